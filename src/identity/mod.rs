//! Event type identity.
//!
//! An [`EventId`] names a *kind* of event, never an instance. Ids are RFC 4122
//! UUIDs chosen by the application and go on the wire as 16 bytes in RFC byte
//! order (the order they are written in, most significant first).

pub mod event_types;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::IdentityError;

pub const EVENT_ID_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(Uuid);

impl EventId {
    pub const fn from_uuid(uuid: Uuid) -> Self {
        EventId(uuid)
    }

    /// Parses the human-readable form (hyphenated, simple, braced or urn).
    pub fn parse(text: &str) -> Result<Self, IdentityError> {
        Uuid::parse_str(text)
            .map(EventId)
            .map_err(|e| IdentityError::InvalidIdentity {
                input: text.to_string(),
                reason: e.to_string(),
            })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        if bytes.len() != EVENT_ID_LEN {
            return Err(IdentityError::InvalidIdentity {
                input: format!("{bytes:02x?}"),
                reason: format!("expected {EVENT_ID_LEN} bytes, got {}", bytes.len()),
            });
        }
        let mut raw = [0u8; EVENT_ID_LEN];
        raw.copy_from_slice(bytes);
        Ok(EventId(Uuid::from_bytes(raw)))
    }

    /// Wire form.
    pub fn encode(&self) -> [u8; EVENT_ID_LEN] {
        *self.0.as_bytes()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}

impl FromStr for EventId {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventId::parse(s)
    }
}

impl From<Uuid> for EventId {
    fn from(uuid: Uuid) -> Self {
        EventId(uuid)
    }
}

/// Anything the recorder accepts where an event type is expected.
/// Validation happens at call time so a bad id surfaces to the caller.
pub trait AsEventId {
    fn to_event_id(&self) -> Result<EventId, IdentityError>;
}

impl AsEventId for EventId {
    fn to_event_id(&self) -> Result<EventId, IdentityError> {
        Ok(*self)
    }
}

impl AsEventId for Uuid {
    fn to_event_id(&self) -> Result<EventId, IdentityError> {
        Ok(EventId(*self))
    }
}

impl AsEventId for str {
    fn to_event_id(&self) -> Result<EventId, IdentityError> {
        EventId::parse(self)
    }
}

impl AsEventId for String {
    fn to_event_id(&self) -> Result<EventId, IdentityError> {
        EventId::parse(self)
    }
}

impl AsEventId for [u8] {
    fn to_event_id(&self) -> Result<EventId, IdentityError> {
        EventId::from_bytes(self)
    }
}

impl<T: AsEventId + ?Sized> AsEventId for &T {
    fn to_event_id(&self) -> Result<EventId, IdentityError> {
        (**self).to_event_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hyphenated_text_encodes_in_written_order() {
        let id = EventId::parse("5071dd96-bdad-4ee5-9c26-3dfef34a9963").unwrap();
        assert_eq!(
            id.encode(),
            [
                0x50, 0x71, 0xdd, 0x96, 0xbd, 0xad, 0x4e, 0xe5, 0x9c, 0x26, 0x3d, 0xfe, 0xf3, 0x4a,
                0x99, 0x63
            ]
        );
        assert_eq!(id.to_string(), "5071dd96-bdad-4ee5-9c26-3dfef34a9963");
    }

    #[test]
    fn short_and_long_inputs_are_rejected() {
        for bad in ["", "5071dd96", "5071dd96-bdad-4ee5-9c26-3dfef34a996", "not a uuid at all"] {
            assert!(
                matches!(EventId::parse(bad), Err(IdentityError::InvalidIdentity { .. })),
                "{bad:?} should not parse"
            );
        }
        assert!(EventId::from_bytes(&[0u8; 15]).is_err());
        assert!(EventId::from_bytes(&[0u8; 17]).is_err());
    }
}
