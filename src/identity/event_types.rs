//! Well-known event types from the first generation of instrumentation.
//!
//! Newer event types live with the code that records them; this table only
//! exists so old ids can still be given a readable name.

use uuid::uuid;

use super::EventId;
use crate::error::IdentityError;

/// Started when a user logs in and stopped when that user logs out.
pub const USER_IS_LOGGED_IN: EventId =
    EventId::from_uuid(uuid!("ab839fd2-a927-456c-8c18-f1136722666b"));

/// Payload is `(previous_network_state, new_network_state)`.
pub const NETWORK_STATUS_CHANGED: EventId =
    EventId::from_uuid(uuid!("5fae6179-e108-4962-83be-c909259c0584"));

/// Start carries the application name, stop carries nothing.
pub const SHELL_APP_IS_OPEN: EventId =
    EventId::from_uuid(uuid!("b5e11a3d-13f8-4219-84fd-c9ba0bf3d1f0"));

pub const SOCIAL_BAR_IS_VISIBLE: EventId =
    EventId::from_uuid(uuid!("9c33a734-7ed8-4348-9e39-3c27f4dc2e62"));

pub const SHELL_APP_ADDED: EventId =
    EventId::from_uuid(uuid!("51640a4e-79aa-47ac-b7e2-d3106a06e129"));

pub const SHELL_APP_REMOVED: EventId =
    EventId::from_uuid(uuid!("683b40a7-cac0-4f9a-994c-4b274693a0a0"));

const KNOWN_EVENTS: &[(EventId, &str)] = &[
    (USER_IS_LOGGED_IN, "User is logged in"),
    (NETWORK_STATUS_CHANGED, "Network status changed"),
    (SHELL_APP_IS_OPEN, "Shell app is open"),
    (SOCIAL_BAR_IS_VISIBLE, "Social bar is visible"),
    (SHELL_APP_ADDED, "Shell app added"),
    (SHELL_APP_REMOVED, "Shell app removed"),
];

pub fn name_of(event_id: &EventId) -> Option<&'static str> {
    KNOWN_EVENTS
        .iter()
        .find(|(known, _)| known == event_id)
        .map(|(_, name)| *name)
}

/// Malformed ids are `InvalidIdentity`; valid but unlisted ids are `UnknownEventType`.
pub fn event_id_to_name(event_id: &str) -> Result<&'static str, IdentityError> {
    let parsed = EventId::parse(event_id)?;
    name_of(&parsed).ok_or(IdentityError::UnknownEventType(parsed))
}
