use thiserror::Error;

use crate::bus::TransportError;
use crate::identity::EventId;
use crate::recorder::sequence::SequenceStage;

/// Problems with an event type identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("invalid event id {input:?}: {reason}")]
    InvalidIdentity { input: String, reason: String },

    #[error("event id {0} is not a known event type")]
    UnknownEventType(EventId),
}

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// Progress or stop without an open start for the key. The buffer is untouched.
    #[error("cannot record {stage} for event {event_id} with key {key}: no unstopped start event")]
    Sequence {
        event_id: EventId,
        key: String,
        stage: SequenceStage,
    },

    #[error("payload contains a maybe type, which the metrics bus cannot carry")]
    MaybePayload,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl RecorderError {
    /// Caller defects, surfaced no matter which call variant was used.
    pub fn is_programmer_error(&self) -> bool {
        !matches!(self, RecorderError::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, RecorderError>;
