//! Boundary with the out-of-process collector.
//!
//! [`BusCall`] is the exact method surface the collector exposes. Argument
//! order and types are a contract with the remote peer and must not change.
//! Connection setup and the wire transport itself live behind [`BusTransport`].

pub mod local;
pub mod mock;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::clock::RelativeTimestamp;
use crate::identity::EVENT_ID_LEN;
use crate::payload::{PayloadValue, WirePayload};

pub const RECORDER_INTERFACE: &str = "com.endlessm.Metrics.EventRecorderServer";
pub const TIMER_INTERFACE: &str = "com.endlessm.Metrics.AggregateTimer";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectPath(String);

impl ObjectPath {
    pub fn new(path: impl Into<String>) -> Self {
        ObjectPath(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `/` or `/`-separated non-empty elements of `[A-Za-z0-9_]`.
    pub fn is_valid(&self) -> bool {
        if self.0 == "/" {
            return true;
        }
        match self.0.strip_prefix('/') {
            Some(rest) => rest.split('/').all(|element| {
                !element.is_empty()
                    && element
                        .bytes()
                        .all(|b| b.is_ascii_alphanumeric() || b == b'_')
            }),
            None => false,
        }
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One element of a `RecordEventSequence` call: `(rel_ts, present, value)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceEntry {
    pub relative_timestamp: RelativeTimestamp,
    pub payload: WirePayload,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BusCall {
    RecordSingularEvent {
        actor: u32,
        event_id: [u8; EVENT_ID_LEN],
        relative_timestamp: RelativeTimestamp,
        payload: WirePayload,
    },
    RecordAggregateEvent {
        actor: u32,
        event_id: [u8; EVENT_ID_LEN],
        count: i64,
        relative_timestamp: RelativeTimestamp,
        payload: WirePayload,
    },
    RecordEventSequence {
        actor: u32,
        event_id: [u8; EVENT_ID_LEN],
        events: Vec<SequenceEntry>,
    },
    StartAggregateTimer {
        actor: u32,
        event_id: [u8; EVENT_ID_LEN],
        payload: WirePayload,
    },
    /// Sent to the object path returned by `StartAggregateTimer`.
    StopTimer,
}

impl BusCall {
    pub fn method_name(&self) -> &'static str {
        match self {
            BusCall::RecordSingularEvent { .. } => "RecordSingularEvent",
            BusCall::RecordAggregateEvent { .. } => "RecordAggregateEvent",
            BusCall::RecordEventSequence { .. } => "RecordEventSequence",
            BusCall::StartAggregateTimer { .. } => "StartAggregateTimer",
            BusCall::StopTimer => "StopTimer",
        }
    }

    pub fn interface(&self) -> &'static str {
        match self {
            BusCall::StopTimer => TIMER_INTERFACE,
            _ => RECORDER_INTERFACE,
        }
    }

    pub fn signature(&self) -> &'static str {
        match self {
            BusCall::RecordSingularEvent { .. } => "uayxbv",
            BusCall::RecordAggregateEvent { .. } => "uayxxbv",
            BusCall::RecordEventSequence { .. } => "uaya(xbv)",
            BusCall::StartAggregateTimer { .. } => "uaybv",
            BusCall::StopTimer => "",
        }
    }

    /// Positional arguments, in wire order.
    pub fn arguments(&self) -> Vec<PayloadValue> {
        match self {
            BusCall::RecordSingularEvent {
                actor,
                event_id,
                relative_timestamp,
                payload,
            } => {
                let mut args = vec![
                    PayloadValue::Uint32(*actor),
                    PayloadValue::Bytes(event_id.to_vec()),
                    PayloadValue::Int64(relative_timestamp.as_nanos()),
                ];
                args.extend(payload_arguments(payload));
                args
            }
            BusCall::RecordAggregateEvent {
                actor,
                event_id,
                count,
                relative_timestamp,
                payload,
            } => {
                let mut args = vec![
                    PayloadValue::Uint32(*actor),
                    PayloadValue::Bytes(event_id.to_vec()),
                    PayloadValue::Int64(*count),
                    PayloadValue::Int64(relative_timestamp.as_nanos()),
                ];
                args.extend(payload_arguments(payload));
                args
            }
            BusCall::RecordEventSequence {
                actor,
                event_id,
                events,
            } => {
                let events = events
                    .iter()
                    .map(|entry| {
                        let mut fields = vec![PayloadValue::Int64(entry.relative_timestamp.as_nanos())];
                        fields.extend(payload_arguments(&entry.payload));
                        PayloadValue::Tuple(fields)
                    })
                    .collect();
                vec![
                    PayloadValue::Uint32(*actor),
                    PayloadValue::Bytes(event_id.to_vec()),
                    PayloadValue::Array(events),
                ]
            }
            BusCall::StartAggregateTimer {
                actor,
                event_id,
                payload,
            } => {
                let mut args = vec![
                    PayloadValue::Uint32(*actor),
                    PayloadValue::Bytes(event_id.to_vec()),
                ];
                args.extend(payload_arguments(payload));
                args
            }
            BusCall::StopTimer => Vec::new(),
        }
    }
}

fn payload_arguments(payload: &WirePayload) -> [PayloadValue; 2] {
    [
        PayloadValue::Bool(payload.present),
        PayloadValue::variant(payload.value.clone()),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusReply {
    Unit,
    ObjectPath(ObjectPath),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("metrics bus connection is closed")]
    Disconnected,

    #[error("metrics bus call timed out after {0:?}")]
    Timeout(Duration),

    #[error("metrics bus call was cancelled before dispatch")]
    Cancelled,

    #[error("collector returned {name}: {message}")]
    Remote { name: String, message: String },

    #[error("unexpected reply to {method}")]
    UnexpectedReply { method: &'static str },
}

/// Continuation run exactly once with the outcome of an asynchronous call.
pub type Completion = Box<dyn FnOnce(Result<BusReply, TransportError>) + Send + 'static>;

/// A reliable, ordered request/response channel to the collector.
///
/// Calls issued by one thread reach the peer in the order they were issued.
/// Implementations must run every [`Completion`] exactly once, including when
/// the call is cancelled or the connection is gone.
pub trait BusTransport: Send + Sync {
    /// Blocks until the peer answers.
    fn call(&self, target: &ObjectPath, call: BusCall) -> Result<BusReply, TransportError>;

    /// Enqueues the call and returns. A call whose token is cancelled before
    /// dispatch is never delivered and completes with `Cancelled`.
    fn call_async(
        &self,
        target: &ObjectPath,
        call: BusCall,
        cancel: CancellationToken,
        completion: Completion,
    );
}

/// The receiving end of a bus connection.
pub trait BusPeer: Send + Sync {
    fn handle(&self, target: &ObjectPath, call: &BusCall) -> Result<BusReply, TransportError>;
}
