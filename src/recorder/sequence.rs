//! Client-side buffering of start/progress/stop sequences.
//!
//! Each `(event id, sub id)` key moves through `Idle -> Open -> Idle`. Nothing
//! reaches the bus until the stop that closes a sequence, and then the whole
//! sequence goes out as one message.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::bus::SequenceEntry;
use crate::clock::RelativeTimestamp;
use crate::identity::EventId;
use crate::payload::{PayloadValue, WirePayload};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SequenceStage {
    Start,
    Progress,
    Stop,
}

impl fmt::Display for SequenceStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SequenceStage::Start => "start",
            SequenceStage::Progress => "progress",
            SequenceStage::Stop => "stop",
        })
    }
}

/// A sub id compared structurally. Doubles compare by bit pattern, so NaN
/// and both infinities are keys of their own.
#[derive(Debug, Clone)]
struct SubId(PayloadValue);

impl PartialEq for SubId {
    fn eq(&self, other: &Self) -> bool {
        same_value(&self.0, &other.0)
    }
}

impl Eq for SubId {}

impl Hash for SubId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_value(&self.0, state);
    }
}

fn same_value(a: &PayloadValue, b: &PayloadValue) -> bool {
    use PayloadValue::*;
    match (a, b) {
        (Double(x), Double(y)) => x.to_bits() == y.to_bits(),
        (Tuple(xs), Tuple(ys)) | (Array(xs), Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| same_value(x, y))
        }
        (Variant(x), Variant(y)) => same_value(x, y),
        (Maybe(Some(x)), Maybe(Some(y))) => same_value(x, y),
        _ => a == b,
    }
}

fn hash_value<H: Hasher>(value: &PayloadValue, state: &mut H) {
    use PayloadValue::*;
    mem::discriminant(value).hash(state);
    match value {
        Bool(v) => v.hash(state),
        Byte(v) => v.hash(state),
        Int32(v) => v.hash(state),
        Uint32(v) => v.hash(state),
        Int64(v) => v.hash(state),
        Uint64(v) => v.hash(state),
        Double(v) => v.to_bits().hash(state),
        Str(v) => v.hash(state),
        Bytes(v) => v.hash(state),
        Tuple(items) | Array(items) => {
            items.len().hash(state);
            for item in items {
                hash_value(item, state);
            }
        }
        Variant(inner) => hash_value(inner, state),
        Maybe(inner) => {
            if let Some(inner) = inner {
                hash_value(inner, state);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SequenceKey {
    event_id: EventId,
    sub_id: Option<SubId>,
}

impl SequenceKey {
    pub fn new(event_id: EventId, sub_id: Option<&PayloadValue>) -> Self {
        Self {
            event_id,
            sub_id: sub_id.cloned().map(SubId),
        }
    }

    pub fn describe_sub_id(&self) -> String {
        match &self.sub_id {
            Some(SubId(value)) => format!("{value:?}"),
            None => "NULL".to_string(),
        }
    }
}

#[derive(Debug, Default)]
enum SequenceState {
    #[default]
    Idle,
    Open(Vec<SequenceEntry>),
}

/// Result of feeding one stage into a key's buffer.
#[derive(Debug, PartialEq)]
pub enum Step {
    Opened,
    /// A start landed on an open key; the earlier entries were discarded.
    Restarted { abandoned: usize },
    Appended { len: usize },
    /// The stop closed the sequence; these entries are ready to send.
    Flushed(Vec<SequenceEntry>),
    /// Progress or stop on an idle key. Nothing changed.
    Rejected,
}

#[derive(Debug, Default)]
pub struct SequenceBuffers {
    open: Mutex<HashMap<SequenceKey, SequenceState>>,
}

impl SequenceBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SequenceKey, SequenceState>> {
        self.open.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `timestamp` is read by the caller before any validation. A reading that
    /// lost the race for the lock is raised to the buffer's last entry so the
    /// buffer stays sorted.
    pub fn record(
        &self,
        key: SequenceKey,
        stage: SequenceStage,
        timestamp: RelativeTimestamp,
        payload: WirePayload,
    ) -> Step {
        let mut open = self.lock();

        let state = open.remove(&key).unwrap_or_default();
        match (state, stage) {
            (SequenceState::Idle, SequenceStage::Start) => {
                open.insert(key, SequenceState::Open(vec![entry(timestamp, payload)]));
                Step::Opened
            }
            (SequenceState::Open(abandoned), SequenceStage::Start) => {
                open.insert(key, SequenceState::Open(vec![entry(timestamp, payload)]));
                Step::Restarted {
                    abandoned: abandoned.len(),
                }
            }
            (SequenceState::Open(mut entries), SequenceStage::Progress) => {
                push_in_order(&mut entries, timestamp, payload);
                let len = entries.len();
                open.insert(key, SequenceState::Open(entries));
                Step::Appended { len }
            }
            (SequenceState::Open(mut entries), SequenceStage::Stop) => {
                push_in_order(&mut entries, timestamp, payload);
                Step::Flushed(entries)
            }
            (SequenceState::Idle, SequenceStage::Progress | SequenceStage::Stop) => Step::Rejected,
        }
    }

    pub fn is_open(&self, key: &SequenceKey) -> bool {
        matches!(self.lock().get(key), Some(SequenceState::Open(_)))
    }

    pub fn open_count(&self) -> usize {
        self.lock().len()
    }
}

fn entry(relative_timestamp: RelativeTimestamp, payload: WirePayload) -> SequenceEntry {
    SequenceEntry {
        relative_timestamp,
        payload,
    }
}

fn push_in_order(entries: &mut Vec<SequenceEntry>, timestamp: RelativeTimestamp, payload: WirePayload) {
    let floor = entries.last().map_or(timestamp, |last| last.relative_timestamp);
    entries.push(entry(timestamp.max(floor), payload));
}
