//! The public recording API.
//!
//! Every operation has an asynchronous form, which returns once the message is
//! built and queued, and a `_sync` form, which blocks for the collector's
//! acknowledgement. Bad event ids, maybe-typed payloads and sequence misuse
//! are caller defects and are reported immediately by both forms.

mod dispatch;
pub mod pending;
pub mod sequence;
pub mod stats;
pub mod timer;

use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bus::{BusCall, BusReply, BusTransport, TransportError};
use crate::clock;
use crate::config::RecorderConfig;
use crate::error::{RecorderError, Result};
use crate::identity::{AsEventId, EventId};
use crate::payload::{encode_optional, OptionalPayload, PayloadValue};

use dispatch::Dispatcher;
use pending::PendingCall;
use sequence::{SequenceBuffers, SequenceKey, SequenceStage, Step};
use stats::{RecorderStats, StatsSnapshot};
use timer::AggregateTimer;

static DEFAULT_RECORDER: OnceLock<EventRecorder> = OnceLock::new();

pub struct EventRecorder {
    /// `None` when the recorder has no bus connection.
    dispatcher: Option<Dispatcher>,
    config: RecorderConfig,
    sequences: SequenceBuffers,
    stats: Arc<RecorderStats>,
}

impl EventRecorder {
    pub fn new(transport: Arc<dyn BusTransport>, config: RecorderConfig) -> Self {
        let stats = Arc::new(RecorderStats::new());
        Self {
            dispatcher: Some(Dispatcher::new(transport, Arc::clone(&stats))),
            config,
            sequences: SequenceBuffers::new(),
            stats,
        }
    }

    /// A recorder without a bus. Inputs are still validated; nothing is sent.
    pub fn disabled(config: RecorderConfig) -> Self {
        Self {
            dispatcher: None,
            config,
            sequences: SequenceBuffers::new(),
            stats: Arc::new(RecorderStats::new()),
        }
    }

    /// Makes `recorder` the process-wide default. Fails, handing the recorder
    /// back, if a default already exists.
    pub fn install_default(recorder: EventRecorder) -> std::result::Result<(), EventRecorder> {
        DEFAULT_RECORDER.set(recorder)
    }

    /// The process-wide recorder. A disabled one is created on first use if
    /// none was installed.
    pub fn get_default() -> &'static EventRecorder {
        DEFAULT_RECORDER.get_or_init(|| {
            warn!("no metrics bus connection installed, events will be dropped");
            EventRecorder::disabled(RecorderConfig::from_env())
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.dispatcher.is_some()
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn default_actor(&self) -> u32 {
        self.config.actor()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Dispatcher to send with, or `None` (counted and logged) when sending is off.
    fn active_dispatcher(&self, method: &'static str) -> Option<&Dispatcher> {
        let dispatcher = self.dispatcher.as_ref()?;
        if !self.config.submission_enabled {
            debug!(method, "skipping event submission, submission is disabled");
            self.stats.record_skipped();
            return None;
        }
        Some(dispatcher)
    }

    fn validate(&self, event_id: impl AsEventId, payload: Option<&PayloadValue>) -> Result<EventId> {
        let event_id = event_id.to_event_id()?;
        if payload.is_some_and(PayloadValue::contains_maybe) {
            return Err(RecorderError::MaybePayload);
        }
        Ok(event_id)
    }

    fn singular_call(
        &self,
        event_id: impl AsEventId,
        actor: Option<u32>,
        payload: OptionalPayload,
    ) -> Result<BusCall> {
        // Timestamp first; everything after it is overhead.
        let relative_timestamp = clock::now_relative();
        let event_id = self.validate(event_id, payload.as_ref())?;
        debug!(%event_id, %relative_timestamp, has_payload = payload.is_some(), "record singular event");
        Ok(BusCall::RecordSingularEvent {
            actor: actor.unwrap_or_else(|| self.default_actor()),
            event_id: event_id.encode(),
            relative_timestamp,
            payload: encode_optional(payload),
        })
    }

    fn aggregate_call(
        &self,
        event_id: impl AsEventId,
        count: i64,
        actor: Option<u32>,
        payload: OptionalPayload,
    ) -> Result<BusCall> {
        let relative_timestamp = clock::now_relative();
        let event_id = self.validate(event_id, payload.as_ref())?;
        debug!(%event_id, count, %relative_timestamp, has_payload = payload.is_some(), "record aggregate event");
        Ok(BusCall::RecordAggregateEvent {
            actor: actor.unwrap_or_else(|| self.default_actor()),
            event_id: event_id.encode(),
            count,
            relative_timestamp,
            payload: encode_optional(payload),
        })
    }

    fn send(&self, call: BusCall) -> PendingCall {
        match self.active_dispatcher(call.method_name()) {
            Some(dispatcher) => dispatcher.send(&self.config.object_path, call),
            None => PendingCall::skipped(),
        }
    }

    fn send_sync(&self, call: BusCall) -> Result<BusReply> {
        match self.active_dispatcher(call.method_name()) {
            Some(dispatcher) => Ok(dispatcher.call(&self.config.object_path, call)?),
            None => Ok(BusReply::Unit),
        }
    }

    pub fn record_singular(
        &self,
        event_id: impl AsEventId,
        actor: Option<u32>,
        payload: OptionalPayload,
    ) -> Result<PendingCall> {
        let call = self.singular_call(event_id, actor, payload)?;
        Ok(self.send(call))
    }

    pub fn record_singular_sync(
        &self,
        event_id: impl AsEventId,
        actor: Option<u32>,
        payload: OptionalPayload,
    ) -> Result<()> {
        let call = self.singular_call(event_id, actor, payload)?;
        self.send_sync(call).map(|_| ())
    }

    /// `count` is passed through as-is, zero and negative values included.
    pub fn record_aggregate(
        &self,
        event_id: impl AsEventId,
        count: i64,
        actor: Option<u32>,
        payload: OptionalPayload,
    ) -> Result<PendingCall> {
        let call = self.aggregate_call(event_id, count, actor, payload)?;
        Ok(self.send(call))
    }

    pub fn record_aggregate_sync(
        &self,
        event_id: impl AsEventId,
        count: i64,
        actor: Option<u32>,
        payload: OptionalPayload,
    ) -> Result<()> {
        let call = self.aggregate_call(event_id, count, actor, payload)?;
        self.send_sync(call).map(|_| ())
    }

    /// Feeds one stage into the `(event_id, sub_id)` buffer. Returns the
    /// finished sequence call when `stage` closed it.
    fn sequence_step(
        &self,
        event_id: impl AsEventId,
        sub_id: Option<&PayloadValue>,
        stage: SequenceStage,
        payload: OptionalPayload,
    ) -> Result<Option<BusCall>> {
        let relative_timestamp = clock::now_relative();
        let event_id = self.validate(event_id, payload.as_ref())?;
        let key = SequenceKey::new(event_id, sub_id);
        debug!(%event_id, key = %key.describe_sub_id(), %stage, %relative_timestamp, has_payload = payload.is_some(), "record sequence event");

        match self
            .sequences
            .record(key.clone(), stage, relative_timestamp, encode_optional(payload))
        {
            Step::Opened | Step::Appended { .. } => Ok(None),
            Step::Restarted { abandoned } => {
                warn!(
                    %event_id,
                    key = %key.describe_sub_id(),
                    abandoned,
                    "restarted event; there was already an unstopped start event with this type and key"
                );
                Ok(None)
            }
            Step::Flushed(events) => Ok(Some(BusCall::RecordEventSequence {
                actor: self.default_actor(),
                event_id: event_id.encode(),
                events,
            })),
            Step::Rejected => Err(RecorderError::Sequence {
                event_id,
                key: key.describe_sub_id(),
                stage,
            }),
        }
    }

    /// Opens a sequence, discarding any unstopped one under the same key.
    pub fn record_start(
        &self,
        event_id: impl AsEventId,
        sub_id: Option<&PayloadValue>,
        payload: OptionalPayload,
    ) -> Result<()> {
        self.sequence_step(event_id, sub_id, SequenceStage::Start, payload)
            .map(|_| ())
    }

    pub fn record_progress(
        &self,
        event_id: impl AsEventId,
        sub_id: Option<&PayloadValue>,
        payload: OptionalPayload,
    ) -> Result<()> {
        self.sequence_step(event_id, sub_id, SequenceStage::Progress, payload)
            .map(|_| ())
    }

    /// Closes the sequence and sends all of it as one `RecordEventSequence`.
    pub fn record_stop(
        &self,
        event_id: impl AsEventId,
        sub_id: Option<&PayloadValue>,
        payload: OptionalPayload,
    ) -> Result<PendingCall> {
        match self.sequence_step(event_id, sub_id, SequenceStage::Stop, payload)? {
            Some(call) => Ok(self.send(call)),
            None => Ok(PendingCall::skipped()),
        }
    }

    pub fn record_stop_sync(
        &self,
        event_id: impl AsEventId,
        sub_id: Option<&PayloadValue>,
        payload: OptionalPayload,
    ) -> Result<()> {
        match self.sequence_step(event_id, sub_id, SequenceStage::Stop, payload)? {
            Some(call) => self.send_sync(call).map(|_| ()),
            None => Ok(()),
        }
    }

    /// Starts a collector-side timer for the default actor.
    pub fn start_aggregate_timer(
        &self,
        event_id: impl AsEventId,
        payload: OptionalPayload,
        actor: Option<u32>,
    ) -> Result<AggregateTimer> {
        let actor = actor.unwrap_or_else(|| self.default_actor());
        self.start_aggregate_timer_with_actor(actor, event_id, payload)
    }

    /// Returns at once; the timer's object path arrives later. Stopping or
    /// dropping the handle before then defers the stop until it does.
    pub fn start_aggregate_timer_with_actor(
        &self,
        actor: u32,
        event_id: impl AsEventId,
        payload: OptionalPayload,
    ) -> Result<AggregateTimer> {
        let call = self.timer_call(actor, event_id, payload)?;
        let Some(dispatcher) = self.active_dispatcher(call.method_name()) else {
            return Ok(AggregateTimer::closed());
        };

        let timer = AggregateTimer::pending(dispatcher.clone());
        let shared = timer.shared();
        dispatcher.send_then(
            &self.config.object_path,
            call,
            CancellationToken::new(),
            Box::new(move |outcome| shared.resolve(outcome)),
        );
        Ok(timer)
    }

    /// Blocks until the collector has created the timer.
    pub fn start_aggregate_timer_sync(
        &self,
        event_id: impl AsEventId,
        payload: OptionalPayload,
        actor: Option<u32>,
    ) -> Result<AggregateTimer> {
        let actor = actor.unwrap_or_else(|| self.default_actor());
        let call = self.timer_call(actor, event_id, payload)?;
        let Some(dispatcher) = self.active_dispatcher(call.method_name()) else {
            return Ok(AggregateTimer::closed());
        };

        match dispatcher.call(&self.config.object_path, call)? {
            BusReply::ObjectPath(path) if path.is_valid() => {
                Ok(AggregateTimer::open(dispatcher.clone(), path))
            }
            _ => Err(TransportError::UnexpectedReply {
                method: "StartAggregateTimer",
            }
            .into()),
        }
    }

    fn timer_call(
        &self,
        actor: u32,
        event_id: impl AsEventId,
        payload: OptionalPayload,
    ) -> Result<BusCall> {
        let event_id = self.validate(event_id, payload.as_ref())?;
        debug!(%event_id, actor, has_payload = payload.is_some(), "start aggregate timer");
        Ok(BusCall::StartAggregateTimer {
            actor,
            event_id: event_id.encode(),
            payload: encode_optional(payload),
        })
    }
}
