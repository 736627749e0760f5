//! Client proxy for a collector-side aggregate timer.
//!
//! A timer has two release paths: an explicit [`AggregateTimer::stop`] and
//! `Drop`. The drop path is a safety net so collector timers do not leak; it
//! sends the stop asynchronously and its timing is not guaranteed.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::dispatch::Dispatcher;
use crate::bus::{BusCall, BusReply, ObjectPath, TransportError};

#[derive(Debug, Default)]
struct TimerSlot {
    /// Known once the start call has been answered.
    path: Option<ObjectPath>,
    stopped: bool,
}

pub(crate) struct TimerShared {
    dispatcher: Option<Dispatcher>,
    slot: Mutex<TimerSlot>,
}

impl TimerShared {
    fn lock(&self) -> MutexGuard<'_, TimerSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Marks the timer stopped. Returns the path to send `StopTimer` to, or
    /// `None` when there is nothing to send now (already stopped, or the path
    /// has not arrived and the stop is deferred until it does).
    fn begin_stop(&self) -> Option<ObjectPath> {
        let mut slot = self.lock();
        if slot.stopped {
            return None;
        }
        slot.stopped = true;
        slot.path.clone()
    }

    fn send_stop(&self, path: ObjectPath) {
        let Some(dispatcher) = &self.dispatcher else {
            return;
        };
        dispatcher.send_then(
            &path,
            BusCall::StopTimer,
            CancellationToken::new(),
            Box::new(|_| {}),
        );
    }

    /// Completion of an asynchronous `StartAggregateTimer`.
    pub(crate) fn resolve(&self, outcome: Result<BusReply, TransportError>) {
        let path = match outcome {
            Ok(BusReply::ObjectPath(path)) if path.is_valid() => path,
            Ok(reply) => {
                warn!(?reply, "collector returned no usable aggregate timer path");
                self.lock().stopped = true;
                return;
            }
            Err(error) => {
                // Already logged by the dispatcher. Nothing exists remotely to stop.
                debug!(%error, "aggregate timer was not started");
                self.lock().stopped = true;
                return;
            }
        };

        let deferred_stop = {
            let mut slot = self.lock();
            slot.path = Some(path.clone());
            slot.stopped
        };
        if deferred_stop {
            debug!(%path, "sending deferred aggregate timer stop");
            self.send_stop(path);
        }
    }
}

/// Live handle to a collector-side aggregate timer.
pub struct AggregateTimer {
    shared: Arc<TimerShared>,
}

impl AggregateTimer {
    pub(crate) fn pending(dispatcher: Dispatcher) -> Self {
        Self::with_slot(Some(dispatcher), TimerSlot::default())
    }

    pub(crate) fn open(dispatcher: Dispatcher, path: ObjectPath) -> Self {
        Self::with_slot(
            Some(dispatcher),
            TimerSlot {
                path: Some(path),
                stopped: false,
            },
        )
    }

    /// A timer that never existed remotely, e.g. from a disabled recorder.
    pub(crate) fn closed() -> Self {
        Self::with_slot(
            None,
            TimerSlot {
                path: None,
                stopped: true,
            },
        )
    }

    fn with_slot(dispatcher: Option<Dispatcher>, slot: TimerSlot) -> Self {
        Self {
            shared: Arc::new(TimerShared {
                dispatcher,
                slot: Mutex::new(slot),
            }),
        }
    }

    pub(crate) fn shared(&self) -> Arc<TimerShared> {
        Arc::clone(&self.shared)
    }

    pub fn object_path(&self) -> Option<ObjectPath> {
        self.shared.lock().path.clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.lock().stopped
    }

    /// Stops the timer without waiting for the collector. Idempotent, also
    /// under a race: exactly one caller sends `StopTimer`.
    pub fn stop(&self) {
        if let Some(path) = self.shared.begin_stop() {
            self.shared.send_stop(path);
        }
    }

    /// Like [`stop`](Self::stop) but waits for the collector to acknowledge.
    /// If the start call is still in flight the stop is deferred and this
    /// returns immediately.
    pub fn stop_sync(&self) -> Result<(), TransportError> {
        let Some(path) = self.shared.begin_stop() else {
            return Ok(());
        };
        match &self.shared.dispatcher {
            Some(dispatcher) => dispatcher.call(&path, BusCall::StopTimer).map(|_| ()),
            None => Ok(()),
        }
    }
}

impl Drop for AggregateTimer {
    fn drop(&mut self) {
        if !self.is_stopped() {
            debug!("aggregate timer dropped while running, stopping it");
            self.stop();
        }
    }
}
