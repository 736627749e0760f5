//! A collector stand-in that records every call it receives.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;

use super::{BusCall, BusPeer, BusReply, ObjectPath, TransportError};
use crate::config::DEFAULT_OBJECT_PATH;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub target: ObjectPath,
    pub call: BusCall,
}

#[derive(Debug)]
pub struct RecordingCollector {
    calls: Mutex<Vec<RecordedCall>>,
    received: watch::Sender<usize>,
    next_timer: AtomicU64,
    failure: Mutex<Option<TransportError>>,
}

impl RecordingCollector {
    pub fn new() -> Arc<Self> {
        let (received, _) = watch::channel(0);
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            received,
            next_timer: AtomicU64::new(0),
            failure: Mutex::new(None),
        })
    }

    fn log(&self) -> MutexGuard<'_, Vec<RecordedCall>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.log().clone()
    }

    pub fn calls_named(&self, method: &str) -> Vec<BusCall> {
        self.log()
            .iter()
            .filter(|recorded| recorded.call.method_name() == method)
            .map(|recorded| recorded.call.clone())
            .collect()
    }

    pub fn call_count(&self) -> usize {
        *self.received.borrow()
    }

    /// Every following call fails with `error` until reset with `None`.
    pub fn fail_with(&self, error: Option<TransportError>) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = error;
    }

    /// Waits until at least `count` calls have been received in total.
    pub async fn wait_for_calls(&self, count: usize, timeout: Duration) -> bool {
        let mut received = self.received.subscribe();
        let reached = match tokio::time::timeout(timeout, received.wait_for(|seen| *seen >= count)).await {
            Ok(result) => result.is_ok(),
            Err(_) => false,
        };
        reached
    }
}

impl BusPeer for RecordingCollector {
    fn handle(&self, target: &ObjectPath, call: &BusCall) -> Result<BusReply, TransportError> {
        if let Some(error) = self
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(error);
        }

        self.log().push(RecordedCall {
            target: target.clone(),
            call: call.clone(),
        });
        self.received.send_modify(|seen| *seen += 1);

        match call {
            BusCall::StartAggregateTimer { .. } => {
                let n = self.next_timer.fetch_add(1, Ordering::Relaxed);
                Ok(BusReply::ObjectPath(ObjectPath::new(format!(
                    "{DEFAULT_OBJECT_PATH}/Timer{n}"
                ))))
            }
            _ => Ok(BusReply::Unit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_for_calls_sees_calls_and_gives_up() {
        let collector = RecordingCollector::new();
        assert!(!collector.wait_for_calls(1, Duration::from_millis(20)).await);

        let target = ObjectPath::new(DEFAULT_OBJECT_PATH);
        collector.handle(&target, &BusCall::StopTimer).unwrap();
        assert!(collector.wait_for_calls(1, Duration::from_millis(20)).await);
        assert_eq!(collector.call_count(), 1);
    }

    #[test]
    fn timer_paths_are_numbered() {
        let collector = RecordingCollector::new();
        let start = BusCall::StartAggregateTimer {
            actor: 0,
            event_id: [0; 16],
            payload: crate::payload::encode_optional(None),
        };
        let target = ObjectPath::new(DEFAULT_OBJECT_PATH);
        for n in 0..2 {
            assert_eq!(
                collector.handle(&target, &start),
                Ok(BusReply::ObjectPath(ObjectPath::new(format!("{DEFAULT_OBJECT_PATH}/Timer{n}"))))
            );
        }
    }
}
