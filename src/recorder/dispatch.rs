use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::pending::PendingCall;
use super::stats::RecorderStats;
use crate::bus::{BusCall, BusReply, BusTransport, Completion, ObjectPath, TransportError};

/// Sends calls on a transport and keeps the recorder's counters honest.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    transport: Arc<dyn BusTransport>,
    stats: Arc<RecorderStats>,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn BusTransport>, stats: Arc<RecorderStats>) -> Self {
        Self { transport, stats }
    }

    pub fn send(&self, target: &ObjectPath, call: BusCall) -> PendingCall {
        let (pending, reply) = PendingCall::channel();
        self.send_then(
            target,
            call,
            pending.token(),
            Box::new(move |outcome| {
                // The caller may have dropped the handle; that is fine.
                let _ = reply.send(outcome);
            }),
        );
        pending
    }

    pub fn send_then(
        &self,
        target: &ObjectPath,
        call: BusCall,
        cancel: CancellationToken,
        then: Completion,
    ) {
        let method = call.method_name();
        let stats = Arc::clone(&self.stats);
        stats.record_dispatch();

        self.transport.call_async(
            target,
            call,
            cancel,
            Box::new(move |outcome| {
                stats.record_outcome(&outcome);
                log_failure(method, &outcome);
                then(outcome);
            }),
        );
    }

    pub fn call(&self, target: &ObjectPath, call: BusCall) -> Result<BusReply, TransportError> {
        let method = call.method_name();
        self.stats.record_dispatch();
        let outcome = self.transport.call(target, call);
        self.stats.record_outcome(&outcome);
        log_failure(method, &outcome);
        outcome
    }
}

fn log_failure(method: &'static str, outcome: &Result<BusReply, TransportError>) {
    match outcome {
        Ok(_) => {}
        Err(TransportError::Cancelled) => debug!(method, "metrics call cancelled"),
        Err(error) => warn!(method, %error, "failed to send event to the metrics collector"),
    }
}
