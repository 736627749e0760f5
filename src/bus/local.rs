use std::io;
use std::sync::mpsc::{sync_channel, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::{BusCall, BusPeer, BusReply, BusTransport, Completion, ObjectPath, TransportError};

struct Envelope {
    target: ObjectPath,
    call: BusCall,
    cancel: CancellationToken,
    completion: Completion,
}

/// In-process connection to a [`BusPeer`].
///
/// Every call, sync or async, goes through one FIFO queue drained by a single
/// dispatch thread, so per-connection ordering holds across both variants.
/// Sync calls must not be issued from inside a [`Completion`]: the dispatch
/// thread would be waiting on itself until the call timeout.
pub struct LocalBus {
    queue: mpsc::UnboundedSender<Envelope>,
    call_timeout: Duration,
}

impl LocalBus {
    pub fn connect(peer: Arc<dyn BusPeer>, call_timeout: Duration) -> io::Result<Self> {
        let (queue, inbox) = mpsc::unbounded_channel();
        thread::Builder::new()
            .name("metrics-bus".to_string())
            .spawn(move || dispatch_loop(peer, inbox))?;
        Ok(Self {
            queue,
            call_timeout,
        })
    }

    fn enqueue(&self, envelope: Envelope) {
        if let Err(mpsc::error::SendError(envelope)) = self.queue.send(envelope) {
            (envelope.completion)(Err(TransportError::Disconnected));
        }
    }
}

fn dispatch_loop(peer: Arc<dyn BusPeer>, mut inbox: mpsc::UnboundedReceiver<Envelope>) {
    while let Some(Envelope {
        target,
        call,
        cancel,
        completion,
    }) = inbox.blocking_recv()
    {
        if cancel.is_cancelled() {
            debug!(method = call.method_name(), %target, "dropping cancelled bus call");
            completion(Err(TransportError::Cancelled));
            continue;
        }
        trace!(interface = call.interface(), method = call.method_name(), %target, "dispatching bus call");
        completion(peer.handle(&target, &call));
    }
    debug!("metrics bus dispatch queue closed");
}

impl BusTransport for LocalBus {
    fn call(&self, target: &ObjectPath, call: BusCall) -> Result<BusReply, TransportError> {
        let (reply_tx, reply_rx) = sync_channel(1);
        let cancel = CancellationToken::new();
        self.enqueue(Envelope {
            target: target.clone(),
            call,
            cancel: cancel.clone(),
            completion: Box::new(move |result| {
                let _ = reply_tx.send(result);
            }),
        });

        match reply_rx.recv_timeout(self.call_timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                // Still queued calls are dropped rather than delivered late.
                cancel.cancel();
                Err(TransportError::Timeout(self.call_timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Disconnected),
        }
    }

    fn call_async(
        &self,
        target: &ObjectPath,
        call: BusCall,
        cancel: CancellationToken,
        completion: Completion,
    ) {
        self.enqueue(Envelope {
            target: target.clone(),
            call,
            cancel,
            completion,
        });
    }
}
