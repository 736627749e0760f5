use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::bus::{BusReply, TransportError};

type Outcome = Result<BusReply, TransportError>;

enum State {
    Ready(Outcome),
    Waiting(oneshot::Receiver<Outcome>),
}

/// Handle to an asynchronous recording call.
///
/// Dropping it is fire-and-forget: the call still goes out and failures are
/// only logged and counted. Awaiting [`PendingCall::outcome`] is how a caller
/// attaches a continuation.
pub struct PendingCall {
    state: State,
    cancel: CancellationToken,
}

impl PendingCall {
    pub(crate) fn channel() -> (Self, oneshot::Sender<Outcome>) {
        let (reply, receiver) = oneshot::channel();
        (
            Self {
                state: State::Waiting(receiver),
                cancel: CancellationToken::new(),
            },
            reply,
        )
    }

    /// For calls that were never sent because submission is off.
    pub(crate) fn skipped() -> Self {
        Self {
            state: State::Ready(Ok(BusReply::Unit)),
            cancel: CancellationToken::new(),
        }
    }

    pub(crate) fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Withdraws the call if the transport has not dispatched it yet.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn outcome(self) -> Outcome {
        match self.state {
            State::Ready(outcome) => outcome,
            State::Waiting(receiver) => receiver.await.unwrap_or(Err(TransportError::Disconnected)),
        }
    }
}
