//! PendingRequest - 応答待ちの 1 件分

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::domain::{InboundEnvelope, ReplyError};

/// What a caller of `send_and_await` eventually receives.
pub type ReplyOutcome = Result<InboundEnvelope, ReplyError>;

/// The receiving half handed back to the caller at registration time.
pub type ReplyReceiver = oneshot::Receiver<ReplyOutcome>;

/// A single-assignment result slot plus bookkeeping.
///
/// Owned by the registry from `register` until it is removed. The slot is a
/// oneshot sender, so it can be completed at most once by construction.
/// Dropping the entry without completing it closes the caller's receiver and
/// cancels the deadline timer.
#[derive(Debug)]
pub struct PendingRequest {
    slot: Option<oneshot::Sender<ReplyOutcome>>,
    deadline: Instant,
    timer: Option<AbortHandle>,
}

impl PendingRequest {
    pub fn new(timeout: Duration) -> (Self, ReplyReceiver) {
        let (slot, receiver) = oneshot::channel();
        let pending = Self {
            slot: Some(slot),
            deadline: Instant::now() + timeout,
            timer: None,
        };
        (pending, receiver)
    }

    /// Registration time plus the request timeout.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub(crate) fn set_timer(&mut self, timer: AbortHandle) {
        if let Some(previous) = self.timer.replace(timer) {
            previous.abort();
        }
    }

    /// Returns false when the caller already stopped waiting.
    pub(crate) fn complete(mut self, outcome: ReplyOutcome) -> bool {
        match self.slot.take() {
            Some(slot) => slot.send(outcome).is_ok(),
            None => false,
        }
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        // resolve 済みの timer は不要（cancel は最適化であって正しさには不要）
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}
