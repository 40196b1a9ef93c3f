//! PublishAck - fire-and-forget の完了ハンドル
//!
//! - `.await` で publish の成否を待てる（Future）
//! - `on_complete` でコールバックを登録できる（呼び出し元はブロックしない）
//! - コールバック内の panic は捕まえてログに出す

use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::domain::{CorrelationId, ReplyError};

/// What a successful fire-and-forget publish reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub correlation_id: CorrelationId,
    pub channel: String,
}

/// Completion handle for a fire-and-forget send.
///
/// Dropping it does not cancel the publish.
#[must_use = "await the ack or register callbacks with on_complete"]
#[derive(Debug)]
pub struct PublishAck {
    receiver: oneshot::Receiver<Result<PublishReceipt, ReplyError>>,
}

/// Write side of a `PublishAck`.
#[derive(Debug)]
pub struct AckCompleter {
    sender: oneshot::Sender<Result<PublishReceipt, ReplyError>>,
}

impl AckCompleter {
    pub fn complete(self, outcome: Result<PublishReceipt, ReplyError>) {
        // 受け手がいなくても publish 自体は終わっている
        let _ = self.sender.send(outcome);
    }
}

impl PublishAck {
    pub fn pending() -> (Self, AckCompleter) {
        let (sender, receiver) = oneshot::channel();
        (Self { receiver }, AckCompleter { sender })
    }

    /// An ack that is already failed, e.g. after shutdown.
    pub fn failed(error: ReplyError) -> Self {
        let (ack, completer) = Self::pending();
        completer.complete(Err(error));
        ack
    }

    /// Register callbacks instead of awaiting. Exactly one of them runs.
    ///
    /// Must be called inside a tokio runtime.
    pub fn on_complete<S, F>(self, on_success: S, on_failure: F)
    where
        S: FnOnce(PublishReceipt) + Send + 'static,
        F: FnOnce(ReplyError) + Send + 'static,
    {
        tokio::spawn(async move {
            match self.await {
                Ok(receipt) => run_guarded("on_success", move || on_success(receipt)),
                Err(err) => run_guarded("on_failure", move || on_failure(err)),
            }
        });
    }
}

impl Future for PublishAck {
    type Output = Result<PublishReceipt, ReplyError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver).poll(cx).map(|received| {
            received.unwrap_or_else(|_| {
                Err(ReplyError::ServiceUnavailable(
                    "publish task ended without reporting".to_string(),
                ))
            })
        })
    }
}

/// Run user code, catching and logging a panic instead of unwinding into us.
pub(crate) fn run_guarded<F: FnOnce()>(label: &'static str, f: F) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(f)) {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        tracing::error!(callback = label, panic = %message, "callback panicked");
    }
}
