//! TimeoutSupervisor - リクエストごとの期限タイマー
//!
//! # 学習ポイント
//! - タイマー 1 本 = TaskTracker 上の小さなタスク 1 つ
//! - 期限が来たら `evict_and_fail`。すでに resolve 済みなら何もしない
//! - resolve 時は PendingRequest が AbortHandle でタイマーを止める（増え続けない）
//! - shutdown は grace 期間だけ待ち、残りは CancellationToken で打ち切る

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::correlation::CorrelationRegistry;
use crate::domain::{CorrelationId, ReplyError};

pub struct TimeoutSupervisor {
    registry: Arc<CorrelationRegistry>,
    tracker: TaskTracker,
    token: CancellationToken,
}

impl TimeoutSupervisor {
    pub fn new(registry: Arc<CorrelationRegistry>) -> Self {
        Self {
            registry,
            tracker: TaskTracker::new(),
            token: CancellationToken::new(),
        }
    }

    /// Arm a one-shot timer that fails `id` at `deadline`.
    ///
    /// Never blocks. `after` is the duration reported in the timeout error.
    pub fn schedule(&self, id: CorrelationId, deadline: Instant, after: Duration) {
        let registry = Arc::clone(&self.registry);
        let token = self.token.clone();
        let timer_id = id.clone();

        let handle = self.tracker.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep_until(deadline) => {
                    let error = ReplyError::Timeout {
                        correlation_id: timer_id.clone(),
                        after,
                    };
                    if registry.evict_and_fail(timer_id.as_str(), error) {
                        tracing::debug!(correlation_id = %timer_id, ?after, "request deadline expired");
                    }
                }
            }
        });

        // entry がもう無い（resolve 済み）ならタイマーは不要
        if !self.registry.attach_timer(id.as_str(), handle.abort_handle()) {
            handle.abort();
        }
    }

    /// Timer tasks that have not finished yet.
    pub fn active_timers(&self) -> usize {
        self.tracker.len()
    }

    /// Wait up to `grace` for outstanding timers, then cancel the rest.
    /// Returns false when cancellation had to be forced.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.tracker.close();
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_ok() {
            return true;
        }

        tracing::warn!(
            remaining = self.tracker.len(),
            ?grace,
            "timer tasks still running after grace period, cancelling"
        );
        self.token.cancel();
        self.tracker.wait().await;
        false
    }
}
