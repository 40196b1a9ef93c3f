//! ResponseListener - reply channel を読み続けるループ
//!
//! # 学習ポイント
//! - subscribe の失敗だけが致命的（start がエラーを返す）
//! - poll は上限付きで待つ。stop 要求とは `select!` で競合させる
//! - poll / commit の一時的なエラーはログを出して固定時間 backoff
//! - ループをどう抜けても subscription は close される

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ListenerConfig;
use crate::correlation::CorrelationRegistry;
use crate::domain::{BrokerRecord, InboundEnvelope, ReplyError};
use crate::ports::{Subscriber, Subscription};

/// Counters kept by the listener loop. Observational only.
#[derive(Debug, Default)]
pub struct ListenerStats {
    matched: AtomicU64,
    unmatched: AtomicU64,
    poll_errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ListenerStatsSnapshot {
    pub matched: u64,
    pub unmatched: u64,
    pub poll_errors: u64,
}

impl ListenerStats {
    pub fn snapshot(&self) -> ListenerStatsSnapshot {
        ListenerStatsSnapshot {
            matched: self.matched.load(Ordering::Relaxed),
            unmatched: self.unmatched.load(Ordering::Relaxed),
            poll_errors: self.poll_errors.load(Ordering::Relaxed),
        }
    }
}

/// Handle to a running listener. Dropping it requests a stop.
pub struct ListenerHandle {
    token: CancellationToken,
    join: Option<JoinHandle<()>>,
    channel: String,
    stats: Arc<ListenerStats>,
}

impl ListenerHandle {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn stats(&self) -> Arc<ListenerStats> {
        Arc::clone(&self.stats)
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Signal the loop and wait until the subscription is closed.
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(join) = self.join.take() {
            if let Err(err) = join.await {
                tracing::error!(channel = %self.channel, error = %err, "response listener task failed");
            }
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

pub struct ResponseListener;

impl ResponseListener {
    /// Subscribe to the reply channel and spawn the consume loop.
    pub async fn start(
        subscriber: Arc<dyn Subscriber>,
        registry: Arc<CorrelationRegistry>,
        config: &ListenerConfig,
    ) -> Result<ListenerHandle, ReplyError> {
        let channel = config.reply_channel.clone();
        let subscription = match subscriber.subscribe(&channel).await {
            Ok(subscription) => subscription,
            Err(err) => {
                tracing::error!(channel = %channel, error = %err, "failed to subscribe to reply channel");
                return Err(ReplyError::Transport {
                    channel,
                    source: err,
                });
            }
        };

        let token = CancellationToken::new();
        let stats = Arc::new(ListenerStats::default());
        let run = ListenerLoop {
            channel: channel.clone(),
            registry,
            stats: Arc::clone(&stats),
            token: token.clone(),
            poll_timeout: config.poll_timeout(),
            error_backoff: config.error_backoff(),
        };
        let join = tokio::spawn(run.run(subscription));

        tracing::info!(channel = %channel, "response listener started");
        Ok(ListenerHandle {
            token,
            join: Some(join),
            channel,
            stats,
        })
    }
}

struct ListenerLoop {
    channel: String,
    registry: Arc<CorrelationRegistry>,
    stats: Arc<ListenerStats>,
    token: CancellationToken,
    poll_timeout: Duration,
    error_backoff: Duration,
}

impl ListenerLoop {
    async fn run(self, mut subscription: Box<dyn Subscription>) {
        loop {
            let polled = tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                polled = subscription.poll(self.poll_timeout) => polled,
            };

            match polled {
                Ok(records) if records.is_empty() => {}
                Ok(records) => {
                    for record in records {
                        self.dispatch(record);
                    }
                    if let Err(err) = subscription.commit().await {
                        tracing::warn!(channel = %self.channel, error = %err, "commit failed");
                        if !self.back_off().await {
                            break;
                        }
                    }
                }
                Err(err) => {
                    self.stats.poll_errors.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        channel = %self.channel,
                        error = %err,
                        backoff = ?self.error_backoff,
                        "poll failed, backing off"
                    );
                    if !self.back_off().await {
                        break;
                    }
                }
            }
        }

        if let Err(err) = subscription.close().await {
            tracing::warn!(channel = %self.channel, error = %err, "closing reply subscription failed");
        }
        tracing::info!(channel = %self.channel, "response listener stopped");
    }

    fn dispatch(&self, record: BrokerRecord) {
        let Some(reply) = InboundEnvelope::from_record(record) else {
            self.stats.unmatched.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(channel = %self.channel, "reply without correlation id dropped");
            return;
        };

        let id = reply.correlation_id().clone();
        if self.registry.resolve_and_remove(id.as_str(), reply) {
            self.stats.matched.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(correlation_id = %id, "reply resolved");
        } else {
            self.stats.unmatched.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(correlation_id = %id, channel = %self.channel, "unmatched or late reply");
        }
    }

    /// Returns false when a stop was requested during the backoff.
    async fn back_off(&self) -> bool {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => false,
            _ = tokio::time::sleep(self.error_backoff) => true,
        }
    }
}
