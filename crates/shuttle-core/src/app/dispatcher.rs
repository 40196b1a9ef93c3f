//! RequestReplyService - 公開 API（同期 request/reply と fire-and-forget）
//!
//! # send_and_await の流れ
//! 1. correlation id を生成
//! 2. `{correlation_id, reply_topic}` を header に付ける（呼び出し側の headers は複製）
//! 3. registry に pending slot を登録
//! 4. TimeoutSupervisor にタイマーを登録
//! 5. request channel に publish
//! 6. slot の完了 / 失敗 / 期限切れのどれかまで待つ
//!
//! どの経路で抜けても（caller が future を drop しても）registry に entry は残らない。
//!
//! # 設計原則
//! - registry はこのインスタンス専用（グローバル状態にしない）
//! - fire-and-forget は registry に触れない

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;

use super::ack::{PublishAck, PublishReceipt};
use super::listener::{ListenerHandle, ListenerStats, ListenerStatsSnapshot, ResponseListener};
use super::timeout::TimeoutSupervisor;
use crate::config::{DispatcherConfig, ShuttleConfig};
use crate::correlation::{CorrelationRegistry, PendingRequest};
use crate::domain::{CorrelationId, Headers, InboundEnvelope, OutboundEnvelope, ReplyError};
use crate::ports::{IdGenerator, Publisher, Subscriber};

pub struct RequestReplyService {
    publisher: Arc<dyn Publisher>,
    registry: Arc<CorrelationRegistry>,
    supervisor: TimeoutSupervisor,
    ids: Arc<dyn IdGenerator>,
    listener: Mutex<Option<ListenerHandle>>,
    listener_stats: Arc<ListenerStats>,
    reply_channel: String,
    config: DispatcherConfig,
    running: AtomicBool,
}

impl RequestReplyService {
    /// Subscribe to the reply channel and start serving.
    ///
    /// Fails only if the reply subscription cannot be opened.
    pub async fn start(
        publisher: Arc<dyn Publisher>,
        subscriber: Arc<dyn Subscriber>,
        ids: Arc<dyn IdGenerator>,
        config: &ShuttleConfig,
    ) -> Result<Self, ReplyError> {
        let registry = Arc::new(CorrelationRegistry::new());
        let listener =
            ResponseListener::start(subscriber, Arc::clone(&registry), &config.listener).await?;

        tracing::info!(reply_channel = %config.listener.reply_channel, "request/reply service started");
        Ok(Self {
            publisher,
            supervisor: TimeoutSupervisor::new(Arc::clone(&registry)),
            registry,
            ids,
            listener_stats: listener.stats(),
            listener: Mutex::new(Some(listener)),
            reply_channel: config.listener.reply_channel.clone(),
            config: config.dispatcher.clone(),
            running: AtomicBool::new(true),
        })
    }

    /// Publish `payload` and wait for the correlated reply.
    ///
    /// `reply_channel` must be the channel this instance listens on.
    pub async fn send_and_await(
        &self,
        payload: Vec<u8>,
        request_channel: &str,
        reply_channel: &str,
        headers: &Headers,
        timeout: Duration,
    ) -> Result<InboundEnvelope, ReplyError> {
        if !self.is_running() {
            return Err(ReplyError::shutting_down());
        }
        if reply_channel != self.reply_channel {
            return Err(ReplyError::ReplyChannelMismatch {
                requested: reply_channel.to_string(),
                listening: self.reply_channel.clone(),
            });
        }

        let id = self.ids.generate_correlation_id();
        let envelope = OutboundEnvelope::request(id.clone(), payload, reply_channel, headers);
        let timed_out = || ReplyError::Timeout {
            correlation_id: id.clone(),
            after: timeout,
        };

        let (pending, mut receiver) = PendingRequest::new(timeout);
        let deadline = pending.deadline();
        self.registry.register(id.clone(), pending)?;
        let _registration = RegistrationGuard {
            registry: self.registry.as_ref(),
            id: &id,
        };

        // shutdown の fail_all と登録がすれ違った場合
        if !self.is_running() {
            return Err(ReplyError::shutting_down());
        }
        self.supervisor.schedule(id.clone(), deadline, timeout);

        tracing::info!(correlation_id = %id, channel = %request_channel, "sending request");
        let publish = self.publisher.publish(request_channel, envelope.into_record());
        match tokio::time::timeout_at(deadline, publish).await {
            Ok(Ok(())) => {}
            Ok(Err(source)) => {
                self.registry.discard(id.as_str());
                tracing::error!(correlation_id = %id, channel = %request_channel, error = %source, "publish failed");
                return Err(ReplyError::Transport {
                    channel: request_channel.to_string(),
                    source,
                });
            }
            Err(_) => return Err(timed_out()),
        }

        match tokio::time::timeout_at(deadline, &mut receiver).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(ReplyError::shutting_down()),
            Err(_) => {
                // タイマーと同時刻。先に remove した側の結果を採る
                self.registry.discard(id.as_str());
                receiver.try_recv().unwrap_or_else(|_| Err(timed_out()))
            }
        }
    }

    /// Publish without waiting for a reply. Never blocks.
    ///
    /// Must be called within a tokio runtime.
    pub fn send_fire_and_forget(
        &self,
        payload: Vec<u8>,
        request_channel: &str,
        headers: &Headers,
    ) -> PublishAck {
        if !self.is_running() {
            return PublishAck::failed(ReplyError::shutting_down());
        }

        let id = self.ids.generate_correlation_id();
        let envelope = OutboundEnvelope::fire_and_forget(id, payload, headers);
        let publisher = Arc::clone(&self.publisher);
        let channel = request_channel.to_string();

        let (ack, completer) = PublishAck::pending();
        tokio::spawn(async move {
            completer.complete(publish_no_reply(publisher.as_ref(), &channel, envelope).await);
        });
        ack
    }

    /// Callback flavour of `send_fire_and_forget`. Callback panics are caught and logged.
    pub fn send_fire_and_forget_with<S, F>(
        &self,
        payload: Vec<u8>,
        request_channel: &str,
        headers: &Headers,
        on_success: S,
        on_failure: F,
    ) where
        S: FnOnce(PublishReceipt) + Send + 'static,
        F: FnOnce(ReplyError) + Send + 'static,
    {
        self.send_fire_and_forget(payload, request_channel, headers)
            .on_complete(on_success, on_failure);
    }

    /// One awaited fire-and-forget publish. The retry decorator runs this per attempt.
    pub(crate) async fn fire_and_forget_once(
        &self,
        payload: Vec<u8>,
        request_channel: &str,
        headers: &Headers,
    ) -> Result<PublishReceipt, ReplyError> {
        if !self.is_running() {
            return Err(ReplyError::shutting_down());
        }
        let id = self.ids.generate_correlation_id();
        let envelope = OutboundEnvelope::fire_and_forget(id, payload, headers);
        publish_no_reply(self.publisher.as_ref(), request_channel, envelope).await
    }

    /// Stop serving: fail every pending request, stop the listener, release timers.
    ///
    /// Idempotent.
    pub async fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        tracing::info!(pending = self.registry.len(), "shutting down request/reply service");

        let failed = self.registry.fail_all(|_| ReplyError::shutting_down());
        if let Some(listener) = self.listener.lock().await.take() {
            listener.stop().await;
        }
        let graceful = self.supervisor.shutdown(self.config.shutdown_grace()).await;
        // 停止中に登録だけ済ませたリクエスト
        let late = self.registry.fail_all(|_| ReplyError::shutting_down());

        tracing::info!(failed = failed + late, graceful, "request/reply service stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn pending_count(&self) -> usize {
        self.registry.len()
    }

    /// The channel replies are consumed from.
    pub fn reply_channel(&self) -> &str {
        &self.reply_channel
    }

    pub fn default_timeout(&self) -> Duration {
        self.config.request_timeout()
    }

    pub fn listener_stats(&self) -> ListenerStatsSnapshot {
        self.listener_stats.snapshot()
    }
}

/// Removes the registry entry however `send_and_await` exits.
struct RegistrationGuard<'a> {
    registry: &'a CorrelationRegistry,
    id: &'a CorrelationId,
}

impl Drop for RegistrationGuard<'_> {
    fn drop(&mut self) {
        self.registry.discard(self.id.as_str());
    }
}

async fn publish_no_reply(
    publisher: &dyn Publisher,
    channel: &str,
    envelope: OutboundEnvelope,
) -> Result<PublishReceipt, ReplyError> {
    let correlation_id = envelope.correlation_id().clone();
    match publisher.publish(channel, envelope.into_record()).await {
        Ok(()) => {
            tracing::info!(correlation_id = %correlation_id, channel = %channel, "fire-and-forget message sent");
            Ok(PublishReceipt {
                correlation_id,
                channel: channel.to_string(),
            })
        }
        Err(source) => {
            tracing::error!(correlation_id = %correlation_id, channel = %channel, error = %source, "fire-and-forget publish failed");
            Err(ReplyError::Transport {
                channel: channel.to_string(),
                source,
            })
        }
    }
}
