//! ResilientRequestService - RequestReplyService に retry を被せる decorator
//!
//! - 再試行ごとに dispatch 全体をやり直す（correlation id も新しくなる）
//! - registry には直接触れない
//! - エラーは上限に達したときだけ（原因つきで）返る
//! - inner が停止したら残りの試行はしない（停止は恒久的）

use std::sync::Arc;
use std::time::Duration;

use super::metrics::RetryMetricsSnapshot;
use super::policy::RetryPolicy;
use super::retry::Retry;
use crate::app::ack::{PublishAck, PublishReceipt};
use crate::app::dispatcher::RequestReplyService;
use crate::domain::{Headers, InboundEnvelope, ReplyError};

pub struct ResilientRequestService {
    inner: Arc<RequestReplyService>,
    retry: Arc<Retry>,
}

impl ResilientRequestService {
    pub fn new(inner: Arc<RequestReplyService>, retry: Retry) -> Self {
        Self {
            inner,
            retry: Arc::new(retry),
        }
    }

    /// `send_and_await` under the retry policy. Each attempt gets a fresh id
    /// and its own `timeout`.
    ///
    /// Once the inner service is shut down, the failing attempt surfaces as is
    /// and no further attempt is made.
    pub async fn send_with_retry(
        &self,
        payload: Vec<u8>,
        request_channel: &str,
        reply_channel: &str,
        headers: &Headers,
        timeout: Duration,
    ) -> Result<InboundEnvelope, ReplyError> {
        let inner = self.inner.as_ref();
        self.retry
            .execute_while(
                "send_and_await",
                || inner.is_running(),
                move |_attempt| {
                    inner.send_and_await(payload.clone(), request_channel, reply_channel, headers, timeout)
                },
            )
            .await
    }

    /// Plain fire-and-forget, no retry.
    pub fn send_fire_and_forget(
        &self,
        payload: Vec<u8>,
        request_channel: &str,
        headers: &Headers,
    ) -> PublishAck {
        self.inner.send_fire_and_forget(payload, request_channel, headers)
    }

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
        self.inner
            .send_fire_and_forget_with(payload, request_channel, headers, on_success, on_failure);
    }

    /// Fire-and-forget whose publish is retried in the background.
    ///
    /// Never blocks; the ack resolves once an attempt succeeds or retries run out.
    pub fn send_fire_and_forget_with_retry(
        &self,
        payload: Vec<u8>,
        request_channel: &str,
        headers: &Headers,
    ) -> PublishAck {
        if !self.inner.is_running() {
            return PublishAck::failed(ReplyError::shutting_down());
        }

        let inner = Arc::clone(&self.inner);
        let retry = Arc::clone(&self.retry);
        let channel = request_channel.to_string();
        let headers = headers.clone();
        let (ack, completer) = PublishAck::pending();

        tokio::spawn(async move {
            let (service, channel, headers, payload) = (inner.as_ref(), channel.as_str(), &headers, &payload);
            let outcome = retry
                .execute_while(
                    "fire_and_forget",
                    || service.is_running(),
                    move |_attempt| service.fire_and_forget_once(payload.clone(), channel, headers),
                )
                .await;
            completer.complete(outcome);
        });
        ack
    }

    pub fn send_fire_and_forget_with_retry_callbacks<S, F>(
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
        self.send_fire_and_forget_with_retry(payload, request_channel, headers)
            .on_complete(on_success, on_failure);
    }

    pub fn metrics(&self) -> RetryMetricsSnapshot {
        self.retry.metrics()
    }

    pub fn retry_config(&self) -> &RetryPolicy {
        self.retry.policy()
    }

    pub fn is_service_running(&self) -> bool {
        self.inner.is_running()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending_count()
    }

    /// The wrapped service, for calls that should bypass retry.
    pub fn inner(&self) -> &Arc<RequestReplyService> {
        &self.inner
    }

    pub async fn shutdown(&self) {
        self.inner.shutdown().await;
    }
}
