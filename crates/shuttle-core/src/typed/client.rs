//! TypedClient - codec を挟んだ request/reply クライアント
//!
//! # 学習ポイント
//! - デフォルト型パラメータ（`TypedClient<C = JsonCodec>`）
//! - encode / decode の失敗は `ReplyError::Codec`（retry しない）
//! - `call` は相手が `ReplyMessage` で答える前提。`success == false` は Remote エラー

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::app::PublishAck;
use crate::domain::{Headers, ReplyError, ReplyMessage};
use crate::impls::JsonCodec;
use crate::ports::PayloadCodec;
use crate::resilience::ResilientRequestService;

/// Header carrying the codec's content type.
pub const CONTENT_TYPE_HEADER: &str = "content_type";

pub struct TypedClient<C: PayloadCodec = JsonCodec> {
    service: Arc<ResilientRequestService>,
    codec: C,
    request_channel: String,
    timeout: Duration,
}

impl TypedClient<JsonCodec> {
    /// JSON client for `request_channel`, using the service's default timeout.
    pub fn new(service: Arc<ResilientRequestService>, request_channel: impl Into<String>) -> Self {
        Self::with_codec(service, JsonCodec, request_channel)
    }
}

impl<C: PayloadCodec> TypedClient<C> {
    pub fn with_codec(
        service: Arc<ResilientRequestService>,
        codec: C,
        request_channel: impl Into<String>,
    ) -> Self {
        let timeout = service.inner().default_timeout();
        Self {
            service,
            codec,
            request_channel: request_channel.into(),
            timeout,
        }
    }

    /// Per-attempt deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn request_channel(&self) -> &str {
        &self.request_channel
    }

    /// Send `value` and decode the raw reply payload as `R`.
    pub async fn request<T, R>(&self, value: &T) -> Result<R, ReplyError>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let payload = self.codec.encode(value)?;
        let reply = self
            .service
            .send_with_retry(
                payload,
                &self.request_channel,
                self.service.inner().reply_channel(),
                &self.headers(),
                self.timeout,
            )
            .await?;
        Ok(self.codec.decode(reply.payload())?)
    }

    /// Send `value` and unwrap a `ReplyMessage<R>` answer.
    pub async fn call<T, R>(&self, value: &T) -> Result<R, ReplyError>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.request::<T, ReplyMessage<R>>(value).await?.into_result()
    }

    /// Fire-and-forget `value`, retrying the publish in the background.
    pub fn notify<T>(&self, value: &T) -> Result<PublishAck, ReplyError>
    where
        T: Serialize + ?Sized,
    {
        let payload = self.codec.encode(value)?;
        Ok(self
            .service
            .send_fire_and_forget_with_retry(payload, &self.request_channel, &self.headers()))
    }

    fn headers(&self) -> Headers {
        Headers::new().with(CONTENT_TYPE_HEADER, self.codec.content_type())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ServiceBuilder;
    use crate::config::{ListenerConfig, RetryConfig, ShuttleConfig};
    use crate::domain::{ErrorKind, InboundEnvelope, NO_REPLY_HEADER};
    use crate::impls::{InMemoryBroker, ReplyResponder, handler};
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize)]
    struct Quote {
        sku: String,
        quantity: u32,
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Price {
        total_cents: u64,
    }

    async fn client(broker: &Arc<InMemoryBroker>) -> TypedClient {
        let config = ShuttleConfig {
            listener: ListenerConfig {
                reply_channel: "pricing-replies".into(),
                poll_timeout_ms: 50,
                error_backoff_ms: 200,
            },
            retry: RetryConfig {
                max_attempts: 2,
                wait_ms: 50,
                ..RetryConfig::default()
            },
            ..ShuttleConfig::default()
        };
        let service = ServiceBuilder::new()
            .broker(broker.clone())
            .config(config)
            .start_resilient()
            .await
            .unwrap();
        TypedClient::new(Arc::new(service), "pricing").timeout(Duration::from_secs(1))
    }

    /// Prices 250 cents per unit; refuses unknown SKUs with an error reply.
    async fn pricing_service(broker: &Arc<InMemoryBroker>) -> ReplyResponder {
        ReplyResponder::spawn(
            broker.clone(),
            broker.as_ref(),
            "pricing",
            handler(|req: InboundEnvelope| async move {
                let id = req.correlation_id().clone();
                let quote: Quote = JsonCodec.decode(req.payload()).ok()?;
                let reply = if quote.sku == "A-1" {
                    ReplyMessage::success(id, Price { total_cents: 250 * u64::from(quote.quantity) })
                } else {
                    ReplyMessage::error(id, format!("unknown sku {}", quote.sku))
                };
                JsonCodec.encode(&reply).ok()
            }),
            Duration::from_millis(50),
        )
        .await
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn call_decodes_a_successful_reply() {
        let broker = Arc::new(InMemoryBroker::new());
        let responder = pricing_service(&broker).await;
        let client = client(&broker).await;

        let price: Price = client
            .call(&Quote { sku: "A-1".into(), quantity: 4 })
            .await
            .unwrap();
        assert_eq!(price, Price { total_cents: 1_000 });

        let sent = broker.published("pricing").await;
        assert_eq!(sent[0].headers.get(CONTENT_TYPE_HEADER), Some("application/json"));

        client.service.shutdown().await;
        responder.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn error_reply_surfaces_as_remote_without_retry() {
        let broker = Arc::new(InMemoryBroker::new());
        let responder = pricing_service(&broker).await;
        let client = client(&broker).await;

        let err = client
            .call::<_, Price>(&Quote { sku: "Z-9".into(), quantity: 1 })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Remote);
        assert!(err.to_string().contains("unknown sku Z-9"));
        assert_eq!(client.service.metrics().total_attempts, 1);

        client.service.shutdown().await;
        responder.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_reply_is_a_codec_error() {
        let broker = Arc::new(InMemoryBroker::new());
        let responder = ReplyResponder::spawn(
            broker.clone(),
            broker.as_ref(),
            "pricing",
            handler(|_req: InboundEnvelope| async { Some(b"not json".to_vec()) }),
            Duration::from_millis(50),
        )
        .await
        .unwrap();
        let client = client(&broker).await;

        let err = client
            .request::<_, Price>(&Quote { sku: "A-1".into(), quantity: 1 })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Codec);

        client.service.shutdown().await;
        responder.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn notify_publishes_a_no_reply_message() {
        let broker = Arc::new(InMemoryBroker::new());
        let client = client(&broker).await;

        client
            .notify(&Quote { sku: "A-1".into(), quantity: 1 })
            .unwrap()
            .await
            .unwrap();

        let sent = broker.published("pricing").await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].headers.get(NO_REPLY_HEADER), Some("true"));
        assert_eq!(sent[0].payload, br#"{"sku":"A-1","quantity":1}"#);
        client.service.shutdown().await;
    }
}
