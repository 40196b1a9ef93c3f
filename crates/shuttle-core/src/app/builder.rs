//! ServiceBuilder - サービスの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - 開発体験の改善（明確なエラーメッセージ）

use std::sync::Arc;

use super::dispatcher::RequestReplyService;
use crate::config::{ConfigError, ShuttleConfig};
use crate::domain::ReplyError;
use crate::ports::{IdGenerator, Publisher, RetryEventSink, Subscriber, SystemClock, UlidGenerator};
use crate::resilience::{Classifier, ResilientRequestService, Retry, RetryPolicy};

/// ServiceBuilder はサービスを構築
///
/// # 使用例
/// ```ignore
/// let service = ServiceBuilder::new()
///     .broker(Arc::new(InMemoryBroker::new()))
///     .config(ShuttleConfig::from_path("shuttle.json")?)
///     .start_resilient()
///     .await?;
/// ```
///
/// # Fail-fast 設計
/// - publisher / subscriber が無ければ MissingComponent
/// - 設定値の検証に失敗すれば Config
/// - reply channel を subscribe できなければ Listener
pub struct ServiceBuilder {
    publisher: Option<Arc<dyn Publisher>>,
    subscriber: Option<Arc<dyn Subscriber>>,
    ids: Option<Arc<dyn IdGenerator>>,
    config: ShuttleConfig,
    event_sink: Option<Arc<dyn RetryEventSink>>,
    classifier: Option<Classifier>,
}

/// BuildError はサービス構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing component: {0}. Set it on the builder before starting.")]
    MissingComponent(&'static str),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("response listener could not start: {0}")]
    Listener(#[source] ReplyError),
}

impl ServiceBuilder {
    pub fn new() -> Self {
        Self {
            publisher: None,
            subscriber: None,
            ids: None,
            config: ShuttleConfig::default(),
            event_sink: None,
            classifier: None,
        }
    }

    pub fn publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn subscriber(mut self, subscriber: Arc<dyn Subscriber>) -> Self {
        self.subscriber = Some(subscriber);
        self
    }

    /// One broker serving as both publisher and subscriber.
    pub fn broker<B: Publisher + Subscriber + 'static>(self, broker: Arc<B>) -> Self {
        self.publisher(broker.clone()).subscriber(broker)
    }

    /// Defaults to a ULID generator on the system clock.
    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn config(mut self, config: ShuttleConfig) -> Self {
        self.config = config;
        self
    }

    /// Only used by `start_resilient`. Defaults to `LoggingEventSink`.
    pub fn event_sink(mut self, sink: Arc<dyn RetryEventSink>) -> Self {
        self.event_sink = Some(sink);
        self
    }

    /// Only used by `start_resilient`. Defaults to `is_retryable`.
    pub fn retry_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Validate and start the plain service.
    pub async fn start(self) -> Result<RequestReplyService, BuildError> {
        self.config.validate()?;
        self.start_validated().await
    }

    /// Validate and start the service wrapped in the retry decorator.
    pub async fn start_resilient(self) -> Result<ResilientRequestService, BuildError> {
        self.config.validate()?;
        let retry = self.retry();
        let service = self.start_validated().await?;
        Ok(ResilientRequestService::new(Arc::new(service), retry))
    }

    fn retry(&self) -> Retry {
        let mut retry = Retry::new("request-reply", RetryPolicy::from_config(&self.config.retry));
        if let Some(sink) = &self.event_sink {
            retry = retry.with_event_sink(Arc::clone(sink));
        }
        if let Some(classifier) = &self.classifier {
            retry = retry.with_classifier(Arc::clone(classifier));
        }
        retry
    }

    async fn start_validated(self) -> Result<RequestReplyService, BuildError> {
        let publisher = self.publisher.ok_or(BuildError::MissingComponent("publisher"))?;
        let subscriber = self
            .subscriber
            .ok_or(BuildError::MissingComponent("subscriber"))?;
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(SystemClock)));

        RequestReplyService::start(publisher, subscriber, ids, &self.config)
            .await
            .map_err(BuildError::Listener)
    }
}

impl Default for ServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}
