//! shuttle-core
//!
//! Request/reply on top of a publish/subscribe broker.
//!
//! caller は `send_and_await` で request を publish し、相関する reply が届くか
//! 期限が来るまで待つ。retry decorator はその往復全体を上限付きで再試行する。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, envelope, message, errors, events）
//! - **ports**: 抽象化レイヤー（Publisher, Subscriber, IdGenerator, Clock, PayloadCodec, RetryEventSink）
//! - **correlation**: correlation id → 応答待ちスロット（CorrelationRegistry）
//! - **app**: 実行時コンポーネント（listener, timeout, dispatcher, ack, builder）
//! - **resilience**: retry policy, 分類, メトリクス, decorator
//! - **typed**: codec を挟んだ型付きクライアント
//! - **impls**: 実装（InMemoryBroker, ReplyResponder, JsonCodec, LoggingEventSink）
//! - **config**: 設定値とデフォルト

pub mod app;
pub mod config;
pub mod correlation;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod resilience;
pub mod typed;

pub use self::app::{
    BuildError, PublishAck, PublishReceipt, RequestReplyService, ServiceBuilder,
};
pub use self::config::{ConfigError, ShuttleConfig};
pub use self::domain::{CorrelationId, ErrorKind, Headers, InboundEnvelope, ReplyError};
pub use self::resilience::{ResilientRequestService, Retry, RetryPolicy};
pub use self::typed::TypedClient;
