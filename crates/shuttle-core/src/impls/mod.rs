//! Impls - ports の実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **InMemoryBroker**: Publisher + Subscriber のインメモリ実装（障害注入つき）
//! - **ReplyResponder**: request channel に応答するサーバ側
//! - **JsonCodec**: デフォルトの PayloadCodec
//! - **LoggingEventSink**: retry イベントを tracing に流す
//!
//! 本物の broker（Kafka など）への adapter は別クレートに置く想定。

pub mod inmem_broker;
pub mod json_codec;
pub mod logging_sink;
pub mod responder;

pub use self::inmem_broker::InMemoryBroker;
pub use self::json_codec::JsonCodec;
pub use self::logging_sink::LoggingEventSink;
pub use self::responder::{ReplyResponder, RequestHandler, handler};
