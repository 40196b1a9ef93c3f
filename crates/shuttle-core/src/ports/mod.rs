//! Ports - 抽象化レイヤー
//!
//! 各 trait は外部システム（broker, 時刻, ID, codec, イベント出力）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - broker の意味論（partition, 複製, consumer group）は持ち込まない
//! - core は `publish` / `subscribe` だけに依存する

pub mod broker;
pub mod clock;
pub mod codec;
pub mod event_sink;
pub mod id_generator;

pub use self::broker::{Publisher, Subscriber, Subscription};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::codec::PayloadCodec;
pub use self::event_sink::RetryEventSink;
pub use self::id_generator::{IdGenerator, UlidGenerator};
