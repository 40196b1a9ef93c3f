//! App - 実行時のコンポーネントとワイヤリング
//!
//! - **listener**: reply channel を読み続けるループ
//! - **timeout**: リクエストごとの期限タイマー
//! - **dispatcher**: 公開 API（RequestReplyService）
//! - **ack**: fire-and-forget の完了ハンドル
//! - **builder**: ServiceBuilder（起動時検証つき）

pub mod ack;
pub mod builder;
pub mod dispatcher;
pub mod listener;
pub mod timeout;

pub use self::ack::{AckCompleter, PublishAck, PublishReceipt};
pub use self::builder::{BuildError, ServiceBuilder};
pub use self::dispatcher::RequestReplyService;
pub use self::listener::{ListenerHandle, ListenerStats, ListenerStatsSnapshot, ResponseListener};
pub use self::timeout::TimeoutSupervisor;
