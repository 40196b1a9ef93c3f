//! Correlation - 応答待ちリクエストの管理

pub mod pending;
pub mod registry;

pub use self::pending::{PendingRequest, ReplyOutcome, ReplyReceiver};
pub use self::registry::CorrelationRegistry;
