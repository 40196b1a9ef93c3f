//! Resilience - retry による decorator
//!
//! - `RetryPolicy`: 試行回数と待ち時間
//! - `is_retryable`: ErrorKind → bool の純粋関数
//! - `Retry`: 再試行ループ（イベント + メトリクス）
//! - `ResilientRequestService`: RequestReplyService を包む

pub mod classify;
pub mod metrics;
pub mod policy;
pub mod retry;
pub mod service;

pub use self::classify::{Classifier, default_classifier, is_retryable};
pub use self::metrics::{RetryMetrics, RetryMetricsSnapshot};
pub use self::policy::{RetryPolicy, WaitStrategy};
pub use self::retry::Retry;
pub use self::service::ResilientRequestService;
