//! Events - retry のライフサイクルイベント
//!
//! イベントは観測専用。`RetryEventSink` に渡されるだけで、制御フローには影響しない。

use std::time::Duration;

use super::errors::ErrorKind;

#[derive(Debug, Clone, PartialEq)]
pub enum RetryEvent {
    /// An attempt (1-indexed) is about to run.
    AttemptStarted {
        operation: &'static str,
        attempt: u32,
        max_attempts: u32,
    },

    /// `attempt` failed with a retryable error; the next one runs after `delay`.
    RetryScheduled {
        operation: &'static str,
        attempt: u32,
        max_attempts: u32,
        delay: Duration,
        kind: ErrorKind,
        error: String,
    },

    /// The error was not retryable; it is surfaced as is.
    NotRetryable {
        operation: &'static str,
        attempt: u32,
        kind: ErrorKind,
        error: String,
    },

    /// The attempt budget is spent.
    Exhausted {
        operation: &'static str,
        attempts: u32,
        kind: ErrorKind,
        error: String,
    },

    /// Success on a later attempt.
    SucceededAfterRetries {
        operation: &'static str,
        retries: u32,
    },
}
