//! LoggingEventSink - retry イベントを tracing に流す（デフォルトの sink）

use crate::domain::RetryEvent;
use crate::ports::RetryEventSink;

#[derive(Debug, Clone, Default)]
pub struct LoggingEventSink {
    name: String,
}

impl LoggingEventSink {
    /// `name` identifies the retry instance in log fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl RetryEventSink for LoggingEventSink {
    fn on_event(&self, event: &RetryEvent) {
        match event {
            RetryEvent::AttemptStarted {
                operation,
                attempt,
                max_attempts,
            } => {
                tracing::debug!(retry = %self.name, operation, attempt, max_attempts, "attempt started");
            }
            RetryEvent::RetryScheduled {
                operation,
                attempt,
                max_attempts,
                delay,
                kind,
                error,
            } => {
                tracing::warn!(
                    retry = %self.name,
                    ?delay,
                    ?kind,
                    error = %error,
                    "Retry attempt {attempt}/{max_attempts} for {operation}"
                );
            }
            RetryEvent::NotRetryable {
                operation,
                attempt,
                kind,
                error,
            } => {
                tracing::debug!(retry = %self.name, operation, attempt, ?kind, error = %error, "error is not retryable");
            }
            RetryEvent::Exhausted {
                operation,
                attempts,
                kind,
                error,
            } => {
                tracing::error!(
                    retry = %self.name,
                    ?kind,
                    error = %error,
                    "{operation} failed after {attempts} attempts"
                );
            }
            RetryEvent::SucceededAfterRetries { operation, retries } => {
                tracing::info!(retry = %self.name, "{operation} succeeded after {retries} retries");
            }
        }
    }
}
