//! Retry - 上限付きの再試行ループ
//!
//! # 学習ポイント
//! - 呼び出しは `FnMut(attempt) -> Future` として受け取り、試行ごとに作り直す
//! - 判定は `Classifier`（ErrorKind → bool）だけ
//! - イベントとメトリクスは観測専用。sink が panic しても制御は変わらない

use std::future::Future;
use std::sync::Arc;

use super::classify::{Classifier, default_classifier};
use super::metrics::{RetryMetrics, RetryMetricsSnapshot};
use super::policy::RetryPolicy;
use crate::app::ack::run_guarded;
use crate::domain::{ReplyError, RetryEvent};
use crate::impls::LoggingEventSink;
use crate::ports::RetryEventSink;

pub struct Retry {
    name: String,
    policy: RetryPolicy,
    classifier: Classifier,
    metrics: RetryMetrics,
    sink: Arc<dyn RetryEventSink>,
}

impl Retry {
    /// Default classifier, events logged through `LoggingEventSink`.
    pub fn new(name: impl Into<String>, policy: RetryPolicy) -> Self {
        let name = name.into();
        Self {
            sink: Arc::new(LoggingEventSink::new(name.clone())),
            name,
            policy,
            classifier: default_classifier(),
            metrics: RetryMetrics::default(),
        }
    }

    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn RetryEventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn metrics(&self) -> RetryMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Run `call` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. `call` receives the 1-indexed attempt number.
    ///
    /// Non-retryable errors surface unchanged; exhaustion surfaces as
    /// `RetryExhausted` wrapping the last failure.
    pub async fn execute<T, F, Fut>(&self, operation: &'static str, call: F) -> Result<T, ReplyError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ReplyError>>,
    {
        self.execute_while(operation, || true, call).await
    }

    /// Like `execute`, but a failure is only retried while `can_retry()`
    /// holds. Once it returns false the failure surfaces unchanged.
    pub async fn execute_while<T, C, F, Fut>(
        &self,
        operation: &'static str,
        can_retry: C,
        mut call: F,
    ) -> Result<T, ReplyError>
    where
        C: Fn() -> bool,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ReplyError>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            self.metrics.record_attempt();
            self.emit(&RetryEvent::AttemptStarted {
                operation,
                attempt,
                max_attempts,
            });

            let retries = attempt - 1;
            let err = match call(attempt).await {
                Ok(value) => {
                    self.metrics.record_success(retries);
                    if retries > 0 {
                        self.emit(&RetryEvent::SucceededAfterRetries { operation, retries });
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            let kind = err.kind();
            if !(self.classifier)(kind) || !can_retry() {
                self.metrics.record_failure(retries);
                self.emit(&RetryEvent::NotRetryable {
                    operation,
                    attempt,
                    kind,
                    error: err.to_string(),
                });
                return Err(err);
            }

            if attempt >= max_attempts {
                self.metrics.record_failure(retries);
                self.emit(&RetryEvent::Exhausted {
                    operation,
                    attempts: attempt,
                    kind,
                    error: err.to_string(),
                });
                return Err(ReplyError::RetryExhausted {
                    operation,
                    attempts: attempt,
                    source: Box::new(err),
                });
            }

            let delay = self.policy.next_delay(attempt);
            self.emit(&RetryEvent::RetryScheduled {
                operation,
                attempt,
                max_attempts,
                delay,
                kind,
                error: err.to_string(),
            });
            self.metrics.record_retry();
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn emit(&self, event: &RetryEvent) {
        run_guarded("retry event sink", || self.sink.on_event(event));
    }
}
