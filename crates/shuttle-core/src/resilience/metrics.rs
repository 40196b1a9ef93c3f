//! Retry metrics. Observational only; nothing reads them to make decisions.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct RetryMetrics {
    successful_without_retry: AtomicU64,
    successful_with_retry: AtomicU64,
    failed_without_retry: AtomicU64,
    failed_with_retry: AtomicU64,
    total_attempts: AtomicU64,
    total_retries: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetryMetricsSnapshot {
    pub successful_calls_without_retry: u64,
    pub successful_calls_with_retry: u64,
    pub failed_calls_without_retry: u64,
    pub failed_calls_with_retry: u64,
    pub total_attempts: u64,
    pub total_retries: u64,
}

impl RetryMetrics {
    pub(crate) fn record_attempt(&self) {
        self.total_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry(&self) {
        self.total_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_success(&self, retries: u32) {
        let counter = if retries == 0 {
            &self.successful_without_retry
        } else {
            &self.successful_with_retry
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self, retries: u32) {
        let counter = if retries == 0 {
            &self.failed_without_retry
        } else {
            &self.failed_with_retry
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RetryMetricsSnapshot {
        RetryMetricsSnapshot {
            successful_calls_without_retry: self.successful_without_retry.load(Ordering::Relaxed),
            successful_calls_with_retry: self.successful_with_retry.load(Ordering::Relaxed),
            failed_calls_without_retry: self.failed_without_retry.load(Ordering::Relaxed),
            failed_calls_with_retry: self.failed_with_retry.load(Ordering::Relaxed),
            total_attempts: self.total_attempts.load(Ordering::Relaxed),
            total_retries: self.total_retries.load(Ordering::Relaxed),
        }
    }
}
