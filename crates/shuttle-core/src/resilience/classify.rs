//! Retry classification: a pure predicate over `ErrorKind`.

use std::sync::Arc;

use crate::domain::ErrorKind;

/// Custom classification hook for `Retry`.
pub type Classifier = Arc<dyn Fn(ErrorKind) -> bool + Send + Sync>;

/// Default classification.
///
/// Timeouts and broker/service failures may succeed on a fresh attempt.
/// Caller mistakes, codec failures, remote error replies and invariant
/// violations will not.
pub fn is_retryable(kind: ErrorKind) -> bool {
    match kind {
        ErrorKind::Timeout | ErrorKind::Transport | ErrorKind::ServiceUnavailable => true,
        ErrorKind::DuplicateCorrelation
        | ErrorKind::Validation
        | ErrorKind::Codec
        | ErrorKind::Remote
        | ErrorKind::RetryExhausted => false,
    }
}

pub fn default_classifier() -> Classifier {
    Arc::new(is_retryable)
}
