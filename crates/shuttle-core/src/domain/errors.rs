//! Errors - エラー型と分類
//!
//! - `ErrorKind`: 運用上の分類。retry 判定はこの enum だけを見る
//! - `ReplyError`: 呼び出し側に返すエラー
//! - `BrokerError`: broker 境界（publish / poll / subscribe）のエラー
//! - `CodecError`: payload の encode / decode エラー

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ids::CorrelationId;

/// ErrorKind は ReplyError の分類
///
/// retry の判定は `resilience::is_retryable(kind)` という純粋関数で行う。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// No reply within the deadline.
    Timeout,
    /// Publish or consume failed at the broker boundary.
    Transport,
    /// Operation attempted during or after shutdown.
    ServiceUnavailable,
    /// Correlation id collision (invariant violation).
    DuplicateCorrelation,
    /// Caller misuse detected before anything was sent.
    Validation,
    /// Payload could not be encoded or decoded.
    Codec,
    /// The remote side answered with an error reply.
    Remote,
    /// Retry budget spent.
    RetryExhausted,
}

/// Errors surfaced by the request/reply service and its decorators.
#[derive(Debug, Error)]
pub enum ReplyError {
    #[error("request {correlation_id} timed out after {after:?}")]
    Timeout {
        correlation_id: CorrelationId,
        after: Duration,
    },

    #[error("transport error on channel '{channel}': {source}")]
    Transport {
        channel: String,
        #[source]
        source: BrokerError,
    },

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("correlation id {0} is already registered")]
    DuplicateCorrelation(CorrelationId),

    #[error("reply channel '{requested}' is not served by this instance (listening on '{listening}')")]
    ReplyChannelMismatch { requested: String, listening: String },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("remote service replied with an error: {0}")]
    Remote(String),

    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetryExhausted {
        operation: &'static str,
        attempts: u32,
        #[source]
        source: Box<ReplyError>,
    },
}

impl ReplyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReplyError::Timeout { .. } => ErrorKind::Timeout,
            ReplyError::Transport { .. } => ErrorKind::Transport,
            ReplyError::ServiceUnavailable(_) => ErrorKind::ServiceUnavailable,
            ReplyError::DuplicateCorrelation(_) => ErrorKind::DuplicateCorrelation,
            ReplyError::ReplyChannelMismatch { .. } => ErrorKind::Validation,
            ReplyError::Codec(_) => ErrorKind::Codec,
            ReplyError::Remote(_) => ErrorKind::Remote,
            ReplyError::RetryExhausted { .. } => ErrorKind::RetryExhausted,
        }
    }

    /// The failure that ended the last attempt, looking through retry wrappers.
    pub fn last_failure(&self) -> &ReplyError {
        match self {
            ReplyError::RetryExhausted { source, .. } => source.last_failure(),
            other => other,
        }
    }

    pub(crate) fn shutting_down() -> Self {
        ReplyError::ServiceUnavailable("service is shutting down".to_string())
    }
}

/// Errors at the broker boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    #[error("publish failed: {0}")]
    Publish(String),

    #[error("poll failed: {0}")]
    Poll(String),

    #[error("commit failed: {0}")]
    Commit(String),

    #[error("subscribe to '{channel}' failed: {reason}")]
    Subscribe { channel: String, reason: String },

    #[error("subscription is closed")]
    Closed,
}

/// Payload encode/decode errors.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),
}
