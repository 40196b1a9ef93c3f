//! Request/reply message models.
//!
//! Payload shapes that services on both sides of a channel can agree on.
//! `None` fields are left out of the JSON entirely.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::errors::ReplyError;
use super::ids::CorrelationId;
use crate::ports::IdGenerator;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMessage<T> {
    pub correlation_id: CorrelationId,
    pub payload: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_topic: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl<T> RequestMessage<T> {
    pub fn new(
        correlation_id: CorrelationId,
        payload: T,
        reply_topic: Option<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            correlation_id,
            payload,
            reply_topic,
            timestamp,
            metadata: Map::new(),
        }
    }

    /// Fresh id, current time.
    pub fn create<G: IdGenerator + ?Sized>(
        ids: &G,
        payload: T,
        reply_topic: impl Into<String>,
    ) -> Self {
        Self::new(
            ids.generate_correlation_id(),
            payload,
            Some(reply_topic.into()),
            Utc::now().timestamp_millis(),
        )
    }

    pub fn add_metadata(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.metadata.insert(key.into(), value.into());
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyMessage<T> {
    pub correlation_id: CorrelationId,
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub payload: Option<T>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl<T> ReplyMessage<T> {
    pub fn success(correlation_id: CorrelationId, payload: T) -> Self {
        Self {
            correlation_id,
            payload: Some(payload),
            success: true,
            error_message: None,
            metadata: Map::new(),
        }
    }

    pub fn error(correlation_id: CorrelationId, error_message: impl Into<String>) -> Self {
        Self {
            correlation_id,
            payload: None,
            success: false,
            error_message: Some(error_message.into()),
            metadata: Map::new(),
        }
    }

    /// `success == false` (or a successful reply without payload) becomes `ReplyError::Remote`.
    pub fn into_result(self) -> Result<T, ReplyError> {
        match (self.success, self.payload) {
            (true, Some(payload)) => Ok(payload),
            (true, None) => Err(ReplyError::Remote(format!(
                "reply {} was marked successful but carried no payload",
                self.correlation_id
            ))),
            (false, _) => Err(ReplyError::Remote(
                self.error_message
                    .unwrap_or_else(|| "remote service reported a failure".to_string()),
            )),
        }
    }
}
