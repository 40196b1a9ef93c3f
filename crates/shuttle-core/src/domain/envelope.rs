//! Envelopes - broker を流れるデータの“運搬用”型
//!
//! - `Headers`: 呼び出し側が付ける自由形式のメタデータ（順序は意味を持たない）
//! - `BrokerRecord`: broker port が受け渡す 1 レコード（key, payload, headers）
//! - `OutboundEnvelope`: 送信 1 回分。構築後は不変
//! - `InboundEnvelope`: 受信した応答。correlation id は key（なければ header）から取る

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::errors::CodecError;
use super::ids::CorrelationId;

/// Header carrying the correlation id.
pub const CORRELATION_ID_HEADER: &str = "correlation_id";
/// Header naming the channel the reply must be published to.
pub const REPLY_TOPIC_HEADER: &str = "reply_topic";
/// Header marking a request that expects no reply.
pub const NO_REPLY_HEADER: &str = "no_reply";

const RESERVED_HEADERS: [&str; 3] = [CORRELATION_ID_HEADER, REPLY_TOPIC_HEADER, NO_REPLY_HEADER];

/// Free-form message metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(HashMap<String, String>);

impl Headers {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    /// Store an arbitrary serializable value as JSON text.
    pub fn insert_json<T: Serialize + ?Sized>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<(), CodecError> {
        let text = serde_json::to_string(value).map_err(CodecError::Encode)?;
        self.0.insert(key.into(), text);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Names the service writes itself; caller values under them are replaced.
    pub fn is_reserved(name: &str) -> bool {
        RESERVED_HEADERS.contains(&name)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// One message as seen by the broker ports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerRecord {
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub headers: Headers,
}

impl BrokerRecord {
    pub fn new(key: Option<String>, payload: Vec<u8>, headers: Headers) -> Self {
        Self {
            key,
            payload,
            headers,
        }
    }

    pub fn is_no_reply(&self) -> bool {
        self.headers.get(NO_REPLY_HEADER) == Some("true")
    }

    pub fn reply_topic(&self) -> Option<&str> {
        self.headers.get(REPLY_TOPIC_HEADER)
    }
}

/// A request on its way to the broker.
///
/// Created once per send call; the caller's headers are copied, never mutated.
#[derive(Debug, Clone)]
pub struct OutboundEnvelope {
    correlation_id: CorrelationId,
    payload: Vec<u8>,
    reply_channel: Option<String>,
    no_reply: bool,
    headers: Headers,
}

impl OutboundEnvelope {
    /// Request that expects a correlated reply on `reply_channel`.
    pub fn request(
        correlation_id: CorrelationId,
        payload: Vec<u8>,
        reply_channel: impl Into<String>,
        caller_headers: &Headers,
    ) -> Self {
        Self {
            correlation_id,
            payload,
            reply_channel: Some(reply_channel.into()),
            no_reply: false,
            headers: caller_headers.clone(),
        }
    }

    /// Request that expects no reply.
    pub fn fire_and_forget(
        correlation_id: CorrelationId,
        payload: Vec<u8>,
        caller_headers: &Headers,
    ) -> Self {
        Self {
            correlation_id,
            payload,
            reply_channel: None,
            no_reply: true,
            headers: caller_headers.clone(),
        }
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn reply_channel(&self) -> Option<&str> {
        self.reply_channel.as_deref()
    }

    pub fn is_no_reply(&self) -> bool {
        self.no_reply
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Wire form: key = correlation id, routing metadata added as headers.
    pub fn into_record(self) -> BrokerRecord {
        let mut headers = self.headers;
        headers.insert(CORRELATION_ID_HEADER, self.correlation_id.as_str());
        if let Some(reply_channel) = self.reply_channel {
            headers.insert(REPLY_TOPIC_HEADER, reply_channel);
        }
        if self.no_reply {
            headers.insert(NO_REPLY_HEADER, "true");
        }

        BrokerRecord {
            key: Some(self.correlation_id.into_string()),
            payload: self.payload,
            headers,
        }
    }
}

/// A reply received from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEnvelope {
    correlation_id: CorrelationId,
    payload: Vec<u8>,
    headers: Headers,
}

impl InboundEnvelope {
    pub fn new(correlation_id: CorrelationId, payload: Vec<u8>, headers: Headers) -> Self {
        Self {
            correlation_id,
            payload,
            headers,
        }
    }

    /// Extract the correlation id from the key, falling back to the header.
    /// Returns `None` when the record carries neither.
    pub fn from_record(record: BrokerRecord) -> Option<Self> {
        let correlation_id = match record.key {
            Some(key) if !key.is_empty() => CorrelationId::new(key),
            _ => CorrelationId::new(record.headers.get(CORRELATION_ID_HEADER)?),
        };
        Some(Self {
            correlation_id,
            payload: record.payload,
            headers: record.headers,
        })
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_record_carries_routing_headers() {
        let caller = Headers::new().with("tenant", "acme");
        let id = CorrelationId::new("01HZX5R2K7Q8");
        let record =
            OutboundEnvelope::request(id.clone(), b"ping".to_vec(), "replies", &caller).into_record();

        assert_eq!(record.key.as_deref(), Some("01HZX5R2K7Q8"));
        assert_eq!(record.headers.get(CORRELATION_ID_HEADER), Some("01HZX5R2K7Q8"));
        assert_eq!(record.reply_topic(), Some("replies"));
        assert_eq!(record.headers.get("tenant"), Some("acme"));
        assert!(!record.is_no_reply());

        // 呼び出し側の headers はそのまま
        assert_eq!(caller.len(), 1);
    }

    #[test]
    fn fire_and_forget_record_is_marked_no_reply() {
        let record = OutboundEnvelope::fire_and_forget(
            CorrelationId::new("c-9"),
            b"audit".to_vec(),
            &Headers::new(),
        )
        .into_record();

        assert!(record.is_no_reply());
        assert_eq!(record.reply_topic(), None);
        assert_eq!(record.key.as_deref(), Some("c-9"));
    }

    #[test]
    fn reserved_headers_from_the_caller_are_replaced() {
        let caller = Headers::new().with(CORRELATION_ID_HEADER, "forged");
        let record = OutboundEnvelope::request(CorrelationId::new("real"), vec![], "r", &caller)
            .into_record();
        assert_eq!(record.headers.get(CORRELATION_ID_HEADER), Some("real"));
        assert!(Headers::is_reserved(REPLY_TOPIC_HEADER));
        assert!(!Headers::is_reserved("tenant"));
    }

    #[test]
    fn inbound_prefers_key_then_header() {
        let from_key = InboundEnvelope::from_record(BrokerRecord::new(
            Some("k-1".into()),
            vec![],
            Headers::new().with(CORRELATION_ID_HEADER, "h-1"),
        ))
        .unwrap();
        assert_eq!(from_key.correlation_id().as_str(), "k-1");

        let from_header = InboundEnvelope::from_record(BrokerRecord::new(
            None,
            vec![],
            Headers::new().with(CORRELATION_ID_HEADER, "h-1"),
        ))
        .unwrap();
        assert_eq!(from_header.correlation_id().as_str(), "h-1");

        assert!(InboundEnvelope::from_record(BrokerRecord::new(None, vec![], Headers::new())).is_none());
    }

    #[test]
    fn insert_json_stores_arbitrary_values() {
        let mut headers = Headers::new();
        headers
            .insert_json("trace", &serde_json::json!({ "span": 7, "sampled": true }))
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(headers.get("trace").unwrap()).unwrap();
        assert_eq!(parsed["span"], 7);
    }
}
