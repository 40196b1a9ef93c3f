//! Domain model (ids, envelopes, messages, errors, events).

pub mod envelope;
pub mod errors;
pub mod events;
pub mod ids;
pub mod message;

pub use self::envelope::{
    BrokerRecord, CORRELATION_ID_HEADER, Headers, InboundEnvelope, NO_REPLY_HEADER,
    OutboundEnvelope, REPLY_TOPIC_HEADER,
};
pub use self::errors::{BrokerError, CodecError, ErrorKind, ReplyError};
pub use self::events::RetryEvent;
pub use self::ids::CorrelationId;
pub use self::message::{ReplyMessage, RequestMessage};
