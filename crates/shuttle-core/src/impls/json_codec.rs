//! JsonCodec - serde_json による PayloadCodec（デフォルト）

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::domain::CodecError;
use crate::ports::PayloadCodec;

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl PayloadCodec for JsonCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(CodecError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(bytes).map_err(CodecError::Decode)
    }

    fn content_type(&self) -> &'static str {
        "application/json"
    }
}
