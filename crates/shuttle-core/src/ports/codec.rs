//! PayloadCodec port - payload と値の相互変換
//!
//! service 本体は `Vec<u8>` しか扱わない。型付きの encode/decode は
//! `typed::TypedClient` がこの port を通して行う。

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::domain::CodecError;

pub trait PayloadCodec: Send + Sync {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CodecError>;

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError>;

    /// Value for a `content_type` header, e.g. `application/json`.
    fn content_type(&self) -> &'static str;
}
