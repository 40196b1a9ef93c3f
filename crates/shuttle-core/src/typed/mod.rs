//! Typed - 型付きの request/reply API
//!
//! service 本体は bytes しか扱わない。このモジュールが PayloadCodec を通して
//! 値 ⇔ bytes の変換を受け持つ。

pub mod client;

pub use self::client::{CONTENT_TYPE_HEADER, TypedClient};
