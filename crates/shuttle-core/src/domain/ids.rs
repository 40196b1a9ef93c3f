//! Correlation identifiers.
//!
//! # ULID ベース
//! 生成側は ULID (Universally Unique Lexicographically Sortable Identifier) を使う。
//! - **分散生成可能**: 調整なしで複数インスタンスから生成できる
//! - **時刻でソート可能**: ログを追うときに送信順が見える
//!
//! 受信側では broker から届いたキー文字列を「不透明な文字列」として扱う。
//! prefix を付けたり正規化したりはしない（往復で 1 文字も変わらないこと）。

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use ulid::Ulid;

/// Opaque token linking an outbound request to its inbound reply.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Wrap an id received from the wire, unmodified.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<Ulid> for CorrelationId {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl From<String> for CorrelationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// registry を &str で引けるようにする（Hash/Eq は String と一致する）
impl Borrow<str> for CorrelationId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
