//! EventSink port - retry イベント記録の抽象化
//!
//! - `impls::LoggingEventSink`: tracing に流す（デフォルト）
//!
//! sink 内の panic は呼び出し側で握りつぶされ、retry の制御には影響しない。

use crate::domain::RetryEvent;

pub trait RetryEventSink: Send + Sync {
    fn on_event(&self, event: &RetryEvent);
}
