//! Broker ports - publish / subscribe の抽象化
//!
//! core が broker に求めるのは次の 2 つだけ。
//! - `publish(channel, record) -> ack`
//! - `subscribe(channel) -> Subscription`（`poll(max_wait)`, `commit()`, `close()`）
//!
//! partition, durability, consumer group などは実装側の責務。

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{BrokerError, BrokerRecord};

/// Publishes records to a named channel.
///
/// The returned future resolves once the broker acknowledged the record.
/// The ack carries no payload.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, channel: &str, record: BrokerRecord) -> Result<(), BrokerError>;
}

/// Opens subscriptions on named channels.
#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn subscribe(&self, channel: &str) -> Result<Box<dyn Subscription>, BrokerError>;
}

/// A live consume handle.
///
/// Dropping a subscription must release it as well; `close()` is the explicit
/// path that can report errors.
#[async_trait]
pub trait Subscription: Send {
    /// Wait at most `max_wait` for records. An empty vec means nothing arrived.
    ///
    /// Must be cancel-safe: dropping the future never loses records.
    async fn poll(&mut self, max_wait: Duration) -> Result<Vec<BrokerRecord>, BrokerError>;

    /// Mark everything returned by previous polls as processed.
    async fn commit(&mut self) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), BrokerError>;
}
