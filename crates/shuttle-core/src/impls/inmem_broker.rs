//! InMemoryBroker - 開発・テスト用の pub/sub broker
//!
//! # 学習ポイント
//! - tokio::sync::Mutex + Notify による async な待ち合わせ
//! - subscription ごとに独立したキュー（fan-out）
//! - 障害注入（publish / poll / subscribe の失敗）で異常系をテストできる
//!
//! # 意味論
//! - subscribe 前に publish されたレコードは届かない
//! - 順序は channel ごとに publish 順
//! - publish されたレコードは `published()` で後から確認できる。
//!   履歴は上限なしに溜まるので、長く動かすなら `without_recording()` を使う

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::domain::{BrokerError, BrokerRecord};
use crate::ports::{Publisher, Subscriber, Subscription};

#[derive(Debug, Default)]
struct SubscriptionQueue {
    records: Mutex<VecDeque<BrokerRecord>>,
    notify: Notify,
    closed: AtomicBool,
}

#[derive(Debug, Default)]
struct BrokerState {
    subscriptions: HashMap<String, Vec<Arc<SubscriptionQueue>>>,
    published: HashMap<String, Vec<BrokerRecord>>,
}

/// Injected failures. Each counter is consumed one failure at a time.
#[derive(Debug, Default)]
struct Faults {
    publishes: AtomicU32,
    polls: AtomicU32,
    refuse_subscriptions: AtomicBool,
}

impl Faults {
    fn take(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// In-process broker implementing both `Publisher` and `Subscriber`.
#[derive(Debug)]
pub struct InMemoryBroker {
    state: Mutex<BrokerState>,
    faults: Arc<Faults>,
    record_published: bool,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    /// Broker that keeps every published record for `published()`.
    pub fn new() -> Self {
        Self {
            state: Mutex::default(),
            faults: Arc::default(),
            record_published: true,
        }
    }

    /// Broker that only delivers. `published()` always comes back empty.
    pub fn without_recording() -> Self {
        Self {
            record_published: false,
            ..Self::new()
        }
    }

    /// The next `n` publishes fail with `BrokerError::Publish`.
    pub fn fail_next_publishes(&self, n: u32) {
        self.faults.publishes.store(n, Ordering::SeqCst);
    }

    /// The next `n` polls, across all subscriptions, fail with `BrokerError::Poll`.
    pub fn fail_next_polls(&self, n: u32) {
        self.faults.polls.store(n, Ordering::SeqCst);
    }

    pub fn refuse_subscriptions(&self, refuse: bool) {
        self.faults.refuse_subscriptions.store(refuse, Ordering::SeqCst);
    }

    /// Every record accepted on `channel`, in publish order.
    pub async fn published(&self, channel: &str) -> Vec<BrokerRecord> {
        let state = self.state.lock().await;
        state.published.get(channel).cloned().unwrap_or_default()
    }

    /// Close every open subscription on `channel` from the broker side.
    /// Their next poll fails with `BrokerError::Closed`.
    pub async fn close_channel(&self, channel: &str) {
        let state = self.state.lock().await;
        for queue in state.subscriptions.get(channel).into_iter().flatten() {
            queue.closed.store(true, Ordering::SeqCst);
            queue.notify.notify_one();
        }
    }

    /// Open subscriptions on `channel`.
    pub async fn subscriber_count(&self, channel: &str) -> usize {
        let state = self.state.lock().await;
        state.subscriptions.get(channel).map_or(0, |subs| {
            subs.iter().filter(|q| !q.closed.load(Ordering::SeqCst)).count()
        })
    }
}

#[async_trait]
impl Publisher for InMemoryBroker {
    async fn publish(&self, channel: &str, record: BrokerRecord) -> Result<(), BrokerError> {
        if Faults::take(&self.faults.publishes) {
            return Err(BrokerError::Publish(format!(
                "injected publish failure on '{channel}'"
            )));
        }

        let mut state = self.state.lock().await;
        if let Some(subs) = state.subscriptions.get_mut(channel) {
            subs.retain(|q| !q.closed.load(Ordering::SeqCst));
            for queue in subs.iter() {
                queue.records.lock().await.push_back(record.clone());
                // 待っている poll がいなくても permit が残る
                queue.notify.notify_one();
            }
        }
        if self.record_published {
            state
                .published
                .entry(channel.to_string())
                .or_default()
                .push(record);
        }
        Ok(())
    }
}

#[async_trait]
impl Subscriber for InMemoryBroker {
    async fn subscribe(&self, channel: &str) -> Result<Box<dyn Subscription>, BrokerError> {
        if self.faults.refuse_subscriptions.load(Ordering::SeqCst) {
            return Err(BrokerError::Subscribe {
                channel: channel.to_string(),
                reason: "subscriptions are refused".to_string(),
            });
        }

        let queue = Arc::new(SubscriptionQueue::default());
        let mut state = self.state.lock().await;
        state
            .subscriptions
            .entry(channel.to_string())
            .or_default()
            .push(Arc::clone(&queue));

        Ok(Box::new(InMemorySubscription {
            queue,
            faults: Arc::clone(&self.faults),
        }))
    }
}

struct InMemorySubscription {
    queue: Arc<SubscriptionQueue>,
    faults: Arc<Faults>,
}

#[async_trait]
impl Subscription for InMemorySubscription {
    async fn poll(&mut self, max_wait: Duration) -> Result<Vec<BrokerRecord>, BrokerError> {
        let deadline = Instant::now() + max_wait;
        loop {
            if self.queue.closed.load(Ordering::SeqCst) {
                return Err(BrokerError::Closed);
            }
            if Faults::take(&self.faults.polls) {
                return Err(BrokerError::Poll("injected poll failure".to_string()));
            }

            {
                let mut records = self.queue.records.lock().await;
                if !records.is_empty() {
                    return Ok(records.drain(..).collect());
                }
            }

            tokio::select! {
                _ = self.queue.notify.notified() => {}
                _ = tokio::time::sleep_until(deadline) => return Ok(Vec::new()),
            }
        }
    }

    async fn close(self: Box<Self>) -> Result<(), BrokerError> {
        self.queue.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for InMemorySubscription {
    fn drop(&mut self) {
        self.queue.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Headers;

    fn record(key: &str) -> BrokerRecord {
        BrokerRecord::new(Some(key.to_string()), key.as_bytes().to_vec(), Headers::new())
    }

    #[tokio::test]
    async fn published_records_reach_every_subscription() {
        let broker = InMemoryBroker::new();
        let mut first = broker.subscribe("orders").await.unwrap();
        let mut second = broker.subscribe("orders").await.unwrap();

        broker.publish("orders", record("a")).await.unwrap();
        broker.publish("orders", record("b")).await.unwrap();

        for sub in [&mut first, &mut second] {
            let keys: Vec<_> = sub
                .poll(Duration::from_millis(10))
                .await
                .unwrap()
                .into_iter()
                .filter_map(|r| r.key)
                .collect();
            assert_eq!(keys, vec!["a", "b"]);
        }
        assert_eq!(broker.published("orders").await.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_returns_empty_after_max_wait() {
        let broker = InMemoryBroker::new();
        let mut sub = broker.subscribe("orders").await.unwrap();

        let started = Instant::now();
        let records = sub.poll(Duration::from_millis(500)).await.unwrap();
        assert!(records.is_empty());
        assert!(started.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn publish_wakes_a_waiting_poll() {
        let broker = Arc::new(InMemoryBroker::new());
        let mut sub = broker.subscribe("orders").await.unwrap();

        let publisher = Arc::clone(&broker);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            publisher.publish("orders", record("late")).await.unwrap();
        });

        let started = Instant::now();
        let records = sub.poll(Duration::from_secs(5)).await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn records_published_before_subscribing_are_not_delivered() {
        let broker = InMemoryBroker::new();
        broker.publish("orders", record("early")).await.unwrap();
        let mut sub = broker.subscribe("orders").await.unwrap();

        assert!(sub.poll(Duration::from_millis(10)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn injected_faults_are_consumed_one_by_one() {
        let broker = InMemoryBroker::new();
        broker.fail_next_publishes(1);
        assert!(matches!(
            broker.publish("orders", record("a")).await,
            Err(BrokerError::Publish(_))
        ));
        assert!(broker.publish("orders", record("a")).await.is_ok());

        let mut sub = broker.subscribe("orders").await.unwrap();
        broker.fail_next_polls(1);
        assert!(matches!(
            sub.poll(Duration::from_millis(10)).await,
            Err(BrokerError::Poll(_))
        ));
        assert!(sub.poll(Duration::from_millis(10)).await.is_ok());

        broker.refuse_subscriptions(true);
        assert!(matches!(
            broker.subscribe("orders").await.err(),
            Some(BrokerError::Subscribe { .. })
        ));
    }

    #[tokio::test]
    async fn closed_subscriptions_stop_receiving() {
        let broker = InMemoryBroker::new();
        let sub = broker.subscribe("orders").await.unwrap();
        let other = broker.subscribe("orders").await.unwrap();
        assert_eq!(broker.subscriber_count("orders").await, 2);

        sub.close().await.unwrap();
        drop(other);
        assert_eq!(broker.subscriber_count("orders").await, 0);
        assert!(broker.publish("orders", record("a")).await.is_ok());
    }

    #[tokio::test]
    async fn unrecorded_broker_still_delivers() {
        let broker = InMemoryBroker::without_recording();
        let mut sub = broker.subscribe("orders").await.unwrap();

        broker.publish("orders", record("a")).await.unwrap();

        assert_eq!(sub.poll(Duration::from_millis(10)).await.unwrap().len(), 1);
        assert!(broker.published("orders").await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn close_channel_fails_a_waiting_poll() {
        let broker = Arc::new(InMemoryBroker::new());
        let mut sub = broker.subscribe("orders").await.unwrap();

        let closer = Arc::clone(&broker);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            closer.close_channel("orders").await;
        });

        assert!(matches!(sub.poll(Duration::from_secs(5)).await, Err(BrokerError::Closed)));
        assert_eq!(broker.subscriber_count("orders").await, 0);
    }
}
