//! ReplyResponder - request channel を読んで応答を返す側
//!
//! protocol の反対側（サーバ役）。開発用のデモとテストで使う。
//! - `no_reply` 付きのリクエストは handler に渡すが応答しない
//! - 応答は `reply_topic` header の channel に、key = correlation id で publish
//! - リクエストごとに task を spawn するので、遅い handler が他を待たせない
//! - broker 側で subscription が閉じられたらループを抜ける

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::domain::{BrokerError, BrokerRecord, CORRELATION_ID_HEADER, Headers, InboundEnvelope};
use crate::ports::{Publisher, Subscriber};

type HandlerFuture = Pin<Box<dyn Future<Output = Option<Vec<u8>>> + Send>>;

/// Request handler. Returning `None` sends no reply.
pub type RequestHandler = Arc<dyn Fn(InboundEnvelope) -> HandlerFuture + Send + Sync>;

/// Wrap an async closure as a `RequestHandler`.
pub fn handler<F, Fut>(f: F) -> RequestHandler
where
    F: Fn(InboundEnvelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<Vec<u8>>> + Send + 'static,
{
    Arc::new(move |request| Box::pin(f(request)))
}

pub struct ReplyResponder {
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl ReplyResponder {
    pub async fn spawn(
        publisher: Arc<dyn Publisher>,
        subscriber: &dyn Subscriber,
        request_channel: &str,
        handler: RequestHandler,
        poll_timeout: Duration,
    ) -> Result<Self, BrokerError> {
        let mut subscription = subscriber.subscribe(request_channel).await?;
        let token = CancellationToken::new();
        let loop_token = token.clone();
        let channel = request_channel.to_string();

        let join = tokio::spawn(async move {
            loop {
                let polled = tokio::select! {
                    biased;
                    _ = loop_token.cancelled() => break,
                    polled = subscription.poll(poll_timeout) => polled,
                };
                let records = match polled {
                    Ok(records) => records,
                    Err(BrokerError::Closed) => {
                        tracing::warn!(channel = %channel, "request subscription closed by the broker");
                        break;
                    }
                    Err(err) => {
                        tracing::warn!(channel = %channel, error = %err, "responder poll failed");
                        tokio::select! {
                            _ = loop_token.cancelled() => break,
                            _ = tokio::time::sleep(poll_timeout) => continue,
                        }
                    }
                };

                for record in records {
                    tokio::spawn(respond(Arc::clone(&publisher), Arc::clone(&handler), record));
                }
            }
            if let Err(err) = subscription.close().await {
                tracing::warn!(channel = %channel, error = %err, "closing request subscription failed");
            }
        });

        Ok(Self { token, join })
    }

    /// True once the serving loop has exited.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub async fn stop(self) {
        self.token.cancel();
        if let Err(err) = self.join.await {
            tracing::error!(error = %err, "responder task failed");
        }
    }
}

async fn respond(publisher: Arc<dyn Publisher>, handler: RequestHandler, record: BrokerRecord) {
    let no_reply = record.is_no_reply();
    let reply_topic = record.reply_topic().map(str::to_string);
    let Some(request) = InboundEnvelope::from_record(record) else {
        tracing::warn!("request without correlation id ignored");
        return;
    };
    let id = request.correlation_id().clone();

    let Some(payload) = handler(request).await else {
        tracing::debug!(correlation_id = %id, "handler chose not to reply");
        return;
    };
    if no_reply {
        return;
    }
    let Some(reply_topic) = reply_topic else {
        tracing::warn!(correlation_id = %id, "request has no reply_topic header, reply dropped");
        return;
    };

    let headers = Headers::new().with(CORRELATION_ID_HEADER, id.as_str());
    let reply = BrokerRecord::new(Some(id.to_string()), payload, headers);
    if let Err(err) = publisher.publish(&reply_topic, reply).await {
        tracing::warn!(correlation_id = %id, channel = %reply_topic, error = %err, "failed to publish reply");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CorrelationId, OutboundEnvelope};
    use crate::impls::InMemoryBroker;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn replies_go_to_the_reply_topic_with_the_same_key() {
        let broker = Arc::new(InMemoryBroker::new());
        let responder = ReplyResponder::spawn(
            broker.clone(),
            broker.as_ref(),
            "echo",
            handler(|req: InboundEnvelope| async move { Some(req.into_payload()) }),
            Duration::from_millis(50),
        )
        .await
        .unwrap();
        let mut replies = broker.subscribe("echo-replies").await.unwrap();

        let request = OutboundEnvelope::request(
            CorrelationId::new("c-1"),
            b"hello".to_vec(),
            "echo-replies",
            &Headers::new(),
        );
        broker.publish("echo", request.into_record()).await.unwrap();

        let received = replies.poll(Duration::from_secs(1)).await.unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].key.as_deref(), Some("c-1"));
        assert_eq!(received[0].payload, b"hello");

        responder.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn no_reply_requests_are_handled_but_not_answered() {
        let broker = Arc::new(InMemoryBroker::new());
        let handled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&handled);
        let responder = ReplyResponder::spawn(
            broker.clone(),
            broker.as_ref(),
            "audit",
            handler(move |_req: InboundEnvelope| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Some(b"ignored".to_vec()) }
            }),
            Duration::from_millis(50),
        )
        .await
        .unwrap();

        let request =
            OutboundEnvelope::fire_and_forget(CorrelationId::new("c-2"), vec![], &Headers::new());
        broker.publish("audit", request.into_record()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(handled.load(Ordering::SeqCst), 1);
        // request 1 件だけで、応答は publish されていない
        assert_eq!(broker.published("audit").await.len(), 1);

        responder.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_interrupts_the_poll_error_backoff() {
        let broker = Arc::new(InMemoryBroker::new());
        broker.fail_next_polls(1);
        let responder = ReplyResponder::spawn(
            broker.clone(),
            broker.as_ref(),
            "echo",
            handler(|req: InboundEnvelope| async move { Some(req.into_payload()) }),
            Duration::from_secs(30),
        )
        .await
        .unwrap();
        tokio::task::yield_now().await;

        let started = tokio::time::Instant::now();
        responder.stop().await;
        assert!(started.elapsed() < Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn loop_exits_when_the_broker_closes_the_channel() {
        let broker = Arc::new(InMemoryBroker::new());
        let responder = ReplyResponder::spawn(
            broker.clone(),
            broker.as_ref(),
            "echo",
            handler(|req: InboundEnvelope| async move { Some(req.into_payload()) }),
            Duration::from_millis(50),
        )
        .await
        .unwrap();

        broker.close_channel("echo").await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(responder.is_finished());
        responder.stop().await;
    }
}
