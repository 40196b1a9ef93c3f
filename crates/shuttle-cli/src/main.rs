use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tokio::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use shuttle_core::domain::{InboundEnvelope, ReplyMessage};
use shuttle_core::impls::{InMemoryBroker, JsonCodec, ReplyResponder, handler};
use shuttle_core::ports::PayloadCodec;
use shuttle_core::{ServiceBuilder, ShuttleConfig, TypedClient};

const GREETER_CHANNEL: &str = "greeter";
const AUDIT_CHANNEL: &str = "audit";

#[derive(Debug, Serialize, Deserialize)]
struct HelloRequest {
    name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct HelloReply {
    greeting: String,
}

#[derive(Debug, Serialize)]
struct AuditEvent<'a> {
    action: &'a str,
    subject: &'a str,
}

/// Greeter side: answers every request except the first `drop_first`,
/// so the client has something to retry.
async fn spawn_greeter(broker: &Arc<InMemoryBroker>, drop_first: u32) -> anyhow::Result<ReplyResponder> {
    let remaining_drops = Arc::new(AtomicU32::new(drop_first));
    let greeter = handler(move |request: InboundEnvelope| {
        let drop_this = remaining_drops
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        async move {
            if drop_this {
                tracing::info!(correlation_id = %request.correlation_id(), "greeter ignoring request");
                return None;
            }
            let id = request.correlation_id().clone();
            let reply = match JsonCodec.decode::<HelloRequest>(request.payload()) {
                Ok(hello) => ReplyMessage::success(
                    id,
                    HelloReply {
                        greeting: format!("Hello, {}!", hello.name),
                    },
                ),
                Err(err) => ReplyMessage::error(id, err.to_string()),
            };
            JsonCodec.encode(&reply).ok()
        }
    });

    ReplyResponder::spawn(
        broker.clone(),
        broker.as_ref(),
        GREETER_CHANNEL,
        greeter,
        Duration::from_millis(100),
    )
    .await
    .context("failed to start greeter")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // (A) 設定: 引数があれば JSON ファイル、なければデフォルト（デモ向けに短め）
    let config = match std::env::args().nth(1) {
        Some(path) => ShuttleConfig::from_path(&path)
            .with_context(|| format!("failed to load config from {path}"))?,
        None => {
            let mut config = ShuttleConfig::default();
            config.dispatcher.request_timeout_ms = 1_000;
            config.retry.wait_ms = 200;
            config
        }
    };

    // (B) broker と応答側
    let broker = Arc::new(InMemoryBroker::new());
    let greeter = spawn_greeter(&broker, 1).await?;

    // (C) クライアント側
    let service = Arc::new(
        ServiceBuilder::new()
            .broker(broker.clone())
            .config(config)
            .start_resilient()
            .await?,
    );
    let client = TypedClient::new(Arc::clone(&service), GREETER_CHANNEL);

    // (D) request/reply（1 回目は無視されるので retry で成功する）
    let reply: HelloReply = client
        .call(&HelloRequest {
            name: "shuttle".to_string(),
        })
        .await?;
    println!("{}", reply.greeting);

    // (E) fire-and-forget
    let audit = TypedClient::new(Arc::clone(&service), AUDIT_CHANNEL);
    let receipt = audit
        .notify(&AuditEvent {
            action: "greeted",
            subject: "shuttle",
        })?
        .await?;
    tracing::info!(correlation_id = %receipt.correlation_id, channel = %receipt.channel, "audit event published");
    println!("audit messages: {}", broker.published(AUDIT_CHANNEL).await.len());

    println!("retry metrics: {}", serde_json::to_string_pretty(&service.metrics())?);

    service.shutdown().await;
    greeter.stop().await;
    Ok(())
}
