//! Loopback demo
//!
//! Runs the adapter against an in-process gateway that answers every request
//! with success, so one session goes through new-session, association and a
//! short recovery walk to a connected region.
//!
//! ```sh
//! cargo run -p npac-core --example loopback
//! RUST_LOG=npac_core=debug cargo run -p npac-core --example loopback -- npac.toml
//! ```

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, Level};

use infra_common::{log_welcome, setup_logging, LoggingConfig};
use npac_core::prelude::*;

type Outbound = (InvokeId, OutboundRequest);

struct LoopbackGateway {
    tx: mpsc::UnboundedSender<Outbound>,
}

#[async_trait]
impl GatewayClient for LoopbackGateway {
    async fn send(&self, invoke_id: &InvokeId, request: &OutboundRequest) -> NpacResult<AckCode> {
        self.tx
            .send((invoke_id.clone(), request.clone()))
            .map_err(|_| NpacError::Gateway("loopback closed".to_string()))?;
        Ok(AckCode::Ack)
    }
}

struct PrintingProcessor;

#[async_trait]
impl ReplyProcessor for PrintingProcessor {
    async fn process(&self, reply: &Reply) -> NpacResult<()> {
        info!("Processed {}", reply.describe());
        Ok(())
    }
}

struct PrintingQueue;

#[async_trait]
impl QueueStatusStore for PrintingQueue {
    async fn delete_on_success(&self, message_key: &str) -> NpacResult<()> {
        info!("Queue: delete {}", message_key);
        Ok(())
    }

    async fn update_status(
        &self,
        message_key: &str,
        status: QueueStatus,
        reason: Option<&str>,
    ) -> NpacResult<()> {
        info!("Queue: {} -> {:?} ({:?})", message_key, status, reason);
        Ok(())
    }
}

/// What the far end says to each request
fn answer(request: &OutboundRequest) -> Reply {
    match request {
        OutboundRequest::NewSession { .. } => {
            Reply::new().with_status("success").with_session_id("LOOP-1")
        }
        OutboundRequest::Recovery(req) => Reply::new()
            .with_status("success")
            .with_region(req.region)
            .with_body(format!("{} {} {}..{}", req.kind, req.spid, req.start, req.stop)),
        _ => Reply::new().with_status("success"),
    }
}

#[tokio::main]
async fn main() -> NpacResult<()> {
    setup_logging(LoggingConfig::new(Level::INFO, "npac-loopback"))?;
    log_welcome("npac-loopback", env!("CARGO_PKG_VERSION"));

    let config = match std::env::args().nth(1) {
        Some(path) => AdapterConfig::from_file(path)?,
        None => AdapterConfig {
            recovery_interval_ms: 15 * 60 * 1000,
            ..AdapterConfig::default()
        },
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let times = Arc::new(InMemoryTimeStore::new());
    let southeast = Region::new(3)?;
    let since = Utc::now() - TimeDelta::hours(1);
    times.seed(RecoveryKind::Notifications, "5678", southeast, since);
    times.seed(RecoveryKind::Notifications, "9012", southeast, since);

    let adapter = NpacAdapter::builder(config)
        .gateway(Arc::new(LoopbackGateway { tx }))
        .processor(Arc::new(PrintingProcessor))
        .queue_store(Arc::new(PrintingQueue))
        .time_store(times)
        .build()?;

    let session = adapter.add_session(
        Session::new("1234").with_region_spids(southeast, vec!["5678".into(), "9012".into()]),
    );
    adapter.initialize().await;

    while let Some((invoke_id, request)) = rx.recv().await {
        info!("-> {} ({})", request.name(), invoke_id);
        let reply = answer(&request);
        adapter.handle_notification(&invoke_id, reply);

        if matches!(request, OutboundRequest::RecoveryComplete { .. }) {
            break;
        }
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    info!(
        "Region {} is {}",
        southeast,
        session.association_state(southeast)
    );
    adapter.shutdown().await
}
