//! Shared mock collaborators for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use npac_core::prelude::*;

/// Gateway that hands every sent request to the test
pub struct MockGateway {
    tx: mpsc::UnboundedSender<(InvokeId, OutboundRequest)>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<(InvokeId, OutboundRequest)>>,
    nack: AtomicBool,
}

impl MockGateway {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            tx,
            rx: tokio::sync::Mutex::new(rx),
            nack: AtomicBool::new(false),
        })
    }

    pub fn set_nack(&self, nack: bool) {
        self.nack.store(nack, Ordering::SeqCst);
    }

    /// Next request the adapter sent; panics if none arrives in time
    pub async fn next(&self) -> (InvokeId, OutboundRequest) {
        let mut rx = self.rx.lock().await;
        tokio::time::timeout(Duration::from_secs(3600 * 24), rx.recv())
            .await
            .expect("timed out waiting for an outbound request")
            .expect("gateway channel closed")
    }

    /// A request sent within `wait`, if any
    pub async fn next_within(&self, wait: Duration) -> Option<(InvokeId, OutboundRequest)> {
        let mut rx = self.rx.lock().await;
        tokio::time::timeout(wait, rx.recv()).await.ok().flatten()
    }
}

#[async_trait]
impl GatewayClient for MockGateway {
    async fn send(&self, invoke_id: &InvokeId, request: &OutboundRequest) -> NpacResult<AckCode> {
        let _ = self.tx.send((invoke_id.clone(), request.clone()));
        if self.nack.load(Ordering::SeqCst) {
            Ok(AckCode::Nack)
        } else {
            Ok(AckCode::Ack)
        }
    }
}

#[derive(Default)]
pub struct MockProcessor {
    pub replies: Mutex<Vec<Reply>>,
    failing: AtomicBool,
}

impl MockProcessor {
    pub fn count(&self) -> usize {
        self.replies.lock().unwrap().len()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl ReplyProcessor for MockProcessor {
    async fn process(&self, reply: &Reply) -> NpacResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NpacError::Processing("downstream rejected reply".to_string()));
        }
        self.replies.lock().unwrap().push(reply.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    Deleted(String),
    Status(String, QueueStatus, Option<String>),
}

#[derive(Default)]
pub struct MockQueue {
    pub events: Mutex<Vec<QueueEvent>>,
    failing: AtomicBool,
}

impl MockQueue {
    pub fn events(&self) -> Vec<QueueEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> NpacResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(NpacError::Queue("queue table locked".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl QueueStatusStore for MockQueue {
    async fn delete_on_success(&self, message_key: &str) -> NpacResult<()> {
        self.check()?;
        self.events
            .lock()
            .unwrap()
            .push(QueueEvent::Deleted(message_key.to_string()));
        Ok(())
    }

    async fn update_status(
        &self,
        message_key: &str,
        status: QueueStatus,
        reason: Option<&str>,
    ) -> NpacResult<()> {
        self.check()?;
        self.events.lock().unwrap().push(QueueEvent::Status(
            message_key.to_string(),
            status,
            reason.map(str::to_string),
        ));
        Ok(())
    }
}

/// Time store whose writes always fail
#[derive(Default)]
pub struct FailingWrites {
    pub inner: InMemoryTimeStore,
}

#[async_trait]
impl NotificationTimeStore for FailingWrites {
    async fn last_notification_time(
        &self,
        kind: RecoveryKind,
        spid: &str,
        region: Region,
    ) -> NpacResult<Option<DateTime<Utc>>> {
        self.inner.last_notification_time(kind, spid, region).await
    }

    async fn set_last_notification_time(
        &self,
        _kind: RecoveryKind,
        _spid: &str,
        _region: Region,
        _time: DateTime<Utc>,
    ) -> NpacResult<()> {
        Err(NpacError::Persistence("database unavailable".to_string()))
    }
}

pub struct Harness {
    pub adapter: NpacAdapter,
    pub gateway: Arc<MockGateway>,
    pub processor: Arc<MockProcessor>,
    pub queue: Arc<MockQueue>,
    pub times: Arc<InMemoryTimeStore>,
}

impl Harness {
    pub fn new(config: AdapterConfig) -> Self {
        let times = Arc::new(InMemoryTimeStore::new());
        Self::with_time_store(config, times.clone(), times)
    }

    pub fn with_time_store(
        config: AdapterConfig,
        store: Arc<dyn NotificationTimeStore>,
        times: Arc<InMemoryTimeStore>,
    ) -> Self {
        let gateway = MockGateway::new();
        let processor = Arc::new(MockProcessor::default());
        let queue = Arc::new(MockQueue::default());
        let adapter = NpacAdapter::builder(config)
            .gateway(gateway.clone())
            .processor(processor.clone())
            .queue_store(queue.clone())
            .time_store(store)
            .build()
            .expect("adapter builds");

        Self {
            adapter,
            gateway,
            processor,
            queue,
            times,
        }
    }

    /// Reply to `invoke_id` and expect the handler to accept it
    pub fn reply(&self, invoke_id: &InvokeId, reply: Reply) {
        assert_eq!(
            self.adapter.handle_notification(invoke_id, reply),
            AckCode::Ack,
            "reply for {} was not accepted",
            invoke_id
        );
    }
}

pub fn config() -> AdapterConfig {
    AdapterConfig {
        retry_interval_ms: 5_000,
        resend_timeout_ms: 30_000,
        ..AdapterConfig::default()
    }
}

pub fn southeast() -> Region {
    Region::new(3).unwrap()
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
}

/// Live session recovering for `spids` in the Southeast region
pub fn live_session(adapter: &NpacAdapter, spids: &[&str]) -> Arc<Session> {
    let session = adapter.add_session(
        Session::new("0001")
            .with_region_spids(southeast(), spids.iter().map(|s| s.to_string()).collect()),
    );
    session.set_id("S-1");
    session.set_association_state(southeast(), AssociationState::Recovering);
    session
}

pub fn seed(times: &InMemoryTimeStore, kind: RecoveryKind, spids: &[&str], at: DateTime<Utc>) {
    for spid in spids {
        times.seed(kind, spid, southeast(), at);
    }
}

pub fn as_recovery(request: &OutboundRequest) -> &RecoveryRequest {
    match request {
        OutboundRequest::Recovery(req) => req,
        other => panic!("expected a recovery request, got {:?}", other),
    }
}

pub fn interval_ms(req: &RecoveryRequest) -> i64 {
    (req.stop - req.start).num_milliseconds()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("npac_core=debug")
        .with_test_writer()
        .try_init();
}

/// Let spawned handler work run to completion (time is paused in these tests)
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
