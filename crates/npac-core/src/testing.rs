//! Recording collaborators for unit tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::adapter::NpacAdapter;
use crate::collaborators::{GatewayClient, InMemoryTimeStore, QueueStatusStore, ReplyProcessor};
use crate::config::AdapterConfig;
use crate::errors::NpacResult;
use crate::handler::NotificationHandler;
use crate::message::{OutboundRequest, Reply};
use crate::session::Session;
use crate::types::{AckCode, InvokeId, QueueStatus, Region, RequestOrigin};

#[derive(Default)]
pub(crate) struct RecordingGateway {
    sent: Mutex<Vec<(InvokeId, OutboundRequest)>>,
}

impl RecordingGateway {
    pub(crate) fn last(&self) -> Option<(InvokeId, OutboundRequest)> {
        self.sent.lock().last().cloned()
    }

    pub(crate) fn count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl GatewayClient for RecordingGateway {
    async fn send(&self, invoke_id: &InvokeId, request: &OutboundRequest) -> NpacResult<AckCode> {
        self.sent.lock().push((invoke_id.clone(), request.clone()));
        Ok(AckCode::Ack)
    }
}

#[derive(Default)]
pub(crate) struct RecordingProcessor {
    pub(crate) replies: Mutex<Vec<Reply>>,
}

#[async_trait]
impl ReplyProcessor for RecordingProcessor {
    async fn process(&self, reply: &Reply) -> NpacResult<()> {
        self.replies.lock().push(reply.clone());
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct RecordingQueue {
    pub(crate) updates: Mutex<Vec<(String, Option<QueueStatus>)>>,
}

#[async_trait]
impl QueueStatusStore for RecordingQueue {
    async fn delete_on_success(&self, message_key: &str) -> NpacResult<()> {
        self.updates.lock().push((message_key.to_string(), None));
        Ok(())
    }

    async fn update_status(
        &self,
        message_key: &str,
        status: QueueStatus,
        _reason: Option<&str>,
    ) -> NpacResult<()> {
        self.updates.lock().push((message_key.to_string(), Some(status)));
        Ok(())
    }
}

pub(crate) struct Mocks {
    pub(crate) gateway: Arc<RecordingGateway>,
    pub(crate) processor: Arc<RecordingProcessor>,
    pub(crate) queue: Arc<RecordingQueue>,
    pub(crate) times: Arc<InMemoryTimeStore>,
}

pub(crate) fn test_adapter(config: AdapterConfig) -> (NpacAdapter, Mocks) {
    let mocks = Mocks {
        gateway: Arc::new(RecordingGateway::default()),
        processor: Arc::new(RecordingProcessor::default()),
        queue: Arc::new(RecordingQueue::default()),
        times: Arc::new(InMemoryTimeStore::new()),
    };
    let adapter = NpacAdapter::builder(config)
        .gateway(mocks.gateway.clone())
        .processor(mocks.processor.clone())
        .queue_store(mocks.queue.clone())
        .time_store(mocks.times.clone())
        .build()
        .unwrap();
    (adapter, mocks)
}

/// Session with one provider in the Southeast region
pub(crate) fn test_session() -> Session {
    Session::new("0001").with_region_spids(Region::new(3).unwrap(), vec!["P1".to_string()])
}

/// Counts how the handlers it hands out were completed
#[derive(Debug, Default, Clone)]
pub(crate) struct Counters {
    runs: Arc<AtomicUsize>,
    errors: Arc<AtomicUsize>,
    timeouts: Arc<AtomicUsize>,
}

impl Counters {
    pub(crate) fn handler(&self, origin: RequestOrigin) -> Box<CountingHandler> {
        Box::new(CountingHandler {
            counters: self.clone(),
            origin,
            accept: true,
        })
    }

    /// A handler that NACKs every reply
    pub(crate) fn rejecting_handler(&self) -> Box<CountingHandler> {
        Box::new(CountingHandler {
            counters: self.clone(),
            origin: RequestOrigin::Other,
            accept: false,
        })
    }

    pub(crate) fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub(crate) fn errors(&self) -> usize {
        self.errors.load(Ordering::SeqCst)
    }

    pub(crate) fn timeouts(&self) -> usize {
        self.timeouts.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub(crate) struct CountingHandler {
    counters: Counters,
    origin: RequestOrigin,
    accept: bool,
}

#[async_trait]
impl NotificationHandler for CountingHandler {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn origin(&self) -> RequestOrigin {
        self.origin
    }

    fn receive_notification(&mut self, _reply: Reply) -> AckCode {
        if self.accept {
            AckCode::Ack
        } else {
            AckCode::Nack
        }
    }

    async fn run(self: Box<Self>, _adapter: &NpacAdapter) {
        self.counters.runs.fetch_add(1, Ordering::SeqCst);
    }

    async fn receive_error(self: Box<Self>, _error: Reply, _adapter: &NpacAdapter) {
        self.counters.errors.fetch_add(1, Ordering::SeqCst);
    }

    async fn timeout(self: Box<Self>, _adapter: &NpacAdapter) {
        self.counters.timeouts.fetch_add(1, Ordering::SeqCst);
    }
}
