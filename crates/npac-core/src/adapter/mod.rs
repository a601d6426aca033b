//! The adapter service
//!
//! [`NpacAdapter`] is the process-scoped object that owns everything the
//! protocol core needs: collaborators, the pending-reply registry, the worker
//! pool and the sessions. It is a cheap-clone handle; handlers receive a
//! reference to it and call back into it to send the next request.
//!
//! ```text
//!   transport ──handle_notification──▶ NpacAdapter ──deliver──▶ PendingReplies
//!                                           │                       │
//!                                           │ spawn run()           │ timeout
//!                                           ▼                       ▼
//!                                      WorkerPool ◀──── dispatch_timeout
//!                                           │
//!                                 handler.run(&adapter)
//!                                           │
//!                 send_* / retry_* ◀────────┘────────▶ GatewayClient
//! ```
//!
//! Operations are spread over three files: this one holds construction and
//! the inbound entry points, `requests.rs` the session/association requests
//! and retries, `recovery.rs` the recovery walk sequencing.

mod recovery;
mod requests;

use infra_common::{LogContext, WorkerPool};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn, Instrument, Level};

use crate::collaborators::{
    GatewayClient, InMemoryTimeStore, NotificationTimeStore, QueueStatusStore, ReplyProcessor,
};
use crate::config::AdapterConfig;
use crate::errors::{NpacError, NpacResult};
use crate::handler::NotificationHandler;
use crate::message::{error_codes, Reply};
use crate::registry::{Delivery, PendingReplies};
use crate::session::Session;
use crate::types::{AckCode, AssociationState, InvokeId, QueueStatus, Region, RequestOrigin};

pub(crate) type WeakAdapter = Weak<AdapterInner>;

pub(crate) struct AdapterInner {
    config: AdapterConfig,
    gateway: Arc<dyn GatewayClient>,
    processor: Arc<dyn ReplyProcessor>,
    time_store: Arc<dyn NotificationTimeStore>,
    queue_store: Arc<dyn QueueStatusStore>,
    registry: PendingReplies,
    pool: WorkerPool,
    sessions: RwLock<Vec<Arc<Session>>>,
    next_invoke_id: AtomicU64,
}

/// Handle to the adapter service
#[derive(Clone)]
pub struct NpacAdapter {
    inner: Arc<AdapterInner>,
}

impl std::fmt::Debug for NpacAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NpacAdapter")
            .field("sessions", &self.inner.sessions.read().len())
            .field("pending", &self.inner.registry.len())
            .field("pool", &self.inner.pool)
            .finish()
    }
}

/// Builder for [`NpacAdapter`]
pub struct NpacAdapterBuilder {
    config: AdapterConfig,
    gateway: Option<Arc<dyn GatewayClient>>,
    processor: Option<Arc<dyn ReplyProcessor>>,
    time_store: Option<Arc<dyn NotificationTimeStore>>,
    queue_store: Option<Arc<dyn QueueStatusStore>>,
}

impl NpacAdapterBuilder {
    pub fn gateway(mut self, gateway: Arc<dyn GatewayClient>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn processor(mut self, processor: Arc<dyn ReplyProcessor>) -> Self {
        self.processor = Some(processor);
        self
    }

    /// Defaults to an [`InMemoryTimeStore`]
    pub fn time_store(mut self, time_store: Arc<dyn NotificationTimeStore>) -> Self {
        self.time_store = Some(time_store);
        self
    }

    pub fn queue_store(mut self, queue_store: Arc<dyn QueueStatusStore>) -> Self {
        self.queue_store = Some(queue_store);
        self
    }

    /// Validate the configuration and start the worker pool
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> NpacResult<NpacAdapter> {
        self.config.validate()?;

        let gateway = self
            .gateway
            .ok_or_else(|| NpacError::Config("a gateway client is required".to_string()))?;
        let processor = self
            .processor
            .ok_or_else(|| NpacError::Config("a reply processor is required".to_string()))?;
        let queue_store = self
            .queue_store
            .ok_or_else(|| NpacError::Config("a queue status store is required".to_string()))?;
        let time_store = self
            .time_store
            .unwrap_or_else(|| Arc::new(InMemoryTimeStore::new()));

        let pool = WorkerPool::new(
            "npac-adapter",
            self.config.max_concurrent_tasks,
            self.config.shutdown_timeout(),
        )?;
        let config = self.config;

        let inner = Arc::new_cyclic(|weak: &WeakAdapter| AdapterInner {
            config,
            gateway,
            processor,
            time_store,
            queue_store,
            registry: PendingReplies::new(weak.clone()),
            pool,
            sessions: RwLock::new(Vec::new()),
            next_invoke_id: AtomicU64::new(1),
        });

        Ok(NpacAdapter { inner })
    }
}

impl NpacAdapter {
    pub fn builder(config: AdapterConfig) -> NpacAdapterBuilder {
        NpacAdapterBuilder {
            config,
            gateway: None,
            processor: None,
            time_store: None,
            queue_store: None,
        }
    }

    pub(crate) fn from_inner(inner: Arc<AdapterInner>) -> Self {
        Self { inner }
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.inner.config
    }

    pub fn pending_replies(&self) -> &PendingReplies {
        &self.inner.registry
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.inner.pool
    }

    /// Allocate the next invoke id
    pub fn next_invoke_id(&self) -> InvokeId {
        let n = self.inner.next_invoke_id.fetch_add(1, Ordering::Relaxed);
        InvokeId::new(format!("{}{}", self.inner.config.invoke_id_prefix, n))
    }

    /// Manage `session`; it is established on [`initialize`](Self::initialize)
    pub fn add_session(&self, session: Session) -> Arc<Session> {
        let session = Arc::new(session);
        self.inner.sessions.write().push(session.clone());
        session
    }

    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.inner.sessions.read().clone()
    }

    pub fn session_by_id(&self, session_id: &str) -> Option<Arc<Session>> {
        self.inner
            .sessions
            .read()
            .iter()
            .find(|s| s.id() == session_id)
            .cloned()
    }

    pub fn session_by_spid(&self, primary_spid: &str) -> Option<Arc<Session>> {
        self.inner
            .sessions
            .read()
            .iter()
            .find(|s| s.primary_spid() == primary_spid)
            .cloned()
    }

    /// Send a new-session request for every managed session
    pub async fn initialize(&self) {
        let sessions = self.sessions();
        info!("Initializing NPAC adapter with {} sessions", sessions.len());
        for session in &sessions {
            self.send_new_session(session).await;
        }
    }

    /// Drop pending replies and drain the worker pool
    pub async fn shutdown(&self) -> NpacResult<()> {
        info!(
            "Shutting down NPAC adapter with {} pending replies",
            self.inner.registry.len()
        );
        self.inner.registry.clear();
        self.inner.pool.shutdown().await?;
        Ok(())
    }

    // -- inbound -----------------------------------------------------------

    /// Deliver a reply to the handler waiting on `invoke_id`
    ///
    /// # Returns
    /// - `Nack` when nothing is waiting (late, duplicate or unknown reply)
    /// - `Nack` when the handler rejects the reply; the handler stays pending
    ///   and its original deadline still applies
    /// - `Ack` once the handler has accepted the reply and its `run` is queued
    pub fn handle_notification(&self, invoke_id: &InvokeId, reply: Reply) -> AckCode {
        let handler = match self.inner.registry.deliver(invoke_id, reply) {
            Delivery::Accepted(handler) => handler,
            Delivery::Rejected(name) => {
                warn!(
                    "{} handler rejected reply for invoke id {}, keeping it pending",
                    name, invoke_id
                );
                return AckCode::Nack;
            }
            Delivery::Missing => {
                warn!("No handler waiting for reply with invoke id {}", invoke_id);
                return AckCode::Nack;
            }
        };

        let span = LogContext::with_operation(handler.name(), "run")
            .with_field("invoke_id", invoke_id)
            .span(Level::DEBUG);
        let adapter = self.clone();
        let spawned = self.inner.pool.spawn(
            "reply-run",
            async move { handler.run(&adapter).await }.instrument(span),
        );
        if let Err(e) = spawned {
            warn!("Dropping reply for invoke id {}: {}", invoke_id, e);
        }
        AckCode::Ack
    }

    /// Deliver an error reply to the handler waiting on `invoke_id`
    pub fn handle_error(&self, invoke_id: &InvokeId, error: Reply) -> AckCode {
        let Some(handler) = self.inner.registry.cancel(invoke_id) else {
            warn!("No handler waiting for error with invoke id {}", invoke_id);
            return AckCode::Nack;
        };

        let span = LogContext::with_operation(handler.name(), "receive_error")
            .with_field("invoke_id", invoke_id)
            .span(Level::DEBUG);
        let adapter = self.clone();
        let spawned = self.inner.pool.spawn(
            "reply-error",
            async move { handler.receive_error(error, &adapter).await }.instrument(span),
        );
        if let Err(e) = spawned {
            warn!("Dropping error for invoke id {}: {}", invoke_id, e);
        }
        AckCode::Ack
    }

    /// Run an expired handler's timeout on the pool
    pub(crate) fn dispatch_timeout(&self, invoke_id: InvokeId, handler: Box<dyn NotificationHandler>) {
        let span = LogContext::with_operation(handler.name(), "timeout")
            .with_field("invoke_id", &invoke_id)
            .span(Level::DEBUG);
        let adapter = self.clone();
        let spawned = self.inner.pool.spawn(
            "reply-timeout",
            async move { handler.timeout(&adapter).await }.instrument(span),
        );
        if let Err(e) = spawned {
            debug!("Dropping timeout for invoke id {}: {}", invoke_id, e);
        }
    }

    pub fn notification_handler_exists(&self, invoke_id: &InvokeId) -> bool {
        self.inner.registry.exists(invoke_id)
    }

    /// Whether `invoke_id` belongs to a message sent for a queued client request
    pub fn is_generic_reply(&self, invoke_id: &InvokeId) -> bool {
        self.inner.registry.classify(invoke_id) == RequestOrigin::GenericAutoRequest
    }

    /// The gateway released a session; reset it and establish a new one
    pub fn receive_release_session(&self, session_id: &str) -> AckCode {
        let Some(session) = self.session_by_id(session_id) else {
            warn!("Release for unknown session {}", session_id);
            return AckCode::Nack;
        };

        info!("Session {} released by the gateway", session_id);
        session.reset();
        self.retry_new_session_immediately(&session);
        AckCode::Ack
    }

    /// The gateway reported an association's status out of band
    pub fn receive_association_status(
        &self,
        session_id: &str,
        region: Region,
        connected: bool,
    ) -> AckCode {
        let Some(session) = self.session_by_id(session_id) else {
            warn!("Association status for unknown session {}", session_id);
            return AckCode::Nack;
        };

        let state = session.association_state(region);
        if connected || state == AssociationState::NotRequired {
            debug!(
                "Association status for session {} region {}: connected={}, state {}",
                session_id, region, connected, state
            );
            return AckCode::Ack;
        }

        info!(
            "Association for session {} region {} lost ({}), reassociating",
            session_id, region, state
        );
        self.retry_association_request_immediately(&session, region);
        AckCode::Ack
    }

    // -- reply predicates --------------------------------------------------

    pub fn is_session_invalid(&self, reply: &Reply) -> bool {
        reply.has_error_code(error_codes::SESSION_INVALID)
    }

    pub fn is_association_recovering(&self, reply: &Reply) -> bool {
        reply.has_error_code(error_codes::ASSOCIATION_IN_RECOVERY)
    }

    pub fn is_region_not_associated(&self, reply: &Reply) -> bool {
        reply.has_error_code(error_codes::REGION_NOT_ASSOCIATED)
    }

    // -- collaborator calls that never fail the caller ----------------------

    /// Forward `reply` downstream; failures are logged
    pub(crate) async fn process(&self, reply: &Reply) {
        if let Err(e) = self.inner.processor.process(reply).await {
            warn!("Downstream processing failed for {}: {}", reply.describe(), e);
        }
    }

    pub(crate) async fn delete_queued_message(&self, message_key: &str) {
        if let Err(e) = self.inner.queue_store.delete_on_success(message_key).await {
            warn!("Could not delete queued message {}: {}", message_key, e);
        }
    }

    pub(crate) async fn update_queue_status(
        &self,
        message_key: &str,
        status: QueueStatus,
        reason: Option<&str>,
    ) {
        if let Err(e) = self
            .inner
            .queue_store
            .update_status(message_key, status, reason)
            .await
        {
            warn!(
                "Could not set queued message {} to {:?}: {}",
                message_key, status, e
            );
        }
    }
}
