use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::NpacAdapter;
use crate::errors::{NpacError, NpacResult};
use crate::handler::{
    AssociationReplyHandler, GenericReplyHandler, NewSessionReplyHandler, NotificationHandler,
    RecoveryCompleteReplyHandler,
};
use crate::message::OutboundRequest;
use crate::recovery::RecoveryJob;
use crate::retry::{RetryAction, RetryTask};
use crate::session::Session;
use crate::types::{AckCode, AssociationState, InvokeId, Region};

impl NpacAdapter {
    /// Register `handler` under `invoke_id`, then send `request`
    ///
    /// The handler is registered first so that a fast reply always finds it.
    /// If the gateway refuses the request the registration is cancelled and
    /// `false` is returned; the caller decides how to retry.
    pub(crate) async fn dispatch(
        &self,
        invoke_id: InvokeId,
        handler: Box<dyn NotificationHandler>,
        request: OutboundRequest,
    ) -> bool {
        self.inner
            .registry
            .register(invoke_id.clone(), handler, self.inner.config.resend_timeout());

        let result = self.inner.gateway.send(&invoke_id, &request).await;
        match result {
            Ok(AckCode::Ack) => {
                debug!("Sent {} request with invoke id {}", request.name(), invoke_id);
                true
            }
            Ok(AckCode::Nack) => {
                warn!("Gateway NACKed {} request {}", request.name(), invoke_id);
                self.inner.registry.cancel(&invoke_id);
                false
            }
            Err(e) => {
                warn!("Failed to send {} request {}: {}", request.name(), invoke_id, e);
                self.inner.registry.cancel(&invoke_id);
                false
            }
        }
    }

    /// Establish `session` unless it already is
    pub async fn send_new_session(&self, session: &Arc<Session>) {
        if session.is_alive() {
            debug!(
                "Session for {} is already established as {}",
                session.primary_spid(),
                session.id()
            );
            return;
        }

        let request = OutboundRequest::NewSession {
            primary_spid: session.primary_spid().to_string(),
            user_id: self.inner.config.user_id.clone(),
        };
        let handler = Box::new(NewSessionReplyHandler::new(session.clone()));
        if !self.dispatch(self.next_invoke_id(), handler, request).await {
            self.retry_new_session(session);
        }
    }

    /// Bring up every region's association for a newly established session
    ///
    /// Regions without providers are marked not required; the rest are
    /// connected through immediate retries so they proceed in parallel.
    pub fn send_next_association_requests(&self, session: &Arc<Session>) {
        for region in Region::all() {
            if session.spids(region).is_empty() {
                session.set_association_state(region, AssociationState::NotRequired);
                continue;
            }
            match session.association_state(region) {
                AssociationState::Down | AssociationState::Retry => {
                    self.retry_association_request_immediately(session, region);
                }
                state => {
                    debug!(
                        "Region {} association already {} for session {}",
                        region,
                        state,
                        session.id()
                    );
                }
            }
        }
    }

    pub async fn send_association_connect(&self, session: &Arc<Session>, region: Region) {
        if !session.is_alive() {
            debug!(
                "Not associating region {}: session for {} is down",
                region,
                session.primary_spid()
            );
            return;
        }

        session.set_association_state(region, AssociationState::WaitingForReply);

        let request = OutboundRequest::AssociationConnect {
            session_id: session.id(),
            region,
            primary_spid: session.primary_spid().to_string(),
        };
        let handler = Box::new(AssociationReplyHandler::new(session.clone(), region));
        if !self.dispatch(self.next_invoke_id(), handler, request).await {
            self.retry_association_request(session, region);
        }
    }

    /// Tell the gateway the region's recovery walk has finished
    pub async fn send_recovery_complete(&self, session: &Arc<Session>, region: Region) {
        info!(
            "Recovery walk for region {} finished on session {}",
            region,
            session.id()
        );
        let request = OutboundRequest::RecoveryComplete {
            session_id: session.id(),
            region,
            primary_spid: session.primary_spid().to_string(),
        };
        let handler = Box::new(RecoveryCompleteReplyHandler::new(session.clone(), region));
        if !self.dispatch(self.next_invoke_id(), handler, request).await {
            self.retry_association_request(session, region);
        }
    }

    /// Send a message queued by a client
    ///
    /// # Arguments
    /// * `session` - Session to send on
    /// * `message_key` - Queue key, used for status updates when the reply arrives
    /// * `spid` - Provider the message is sent for
    /// * `region` - Region the message targets, when it targets one
    /// * `body` - Encoded message
    ///
    /// # Returns
    /// The invoke id the reply will arrive under.
    pub async fn send_generic(
        &self,
        session: &Arc<Session>,
        message_key: &str,
        spid: &str,
        region: Option<Region>,
        body: impl Into<String>,
    ) -> NpacResult<InvokeId> {
        if !session.is_alive() {
            return Err(NpacError::SessionNotFound(format!(
                "no live session for {}",
                session.primary_spid()
            )));
        }

        let invoke_id = self.next_invoke_id();
        let request = OutboundRequest::Generic {
            session_id: session.id(),
            spid: spid.to_string(),
            region,
            body: body.into(),
        };
        let handler = Box::new(GenericReplyHandler::new(
            session.clone(),
            message_key,
            spid,
            region,
        ));

        if self.dispatch(invoke_id.clone(), handler, request).await {
            Ok(invoke_id)
        } else {
            Err(NpacError::Gateway(format!(
                "message {} was not accepted",
                message_key
            )))
        }
    }

    // -- retries -----------------------------------------------------------

    pub fn retry_new_session(&self, session: &Arc<Session>) {
        let delay = Duration::from_millis(self.inner.config.retry_interval_ms);
        RetryTask::new(RetryAction::NewSession, delay, session.clone()).schedule(self);
    }

    pub(crate) fn retry_new_session_immediately(&self, session: &Arc<Session>) {
        RetryTask::new(RetryAction::NewSession, Duration::ZERO, session.clone()).schedule(self);
    }

    /// Mark the region for retry and reassociate after the region's backoff
    pub fn retry_association_request(&self, session: &Arc<Session>, region: Region) {
        self.schedule_association_retry(session, region, self.inner.config.retry_interval(region));
    }

    pub fn retry_association_request_immediately(&self, session: &Arc<Session>, region: Region) {
        self.schedule_association_retry(session, region, Duration::ZERO);
    }

    fn schedule_association_retry(&self, session: &Arc<Session>, region: Region, delay: Duration) {
        // Set the state first: the change must not abort the retry created below.
        session.set_association_state(region, AssociationState::Retry);
        RetryTask::new(RetryAction::AssociationConnect { region }, delay, session.clone())
            .schedule(self);
    }

    /// Resend a recovery request after the region's backoff
    pub fn retry_recovery_request(&self, job: RecoveryJob) {
        let delay = self.inner.config.retry_interval(job.region);
        let session = job.session.clone();
        RetryTask::new(RetryAction::Recovery(job), delay, session).schedule(self);
    }

    pub fn retry_continuation_request(&self, job: RecoveryJob, action_id: String) {
        let delay = self.inner.config.retry_interval(job.region);
        let session = job.session.clone();
        RetryTask::new(RetryAction::Continuation { job, action_id }, delay, session)
            .schedule(self);
    }
}
