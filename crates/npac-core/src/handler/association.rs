use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::adapter::NpacAdapter;
use crate::handler::NotificationHandler;
use crate::message::Reply;
use crate::session::{AssociationSubscription, Session};
use crate::types::{AckCode, AssociationState, Region, ReplyStatus};

/// Handles the reply to an association-connect request
///
/// Subscribes to the region's association state when created; a state change
/// before the reply is processed makes the reply stale.
#[derive(Debug)]
pub struct AssociationReplyHandler {
    session: Arc<Session>,
    region: Region,
    subscription: Option<AssociationSubscription>,
    status: Option<ReplyStatus>,
}

impl AssociationReplyHandler {
    pub fn new(session: Arc<Session>, region: Region) -> Self {
        let subscription = Some(session.watch_association(region));
        Self {
            session,
            region,
            subscription,
            status: None,
        }
    }

    /// Unsubscribe and report whether the association changed meanwhile
    fn release(&mut self) -> bool {
        self.subscription
            .take()
            .map(|sub| sub.is_aborted())
            .unwrap_or(false)
    }
}

#[async_trait]
impl NotificationHandler for AssociationReplyHandler {
    fn name(&self) -> &'static str {
        "association-connect"
    }

    fn receive_notification(&mut self, reply: Reply) -> AckCode {
        self.status = reply.status();
        AckCode::Ack
    }

    async fn run(self: Box<Self>, adapter: &NpacAdapter) {
        let mut this = self;
        if this.release() {
            debug!(
                "Ignoring stale association reply for region {}",
                this.region
            );
            return;
        }

        if matches!(this.status, Some(ReplyStatus::Success)) {
            info!(
                "Association for region {} established on session {}, starting recovery",
                this.region,
                this.session.id()
            );
            this.session
                .set_association_state(this.region, AssociationState::Recovering);
            adapter
                .start_region_recovery(&this.session, this.region, Utc::now())
                .await;
        } else {
            warn!(
                "Association-connect for region {} failed with {:?}",
                this.region, this.status
            );
            adapter.retry_association_request(&this.session, this.region);
        }
    }

    async fn receive_error(self: Box<Self>, error: Reply, adapter: &NpacAdapter) {
        let mut this = self;
        if this.release() {
            return;
        }
        warn!(
            "Association-connect for region {} returned error: {}",
            this.region,
            error.describe()
        );
        adapter.retry_association_request(&this.session, this.region);
    }

    async fn timeout(self: Box<Self>, adapter: &NpacAdapter) {
        let mut this = self;
        if this.release() {
            return;
        }
        warn!(
            "Association-connect for region {} timed out, resending",
            this.region
        );
        adapter.send_association_connect(&this.session, this.region).await;
    }
}

/// Handles the reply to the recovery-complete request that closes a walk
#[derive(Debug)]
pub struct RecoveryCompleteReplyHandler {
    session: Arc<Session>,
    region: Region,
    status: Option<ReplyStatus>,
}

impl RecoveryCompleteReplyHandler {
    pub fn new(session: Arc<Session>, region: Region) -> Self {
        Self {
            session,
            region,
            status: None,
        }
    }
}

#[async_trait]
impl NotificationHandler for RecoveryCompleteReplyHandler {
    fn name(&self) -> &'static str {
        "recovery-complete"
    }

    fn receive_notification(&mut self, reply: Reply) -> AckCode {
        self.status = reply.status();
        AckCode::Ack
    }

    async fn run(self: Box<Self>, adapter: &NpacAdapter) {
        if matches!(self.status, Some(ReplyStatus::Success)) {
            info!(
                "Region {} recovered, association connected on session {}",
                self.region,
                self.session.id()
            );
            self.session
                .set_association_state(self.region, AssociationState::Connected);
        } else {
            warn!(
                "Recovery-complete for region {} failed with {:?}, reassociating",
                self.region, self.status
            );
            adapter.retry_association_request(&self.session, self.region);
        }
    }

    async fn receive_error(self: Box<Self>, error: Reply, adapter: &NpacAdapter) {
        warn!(
            "Recovery-complete for region {} returned error: {}",
            self.region,
            error.describe()
        );
        adapter.retry_association_request(&self.session, self.region);
    }

    async fn timeout(self: Box<Self>, adapter: &NpacAdapter) {
        warn!("Recovery-complete for region {} timed out, resending", self.region);
        adapter.send_recovery_complete(&self.session, self.region).await;
    }
}
