use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::adapter::NpacAdapter;
use crate::handler::NotificationHandler;
use crate::message::Reply;
use crate::session::Session;
use crate::types::{AckCode, QueueStatus, Region, RequestOrigin};

/// Handles the reply to a message a client queued for sending
///
/// Replies that only say "not now" (invalid session, association in
/// recovery, region not associated) put the message back in the queue as a
/// failure; anything else is final and goes downstream.
#[derive(Debug)]
pub struct GenericReplyHandler {
    session: Arc<Session>,
    message_key: String,
    spid: String,
    region: Option<Region>,
    reply: Option<Reply>,
}

impl GenericReplyHandler {
    pub fn new(
        session: Arc<Session>,
        message_key: impl Into<String>,
        spid: impl Into<String>,
        region: Option<Region>,
    ) -> Self {
        Self {
            session,
            message_key: message_key.into(),
            spid: spid.into(),
            region,
            reply: None,
        }
    }

    /// Reason to put the message back in the queue, if any
    fn requeue_reason(adapter: &NpacAdapter, reply: &Reply) -> Option<&'static str> {
        if adapter.is_session_invalid(reply) {
            Some("session invalid")
        } else if adapter.is_association_recovering(reply) {
            Some("association in recovery")
        } else if adapter.is_region_not_associated(reply) {
            Some("region not associated")
        } else {
            None
        }
    }

    async fn requeue(&self, adapter: &NpacAdapter, reason: &str) {
        debug!(
            "Re-queueing message {} for {}: {}",
            self.message_key, self.spid, reason
        );
        adapter
            .update_queue_status(&self.message_key, QueueStatus::Failure, Some(reason))
            .await;
    }
}

#[async_trait]
impl NotificationHandler for GenericReplyHandler {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn origin(&self) -> RequestOrigin {
        RequestOrigin::GenericAutoRequest
    }

    fn receive_notification(&mut self, reply: Reply) -> AckCode {
        self.reply = Some(reply);
        AckCode::Ack
    }

    async fn run(self: Box<Self>, adapter: &NpacAdapter) {
        let Some(reply) = self.reply.as_ref() else {
            return;
        };

        if let Some(reason) = Self::requeue_reason(adapter, reply) {
            self.requeue(adapter, reason).await;
            return;
        }

        adapter.delete_queued_message(&self.message_key).await;
        adapter.process(reply).await;
    }

    async fn receive_error(self: Box<Self>, error: Reply, adapter: &NpacAdapter) {
        if let Some(reason) = Self::requeue_reason(adapter, &error) {
            self.requeue(adapter, reason).await;
            return;
        }

        warn!(
            "Message {} for {} on session {} failed: {}",
            self.message_key,
            self.spid,
            self.session.id(),
            error.describe()
        );

        let mut error = error;
        if error.customer_id.as_deref().map_or(true, str::is_empty) {
            error.customer_id = Some(self.spid.clone());
        }
        if error.region.is_none() {
            error.region = self.region;
        }

        adapter.delete_queued_message(&self.message_key).await;
        adapter.process(&error).await;
    }

    async fn timeout(self: Box<Self>, adapter: &NpacAdapter) {
        warn!(
            "No reply for message {} from {}, marking for retry",
            self.message_key, self.spid
        );
        adapter
            .update_queue_status(&self.message_key, QueueStatus::Retry, Some("reply timed out"))
            .await;
    }
}
