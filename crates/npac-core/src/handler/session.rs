use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::adapter::NpacAdapter;
use crate::handler::NotificationHandler;
use crate::message::Reply;
use crate::session::Session;
use crate::types::{AckCode, ReplyStatus};

/// Handles the reply to a new-session request
#[derive(Debug)]
pub struct NewSessionReplyHandler {
    session: Arc<Session>,
    status: Option<ReplyStatus>,
    session_id: Option<String>,
}

impl NewSessionReplyHandler {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            status: None,
            session_id: None,
        }
    }
}

#[async_trait]
impl NotificationHandler for NewSessionReplyHandler {
    fn name(&self) -> &'static str {
        "new-session"
    }

    fn receive_notification(&mut self, reply: Reply) -> AckCode {
        let status = reply.status();
        let session_id = reply.session_id.filter(|id| !id.is_empty());

        // A successful reply is useless without the id it establishes
        if matches!(status, Some(ReplyStatus::Success)) && session_id.is_none() {
            warn!(
                "New-session reply for {} reported success without a session id",
                self.session.primary_spid()
            );
            return AckCode::Nack;
        }

        self.status = status;
        self.session_id = session_id;
        AckCode::Ack
    }

    async fn run(self: Box<Self>, adapter: &NpacAdapter) {
        match (self.status, self.session_id) {
            (Some(ReplyStatus::Success), Some(id)) => {
                info!("Session {} established for {}", id, self.session.primary_spid());
                self.session.set_id(id);
                adapter.send_next_association_requests(&self.session);
            }
            (status, _) => {
                warn!(
                    "New-session request for {} failed with {:?}",
                    self.session.primary_spid(),
                    status
                );
                adapter.retry_new_session(&self.session);
            }
        }
    }

    async fn receive_error(self: Box<Self>, error: Reply, adapter: &NpacAdapter) {
        warn!(
            "New-session request for {} returned error: {}",
            self.session.primary_spid(),
            error.describe()
        );
        adapter.retry_new_session(&self.session);
    }

    async fn timeout(self: Box<Self>, adapter: &NpacAdapter) {
        warn!(
            "New-session request for {} timed out, resending",
            self.session.primary_spid()
        );
        adapter.send_new_session(&self.session).await;
    }
}
