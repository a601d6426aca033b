use async_trait::async_trait;
use tracing::{debug, warn};

use crate::adapter::NpacAdapter;
use crate::handler::NotificationHandler;
use crate::message::Reply;
use crate::recovery::RecoveryJob;
use crate::session::AssociationSubscription;
use crate::types::{AckCode, ReplyStatus};

/// Handles the reply to a continuation (fetch next batch) request
///
/// A reply carrying a stop time tells the walk where the delivered data
/// ended; the walk resumes the same provider from there in time-range mode.
#[derive(Debug)]
pub struct ContinuationReplyHandler {
    job: RecoveryJob,
    action_id: String,
    subscription: Option<AssociationSubscription>,
    reply: Option<Reply>,
}

impl ContinuationReplyHandler {
    pub fn new(job: RecoveryJob, action_id: String) -> Self {
        let subscription = Some(job.session.watch_association(job.region));
        Self {
            job,
            action_id,
            subscription,
            reply: None,
        }
    }

    fn release(&mut self) -> bool {
        self.subscription
            .take()
            .map(|sub| sub.is_aborted())
            .unwrap_or(false)
    }
}

#[async_trait]
impl NotificationHandler for ContinuationReplyHandler {
    fn name(&self) -> &'static str {
        "continuation"
    }

    fn receive_notification(&mut self, reply: Reply) -> AckCode {
        if reply.status().is_none() {
            warn!(
                "Continuation reply for action {} in region {} has no status",
                self.action_id, self.job.region
            );
            return AckCode::Nack;
        }
        self.reply = Some(reply);
        AckCode::Ack
    }

    async fn run(self: Box<Self>, adapter: &NpacAdapter) {
        let mut this = self;
        if this.release() {
            debug!(
                "Association for region {} changed during continuation {}, dropping reply",
                this.job.region, this.action_id
            );
            return;
        }

        let Some(reply) = this.reply.take() else {
            return;
        };
        let success = matches!(reply.status(), Some(ReplyStatus::Success));

        match reply.stop_time {
            Some(stop_time) => {
                if !success {
                    warn!(
                        "Continuation {} in region {} failed ({}), resuming from {}",
                        this.action_id,
                        this.job.region,
                        reply.describe(),
                        stop_time
                    );
                }
                let mut job = this.job;
                job.last_notification_time = Some(stop_time);
                job.action_id = None;
                job.time_range = true;
                adapter.send_recovery_request(job).await;
            }
            None if success => {
                let interval = adapter.config().recovery_interval();
                adapter.send_recovery_request(this.job.next_provider(interval)).await;
            }
            None => {
                warn!(
                    "Continuation {} in region {} failed: {}",
                    this.action_id,
                    this.job.region,
                    reply.describe()
                );
                adapter.retry_continuation_request(this.job, this.action_id);
            }
        }
    }

    async fn receive_error(self: Box<Self>, error: Reply, adapter: &NpacAdapter) {
        let mut this = self;
        if this.release() {
            return;
        }
        warn!(
            "Continuation {} in region {} returned error: {}",
            this.action_id,
            this.job.region,
            error.describe()
        );
        adapter.retry_continuation_request(this.job, this.action_id);
    }

    async fn timeout(self: Box<Self>, adapter: &NpacAdapter) {
        let mut this = self;
        if this.release() {
            return;
        }
        warn!(
            "Continuation {} in region {} timed out",
            this.action_id, this.job.region
        );
        adapter.retry_continuation_request(this.job, this.action_id);
    }
}
