use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::adapter::NpacAdapter;
use crate::handler::NotificationHandler;
use crate::message::Reply;
use crate::recovery::{classify, RecoveryJob, RecoveryStep};
use crate::session::AssociationSubscription;
use crate::types::{AckCode, RecoveryStyle};

/// Handles the reply to one recovery request, for either recovery style
///
/// `job` already describes the position after this request: its lower bound
/// is the stop time that was sent. `request_start` keeps the start that was
/// sent so a retry can repeat the exact same window.
#[derive(Debug)]
pub struct RecoveryReplyHandler {
    job: RecoveryJob,
    request_start: DateTime<Utc>,
    subscription: Option<AssociationSubscription>,
    reply: Option<Reply>,
}

impl RecoveryReplyHandler {
    pub fn new(job: RecoveryJob, request_start: DateTime<Utc>) -> Self {
        let subscription = Some(job.session.watch_association(job.region));
        Self {
            job,
            request_start,
            subscription,
            reply: None,
        }
    }

    pub fn job(&self) -> &RecoveryJob {
        &self.job
    }

    /// Unsubscribe and report whether the association changed meanwhile
    fn release(&mut self) -> bool {
        self.subscription
            .take()
            .map(|sub| sub.is_aborted())
            .unwrap_or(false)
    }

    /// The job that repeats this request unchanged
    fn resend_job(&self) -> RecoveryJob {
        RecoveryJob {
            last_notification_time: Some(self.request_start),
            ..self.job.clone()
        }
    }

    fn spid(&self) -> &str {
        self.job.current_spid().unwrap_or("<none>")
    }
}

#[async_trait]
impl NotificationHandler for RecoveryReplyHandler {
    fn name(&self) -> &'static str {
        match self.job.style {
            RecoveryStyle::Sequence => "sequence-recovery",
            RecoveryStyle::TimeRange => "time-range-recovery",
        }
    }

    fn receive_notification(&mut self, reply: Reply) -> AckCode {
        if let Some(region) = reply.region {
            if region != self.job.region {
                warn!(
                    "Recovery reply for region {} delivered to handler for region {}",
                    region, self.job.region
                );
                return AckCode::Nack;
            }
        }
        self.reply = Some(reply);
        AckCode::Ack
    }

    async fn run(self: Box<Self>, adapter: &NpacAdapter) {
        let mut this = self;
        if this.release() {
            debug!(
                "Association for region {} changed while {} recovery for {} was pending, dropping reply",
                this.job.region,
                this.job.kind,
                this.spid()
            );
            return;
        }

        let Some(reply) = this.reply.take() else {
            return;
        };
        let status = reply.status();
        let step = classify(this.job.style, status.as_ref(), reply.action_id());
        let interval = adapter.config().recovery_interval();

        match step {
            RecoveryStep::Completed { forward, token } => {
                if forward {
                    adapter.process(&reply).await;
                }
                adapter.persist_last_notification_time(&this.job).await;

                let mut job = this.job;
                match token {
                    Some(token) => {
                        adapter.send_continuation_request(job, token).await;
                    }
                    None if job.time_range => {
                        job.action_id = None;
                        adapter.send_recovery_request(job).await;
                    }
                    None => {
                        adapter.send_recovery_request(job.next_provider(interval)).await;
                    }
                }
            }
            RecoveryStep::MoreData { token } => {
                adapter.process(&reply).await;
                let mut job = this.job;
                job.action_id = Some(token);
                job.time_range = true;
                adapter.send_recovery_request(job).await;
            }
            RecoveryStep::TooMuchData => {
                let mut job = this.job;
                if job.subdivide() {
                    info!(
                        "Too much {} data for {} in region {}, retrying with interval {:?}",
                        job.kind,
                        job.current_spid().unwrap_or("<none>"),
                        job.region,
                        job.interval
                    );
                    adapter.send_recovery_request(job).await;
                } else {
                    error!(
                        "Smallest recovery interval failed for {} in region {} ({} recovery), skipping provider",
                        job.current_spid().unwrap_or("<none>"),
                        job.region,
                        job.kind
                    );
                    adapter.send_recovery_request(job.next_provider(interval)).await;
                }
            }
            RecoveryStep::Failed => {
                warn!(
                    "{} recovery for {} in region {} failed: {}",
                    this.job.kind,
                    this.spid(),
                    this.job.region,
                    reply.describe()
                );
                adapter.retry_recovery_request(this.resend_job());
            }
        }
    }

    async fn receive_error(self: Box<Self>, error: Reply, adapter: &NpacAdapter) {
        let mut this = self;
        if this.release() {
            return;
        }
        warn!(
            "{} recovery for {} in region {} returned error: {}",
            this.job.kind,
            this.spid(),
            this.job.region,
            error.describe()
        );
        adapter.retry_recovery_request(this.resend_job());
    }

    async fn timeout(self: Box<Self>, adapter: &NpacAdapter) {
        let mut this = self;
        if this.release() {
            return;
        }
        warn!(
            "{} recovery for {} in region {} timed out",
            this.job.kind,
            this.spid(),
            this.job.region
        );
        adapter.retry_recovery_request(this.resend_job());
    }
}
