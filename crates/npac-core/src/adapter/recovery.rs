use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::NpacAdapter;
use crate::message::{OutboundRequest, RecoveryRequest};
use crate::recovery::{time_delta, ContinuationReplyHandler, RecoveryJob, RecoveryReplyHandler};
use crate::session::Session;
use crate::types::{RecoveryKind, Region};

impl NpacAdapter {
    /// Start the recovery walk for `region` up to `window_end`
    pub async fn start_region_recovery(
        &self,
        session: &Arc<Session>,
        region: Region,
        window_end: DateTime<Utc>,
    ) {
        let style = self.inner.config.recovery_style(region);
        info!(
            "Starting {:?} recovery for region {} on session {} up to {}",
            style,
            region,
            session.id(),
            window_end
        );
        let job = RecoveryJob::new(
            session.clone(),
            region,
            RecoveryKind::ServiceProviderData,
            style,
            window_end,
            self.inner.config.recovery_interval(),
        );
        self.send_recovery_request(job).await;
    }

    /// Send the next recovery request for `job`
    ///
    /// Skips providers that have nothing to recover, moves through the
    /// phases when a provider list is exhausted and finishes the walk with a
    /// recovery-complete request.
    pub async fn send_recovery_request(&self, mut job: RecoveryJob) {
        let interval = self.inner.config.recovery_interval();

        loop {
            let Some(spid) = job.current_spid().map(str::to_string) else {
                let (session, region, kind) = (job.session.clone(), job.region, job.kind);
                match job.next_phase(interval) {
                    Some(next) => {
                        debug!(
                            "{} recovery for region {} done, starting {}",
                            kind, region, next.kind
                        );
                        job = next;
                        continue;
                    }
                    None => {
                        self.send_recovery_complete(&session, region).await;
                        return;
                    }
                }
            };

            if job.last_notification_time.is_none() {
                job.last_notification_time = self.load_last_notification_time(&job, &spid).await;
            }

            let Some(start) = job.last_notification_time else {
                warn!(
                    "No last {} notification time for {} in region {}, skipping provider",
                    job.kind, spid, job.region
                );
                job = job.next_provider(interval);
                continue;
            };

            if job.action_id.is_none() && job.is_caught_up(start) {
                debug!(
                    "{} recovery for {} in region {} is up to date",
                    job.kind, spid, job.region
                );
                job = job.next_provider(interval);
                continue;
            }

            let stop = job.window_stop(start);
            let request = RecoveryRequest {
                session_id: job.session.id(),
                region: job.region,
                spid: spid.clone(),
                kind: job.kind,
                style: job.style,
                start,
                stop,
                action_id: job.action_id.clone(),
                time_range: job.time_range,
            };

            let session = job.session.clone();
            let region = job.region;
            let mut next = job;
            next.last_notification_time = Some(stop);
            let handler = Box::new(RecoveryReplyHandler::new(next, start));

            debug!(
                "Requesting {} data for {} in region {} from {} to {}",
                request.kind, spid, region, start, stop
            );
            if !self
                .dispatch(self.next_invoke_id(), handler, OutboundRequest::Recovery(request))
                .await
            {
                self.retry_association_request(&session, region);
            }
            return;
        }
    }

    /// Acknowledge a batch and fetch the next one behind `action_id`
    pub async fn send_continuation_request(&self, job: RecoveryJob, action_id: String) {
        let Some(spid) = job.current_spid().map(str::to_string) else {
            error!(
                "Continuation {} for region {} has no provider, restarting walk position",
                action_id, job.region
            );
            self.send_recovery_request(job).await;
            return;
        };

        let request = OutboundRequest::Continuation {
            session_id: job.session.id(),
            region: job.region,
            spid,
            kind: job.kind,
            action_id: action_id.clone(),
        };
        let session = job.session.clone();
        let region = job.region;
        let handler = Box::new(ContinuationReplyHandler::new(job, action_id));

        if !self.dispatch(self.next_invoke_id(), handler, request).await {
            self.retry_association_request(&session, region);
        }
    }

    /// Stored lower bound for the job's provider, minus the recovery padding
    async fn load_last_notification_time(
        &self,
        job: &RecoveryJob,
        spid: &str,
    ) -> Option<DateTime<Utc>> {
        match self
            .inner
            .time_store
            .last_notification_time(job.kind, spid, job.region)
            .await
        {
            Ok(time) => time.map(|t| {
                t.checked_sub_signed(time_delta(self.inner.config.recovery_padding()))
                    .unwrap_or(t)
            }),
            Err(e) => {
                error!(
                    "Could not read last {} notification time for {} in region {}: {}",
                    job.kind, spid, job.region, e
                );
                None
            }
        }
    }

    /// Record the job's lower bound as recovered; failures are logged only
    pub(crate) async fn persist_last_notification_time(&self, job: &RecoveryJob) {
        let (Some(spid), Some(time)) = (job.current_spid(), job.last_notification_time) else {
            return;
        };
        if let Err(e) = self
            .inner
            .time_store
            .set_last_notification_time(job.kind, spid, job.region, time)
            .await
        {
            error!(
                "Could not store last {} notification time {} for {} in region {}: {}",
                job.kind, time, spid, job.region, e
            );
        }
    }
}
