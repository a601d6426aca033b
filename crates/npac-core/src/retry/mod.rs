//! Delayed resends tied to a session generation
//!
//! Every "try again after a backoff" in the adapter is a [`RetryTask`]. The
//! task captures the session id when it is created; if the session has been
//! re-established by the time the delay elapses, the retry belongs to a dead
//! generation and is dropped.
//!
//! Association-scoped retries also hold an [`AssociationSubscription`]: any
//! change to the region's association before the retry fires aborts it, and
//! a scheduled retry is dropped from the pool as soon as that happens.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::adapter::NpacAdapter;
use crate::recovery::RecoveryJob;
use crate::session::{AssociationSubscription, Session};
use crate::types::Region;

/// What a retry does when it fires
#[derive(Debug, Clone)]
pub enum RetryAction {
    NewSession,
    AssociationConnect { region: Region },
    /// Resend a recovery request of either style
    Recovery(RecoveryJob),
    Continuation { job: RecoveryJob, action_id: String },
}

impl RetryAction {
    /// Region whose association scopes this action, if any
    pub fn region(&self) -> Option<Region> {
        match self {
            RetryAction::NewSession => None,
            RetryAction::AssociationConnect { region } => Some(*region),
            RetryAction::Recovery(job) | RetryAction::Continuation { job, .. } => Some(job.region),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RetryAction::NewSession => "retry-new-session",
            RetryAction::AssociationConnect { .. } => "retry-association-connect",
            RetryAction::Recovery(_) => "retry-recovery",
            RetryAction::Continuation { .. } => "retry-continuation",
        }
    }
}

/// A resend scheduled after a delay
#[derive(Debug)]
pub struct RetryTask {
    action: RetryAction,
    delay: Duration,
    session: Arc<Session>,
    captured_session_id: String,
    subscription: Option<AssociationSubscription>,
}

impl RetryTask {
    /// Capture the session id and, for association-scoped actions, subscribe
    pub fn new(action: RetryAction, delay: Duration, session: Arc<Session>) -> Self {
        let subscription = action.region().map(|region| session.watch_association(region));
        let captured_session_id = session.id();
        Self {
            action,
            delay,
            session,
            captured_session_id,
            subscription,
        }
    }

    pub fn action(&self) -> &RetryAction {
        &self.action
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn captured_session_id(&self) -> &str {
        &self.captured_session_id
    }

    pub fn is_aborted(&self) -> bool {
        self.subscription
            .as_ref()
            .map(|sub| sub.is_aborted())
            .unwrap_or(false)
    }

    /// Hand the task to the adapter's worker pool
    ///
    /// The delay is spent as a timer, not in a pool slot. An association
    /// change during the delay drops the task without waiting it out.
    pub fn schedule(self, adapter: &NpacAdapter) {
        let name = self.action.name();
        let delay = self.delay;
        let abort = self.subscription.as_ref().map(|sub| sub.abort_token());
        let owner = adapter.clone();

        debug!(
            "Scheduling {} in {:?} for session {}",
            name, delay, self.captured_session_id
        );
        let task = async move {
            self.fire(&owner).await;
        };
        let spawned = match abort {
            Some(abort) => adapter.pool().spawn_after_unless(name, delay, abort, task),
            None => adapter.pool().spawn_after(name, delay, task),
        };
        if let Err(e) = spawned {
            warn!("Could not schedule {}: {}", name, e);
        }
    }

    /// Dispatch the action unless it has gone stale
    ///
    /// Returns whether the action was dispatched.
    pub async fn fire(mut self, adapter: &NpacAdapter) -> bool {
        let aborted = self.is_aborted();
        self.subscription = None;
        if aborted {
            debug!(
                "{} aborted by association change for session {}",
                self.action.name(),
                self.captured_session_id
            );
            return false;
        }

        let current = self.session.id();
        if current != self.captured_session_id {
            info!(
                "Dropping {}: session {} was replaced by {}",
                self.action.name(),
                self.captured_session_id,
                current
            );
            return false;
        }

        match self.action {
            RetryAction::NewSession => adapter.send_new_session(&self.session).await,
            RetryAction::AssociationConnect { region } => {
                adapter.send_association_connect(&self.session, region).await
            }
            RetryAction::Recovery(job) => adapter.send_recovery_request(job).await,
            RetryAction::Continuation { job, action_id } => {
                adapter.send_continuation_request(job, action_id).await
            }
        }
        true
    }
}
