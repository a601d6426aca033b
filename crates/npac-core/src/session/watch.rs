//! Association-state cancellation tokens
//!
//! Handlers and retries that only make sense while a region's association
//! stays put take an [`AssociationSubscription`] when they are created. Any
//! state change for that region cancels every live subscription for it;
//! dropping a subscription unsubscribes.
//!
//! ```text
//!   set_association_state(R, s) ──▶ notify(R) ──▶ cancel tokens for R
//!                                                      │
//!   RecoveryReplyHandler::run ─── is_aborted()? ◀──────┤
//!   RetryTask (sleeping)     ─── abort_token()     ◀───┘
//! ```

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::trace;

use crate::types::{AssociationState, Region};

#[derive(Default)]
struct WatchInner {
    next_id: AtomicU64,
    entries: Mutex<HashMap<u64, (Region, CancellationToken)>>,
}

/// Per-session registry of association subscriptions
#[derive(Clone, Default)]
pub struct AssociationWatch {
    inner: Arc<WatchInner>,
}

impl std::fmt::Debug for AssociationWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssociationWatch")
            .field("subscriptions", &self.inner.entries.lock().len())
            .finish()
    }
}

impl AssociationWatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to state changes for `region`
    pub fn subscribe(&self, region: Region) -> AssociationSubscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        self.inner.entries.lock().insert(id, (region, token.clone()));

        AssociationSubscription {
            id,
            region,
            token,
            watch: self.inner.clone(),
        }
    }

    /// Cancel and drop every subscription for `region`
    ///
    /// Returns how many subscriptions were cancelled.
    pub fn notify(&self, region: Region, state: AssociationState) -> usize {
        let cancelled: Vec<CancellationToken> = {
            let mut entries = self.inner.entries.lock();
            let ids: Vec<u64> = entries
                .iter()
                .filter(|(_, (r, _))| *r == region)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| entries.remove(&id).map(|(_, token)| token))
                .collect()
        };

        for token in &cancelled {
            token.cancel();
        }

        if !cancelled.is_empty() {
            trace!(
                "Association for region {} changed to {}, cancelled {} subscriptions",
                region,
                state,
                cancelled.len()
            );
        }
        cancelled.len()
    }

    pub fn subscriber_count(&self, region: Region) -> usize {
        self.inner
            .entries
            .lock()
            .values()
            .filter(|(r, _)| *r == region)
            .count()
    }
}

/// A live interest in one region's association state
///
/// Unsubscribes on drop.
pub struct AssociationSubscription {
    id: u64,
    region: Region,
    token: CancellationToken,
    watch: Arc<WatchInner>,
}

impl AssociationSubscription {
    pub fn region(&self) -> Region {
        self.region
    }

    /// Whether the region's association changed since subscribing
    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves when the region's association changes
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// Owned token cancelled together with this subscription
    pub fn abort_token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl std::fmt::Debug for AssociationSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssociationSubscription")
            .field("region", &self.region.id())
            .field("aborted", &self.is_aborted())
            .finish()
    }
}

impl Drop for AssociationSubscription {
    fn drop(&mut self) {
        self.watch.entries.lock().remove(&self.id);
    }
}
