//! Per-request reply timeouts
//!
//! Each registry entry owns one [`TimeoutTimer`]. The expiry task only holds
//! weak references to the registry and the adapter, so a pending timer never
//! keeps either of them alive.

use std::sync::Weak;
use std::time::Duration;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::adapter::{NpacAdapter, WeakAdapter};
use crate::registry::PendingReply;
use crate::types::InvokeId;

/// One-shot reply timeout for a single pending invocation
///
/// The serial ties the timer to the registry entry it was armed for, so a
/// timer left running by [`PendingReplies::remove`](super::PendingReplies::remove)
/// can never evict a later entry registered under the same id.
/// Clones share the same cancellation state.
#[derive(Debug, Clone)]
pub struct TimeoutTimer {
    serial: u64,
    cancel_token: CancellationToken,
}

impl TimeoutTimer {
    pub(crate) fn new(serial: u64) -> Self {
        Self {
            serial,
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Stop the timer; a timer that has already fired is unaffected
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Spawn the expiry task
    ///
    /// On expiry the entry is removed only if it still belongs to this timer,
    /// then the handler's timeout is handed to the adapter's worker pool.
    pub(crate) fn start(
        &self,
        invoke_id: InvokeId,
        timeout: Duration,
        entries: Weak<DashMap<InvokeId, PendingReply>>,
        adapter: WeakAdapter,
    ) {
        let serial = self.serial;
        let cancel_token = self.cancel_token.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    trace!("Timeout timer for {} cancelled", invoke_id);
                }
                _ = tokio::time::sleep(timeout) => {
                    let Some(entries) = entries.upgrade() else {
                        return;
                    };
                    let expired = entries
                        .remove_if(&invoke_id, |_, pending| pending.timer.serial == serial)
                        .map(|(_, pending)| pending.handler);

                    let Some(handler) = expired else {
                        trace!("Timeout for {} found no pending reply", invoke_id);
                        return;
                    };
                    let Some(inner) = adapter.upgrade() else {
                        return;
                    };

                    debug!("No reply for {} within {:?}", invoke_id, timeout);
                    NpacAdapter::from_inner(inner).dispatch_timeout(invoke_id, handler);
                }
            }
        });
    }
}
