//! Pending-reply registry
//!
//! Maps the invoke id of every outstanding request to the handler waiting
//! for its reply and the timer guarding it.
//!
//! ```text
//!                      register(id, handler, timeout)
//!                                   │
//!                                   ▼
//!                  ┌─────────────────────────────────┐
//!   reply ───────▶ │ DashMap<InvokeId, PendingReply> │ ◀─────── timer expiry
//!   remove/cancel  └─────────────────────────────────┘   remove_if(serial)
//!                                   │
//!                     exactly one caller gets the handler
//! ```
//!
//! Removal is the single arbitration point between the reply path and the
//! timeout path: whichever removes the entry first owns the handler, the
//! other finds nothing.

pub mod timer;

pub use timer::TimeoutTimer;

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::adapter::WeakAdapter;
use crate::handler::NotificationHandler;
use crate::message::Reply;
use crate::types::{AckCode, InvokeId, RequestOrigin};

/// A handler waiting for its reply, plus the timer that guards it
pub(crate) struct PendingReply {
    pub(crate) handler: Box<dyn NotificationHandler>,
    pub(crate) timer: TimeoutTimer,
}

/// Outcome of handing a reply to the registry
pub enum Delivery {
    /// The handler accepted the reply and was taken out of the registry
    Accepted(Box<dyn NotificationHandler>),
    /// The handler rejected the reply and stays pending under its original timer
    Rejected(&'static str),
    Missing,
}

/// Registry of outstanding requests keyed by invoke id
pub struct PendingReplies {
    entries: Arc<DashMap<InvokeId, PendingReply>>,
    next_serial: AtomicU64,
    adapter: WeakAdapter,
}

impl std::fmt::Debug for PendingReplies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingReplies")
            .field("pending", &self.entries.len())
            .finish()
    }
}

impl PendingReplies {
    pub(crate) fn new(adapter: WeakAdapter) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            next_serial: AtomicU64::new(0),
            adapter,
        }
    }

    /// Store `handler` under `invoke_id` and arm its timeout
    ///
    /// Ids are expected to be unique; an existing entry is replaced and its
    /// timer cancelled.
    pub fn register(
        &self,
        invoke_id: InvokeId,
        handler: Box<dyn NotificationHandler>,
        timeout: Duration,
    ) {
        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
        let timer = TimeoutTimer::new(serial);
        let name = handler.name();

        // Insert before arming so a zero timeout still finds the entry.
        let previous = self.entries.insert(
            invoke_id.clone(),
            PendingReply {
                handler,
                timer: timer.clone(),
            },
        );
        if let Some(previous) = previous {
            previous.timer.cancel();
            warn!(
                "Replaced pending {} handler for invoke id {}",
                previous.handler.name(),
                invoke_id
            );
        }

        timer.start(
            invoke_id.clone(),
            timeout,
            Arc::downgrade(&self.entries),
            self.adapter.clone(),
        );

        debug!("Registered {} handler for invoke id {} (timeout {:?})", name, invoke_id, timeout);
    }

    pub fn exists(&self, invoke_id: &InvokeId) -> bool {
        self.entries.contains_key(invoke_id)
    }

    /// Who solicited the reply expected under `invoke_id`
    pub fn classify(&self, invoke_id: &InvokeId) -> RequestOrigin {
        self.entries
            .get(invoke_id)
            .map(|entry| entry.handler.origin())
            .unwrap_or(RequestOrigin::Other)
    }

    /// Offer `reply` to the handler pending under `invoke_id`
    ///
    /// The handler is taken only if it accepts the reply. A rejected reply
    /// leaves the entry and its timer exactly as they were. An accepted
    /// handler's timer stays armed and later finds the entry gone.
    pub fn deliver(&self, invoke_id: &InvokeId, reply: Reply) -> Delivery {
        let mut rejected_by = None;
        let taken = self.entries.remove_if_mut(invoke_id, |_, pending| {
            if pending.handler.receive_notification(reply) == AckCode::Ack {
                true
            } else {
                rejected_by = Some(pending.handler.name());
                false
            }
        });

        match (taken, rejected_by) {
            (Some((_, pending)), _) => Delivery::Accepted(pending.handler),
            (None, Some(name)) => Delivery::Rejected(name),
            (None, None) => Delivery::Missing,
        }
    }

    /// Take the handler, leaving its timer armed
    ///
    /// The timer later finds the entry gone and does nothing.
    pub fn remove(&self, invoke_id: &InvokeId) -> Option<Box<dyn NotificationHandler>> {
        self.entries.remove(invoke_id).map(|(_, pending)| pending.handler)
    }

    /// Take the handler and stop its timer
    pub fn cancel(&self, invoke_id: &InvokeId) -> Option<Box<dyn NotificationHandler>> {
        self.entries.remove(invoke_id).map(|(_, pending)| {
            pending.timer.cancel();
            pending.handler
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every pending handler and stop every timer
    pub fn clear(&self) {
        let ids: Vec<InvokeId> = self.entries.iter().map(|e| e.key().clone()).collect();
        let mut dropped = 0;
        for id in ids {
            if self.cancel(&id).is_some() {
                dropped += 1;
            }
        }
        if dropped > 0 {
            debug!("Dropped {} pending replies", dropped);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdapterConfig;
    use crate::message::Reply;
    use crate::testing::{test_adapter, Counters};
    use crate::types::AckCode;

    fn id(s: &str) -> InvokeId {
        InvokeId::from(s)
    }

    #[tokio::test]
    async fn test_register_exists_and_classify() {
        let (adapter, _mocks) = test_adapter(AdapterConfig::default());
        let registry = adapter.pending_replies();
        let counters = Counters::default();

        registry.register(id("G-1"), counters.handler(RequestOrigin::GenericAutoRequest), Duration::from_secs(60));
        registry.register(id("R-1"), counters.handler(RequestOrigin::Other), Duration::from_secs(60));

        assert!(registry.exists(&id("G-1")));
        assert_eq!(registry.classify(&id("G-1")), RequestOrigin::GenericAutoRequest);
        assert_eq!(registry.classify(&id("R-1")), RequestOrigin::Other);
        assert_eq!(registry.classify(&id("missing")), RequestOrigin::Other);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_remove_and_cancel_are_at_most_once() {
        let (adapter, _mocks) = test_adapter(AdapterConfig::default());
        let registry = adapter.pending_replies();
        let counters = Counters::default();

        registry.register(id("A"), counters.handler(RequestOrigin::Other), Duration::from_secs(60));
        assert!(registry.remove(&id("A")).is_some());
        assert!(registry.remove(&id("A")).is_none());
        assert!(registry.cancel(&id("A")).is_none());

        registry.register(id("B"), counters.handler(RequestOrigin::Other), Duration::from_secs(60));
        assert!(registry.cancel(&id("B")).is_some());
        assert!(registry.remove(&id("B")).is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_remove_and_cancel_yield_one_handler() {
        let (adapter, _mocks) = test_adapter(AdapterConfig::default());
        let counters = Counters::default();

        for round in 0..200 {
            let key = id(&format!("race-{}", round));
            adapter
                .pending_replies()
                .register(key.clone(), counters.handler(RequestOrigin::Other), Duration::from_secs(60));

            let (a, b) = (adapter.clone(), adapter.clone());
            let (k1, k2) = (key.clone(), key.clone());
            let removed = tokio::spawn(async move { a.pending_replies().remove(&k1).is_some() });
            let cancelled = tokio::spawn(async move { b.pending_replies().cancel(&k2).is_some() });

            let hits = [removed.await.unwrap(), cancelled.await.unwrap()]
                .iter()
                .filter(|hit| **hit)
                .count();
            assert_eq!(hits, 1, "round {}", round);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fires_exactly_once() {
        let (adapter, _mocks) = test_adapter(AdapterConfig::default());
        let counters = Counters::default();

        adapter
            .pending_replies()
            .register(id("T-1"), counters.handler(RequestOrigin::Other), Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(counters.timeouts(), 0);
        assert!(adapter.notification_handler_exists(&id("T-1")));

        tokio::time::sleep(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;
        assert_eq!(counters.timeouts(), 1);
        assert!(!adapter.notification_handler_exists(&id("T-1")));

        // A late reply finds nothing
        assert_eq!(adapter.handle_notification(&id("T-1"), Reply::new()), AckCode::Nack);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(counters.timeouts(), 1);
        assert_eq!(counters.runs(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_before_timeout_suppresses_timeout() {
        let (adapter, _mocks) = test_adapter(AdapterConfig::default());
        let counters = Counters::default();

        adapter
            .pending_replies()
            .register(id("T-2"), counters.handler(RequestOrigin::Other), Duration::from_secs(30));
        assert_eq!(adapter.handle_notification(&id("T-2"), Reply::new()), AckCode::Ack);

        tokio::time::sleep(Duration::from_secs(31)).await;
        tokio::task::yield_now().await;
        assert_eq!(counters.runs(), 1);
        assert_eq!(counters.timeouts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_timer_does_not_evict_new_registration() {
        let (adapter, _mocks) = test_adapter(AdapterConfig::default());
        let registry = adapter.pending_replies();
        let first = Counters::default();
        let second = Counters::default();

        registry.register(id("T-3"), first.handler(RequestOrigin::Other), Duration::from_secs(10));
        // remove leaves the first timer armed
        assert!(registry.remove(&id("T-3")).is_some());
        registry.register(id("T-3"), second.handler(RequestOrigin::Other), Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(11)).await;
        tokio::task::yield_now().await;
        assert!(registry.exists(&id("T-3")));
        assert_eq!(first.timeouts() + second.timeouts(), 0);
    }

    #[tokio::test]
    async fn test_clear_drops_everything() {
        let (adapter, _mocks) = test_adapter(AdapterConfig::default());
        let counters = Counters::default();
        for n in 0..5 {
            adapter.pending_replies().register(
                id(&format!("C-{}", n)),
                counters.handler(RequestOrigin::Other),
                Duration::from_secs(60),
            );
        }
        adapter.pending_replies().clear();
        assert!(adapter.pending_replies().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_delivery_keeps_original_deadline() {
        let (adapter, _mocks) = test_adapter(AdapterConfig::default());
        let registry = adapter.pending_replies();
        let counters = Counters::default();

        registry.register(id("N-1"), counters.rejecting_handler(), Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(matches!(
            registry.deliver(&id("N-1"), Reply::new()),
            Delivery::Rejected("counting")
        ));
        assert!(registry.exists(&id("N-1")));

        // Still expires 30s after registration, not 30s after the rejection
        tokio::time::sleep(Duration::from_secs(11)).await;
        tokio::task::yield_now().await;
        assert_eq!(counters.timeouts(), 1);
        assert!(!registry.exists(&id("N-1")));
        assert!(matches!(
            registry.deliver(&id("N-1"), Reply::new()),
            Delivery::Missing
        ));
    }

    #[tokio::test]
    async fn test_accepted_delivery_takes_handler() {
        let (adapter, _mocks) = test_adapter(AdapterConfig::default());
        let registry = adapter.pending_replies();
        let counters = Counters::default();

        registry.register(id("D-1"), counters.handler(RequestOrigin::Other), Duration::from_secs(60));
        assert!(matches!(
            registry.deliver(&id("D-1"), Reply::new()),
            Delivery::Accepted(_)
        ));
        assert!(registry.is_empty());
    }
}
