//! Sessions and their per-region association state

pub mod watch;

pub use watch::{AssociationSubscription, AssociationWatch};

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};

use crate::types::{AssociationState, Region, REGION_COUNT};

/// Session id held by a session that has not completed a new-session exchange
pub const UNINITIALIZED_SESSION_ID: &str = "0";

/// One logical connection to the gateway on behalf of a primary SPID
///
/// The id changes every time the session is (re)established; retries capture
/// it at creation to detect that the session they were meant for is gone.
#[derive(Debug)]
pub struct Session {
    primary_spid: String,
    spids: [Arc<[String]>; REGION_COUNT],
    id: RwLock<String>,
    states: RwLock<[AssociationState; REGION_COUNT]>,
    watch: AssociationWatch,
}

impl Session {
    pub fn new(primary_spid: impl Into<String>) -> Self {
        Self {
            primary_spid: primary_spid.into(),
            spids: std::array::from_fn(|_| Arc::from(Vec::<String>::new())),
            id: RwLock::new(UNINITIALIZED_SESSION_ID.to_string()),
            states: RwLock::new([AssociationState::Down; REGION_COUNT]),
            watch: AssociationWatch::new(),
        }
    }

    /// Set the providers recovered for in `region`
    pub fn with_region_spids(mut self, region: Region, spids: Vec<String>) -> Self {
        self.spids[region.index()] = Arc::from(spids);
        self
    }

    pub fn primary_spid(&self) -> &str {
        &self.primary_spid
    }

    /// Providers recovered for in `region`, shared and immutable
    pub fn spids(&self, region: Region) -> Arc<[String]> {
        self.spids[region.index()].clone()
    }

    pub fn id(&self) -> String {
        self.id.read().clone()
    }

    pub fn set_id(&self, id: impl Into<String>) {
        let id = id.into();
        debug!("Session for {} now has id {}", self.primary_spid, id);
        *self.id.write() = id;
    }

    pub fn is_alive(&self) -> bool {
        *self.id.read() != UNINITIALIZED_SESSION_ID
    }

    pub fn association_state(&self, region: Region) -> AssociationState {
        self.states.read()[region.index()]
    }

    /// Record a new association state and cancel the region's subscriptions
    ///
    /// Every call counts as a change, including re-setting the current state.
    pub fn set_association_state(&self, region: Region, state: AssociationState) {
        let previous = {
            let mut states = self.states.write();
            std::mem::replace(&mut states[region.index()], state)
        };
        debug!(
            "Session {} region {} association {} -> {}",
            self.id(),
            region,
            previous,
            state
        );
        self.watch.notify(region, state);
    }

    /// Subscribe to association changes for `region`
    pub fn watch_association(&self, region: Region) -> AssociationSubscription {
        self.watch.subscribe(region)
    }

    pub fn watch(&self) -> &AssociationWatch {
        &self.watch
    }

    /// Forget the session id and take every region down
    pub fn reset(&self) {
        info!("Resetting session {} for {}", self.id(), self.primary_spid);
        *self.id.write() = UNINITIALIZED_SESSION_ID.to_string();
        for region in Region::all() {
            self.set_association_state(region, AssociationState::Down);
        }
    }
}
