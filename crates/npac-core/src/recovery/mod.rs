//! Per-region recovery walk
//!
//! After an association comes up, the region's data is recovered provider
//! by provider, in three phases:
//!
//! ```text
//!   ServiceProviderData ──▶ NetworkData ──▶ Notifications ──▶ recovery-complete
//!        [P1, P2, ...]        [P1, P2, ...]     [P1, P2, ...]
//! ```
//!
//! Each provider is queried over `[last notification time, window end]` in
//! slices of `interval`. The [`RecoveryJob`] carries that position from one
//! reply to the next request; [`RecoveryReplyHandler`] applies the
//! transition table to each reply; [`ContinuationReplyHandler`] handles the
//! fetch-next-batch exchange.
//!
//! Only one recovery request per region is ever outstanding: the next one is
//! sent from the handler of the current one.

pub mod continuation;
pub mod handler;

pub use continuation::ContinuationReplyHandler;
pub use handler::RecoveryReplyHandler;

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::session::Session;
use crate::types::{RecoveryKind, RecoveryStyle, Region, ReplyStatus, MIN_RECOVERY_INTERVAL};

/// Extra rollback applied on top of the interval when subdividing a window
pub const ROLLBACK_PADDING: Duration = Duration::from_millis(1000);

/// Convert for date arithmetic, saturating on absurd values
pub(crate) fn time_delta(duration: Duration) -> TimeDelta {
    let ms = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX / 1_000_000);
    TimeDelta::try_milliseconds(ms).unwrap_or(TimeDelta::MAX)
}

/// Position of a region's recovery walk
#[derive(Debug, Clone)]
pub struct RecoveryJob {
    pub session: Arc<Session>,
    pub region: Region,
    pub kind: RecoveryKind,
    pub style: RecoveryStyle,
    /// Providers for this region, shared for the whole walk
    pub spids: Arc<[String]>,
    pub index: usize,
    /// Recovery complete time; nothing past it is requested
    pub window_end: DateTime<Utc>,
    /// Moving lower bound; `None` means "load from the time store"
    pub last_notification_time: Option<DateTime<Utc>>,
    /// Current slice length, never below [`MIN_RECOVERY_INTERVAL`]
    pub interval: Duration,
    /// Continuation token to echo on the next request
    pub action_id: Option<String>,
    /// The walk is following a token within the same provider
    pub time_range: bool,
}

impl RecoveryJob {
    /// Start a phase at the first provider of `region`
    pub fn new(
        session: Arc<Session>,
        region: Region,
        kind: RecoveryKind,
        style: RecoveryStyle,
        window_end: DateTime<Utc>,
        interval: Duration,
    ) -> Self {
        let spids = session.spids(region);
        Self {
            session,
            region,
            kind,
            style,
            spids,
            index: 0,
            window_end,
            last_notification_time: None,
            interval: interval.max(MIN_RECOVERY_INTERVAL),
            action_id: None,
            time_range: false,
        }
    }

    pub fn current_spid(&self) -> Option<&str> {
        self.spids.get(self.index).map(String::as_str)
    }

    /// Every provider of this phase has been walked
    pub fn is_exhausted(&self) -> bool {
        self.index >= self.spids.len()
    }

    /// Move to the next provider with a fresh window
    pub fn next_provider(mut self, interval: Duration) -> Self {
        self.index += 1;
        self.last_notification_time = None;
        self.interval = interval.max(MIN_RECOVERY_INTERVAL);
        self.action_id = None;
        self.time_range = false;
        self
    }

    /// First provider of the following phase, `None` once notifications are done
    pub fn next_phase(self, interval: Duration) -> Option<Self> {
        let kind = self.kind.next_phase()?;
        Some(Self {
            kind,
            index: 0,
            last_notification_time: None,
            interval: interval.max(MIN_RECOVERY_INTERVAL),
            action_id: None,
            time_range: false,
            ..self
        })
    }

    /// Shrink the window after a too-much-data reply
    ///
    /// Rolls the lower bound back by `interval + 1s` and halves the interval.
    /// Returns `false`, leaving the job untouched, once the interval is at
    /// its floor.
    pub fn subdivide(&mut self) -> bool {
        if self.interval <= MIN_RECOVERY_INTERVAL {
            return false;
        }
        if let Some(lnt) = self.last_notification_time {
            let rollback = time_delta(self.interval + ROLLBACK_PADDING);
            self.last_notification_time = Some(lnt.checked_sub_signed(rollback).unwrap_or(lnt));
        }
        self.interval = (self.interval / 2).max(MIN_RECOVERY_INTERVAL);
        self.action_id = None;
        true
    }

    /// Upper bound of the slice that starts at `start`
    pub fn window_stop(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        start
            .checked_add_signed(time_delta(self.interval))
            .map_or(self.window_end, |stop| stop.min(self.window_end))
    }

    /// `start` has reached the window end, compared at second precision
    pub fn is_caught_up(&self, start: DateTime<Utc>) -> bool {
        start.timestamp() >= self.window_end.timestamp()
    }
}

/// What a recovery reply asks the walk to do next
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RecoveryStep {
    /// Success or no data: persist progress and move on
    Completed { forward: bool, token: Option<String> },
    /// More data waits behind `token` for the same provider
    MoreData { token: String },
    /// Query too large for one reply
    TooMuchData,
    Failed,
}

/// Apply the transition table to a reply status
pub(crate) fn classify(
    style: RecoveryStyle,
    status: Option<&ReplyStatus>,
    token: Option<&str>,
) -> RecoveryStep {
    let token = match style {
        RecoveryStyle::Sequence => token.map(str::to_string),
        RecoveryStyle::TimeRange => None,
    };

    match status {
        Some(ReplyStatus::Success) => RecoveryStep::Completed {
            forward: true,
            token,
        },
        Some(ReplyStatus::NoDataSelected) => RecoveryStep::Completed {
            forward: false,
            token,
        },
        Some(ReplyStatus::MoreDataAvailable) => match token {
            Some(token) => RecoveryStep::MoreData { token },
            None => RecoveryStep::Failed,
        },
        Some(status) if status.is_volume_failure() => RecoveryStep::TooMuchData,
        _ => RecoveryStep::Failed,
    }
}
