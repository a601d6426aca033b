//! Core protocol types shared by every component

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::errors::NpacError;

/// Number of NPAC regions
pub const REGION_COUNT: usize = 8;

/// Smallest recovery interval; a too-much-data reply at this size skips the provider
pub const MIN_RECOVERY_INTERVAL: Duration = Duration::from_millis(1000);

const REGION_LABELS: [&str; REGION_COUNT] = [
    "Midwest",
    "Mid-Atlantic",
    "Northeast",
    "Southeast",
    "Southwest",
    "Western",
    "West Coast",
    "Canada",
];

/// One of the fixed NPAC geographic regions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Region(u8);

impl Region {
    pub fn new(id: u8) -> Result<Self, NpacError> {
        if (id as usize) < REGION_COUNT {
            Ok(Region(id))
        } else {
            Err(NpacError::InvalidRegion(id))
        }
    }

    pub fn id(&self) -> u8 {
        self.0
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }

    pub fn label(&self) -> &'static str {
        REGION_LABELS[self.index()]
    }

    /// All regions in id order
    pub fn all() -> impl Iterator<Item = Region> {
        (0..REGION_COUNT as u8).map(Region)
    }
}

impl TryFrom<u8> for Region {
    type Error = NpacError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        Region::new(id)
    }
}

impl From<Region> for u8 {
    fn from(region: Region) -> u8 {
        region.0
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.label())
    }
}

/// Association lifecycle for one region of one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssociationState {
    Down,
    /// The session has no SPIDs for this region
    NotRequired,
    WaitingForReply,
    Retry,
    Recovering,
    Connected,
}

impl fmt::Display for AssociationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AssociationState::Down => "down",
            AssociationState::NotRequired => "not-required",
            AssociationState::WaitingForReply => "waiting-for-reply",
            AssociationState::Retry => "retry",
            AssociationState::Recovering => "recovering",
            AssociationState::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// Correlation id assigned to one outbound request
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvokeId(String);

impl InvokeId {
    pub fn new(id: impl Into<String>) -> Self {
        InvokeId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for InvokeId {
    fn from(s: &str) -> Self {
        InvokeId(s.to_string())
    }
}

impl From<String> for InvokeId {
    fn from(s: String) -> Self {
        InvokeId(s)
    }
}

impl fmt::Display for InvokeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Acknowledgement returned to the gateway for an inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AckCode {
    Ack,
    Nack,
}

/// Status carried by an NPAC reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyStatus {
    Success,
    NoDataSelected,
    MoreDataAvailable,
    CriteriaTooLarge,
    TimeRangeInvalid,
    Failed,
    Other(String),
}

impl ReplyStatus {
    /// Map a raw status value; matching is case-insensitive and accepts `_` for `-`
    pub fn parse(raw: &str) -> ReplyStatus {
        let normalized = raw.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "success" => ReplyStatus::Success,
            "no-data-selected" => ReplyStatus::NoDataSelected,
            "more-data-available" | "swim-more-data" => ReplyStatus::MoreDataAvailable,
            "criteria-too-large" => ReplyStatus::CriteriaTooLarge,
            "time-range-invalid" => ReplyStatus::TimeRangeInvalid,
            "failed" | "failure" => ReplyStatus::Failed,
            _ => ReplyStatus::Other(raw.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ReplyStatus::Success)
    }

    /// Too much data for the requested window
    pub fn is_volume_failure(&self) -> bool {
        matches!(self, ReplyStatus::CriteriaTooLarge | ReplyStatus::TimeRangeInvalid)
    }
}

/// What a recovery walk is downloading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecoveryKind {
    /// Service provider data download
    ServiceProviderData,
    /// Network data download
    NetworkData,
    /// Ordinary per-provider notification recovery
    Notifications,
}

impl RecoveryKind {
    /// Phase that follows this one in a region's walk, `None` after notifications
    pub fn next_phase(&self) -> Option<RecoveryKind> {
        match self {
            RecoveryKind::ServiceProviderData => Some(RecoveryKind::NetworkData),
            RecoveryKind::NetworkData => Some(RecoveryKind::Notifications),
            RecoveryKind::Notifications => None,
        }
    }
}

impl fmt::Display for RecoveryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecoveryKind::ServiceProviderData => "service-provider-data",
            RecoveryKind::NetworkData => "network-data",
            RecoveryKind::Notifications => "notifications",
        };
        f.write_str(s)
    }
}

/// How a region's recovery requests are framed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecoveryStyle {
    /// Sequence-based recovery with continuation tokens
    Sequence,
    /// Time-range recovery, one window per provider
    TimeRange,
}

/// Who solicited the reply registered under an invoke id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOrigin {
    /// An externally queued message sent on behalf of a client
    GenericAutoRequest,
    Other,
}

/// Status written back for an externally queued message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueStatus {
    Failure,
    Retry,
}
