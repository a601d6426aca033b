//! Replies received from and requests sent to the NPAC gateway
//!
//! The gateway transport owns the wire format. By the time a reply reaches
//! the core it has been reduced to a [`Reply`]: the handful of fields the
//! correlation and recovery logic reads, plus the opaque body that is
//! forwarded downstream untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{NpacError, NpacResult};
use crate::types::{RecoveryKind, RecoveryStyle, Region, ReplyStatus};

/// Error codes the gateway attaches to replies that must be re-queued
pub mod error_codes {
    pub const SESSION_INVALID: &str = "session-invalid";
    pub const ASSOCIATION_IN_RECOVERY: &str = "association-in-recovery";
    pub const REGION_NOT_ASSOCIATED: &str = "region-not-associated";
}

/// A decoded reply or error from the gateway
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Reply {
    pub session_id: Option<String>,
    pub region: Option<Region>,
    pub customer_id: Option<String>,
    /// Raw status value
    pub status: Option<String>,
    /// Continuation token returned when more data is waiting
    pub action_id: Option<String>,
    /// Upper bound of the data actually returned by a continuation reply
    pub stop_time: Option<DateTime<Utc>>,
    pub error_codes: Vec<String>,
    /// Opaque payload for downstream processing
    pub body: String,
}

impl Reply {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a JSON-framed reply
    pub fn from_json(input: &str) -> NpacResult<Self> {
        serde_json::from_str(input).map_err(|e| NpacError::MalformedReply(e.to_string()))
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }

    pub fn with_action_id(mut self, action_id: impl Into<String>) -> Self {
        self.action_id = Some(action_id.into());
        self
    }

    pub fn with_stop_time(mut self, stop_time: DateTime<Utc>) -> Self {
        self.stop_time = Some(stop_time);
        self
    }

    pub fn with_error_code(mut self, code: impl Into<String>) -> Self {
        self.error_codes.push(code.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Parsed status, `None` when the reply carried none
    pub fn status(&self) -> Option<ReplyStatus> {
        self.status
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(ReplyStatus::parse)
    }

    /// Continuation token, ignoring empty values
    pub fn action_id(&self) -> Option<&str> {
        self.action_id.as_deref().filter(|s| !s.is_empty())
    }

    pub fn has_error_code(&self, code: &str) -> bool {
        self.error_codes.iter().any(|c| c.eq_ignore_ascii_case(code))
    }

    /// Short description for log lines
    pub fn describe(&self) -> String {
        let mut out = self.status.clone().unwrap_or_else(|| "<no status>".to_string());
        if !self.error_codes.is_empty() {
            out.push_str(&format!(" [{}]", self.error_codes.join(", ")));
        }
        out
    }
}

/// A recovery request for one provider and one window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoveryRequest {
    pub session_id: String,
    pub region: Region,
    pub spid: String,
    pub kind: RecoveryKind,
    pub style: RecoveryStyle,
    pub start: DateTime<Utc>,
    pub stop: DateTime<Utc>,
    pub action_id: Option<String>,
    pub time_range: bool,
}

/// Requests the core asks the gateway to send
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum OutboundRequest {
    NewSession {
        primary_spid: String,
        user_id: String,
    },
    AssociationConnect {
        session_id: String,
        region: Region,
        primary_spid: String,
    },
    RecoveryComplete {
        session_id: String,
        region: Region,
        primary_spid: String,
    },
    Recovery(RecoveryRequest),
    /// Acknowledge a batch and fetch the next one for the same query
    Continuation {
        session_id: String,
        region: Region,
        spid: String,
        kind: RecoveryKind,
        action_id: String,
    },
    /// A message queued by a client, sent on its behalf
    Generic {
        session_id: String,
        spid: String,
        region: Option<Region>,
        body: String,
    },
}

impl OutboundRequest {
    pub fn name(&self) -> &'static str {
        match self {
            OutboundRequest::NewSession { .. } => "new-session",
            OutboundRequest::AssociationConnect { .. } => "association-connect",
            OutboundRequest::RecoveryComplete { .. } => "recovery-complete",
            OutboundRequest::Recovery(req) => match req.style {
                RecoveryStyle::Sequence => "sequence-recovery",
                RecoveryStyle::TimeRange => "time-range-recovery",
            },
            OutboundRequest::Continuation { .. } => "continuation",
            OutboundRequest::Generic { .. } => "generic",
        }
    }

    pub fn region(&self) -> Option<Region> {
        match self {
            OutboundRequest::NewSession { .. } => None,
            OutboundRequest::AssociationConnect { region, .. }
            | OutboundRequest::RecoveryComplete { region, .. }
            | OutboundRequest::Continuation { region, .. } => Some(*region),
            OutboundRequest::Recovery(req) => Some(req.region),
            OutboundRequest::Generic { region, .. } => *region,
        }
    }
}
