//! Interfaces to the systems the core drives but does not own
//!
//! | Trait                    | Used for                                        |
//! |--------------------------|-------------------------------------------------|
//! | [`GatewayClient`]        | sending every outbound request                  |
//! | [`ReplyProcessor`]       | forwarding replies to downstream processing     |
//! | [`NotificationTimeStore`]| last notification time per kind/SPID/region     |
//! | [`QueueStatusStore`]     | bookkeeping for externally queued messages      |

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::errors::NpacResult;
use crate::message::{OutboundRequest, Reply};
use crate::types::{AckCode, InvokeId, QueueStatus, RecoveryKind, Region};

/// Transport to the NPAC gateway
#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// Send `request` under `invoke_id`
    ///
    /// `Ok(AckCode::Nack)` and `Err(_)` are both treated as "not sent".
    async fn send(&self, invoke_id: &InvokeId, request: &OutboundRequest) -> NpacResult<AckCode>;
}

/// Downstream consumer of accepted replies
#[async_trait]
pub trait ReplyProcessor: Send + Sync {
    async fn process(&self, reply: &Reply) -> NpacResult<()>;
}

/// Persistence for the lower bound of each recovery walk
#[async_trait]
pub trait NotificationTimeStore: Send + Sync {
    async fn last_notification_time(
        &self,
        kind: RecoveryKind,
        spid: &str,
        region: Region,
    ) -> NpacResult<Option<DateTime<Utc>>>;

    async fn set_last_notification_time(
        &self,
        kind: RecoveryKind,
        spid: &str,
        region: Region,
        time: DateTime<Utc>,
    ) -> NpacResult<()>;
}

/// Status bookkeeping for messages queued by clients
#[async_trait]
pub trait QueueStatusStore: Send + Sync {
    async fn delete_on_success(&self, message_key: &str) -> NpacResult<()>;

    async fn update_status(
        &self,
        message_key: &str,
        status: QueueStatus,
        reason: Option<&str>,
    ) -> NpacResult<()>;
}

/// Process-local [`NotificationTimeStore`]
///
/// Suitable for tests and for deployments that reseed times on startup.
#[derive(Debug, Default)]
pub struct InMemoryTimeStore {
    times: DashMap<(RecoveryKind, String, Region), DateTime<Utc>>,
}

impl InMemoryTimeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a time without going through the async trait
    pub fn seed(&self, kind: RecoveryKind, spid: &str, region: Region, time: DateTime<Utc>) {
        self.times.insert((kind, spid.to_string(), region), time);
    }

    pub fn get(&self, kind: RecoveryKind, spid: &str, region: Region) -> Option<DateTime<Utc>> {
        self.times
            .get(&(kind, spid.to_string(), region))
            .map(|t| *t.value())
    }
}

#[async_trait]
impl NotificationTimeStore for InMemoryTimeStore {
    async fn last_notification_time(
        &self,
        kind: RecoveryKind,
        spid: &str,
        region: Region,
    ) -> NpacResult<Option<DateTime<Utc>>> {
        Ok(self.get(kind, spid, region))
    }

    async fn set_last_notification_time(
        &self,
        kind: RecoveryKind,
        spid: &str,
        region: Region,
        time: DateTime<Utc>,
    ) -> NpacResult<()> {
        self.seed(kind, spid, region, time);
        Ok(())
    }
}
