//! # NPAC Adapter Core
//!
//! The correlation and recovery engine between a number-portability gateway
//! and the NPAC. It:
//!
//! - matches every inbound reply to the handler waiting on its invoke id
//!   ([`registry`]), with a one-shot timeout per request,
//! - keeps one association per region alive for each session, retrying with
//!   backoff and dropping retries that belong to a replaced session
//!   ([`retry`], [`session`]),
//! - walks each region's providers after an association comes up, halving
//!   the query window when a reply would be too large and following
//!   continuation tokens when more data waits ([`recovery`]).
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use npac_core::prelude::*;
//! # async fn run(
//! #     gateway: Arc<dyn GatewayClient>,
//! #     processor: Arc<dyn ReplyProcessor>,
//! #     queue: Arc<dyn QueueStatusStore>,
//! # ) -> NpacResult<()> {
//! let adapter = NpacAdapter::builder(AdapterConfig::default())
//!     .gateway(gateway)
//!     .processor(processor)
//!     .queue_store(queue)
//!     .build()?;
//!
//! let southeast = Region::new(3)?;
//! adapter.add_session(Session::new("1234").with_region_spids(southeast, vec!["5678".into()]));
//! adapter.initialize().await;
//!
//! // Transport delivers replies as they arrive:
//! let ack = adapter.handle_notification(&InvokeId::from("NPAC-1"), Reply::new().with_status("success"));
//! # let _ = ack;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod collaborators;
pub mod config;
pub mod errors;
pub mod handler;
pub mod message;
pub mod recovery;
pub mod registry;
pub mod retry;
pub mod session;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use adapter::{NpacAdapter, NpacAdapterBuilder};
pub use errors::{NpacError, NpacResult};

pub mod prelude {
    pub use crate::adapter::{NpacAdapter, NpacAdapterBuilder};
    pub use crate::collaborators::{
        GatewayClient, InMemoryTimeStore, NotificationTimeStore, QueueStatusStore, ReplyProcessor,
    };
    pub use crate::config::AdapterConfig;
    pub use crate::errors::{NpacError, NpacResult};
    pub use crate::handler::NotificationHandler;
    pub use crate::message::{OutboundRequest, RecoveryRequest, Reply};
    pub use crate::recovery::RecoveryJob;
    pub use crate::retry::{RetryAction, RetryTask};
    pub use crate::session::{AssociationSubscription, Session};
    pub use crate::types::{
        AckCode, AssociationState, InvokeId, QueueStatus, RecoveryKind, RecoveryStyle, Region,
        ReplyStatus, RequestOrigin,
    };
}
