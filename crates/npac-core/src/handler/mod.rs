//! Notification handlers
//!
//! A handler is created for exactly one outbound request and consumed by
//! whichever of reply, error or timeout reaches it first:
//!
//! ```text
//!                    ┌──── receive_notification ──▶ run ────┐
//!   AwaitingReply ───┼──── receive_error ─────────────────── ┼──▶ Completed
//!                    └──── timeout ───────────────────────── ┘
//! ```
//!
//! `run`, `receive_error` and `timeout` take `self: Box<Self>`, so a handler
//! cannot be driven twice. They execute on the adapter's worker pool and
//! decide the next protocol step by calling back into [`NpacAdapter`].

pub mod association;
pub mod generic;
pub mod session;

pub use association::{AssociationReplyHandler, RecoveryCompleteReplyHandler};
pub use generic::GenericReplyHandler;
pub use session::NewSessionReplyHandler;

use async_trait::async_trait;
use std::fmt;

use crate::adapter::NpacAdapter;
use crate::message::Reply;
use crate::types::{AckCode, RequestOrigin};

/// Reply handler for one outstanding request
#[async_trait]
pub trait NotificationHandler: Send + Sync + fmt::Debug {
    /// Short name used in log lines
    fn name(&self) -> &'static str;

    fn origin(&self) -> RequestOrigin {
        RequestOrigin::Other
    }

    /// Accept a reply for later processing by [`run`](Self::run)
    ///
    /// Returns [`AckCode::Nack`] when the reply lacks fields this handler
    /// needs; the handler is then left pending.
    fn receive_notification(&mut self, reply: Reply) -> AckCode;

    /// Drive the next protocol step from the accepted reply
    async fn run(self: Box<Self>, adapter: &NpacAdapter);

    /// The gateway reported an error for this request
    async fn receive_error(self: Box<Self>, error: Reply, adapter: &NpacAdapter);

    /// No reply arrived in time
    async fn timeout(self: Box<Self>, adapter: &NpacAdapter);
}
