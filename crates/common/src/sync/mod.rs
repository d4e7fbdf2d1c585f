//! Per-connection synchronization protocol
//!
//! Each remote connection gets one [`SyncHandler`]. It answers requests
//! against the store and forwards store events to the connection according
//! to its subscription [`Mode`]:
//!
//! - **Unsubscribed**: nothing is forwarded
//! - **Global**: every event
//! - **Discrete**: events for filtered values and anything below them;
//!   values appearing under a filtered ancestor are filtered on first sight
//!
//! Both subscribed modes forward additions, removals and container
//! structure notices. Container add/remove requests arrive inside
//! `ValueChanged` batches and are answered immediately on the outbound
//! channel, separately from the batch reply.

mod handler;
mod messages;
mod subscriptions;
mod wildcard;

pub use handler::SyncHandler;
pub use messages::{
    ChangeEntry, ItemResult, Message, RemovedEntry, Request, Response, ResultSet, Status,
    ValueEntry,
};
pub use subscriptions::Mode;
pub use wildcard::PathPattern;
