/**
 * Dot-separated node names and their
 *  normalization rules.
 */
pub mod path;
/**
 * Declared shape of the tree.
 *  - Seed values loaded from TOML
 *  - Descendants of new container keys
 */
pub mod schema;
/**
 * The hierarchical value store.
 * Owns the node arena and the token map,
 *  and broadcasts every mutation as one of
 *  five signals on a single event thread.
 */
pub mod store;
/**
 * Per-connection request handling and
 *  subscription filtering on top of the store.
 */
pub mod sync;
/**
 * In-process servers and connections
 *  for integration tests.
 */
pub mod testkit;
/**
 * Compact wire identifiers for paths.
 */
pub mod token;
/**
 * Typed, validated node payloads.
 */
pub mod value;

pub mod prelude {
    pub use crate::path::Path;
    pub use crate::schema::{MemorySchema, SchemaError, SchemaProvider};
    pub use crate::store::{
        DispatchedStore, EventLoop, Node, Signal, Store, StoreError, StoreEvent, Subscription,
        Topic, ValueEntry,
    };
    pub use crate::sync::{
        ChangeEntry, ItemResult, Message, Mode, RemovedEntry, Request, Response, ResultSet,
        Status, SyncHandler,
    };
    pub use crate::token::Token;
    pub use crate::value::{Access, FromValue, Kind, Origin, SetResult, Value};
}
