use std::sync::Arc;
use std::time::Duration;

use crate::schema::SchemaProvider;
use crate::store::Store;
use crate::sync::{Request, Response, SyncHandler};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// One simulated remote connection
///
/// Owns a [`SyncHandler`] and the receiving end of its outbound channel.
pub struct TestConnection {
    handler: SyncHandler,
    outbound: flume::Receiver<Response>,
    store: Store,
}

impl TestConnection {
    pub fn new(store: Store, schema: Arc<dyn SchemaProvider>) -> Self {
        let (tx, outbound) = flume::unbounded();
        Self {
            handler: SyncHandler::new(store.clone(), schema, tx),
            outbound,
            store,
        }
    }

    pub fn handler(&self) -> &SyncHandler {
        &self.handler
    }

    /// Send a request and return the direct reply
    pub fn request(&self, request: Request) -> Option<Response> {
        self.handler.handle(request)
    }

    /// Send a sync or subscribe request and wait for its snapshot
    ///
    /// Snapshots are delivered on the outbound channel, so anything already
    ///  queued there should be drained first.
    pub fn snapshot(&self, request: Request) -> Option<Response> {
        match self.handler.handle(request) {
            Some(reply) => Some(reply),
            None => self.next(),
        }
    }

    /// Next outbound notification, waiting up to two seconds
    pub fn next(&self) -> Option<Response> {
        self.next_timeout(DEFAULT_TIMEOUT)
    }

    pub fn next_timeout(&self, timeout: Duration) -> Option<Response> {
        self.outbound.recv_timeout(timeout).ok()
    }

    /// Async flavour of [`TestConnection::next`]
    pub async fn recv(&self) -> Option<Response> {
        tokio::time::timeout(DEFAULT_TIMEOUT, self.outbound.recv_async())
            .await
            .ok()
            .and_then(Result::ok)
    }

    /// Every notification delivered so far
    ///
    /// Flushes the store's event loop first, so everything caused by
    ///  earlier requests is included.
    pub fn drain(&self) -> Vec<Response> {
        self.store.flush();
        self.outbound.drain().collect()
    }
}
