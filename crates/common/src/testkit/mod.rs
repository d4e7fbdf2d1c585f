/// Lightweight harness for connection-level tests
///
/// Runs a store and any number of sync handlers in-process, with each
/// handler's outbound channel exposed for inspection.
///
/// # Example
///
/// ```rust,ignore
/// use common::prelude::*;
/// use common::testkit::TestServer;
///
/// #[test]
/// fn test_set_reaches_subscriber() {
///     let server = TestServer::new(MemorySchema::new()).unwrap();
///     server.store().set(&"a".into(), Value::text("x"), Origin::Local);
///
///     let alice = server.connect();
///     alice.snapshot(Request::Subscribe { ids: vec![] }).unwrap();
///
///     let bob = server.connect();
///     bob.request(Request::SetValue { id: "a".into(), value: "y".into() });
///
///     let seen = alice.drain();
///     assert_eq!(seen.len(), 1);
/// }
/// ```
mod connection;
mod server;

pub use connection::TestConnection;
pub use server::TestServer;
