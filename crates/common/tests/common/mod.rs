//! Shared test utilities for sync integration tests
#![allow(dead_code)]

use ::common::prelude::*;
use ::common::testkit::TestServer;

pub const SCHEMA: &str = r#"
[[value]]
path = "test.bool"
kind = "bool"
access = "read_only"
default = true

[[value]]
path = "test.string"
kind = "text"
default = "x"

[[value]]
path = "dev.ports"
kind = "container"

[[value]]
path = "dev.vlans"
kind = "container"

[[value]]
path = "dev.name"
kind = "text"
default = "switch"

[[container]]
path = "dev.ports"

[[container.children]]
path = "x"
kind = "text"

[[container.children]]
path = "y"
kind = "time_val"

[[container]]
path = "dev.vlans"
"#;

/// Route test logs through `RUST_LOG` if set
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A seeded in-process server
pub fn setup_test_server() -> TestServer {
    init_tracing();
    let schema = MemorySchema::from_toml(SCHEMA).unwrap();
    TestServer::new(schema).unwrap()
}

/// Ids of every value change carried by `responses`, in delivery order
pub fn changed_ids(responses: &[Response]) -> Vec<String> {
    responses
        .iter()
        .flat_map(|r| r.changed())
        .map(|entry| entry.id.to_string())
        .collect()
}

pub fn removed_ids(responses: &[Response]) -> Vec<String> {
    responses
        .iter()
        .flat_map(|r| r.removed())
        .map(|entry| entry.id.to_string())
        .collect()
}

pub fn result_sets(responses: &[Response]) -> Vec<ResultSet> {
    responses.iter().flat_map(|r| r.results()).cloned().collect()
}
