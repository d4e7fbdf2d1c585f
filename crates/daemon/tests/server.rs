//! End-to-end tests of the sync server over a real TCP socket

use std::time::Duration;

use tokio::io::BufReader;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::watch;

use common::prelude::*;
use statetree_daemon::codec::{read_frame, write_frame};
use statetree_daemon::{Server, ServiceState};

const TIMEOUT: Duration = Duration::from_secs(2);

fn test_schema() -> MemorySchema {
    MemorySchema::new()
        .with_value("test.bool", Value::boolean(true).read_only())
        .with_value("test.string", Value::text("x"))
}

struct Client {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(addr: std::net::SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    async fn send(&mut self, request: Request) {
        write_frame(&mut self.writer, &request).await.unwrap();
    }

    async fn next(&mut self) -> Option<Response> {
        tokio::time::timeout(TIMEOUT, read_frame(&mut self.reader))
            .await
            .expect("timed out waiting for a frame")
            .unwrap()
    }

    async fn take(&mut self, count: usize) -> Vec<Response> {
        let mut responses = Vec::new();
        for _ in 0..count {
            responses.push(self.next().await.expect("connection closed"));
        }
        responses
    }
}

async fn start() -> (ServiceState, std::net::SocketAddr, watch::Sender<()>, tokio::task::JoinHandle<()>) {
    let state = ServiceState::new(test_schema()).unwrap();
    let server = Server::bind("127.0.0.1:0".parse().unwrap(), state.clone())
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let handle = tokio::spawn(async move {
        server.serve(shutdown_rx).await.unwrap();
    });
    (state, addr, shutdown_tx, handle)
}

fn changed_ids(responses: &[Response]) -> Vec<String> {
    responses
        .iter()
        .flat_map(|r| r.changed())
        .map(|entry| entry.id.to_string())
        .collect()
}

#[tokio::test]
async fn test_subscribe_set_and_delete() {
    let (state, addr, shutdown_tx, handle) = start().await;
    let mut client = Client::connect(addr).await;

    client.send(Request::Subscribe { ids: Vec::new() }).await;
    let reply = client.next().await.unwrap();
    let result = reply.results().next().unwrap();
    assert_eq!(result.status, Status::Success);
    let ids: Vec<String> = result.values.iter().map(|e| e.id.to_string()).collect();
    assert!(ids.contains(&"test.bool".to_string()));
    assert!(ids.contains(&"test.string".to_string()));
    let token = result
        .values
        .iter()
        .find(|e| e.id.as_str() == "test.string")
        .unwrap()
        .token;

    // one change for the value, one for its parent; the reply may interleave
    client
        .send(Request::SetValue {
            id: Path::new("test.string"),
            value: "y".to_string(),
        })
        .await;
    let responses = client.take(3).await;
    assert_eq!(changed_ids(&responses), vec!["test.string", "test"]);
    let reply = responses.iter().flat_map(|r| r.results()).next().unwrap();
    assert_eq!(reply.status, Status::Success);
    assert_eq!(
        state.store().get_as::<String>(&Path::new("test.string")),
        Some("y".to_string())
    );

    client
        .send(Request::ValueRemoved {
            ids: vec![Path::new("test.string")],
        })
        .await;
    let removed: Vec<RemovedEntry> = client.next().await.unwrap().removed().cloned().collect();
    assert_eq!(
        removed,
        vec![RemovedEntry {
            id: Path::new("test.string"),
            token,
        }]
    );

    let _ = shutdown_tx.send(());
    handle.await.unwrap();
}

#[tokio::test]
async fn test_read_only_set_over_the_wire() {
    let (_state, addr, shutdown_tx, handle) = start().await;
    let mut client = Client::connect(addr).await;

    client
        .send(Request::SetValue {
            id: Path::new("test.bool"),
            value: "false".to_string(),
        })
        .await;
    let reply = client.next().await.unwrap();
    let result = reply.results().next().unwrap();
    assert_eq!(result.status, Status::AccessError);
    assert_eq!(result.values[0].value, Value::boolean(true).read_only());

    let _ = shutdown_tx.send(());
    handle.await.unwrap();
}

#[tokio::test]
async fn test_connections_are_independent() {
    let (_state, addr, shutdown_tx, handle) = start().await;
    let mut watcher = Client::connect(addr).await;
    let mut writer = Client::connect(addr).await;

    watcher
        .send(Request::Sync {
            ids: vec![Path::new("test.string")],
        })
        .await;
    let snapshot = watcher.next().await.unwrap();
    assert_eq!(snapshot.messages[0], Message::SyncCompleted);
    assert_eq!(changed_ids(&[snapshot]), vec!["test.string"]);

    writer
        .send(Request::SetValue {
            id: Path::new("test.string"),
            value: "z".to_string(),
        })
        .await;
    assert!(writer.next().await.unwrap().results().next().is_some());

    // discrete: the parent's bubbled change is not forwarded
    let notice = watcher.next().await.unwrap();
    assert_eq!(changed_ids(&[notice]), vec!["test.string"]);

    let _ = shutdown_tx.send(());
    handle.await.unwrap();
}

#[tokio::test]
async fn test_shutdown_closes_connections() {
    let (_state, addr, shutdown_tx, handle) = start().await;
    let mut client = Client::connect(addr).await;
    client.send(Request::GetAll).await;
    assert!(client.next().await.is_some());

    let _ = shutdown_tx.send(());
    handle.await.unwrap();
    assert!(client.next().await.is_none());
}
