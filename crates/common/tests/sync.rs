//! Integration tests for per-connection subscriptions and requests

mod common;

use ::common::prelude::*;

use common::{changed_ids, removed_ids, result_sets, setup_test_server};

#[test]
fn test_subscribe_set_delete_end_to_end() {
    let server = setup_test_server();
    let conn = server.connect();

    let reply = conn.snapshot(Request::Subscribe { ids: vec![] }).unwrap();
    let result = reply.results().next().unwrap();
    assert_eq!(result.status, Status::Success);
    let bool_entry = result
        .values
        .iter()
        .find(|e| e.id.as_str() == "test.bool")
        .unwrap();
    assert_eq!(bool_entry.value, Value::boolean(true).read_only());
    let string_entry = result
        .values
        .iter()
        .find(|e| e.id.as_str() == "test.string")
        .unwrap();
    assert_eq!(string_entry.value, Value::text("x"));
    let token = string_entry.token;
    assert_eq!(conn.handler().mode(), Mode::Global);

    let reply = conn
        .request(Request::SetValue {
            id: Path::new("test.string"),
            value: "y".to_string(),
        })
        .unwrap();
    assert_eq!(reply.results().next().unwrap().status, Status::Success);
    assert_eq!(changed_ids(&conn.drain()), vec!["test.string", "test"]);

    conn.request(Request::ValueRemoved {
        ids: vec![Path::new("test.string")],
    });
    let removed: Vec<RemovedEntry> = conn
        .drain()
        .iter()
        .flat_map(|r| r.removed().cloned())
        .collect();
    assert_eq!(
        removed,
        vec![RemovedEntry {
            id: Path::new("test.string"),
            token,
        }]
    );
    assert!(!server.store().has(&Path::new("test.string")));
}

#[test]
fn test_same_value_is_silent() {
    let server = setup_test_server();
    let conn = server.connect();
    conn.snapshot(Request::Subscribe { ids: vec![] }).unwrap();

    let reply = conn
        .request(Request::SetValue {
            id: Path::new("test.string"),
            value: "x".to_string(),
        })
        .unwrap();
    // same value still answers success
    assert_eq!(reply.results().next().unwrap().status, Status::Success);
    assert!(conn.drain().is_empty());
}

#[test]
fn test_subscribe_struct_with_nested_containers() {
    let server = setup_test_server();
    let conn = server.connect();

    let reply = conn
        .snapshot(Request::Subscribe {
            ids: vec![Path::new("dev")],
        })
        .unwrap();
    let result = reply.results().next().unwrap();
    let ids: Vec<&str> = result.values.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["dev", "dev.name", "dev.ports", "dev.vlans"]);
    assert!(result.values[2].value.is_container());
    assert_eq!(conn.handler().mode(), Mode::Discrete);
    assert_eq!(conn.handler().filtered_count(), 4);
}

#[test]
fn test_subscribe_reports_unknown_ids() {
    let server = setup_test_server();
    let conn = server.connect();

    let reply = conn
        .snapshot(Request::Subscribe {
            ids: vec![Path::new("test.bool"), Path::new("missing")],
        })
        .unwrap();
    let results = result_sets(&[reply]);
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].status, Status::Success);
    assert_eq!(results[0].values.len(), 1);
    assert_eq!(results[1].status, Status::ErrorNotFound);
    assert_eq!(results[1].ids, vec![Path::new("missing")]);
}

#[test]
fn test_sync_skips_unknown_ids() {
    let server = setup_test_server();
    let conn = server.connect();

    let reply = conn
        .snapshot(Request::Sync {
            ids: vec![Path::new("nope"), Path::new("test.string")],
        })
        .unwrap();
    assert_eq!(reply.messages[0], Message::SyncCompleted);
    assert_eq!(changed_ids(&[reply]), vec!["test.string"]);
}

#[test]
fn test_get_object_wildcard() {
    let server = setup_test_server();
    let store = server.store();
    store.set(&Path::new("a.b.container1"), Value::container(), Origin::Local);
    store.set(&Path::new("a.b.container2"), Value::container(), Origin::Local);
    store.set(&Path::new("a.b.container2.deep"), Value::text("z"), Origin::Local);
    let conn = server.connect();

    let reply = conn
        .request(Request::GetObject {
            id: Path::new("a.b.*"),
        })
        .unwrap();
    let result = reply.results().next().unwrap();
    assert_eq!(result.status, Status::Success);
    let ids: Vec<&str> = result.values.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["a.b", "a.b.container1", "a.b.container2"]);

    let reply = conn
        .request(Request::GetObject {
            id: Path::new("zz.*"),
        })
        .unwrap();
    assert_eq!(reply.results().next().unwrap().status, Status::ErrorNotFound);
}

#[test]
fn test_set_read_only_returns_current_value() {
    let server = setup_test_server();
    let conn = server.connect();

    let reply = conn
        .request(Request::SetValue {
            id: Path::new("test.bool"),
            value: "false".to_string(),
        })
        .unwrap();
    let result = reply.results().next().unwrap();
    assert_eq!(result.status, Status::AccessError);
    assert_eq!(result.values[0].value, Value::boolean(true).read_only());
    assert_eq!(server.store().get_as::<bool>(&Path::new("test.bool")), Some(true));
}

#[test]
fn test_multi_set_reports_per_item() {
    let server = setup_test_server();
    let conn = server.connect();

    let reply = conn
        .request(Request::MultiSet {
            pairs: vec![
                (Path::new("test.string"), "q".to_string()),
                (Path::new("test.bool"), "false".to_string()),
                (Path::new("absent"), "1".to_string()),
            ],
        })
        .unwrap();
    let Message::MultiSetResult(items) = &reply.messages[0] else {
        panic!("unexpected reply {:?}", reply);
    };
    let statuses: Vec<Status> = items.iter().map(|i| i.status).collect();
    assert_eq!(
        statuses,
        vec![Status::Success, Status::AccessError, Status::ErrorNotFound]
    );
    assert!(items[2].value.is_none());
}

#[test]
fn test_multi_get_inlines_container_children() {
    let server = setup_test_server();
    let conn = server.connect();
    conn.request(Request::ValueChanged {
        entries: vec![ChangeEntry::AddToContainer {
            id: Path::new("dev.ports"),
            key: "0".to_string(),
        }],
    });

    let reply = conn
        .request(Request::MultiGet {
            ids: vec![Path::new("dev.ports"), Path::new("nope")],
        })
        .unwrap();
    let Message::MultiGetResult(items) = &reply.messages[0] else {
        panic!("unexpected reply {:?}", reply);
    };
    let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["dev.ports", "dev.ports.0", "nope"]);
    assert_eq!(items[2].status, Status::ErrorNotFound);
}

#[test]
fn test_mirrored_values_bypass_access() {
    let server = setup_test_server();
    let conn = server.connect();

    let reply = conn
        .request(Request::ValueChanged {
            entries: vec![
                ChangeEntry::Set {
                    id: Path::new("test.bool"),
                    value: Value::boolean(false).read_only(),
                },
                ChangeEntry::Set {
                    id: Path::new("remote.new.leaf"),
                    value: Value::text("hi"),
                },
            ],
        })
        .unwrap();
    let Message::MultiSetResult(items) = &reply.messages[0] else {
        panic!("unexpected reply {:?}", reply);
    };
    assert!(items.iter().all(|i| i.status == Status::Success));
    let store = server.store();
    assert_eq!(store.get_as::<bool>(&Path::new("test.bool")), Some(false));
    assert_eq!(
        store.get(&Path::new("remote.new")).unwrap().value().kind(),
        Kind::Unknown
    );
}

#[test]
fn test_connections_see_each_others_writes() {
    let server = setup_test_server();
    let watcher = server.connect();
    let writer = server.connect();
    watcher
        .snapshot(Request::Sync {
            ids: vec![Path::new("test")],
        })
        .unwrap();

    writer.request(Request::SetValue {
        id: Path::new("test.string"),
        value: "from writer".to_string(),
    });
    writer.request(Request::ValueRemoved {
        ids: vec![Path::new("test.bool")],
    });
    server.settle();

    let seen = watcher.drain();
    assert_eq!(changed_ids(&seen), vec!["test.string", "test"]);
    assert_eq!(removed_ids(&seen), vec!["test.bool"]);
    // the writer never subscribed
    assert!(writer.drain().is_empty());
}

#[tokio::test]
async fn test_async_notifications() {
    let server = setup_test_server();
    let conn = server.connect();
    conn.snapshot(Request::Subscribe {
        ids: vec![Path::new("test.string")],
    })
    .unwrap();

    let store = server.store().clone();
    tokio::task::spawn_blocking(move || {
        store
            .set_str(&Path::new("test.string"), "async", Origin::Local)
            .unwrap();
    })
    .await
    .unwrap();

    let notice = conn.recv().await.unwrap();
    let entry = notice.changed().next().unwrap();
    assert_eq!(entry.id, Path::new("test.string"));
    assert_eq!(entry.value, Value::text("async"));
}

#[test]
fn test_sync_with_ids_leaves_global_mode() {
    let server = setup_test_server();
    let conn = server.connect();
    conn.snapshot(Request::Sync { ids: vec![] }).unwrap();
    assert_eq!(conn.handler().mode(), Mode::Global);

    let reply = conn
        .snapshot(Request::Sync {
            ids: vec![Path::new("test.string")],
        })
        .unwrap();
    assert_eq!(changed_ids(&[reply]), vec!["test.string"]);
    assert_eq!(conn.handler().mode(), Mode::Discrete);

    // outside the requested ids
    conn.request(Request::ValueChanged {
        entries: vec![ChangeEntry::Set {
            id: Path::new("test.bool"),
            value: Value::boolean(false).read_only(),
        }],
    });
    server.store().set(&Path::new("other.leaf"), Value::text("o"), Origin::Local);
    assert!(changed_ids(&conn.drain()).is_empty());

    server
        .store()
        .set_str(&Path::new("test.string"), "z", Origin::Local)
        .unwrap();
    assert_eq!(changed_ids(&conn.drain()), vec!["test.string"]);
}

#[test]
fn test_subscribe_reply_precedes_notifications() {
    let server = setup_test_server();
    let conn = server.connect();
    let store = server.store().clone();

    let writer = std::thread::spawn(move || {
        for i in 0..200 {
            store
                .set_str(&Path::new("test.string"), &i.to_string(), Origin::Local)
                .unwrap();
        }
    });
    assert!(conn.request(Request::Subscribe { ids: vec![] }).is_none());
    writer.join().unwrap();

    let seen = conn.drain();
    let first = seen.first().unwrap();
    assert_eq!(first.results().next().unwrap().status, Status::Success);
    assert!(seen[1..].iter().all(|r| r.results().next().is_none()));
}
