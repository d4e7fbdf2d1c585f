//! Integration tests for the store as seen by embedding code

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use ::common::prelude::*;

use common::init_tracing;

fn recorder(store: &Store, topic: Topic) -> (Subscription, Arc<Mutex<Vec<String>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let sub = store.connect(topic, move |event| {
        sink.lock().push(event.path.to_string());
    });
    (sub, seen)
}

#[test]
fn test_unknown_path() {
    init_tracing();
    let store = Store::new().unwrap();
    let path = Path::new("never.registered");
    assert!(store.get(&path).is_none());
    assert!(!store.has(&path));
    assert!(store.token_of(&path).is_none());
    assert!(!store.del(&path, Origin::Local));
}

#[test]
fn test_set_twice_changes_once() {
    let store = Store::new().unwrap();
    let path = Path::new("a.b");
    store.set(&path, Value::int32(1, 0, 10), Origin::Local);
    let (_sub, changes) = recorder(&store, Topic::Signal(Signal::Changed));

    assert_eq!(
        store.set_value(&path, Value::int32(2, 0, 10), Origin::Local).unwrap(),
        SetResult::Success
    );
    assert_eq!(
        store.set_value(&path, Value::int32(2, 0, 10), Origin::Local).unwrap(),
        SetResult::SameValue
    );
    store.flush();
    // the bubbled parent change is the only other event
    assert_eq!(*changes.lock(), vec!["a.b", "a"]);
}

#[test]
fn test_tokens_distinct_across_threads() {
    let store = Store::new().unwrap();
    std::thread::scope(|scope| {
        for worker in 0..4 {
            let store = &store;
            scope.spawn(move || {
                for i in 0..250 {
                    let path = Path::new(format!("w{}.v{}", worker, i));
                    store.set(&path, Value::uint32(i, 0, 1000), Origin::Local);
                }
            });
        }
    });

    let mut tokens = HashSet::new();
    store.visit_values(|node| {
        assert!(node.token().is_valid());
        assert!(tokens.insert(node.token()), "duplicate token for {}", node.path());
    });
    assert_eq!(tokens.len(), store.len());
    assert_eq!(store.len(), 4 + 4 * 250);
}

#[test]
fn test_freed_token_is_not_shared() {
    let store = Store::new().unwrap();
    // these two names hash to the same 32-bit value
    let first = Path::new("costarring");
    let second = Path::new("liquid");
    store.set(&first, Value::boolean(true), Origin::Local);
    store.set(&second, Value::boolean(true), Origin::Local);
    let first_token = store.token_of(&first).unwrap();
    let second_token = store.token_of(&second).unwrap();
    assert_ne!(first_token, second_token);
    assert_eq!(first_token.hash(), second_token.hash());

    store.del(&first, Origin::Local);
    assert_eq!(store.path_of(second_token), Some(second.clone()));
    store.set(&first, Value::boolean(false), Origin::Local);
    assert_ne!(store.token_of(&first), Some(second_token));
}

#[test]
fn test_delete_deepest_first() {
    let store = Store::new().unwrap();
    for path in ["t.a.x", "t.a.y", "t.b"] {
        store.set(&Path::new(path), Value::text(path), Origin::Local);
    }
    let (_sub, removed) = recorder(&store, Topic::Signal(Signal::Removed));

    assert!(store.del(&Path::new("t"), Origin::Local));
    store.flush();
    assert_eq!(*removed.lock(), vec!["t.a.x", "t.a.y", "t.a", "t.b", "t"]);
    assert!(store.is_empty());
}

#[test]
fn test_dispatched_access() {
    let store = Store::new().unwrap();
    let path = Path::new("cfg.level");
    store.set(&path, Value::int32(0, -3, 3), Origin::Local);
    let dispatched = DispatchedStore::new(store.clone()).unwrap();

    assert_eq!(
        dispatched.set_str(&path, "2", Origin::Local).unwrap(),
        SetResult::Success
    );
    assert_eq!(
        dispatched.set_str(&path, "9", Origin::Local).unwrap(),
        SetResult::RangeError
    );
    assert_eq!(dispatched.get(&path), Some(Value::int32(2, -3, 3)));
    assert_eq!(store.get_as::<i32>(&path), Some(2));
}
