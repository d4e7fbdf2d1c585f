use std::collections::HashSet;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::path::{Path, SEPARATOR, WILDCARD};
use crate::schema::{self, SchemaProvider};
use crate::store::{Node, Signal, Store, StoreError, StoreEvent, Subscription, Topic};
use crate::token::Token;
use crate::value::Origin;

use super::messages::{
    ChangeEntry, ItemResult, Message, RemovedEntry, Request, Response, ResultSet, Status,
    ValueEntry,
};
use super::subscriptions::{Mode, Subscriptions};
use super::wildcard::PathPattern;

const GLOBAL_SIGNALS: [Signal; 5] = [
    Signal::Added,
    Signal::Changed,
    Signal::Removed,
    Signal::ContainerAdded,
    Signal::ContainerRemoved,
];

/// Discrete mode hears changes through per-value listeners instead
const DISCRETE_SIGNALS: [Signal; 4] = [
    Signal::Added,
    Signal::Removed,
    Signal::ContainerAdded,
    Signal::ContainerRemoved,
];

fn is_valid_key(key: &str) -> bool {
    !key.is_empty() && !key.contains(SEPARATOR) && key != WILDCARD
}

fn entry_of(event: &StoreEvent) -> ValueEntry {
    ValueEntry {
        id: event.path.clone(),
        token: event.token,
        value: event.value.clone(),
    }
}

/// Per-connection request handler and notification filter
///
/// Requests come in through [`SyncHandler::handle`], which returns the
///  direct reply, if any. Sync and subscribe snapshots go onto the outbound
///  channel before any notification they subscribe to. Store events this
///  connection is subscribed to are pushed from the store's event loop, as
///  are the completions of container add/remove entries.
///
/// Dropping the handler disconnects all of its listeners.
pub struct SyncHandler {
    shared: Arc<Shared>,
}

struct Shared {
    store: Store,
    schema: Arc<dyn SchemaProvider>,
    outbound: flume::Sender<Response>,
    subscriptions: Mutex<Subscriptions>,
    this: Weak<Shared>,
}

impl std::fmt::Debug for SyncHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncHandler")
            .field("mode", &self.mode())
            .field("filtered", &self.filtered_count())
            .finish()
    }
}

impl SyncHandler {
    pub fn new(
        store: Store,
        schema: Arc<dyn SchemaProvider>,
        outbound: flume::Sender<Response>,
    ) -> Self {
        let shared = Arc::new_cyclic(|this| Shared {
            store,
            schema,
            outbound,
            subscriptions: Mutex::new(Subscriptions::default()),
            this: this.clone(),
        });
        Self { shared }
    }

    pub fn store(&self) -> &Store {
        &self.shared.store
    }

    pub fn mode(&self) -> Mode {
        self.shared.subscriptions.lock().mode()
    }

    /// Number of values with their own change listener
    pub fn filtered_count(&self) -> usize {
        self.shared.subscriptions.lock().len()
    }

    pub fn handle(&self, request: Request) -> Option<Response> {
        let shared = &self.shared;
        match request {
            Request::Sync { ids } => {
                shared.sync(&ids);
                None
            }
            Request::Subscribe { ids } => {
                shared.subscribe(&ids);
                None
            }
            Request::Unsubscribe => {
                shared.subscriptions.lock().clear();
                tracing::debug!("sync handler: unsubscribed");
                Some(Response::single(Message::Result(ResultSet::ids(
                    Status::Success,
                    Vec::new(),
                ))))
            }
            Request::GetAll => Some(Response::single(Message::Result(ResultSet::values(
                Status::Success,
                shared.entries(&Path::root()),
            )))),
            Request::GetValue { id } => Some(Response::single(Message::Result(
                shared.get_value(&id),
            ))),
            Request::GetObject { id } => Some(Response::single(Message::Result(
                shared.get_object(&id),
            ))),
            Request::MultiGet { ids } => Some(Response::single(Message::MultiGetResult(
                shared.multi_get(&ids),
            ))),
            Request::SetValue { id, value } => Some(Response::single(Message::Result(
                shared.set_value(&id, &value),
            ))),
            Request::MultiSet { pairs } => Some(Response::single(Message::MultiSetResult(
                pairs
                    .iter()
                    .map(|(id, value)| shared.set_item(id, value))
                    .collect(),
            ))),
            Request::ValueChanged { entries } => shared.value_changed(entries),
            Request::ValueRemoved { ids } => {
                for id in &ids {
                    if !shared.store.del(id, Origin::Remote) {
                        tracing::warn!("sync handler: cannot remove unknown id {}", id);
                    }
                }
                None
            }
        }
    }

    /// Drop every listener; the handler stays usable
    pub fn detach(&self) {
        self.shared.subscriptions.lock().clear();
    }
}

impl Drop for SyncHandler {
    fn drop(&mut self) {
        self.detach();
    }
}

impl Shared {
    /* Listeners */

    fn listen(&self, topic: Topic) -> Subscription {
        let this = self.this.clone();
        self.store.connect(topic, move |event| {
            if let Some(shared) = this.upgrade() {
                shared.on_event(event);
            }
        })
    }

    fn enter_global(&self, subscriptions: &mut Subscriptions) {
        if subscriptions.mode() == Mode::Global {
            return;
        }
        let listeners = GLOBAL_SIGNALS
            .iter()
            .map(|signal| self.listen(Topic::Signal(*signal)))
            .collect();
        subscriptions.enter(Mode::Global, listeners);
        tracing::debug!("sync handler: subscribed globally");
    }

    /// Returns false if global is kept, which subsumes any discrete set
    fn enter_discrete(&self, subscriptions: &mut Subscriptions, leave_global: bool) -> bool {
        match subscriptions.mode() {
            Mode::Global if !leave_global => false,
            Mode::Discrete => true,
            Mode::Global | Mode::Unsubscribed => {
                let listeners = DISCRETE_SIGNALS
                    .iter()
                    .map(|signal| self.listen(Topic::Signal(*signal)))
                    .collect();
                subscriptions.enter(Mode::Discrete, listeners);
                true
            }
        }
    }

    fn attach(&self, subscriptions: &mut Subscriptions, path: &Path, token: Token) {
        if subscriptions.is_filtered(token) {
            return;
        }
        let listener = self.listen(Topic::Value(token));
        subscriptions.insert(path.clone(), token, listener);
    }

    /// Whether this connection hears about `path`
    ///
    /// A value below a filtered ancestor gets its own listener the first
    ///  time it is asked about.
    fn is_parent_subscribed(
        &self,
        subscriptions: &mut Subscriptions,
        path: &Path,
        token: Token,
    ) -> bool {
        match subscriptions.mode() {
            Mode::Global => return true,
            Mode::Unsubscribed => return false,
            Mode::Discrete => {}
        }
        if subscriptions.is_filtered(token) {
            return true;
        }
        if subscriptions.filtered_ancestor(path).is_some() {
            self.attach(subscriptions, path, token);
            return true;
        }
        false
    }

    fn on_event(&self, event: &StoreEvent) {
        let message = {
            let mut subscriptions = self.subscriptions.lock();
            match event.signal {
                Signal::Changed => {
                    let wanted = match subscriptions.mode() {
                        Mode::Global => true,
                        Mode::Discrete => subscriptions.is_filtered(event.token),
                        Mode::Unsubscribed => false,
                    };
                    wanted.then(|| Message::ValueChanged(vec![entry_of(event)]))
                }
                Signal::Added | Signal::ContainerAdded | Signal::ContainerRemoved => self
                    .is_parent_subscribed(&mut subscriptions, &event.path, event.token)
                    .then(|| Message::ValueChanged(vec![entry_of(event)])),
                Signal::Removed => {
                    let covered = subscriptions.covers(&event.path, event.token);
                    subscriptions.remove_path(&event.path);
                    covered.then(|| {
                        Message::ValueRemoved(vec![RemovedEntry {
                            id: event.path.clone(),
                            token: event.token,
                        }])
                    })
                }
            }
        };
        if let Some(message) = message {
            self.send(Response::single(message));
        }
    }

    fn send(&self, response: Response) {
        if self.outbound.send(response).is_err() {
            tracing::debug!("sync handler: outbound channel closed");
        }
    }

    /* Subscription requests */

    /// Snapshot `ids` (or everything) and subscribe to it
    ///
    /// With `leave_global` a global connection narrows to the given ids.
    ///  Returns the snapshot and the ids that were not found.
    fn fan_out(
        &self,
        subscriptions: &mut Subscriptions,
        ids: &[Path],
        leave_global: bool,
    ) -> (Vec<ValueEntry>, Vec<Path>) {
        if ids.is_empty() {
            self.enter_global(subscriptions);
            return (self.entries(&Path::root()), Vec::new());
        }

        let discrete = self.enter_discrete(subscriptions, leave_global);
        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        let mut missing = Vec::new();
        for id in ids {
            let nodes = self.store.snapshot(id);
            if nodes.is_empty() {
                missing.push(id.clone());
                continue;
            }
            for node in nodes {
                if !seen.insert(node.path().clone()) {
                    continue;
                }
                if discrete {
                    self.attach(subscriptions, node.path(), node.token());
                }
                entries.push(node.get());
            }
        }
        (entries, missing)
    }

    // Replies are sent with the subscriptions lock held, so on_event cannot
    //  slip a notification in ahead of the snapshot.

    fn sync(&self, ids: &[Path]) {
        let mut subscriptions = self.subscriptions.lock();
        let (entries, missing) = self.fan_out(&mut subscriptions, ids, true);
        for id in missing {
            tracing::warn!("sync handler: sync of unknown id {}", id);
        }
        self.send(Response::new(vec![
            Message::SyncCompleted,
            Message::ValueChanged(entries),
        ]));
    }

    fn subscribe(&self, ids: &[Path]) {
        let mut subscriptions = self.subscriptions.lock();
        let (entries, missing) = self.fan_out(&mut subscriptions, ids, false);
        let mut response =
            Response::single(Message::Result(ResultSet::values(Status::Success, entries)));
        if !missing.is_empty() {
            response.push(Message::Result(ResultSet::ids(
                Status::ErrorNotFound,
                missing,
            )));
        }
        self.send(response);
    }

    /* Reads */

    fn entries(&self, path: &Path) -> Vec<ValueEntry> {
        self.store.snapshot(path).iter().map(Node::get).collect()
    }

    fn get_value(&self, id: &Path) -> ResultSet {
        match self.store.get(id) {
            Some(node) => ResultSet::values(Status::Success, vec![node.get()]),
            None => ResultSet::ids(Status::ErrorNotFound, vec![id.clone()]),
        }
    }

    fn get_object(&self, id: &Path) -> ResultSet {
        let pattern = match PathPattern::compile(id) {
            Ok(pattern) => pattern,
            Err(e) => {
                tracing::error!("sync handler: bad object pattern {}: {}", id, e);
                return ResultSet::ids(Status::UnknownError, vec![id.clone()]);
            }
        };
        let nodes = self.store.snapshot(pattern.base());
        if nodes.is_empty() {
            return ResultSet::ids(Status::ErrorNotFound, vec![id.clone()]);
        }
        let values = nodes
            .iter()
            .filter(|node| node.path() == pattern.base() || pattern.matches(node.path()))
            .map(Node::get)
            .collect();
        ResultSet::values(Status::Success, values)
    }

    fn multi_get(&self, ids: &[Path]) -> Vec<ItemResult> {
        let mut items = Vec::new();
        for id in ids {
            let Some(node) = self.store.get(id) else {
                items.push(ItemResult {
                    id: id.clone(),
                    status: Status::ErrorNotFound,
                    value: None,
                });
                continue;
            };
            items.push(ItemResult {
                id: id.clone(),
                status: Status::Success,
                value: Some(node.get()),
            });
            if node.is_container() {
                for child in node.children().filter_map(|c| self.store.get(&c)) {
                    items.push(ItemResult {
                        id: child.path().clone(),
                        status: Status::Success,
                        value: Some(child.get()),
                    });
                }
            }
        }
        items
    }

    /* Writes */

    fn write(&self, id: &Path, text: &str) -> (Status, Option<ValueEntry>) {
        let status = match self.store.set_str(id, text, Origin::Local) {
            Ok(result) => Status::from(result),
            Err(StoreError::NotFound(_)) => return (Status::ErrorNotFound, None),
            Err(e) => {
                tracing::warn!("sync handler: set {} failed: {}", id, e);
                Status::UnknownError
            }
        };
        (status, self.store.get(id).map(|node| node.get()))
    }

    fn set_value(&self, id: &Path, text: &str) -> ResultSet {
        match self.write(id, text) {
            (status, Some(entry)) => ResultSet::values(status, vec![entry]),
            (status, None) => ResultSet::ids(status, vec![id.clone()]),
        }
    }

    fn set_item(&self, id: &Path, text: &str) -> ItemResult {
        let (status, value) = self.write(id, text);
        ItemResult {
            id: id.clone(),
            status,
            value,
        }
    }

    fn value_changed(&self, entries: Vec<ChangeEntry>) -> Option<Response> {
        let mut items = Vec::new();
        for entry in entries {
            match entry {
                ChangeEntry::Set { id, value } => {
                    let status = match self.store.set_value(&id, value, Origin::Remote) {
                        Ok(result) => Status::from(result),
                        Err(e) => {
                            tracing::warn!("sync handler: mirror of {} failed: {}", id, e);
                            Status::UnknownError
                        }
                    };
                    let value = self.store.get(&id).map(|node| node.get());
                    items.push(ItemResult { id, status, value });
                }
                ChangeEntry::AddToContainer { id, key } => {
                    let status = self.add_to_container(&id, &key);
                    self.reply_structural(&id, &key, status);
                }
                ChangeEntry::RemoveFromContainer { id, key } => {
                    let status = self.remove_from_container(&id, &key);
                    self.reply_structural(&id, &key, status);
                }
            }
        }
        (!items.is_empty()).then(|| Response::single(Message::MultiSetResult(items)))
    }

    /* Containers */

    /// Out-of-band completion for one structural entry
    ///
    /// Queued on the event loop behind the announcements the entry caused.
    fn reply_structural(&self, container: &Path, key: &str, status: Status) {
        let values = self
            .store
            .get(container)
            .map(|node| vec![node.get()])
            .unwrap_or_default();
        let response = Response::single(Message::Result(ResultSet {
            status,
            values,
            ids: vec![container.join(key)],
        }));
        let outbound = self.outbound.clone();
        let queued = self.store.event_loop().post(move || {
            if outbound.send(response).is_err() {
                tracing::debug!("sync handler: outbound channel closed");
            }
        });
        if !queued {
            tracing::warn!("sync handler: event loop gone, dropped completion for {}", container);
        }
    }

    fn checked_container(&self, container: &Path) -> Result<(), Status> {
        match self.store.get(container) {
            None => {
                tracing::warn!("sync handler: container {} not found", container);
                Err(Status::ErrorNotFound)
            }
            Some(node) if !node.is_container() => {
                tracing::warn!("sync handler: {} is not a container", container);
                Err(Status::WrongValueType)
            }
            Some(_) => Ok(()),
        }
    }

    fn add_to_container(&self, container: &Path, key: &str) -> Status {
        if !is_valid_key(key) {
            tracing::warn!("sync handler: invalid container key {:?}", key);
            return Status::UnknownError;
        }
        let _structure = self.store.lock_containers();
        if let Err(status) = self.checked_container(container) {
            return status;
        }

        let instance = container.join(key);
        if self.store.has(&instance) {
            tracing::debug!("sync handler: {} already exists", instance);
            self.store.add_to_container(container, key, Origin::Local);
            return Status::Success;
        }

        if let Err(e) = schema::materialize(&self.store, self.schema.as_ref(), container, key) {
            tracing::error!("sync handler: failed to materialize {}: {}", instance, e);
            return Status::UnknownError;
        }
        self.store.add_to_container(container, key, Origin::Remote);
        self.store.notify_changed(container, Origin::Remote);
        Status::Success
    }

    fn remove_from_container(&self, container: &Path, key: &str) -> Status {
        let _structure = self.store.lock_containers();
        if let Err(status) = self.checked_container(container) {
            return status;
        }

        let instance = container.join(key);
        // removal of a keyed instance also fires the container's remove signal
        if !self.store.del(&instance, Origin::Remote) {
            tracing::warn!("sync handler: {} not found in container", instance);
            return Status::ErrorNotFound;
        }
        self.store.notify_changed(container, Origin::Remote);
        Status::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::MemorySchema;
    use crate::value::Value;

    fn handler(store: &Store) -> (SyncHandler, flume::Receiver<Response>) {
        let (tx, rx) = flume::unbounded();
        (
            SyncHandler::new(store.clone(), Arc::new(MemorySchema::new()), tx),
            rx,
        )
    }

    fn drain(store: &Store, rx: &flume::Receiver<Response>) -> Vec<Response> {
        store.flush();
        rx.drain().collect()
    }

    #[test]
    fn test_is_valid_key() {
        assert!(is_valid_key("eth0"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("a.b"));
        assert!(!is_valid_key("*"));
    }

    #[test]
    fn test_discrete_attaches_lazily_below_filtered_ancestor() {
        let store = Store::new().unwrap();
        store.set(&Path::new("a.x"), Value::boolean(true), Origin::Local);
        store.set(&Path::new("b"), Value::boolean(true), Origin::Local);
        let (handler, rx) = handler(&store);

        handler.handle(Request::Subscribe {
            ids: vec![Path::new("a")],
        });
        assert_eq!(handler.mode(), Mode::Discrete);
        assert_eq!(handler.filtered_count(), 2);

        store.set(&Path::new("a.new"), Value::int32(1, 0, 9), Origin::Local);
        store.set(&Path::new("b"), Value::boolean(false), Origin::Local);
        let seen = drain(&store, &rx);
        let ids: Vec<String> = seen
            .iter()
            .flat_map(|r| r.changed().map(|e| e.id.to_string()))
            .collect();
        assert_eq!(ids, vec!["a.new"]);
        assert_eq!(handler.filtered_count(), 3);

        store.set_str(&Path::new("a.new"), "2", Origin::Local).unwrap();
        let seen = drain(&store, &rx);
        let ids: Vec<String> = seen
            .iter()
            .flat_map(|r| r.changed().map(|e| e.id.to_string()))
            .collect();
        assert_eq!(ids, vec!["a.new", "a"]);
    }

    #[test]
    fn test_unsubscribe_detaches() {
        let store = Store::new().unwrap();
        store.set(&Path::new("a"), Value::boolean(true), Origin::Local);
        let (handler, rx) = handler(&store);
        handler.handle(Request::Sync { ids: vec![] });
        assert_eq!(handler.mode(), Mode::Global);
        assert_eq!(store.listener_count(Topic::Signal(Signal::Changed)), 1);
        assert_eq!(drain(&store, &rx).len(), 1);

        handler.handle(Request::Unsubscribe);
        assert_eq!(handler.mode(), Mode::Unsubscribed);
        assert_eq!(store.listener_count(Topic::Signal(Signal::Changed)), 0);

        store.set(&Path::new("a"), Value::boolean(false), Origin::Local);
        assert!(drain(&store, &rx).is_empty());
    }

    #[test]
    fn test_drop_disconnects_listeners() {
        let store = Store::new().unwrap();
        store.set(&Path::new("a"), Value::boolean(true), Origin::Local);
        let token = store.token_of(&Path::new("a")).unwrap();
        let (handler, _rx) = handler(&store);
        handler.handle(Request::Sync {
            ids: vec![Path::new("a")],
        });
        assert_eq!(store.listener_count(Topic::Value(token)), 1);
        drop(handler);
        assert_eq!(store.listener_count(Topic::Value(token)), 0);
        assert_eq!(store.listener_count(Topic::Signal(Signal::Added)), 0);
    }

    #[test]
    fn test_global_subsumes_discrete() {
        let store = Store::new().unwrap();
        store.set(&Path::new("a"), Value::boolean(true), Origin::Local);
        let (handler, _rx) = handler(&store);
        handler.handle(Request::Subscribe { ids: vec![] });
        handler.handle(Request::Subscribe {
            ids: vec![Path::new("a")],
        });
        assert_eq!(handler.mode(), Mode::Global);
        assert_eq!(handler.filtered_count(), 0);
    }

    #[test]
    fn test_sync_with_ids_narrows_global() {
        let store = Store::new().unwrap();
        store.set(&Path::new("a"), Value::boolean(true), Origin::Local);
        store.set(&Path::new("b"), Value::boolean(true), Origin::Local);
        let (handler, rx) = handler(&store);
        handler.handle(Request::Sync { ids: vec![] });
        assert_eq!(handler.mode(), Mode::Global);

        assert!(handler
            .handle(Request::Sync {
                ids: vec![Path::new("a")],
            })
            .is_none());
        assert_eq!(handler.mode(), Mode::Discrete);
        assert_eq!(handler.filtered_count(), 1);
        assert_eq!(store.listener_count(Topic::Signal(Signal::Changed)), 0);
        drain(&store, &rx);

        store.set(&Path::new("b"), Value::boolean(false), Origin::Local);
        store.set(&Path::new("a"), Value::boolean(false), Origin::Local);
        let ids: Vec<String> = drain(&store, &rx)
            .iter()
            .flat_map(|r| r.changed().map(|e| e.id.to_string()))
            .collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[test]
    fn test_removed_below_filtered_ancestor() {
        let store = Store::new().unwrap();
        store.set(&Path::new("a.x"), Value::boolean(true), Origin::Local);
        let (handler, rx) = handler(&store);
        handler.handle(Request::Subscribe {
            ids: vec![Path::new("a")],
        });

        store.del(&Path::new("a"), Origin::Local);
        let seen = drain(&store, &rx);
        let removed: Vec<String> = seen
            .iter()
            .flat_map(|r| r.removed().map(|e| e.id.to_string()))
            .collect();
        assert_eq!(removed, vec!["a.x", "a"]);
        assert_eq!(handler.filtered_count(), 0);
    }
}
