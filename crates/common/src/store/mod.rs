//! The hierarchical value store
//!
//! - **[`Store`]**: cloneable handle to the tree, the token allocator and the
//!   signal registry
//! - **[`Node`]**: a copy of one tree entry (path, token, value, child keys)
//! - **[`Subscription`]**: scoped listener handle returned by the
//!   `connect_*_listener` calls
//! - **[`EventLoop`]**: the single thread every signal is delivered on
//! - **[`DispatchedStore`]**: optional hand-off of leaf get/set onto a
//!   dedicated thread
//!
//! # Consistency
//!
//! The node arena and the token allocator live behind one mutex and are
//! always updated together. Events are queued onto the event loop while that
//! mutex is still held, so listeners see them in exactly the order the
//! mutations were applied, and never on the mutating thread's stack.
//!
//! Container structure changes (keyed instance add/remove) are additionally
//! serialized store-wide through [`Store::lock_containers`].

mod dispatch;
mod event_loop;
mod node;
mod signals;
mod visit;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::path::Path;
use crate::token::{Token, TokenAllocator};
use crate::value::{FromValue, Origin, SetResult, Value};

pub use dispatch::DispatchedStore;
pub use event_loop::EventLoop;
pub use node::{Node, ValueEntry};
pub use signals::{Listener, Signal, StoreEvent, Subscription, Topic};

use signals::Registry;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("default error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("the root node cannot be written")]
    RootImmutable,
    #[error("path not found: {0}")]
    NotFound(Path),
    #[error("path is not a container: {0}")]
    NotAContainer(Path),
    #[error("notification-only value cannot be stored at {0}")]
    Ephemeral(Path),
    #[error("token space exhausted for {0}")]
    TokenExhausted(Path),
}

struct State {
    nodes: HashMap<Path, Node>,
    tokens: TokenAllocator,
}

impl State {
    fn new() -> Self {
        let mut nodes = HashMap::new();
        // the root is never registered with the allocator
        nodes.insert(
            Path::root(),
            Node::new(Path::root(), Token::INVALID, Value::structure()),
        );
        Self {
            nodes,
            tokens: TokenAllocator::new(),
        }
    }

    fn node(&self, path: &Path) -> Option<&Node> {
        if path.is_root() {
            return None;
        }
        self.nodes.get(path)
    }

    fn register(&mut self, path: &Path, value: Value) -> Result<(), StoreError> {
        let token = self.tokens.create_token(path);
        if !token.is_valid() {
            return Err(StoreError::TokenExhausted(path.clone()));
        }
        if let Some(parent) = self.nodes.get_mut(&path.parent()) {
            parent.attach(path.leaf());
        }
        self.nodes
            .insert(path.clone(), Node::new(path.clone(), token, value));
        Ok(())
    }

    /// Create `path` and any missing ancestors; pushes every created path
    ///  onto `created`, parents first
    fn insert(
        &mut self,
        path: &Path,
        value: Value,
        ancestor: &Value,
        created: &mut Vec<Path>,
    ) -> Result<(), StoreError> {
        let mut missing: Vec<Path> = path
            .ancestors()
            .take_while(|a| !self.nodes.contains_key(a))
            .collect();
        missing.reverse();
        for ancestor_path in missing {
            self.register(&ancestor_path, ancestor.clone())?;
            created.push(ancestor_path);
        }
        self.register(path, value)?;
        created.push(path.clone());
        Ok(())
    }

    fn event(&self, signal: Signal, path: &Path, origin: Origin) -> Option<StoreEvent> {
        self.node(path).map(|node| StoreEvent {
            signal,
            path: node.path().clone(),
            token: node.token(),
            value: node.value().clone(),
            origin,
        })
    }

    /// Change events for `path` and each ancestor below the root
    fn bubble(&self, path: &Path, origin: Origin) -> Vec<StoreEvent> {
        std::iter::once(path.clone())
            .chain(path.ancestors())
            .filter_map(|p| self.event(Signal::Changed, &p, origin))
            .collect()
    }
}

struct StoreInner {
    state: Mutex<State>,
    signals: Arc<Registry>,
    events: EventLoop,
    containers: Mutex<()>,
}

/// Handle to a store; clones share the same tree
#[derive(Clone)]
pub struct Store(Arc<StoreInner>);

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("len", &self.len()).finish()
    }
}

impl Store {
    /// A store with its own event loop thread
    pub fn new() -> Result<Self, StoreError> {
        let events = EventLoop::spawn("statetree-events")?;
        Ok(Self::with_event_loop(events))
    }

    /// A store delivering its signals on an existing loop
    pub fn with_event_loop(events: EventLoop) -> Self {
        Self(Arc::new(StoreInner {
            state: Mutex::new(State::new()),
            signals: Arc::new(Registry::default()),
            events,
            containers: Mutex::new(()),
        }))
    }

    pub fn event_loop(&self) -> &EventLoop {
        &self.0.events
    }

    /* Reads */

    pub fn has(&self, path: &Path) -> bool {
        self.0.state.lock().node(path).is_some()
    }

    pub fn get(&self, path: &Path) -> Option<Node> {
        self.0.state.lock().node(path).cloned()
    }

    /// Typed read; `None` if absent or of another kind
    pub fn get_as<T: FromValue>(&self, path: &Path) -> Option<T> {
        self.0
            .state
            .lock()
            .node(path)
            .and_then(|node| node.get_as::<T>())
    }

    pub fn token_of(&self, path: &Path) -> Option<Token> {
        self.0.state.lock().node(path).map(Node::token)
    }

    pub fn path_of(&self, token: Token) -> Option<Path> {
        self.0
            .state
            .lock()
            .tokens
            .path_of(token)
            .map(|p| Path::new(&*p))
    }

    /// Number of nodes, not counting the root
    pub fn len(&self) -> usize {
        self.0.state.lock().nodes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Direct children of `path`; the root's children are the top level
    pub fn children(&self, path: &Path) -> Vec<Path> {
        self.0
            .state
            .lock()
            .nodes
            .get(path)
            .map(|node| node.children().collect())
            .unwrap_or_default()
    }

    /// Pre-order copy of the subtree at `path`
    pub fn snapshot(&self, path: &Path) -> Vec<Node> {
        let state = self.0.state.lock();
        visit::pre_order(&state.nodes, path)
            .iter()
            .filter_map(|p| state.nodes.get(p).cloned())
            .collect()
    }

    /// Call `f` on every node in pre-order
    ///
    /// Runs over a snapshot, so `f` may use the store.
    pub fn visit_values(&self, mut f: impl FnMut(&Node)) {
        for node in self.snapshot(&Path::root()) {
            f(&node);
        }
    }

    /* Writes */

    /// Write or create; true on Success or SameValue
    pub fn set(&self, path: &Path, value: Value, origin: Origin) -> bool {
        match self.set_value(path, value, origin) {
            Ok(result) => result.is_ok(),
            Err(e) => {
                tracing::warn!("set {} failed: {}", path, e);
                false
            }
        }
    }

    /// Write `value` into the node at `path`, creating it if missing
    ///
    /// Missing ancestors are created as `Unknown` placeholders for remote
    ///  writes and as structs for local ones. Only a `Success` outcome on an
    ///  existing node fires the change signal (on the node and every
    ///  ancestor); creation fires one added signal per created node instead.
    pub fn set_value(
        &self,
        path: &Path,
        value: Value,
        origin: Origin,
    ) -> Result<SetResult, StoreError> {
        if path.is_root() {
            return Err(StoreError::RootImmutable);
        }
        let mut state = self.0.state.lock();

        if let Some(node) = state.nodes.get_mut(path) {
            let result = node.value_mut().set(&value, origin);
            if result == SetResult::Success {
                let events = state.bubble(path, origin);
                self.post(events);
            }
            return Ok(result);
        }

        if value.kind().is_ephemeral() {
            return Err(StoreError::Ephemeral(path.clone()));
        }
        let verdict = value.validate();
        if verdict != SetResult::Success {
            return Ok(verdict);
        }

        let ancestor = match origin {
            Origin::Remote => Value::unknown(),
            Origin::Local => Value::structure(),
        };
        let mut created = Vec::new();
        let inserted = state.insert(path, value, &ancestor, &mut created);
        let events = created
            .iter()
            .filter_map(|p| state.event(Signal::Added, p, origin))
            .collect();
        self.post(events);
        inserted.map(|_| SetResult::Success)
    }

    /// Parse `text` into the existing node at `path`
    pub fn set_str(&self, path: &Path, text: &str, origin: Origin) -> Result<SetResult, StoreError> {
        let mut state = self.0.state.lock();
        let node = match path.is_root() {
            true => None,
            false => state.nodes.get_mut(path),
        };
        let Some(node) = node else {
            return Err(StoreError::NotFound(path.clone()));
        };
        let result = node.value_mut().set_str(text, origin);
        if result == SetResult::Success {
            let events = state.bubble(path, origin);
            self.post(events);
        }
        Ok(result)
    }

    /// Remove `path` and everything below it
    ///
    /// Fires one removed signal per node, deepest first, the node itself
    ///  last. Removing a keyed instance of a container also fires the
    ///  container's remove signal.
    pub fn del(&self, path: &Path, origin: Origin) -> bool {
        let mut state = self.0.state.lock();
        if state.node(path).is_none() {
            return false;
        }
        let parent = path.parent();
        let in_container = state
            .node(&parent)
            .map(Node::is_container)
            .unwrap_or(false);

        let doomed_paths = visit::post_order(&state.nodes, path);
        let mut events = Vec::new();
        for doomed in doomed_paths {
            if let Some(node) = state.nodes.remove(&doomed) {
                state.tokens.remove_token(node.token());
                events.push(StoreEvent {
                    signal: Signal::Removed,
                    path: doomed,
                    token: node.token(),
                    value: node.value().clone(),
                    origin,
                });
            }
        }
        if let Some(parent_node) = state.nodes.get_mut(&parent) {
            parent_node.detach(path.leaf());
        }
        if in_container {
            if let Some(mut notice) = state.event(Signal::ContainerRemoved, &parent, origin) {
                notice.value = Value::container_remove(path.leaf());
                events.push(notice);
            }
        }
        self.post(events);
        true
    }

    /// Broadcast that `key` was added to the container at `container`
    ///
    /// Does not create the keyed instance; see [`crate::schema::materialize`].
    pub fn add_to_container(&self, container: &Path, key: &str, origin: Origin) -> bool {
        self.container_notice(container, Value::container_add(key), Signal::ContainerAdded, origin)
    }

    /// Broadcast that `key` was removed from the container at `container`
    pub fn remove_from_container(&self, container: &Path, key: &str, origin: Origin) -> bool {
        self.container_notice(
            container,
            Value::container_remove(key),
            Signal::ContainerRemoved,
            origin,
        )
    }

    fn container_notice(&self, container: &Path, notice: Value, signal: Signal, origin: Origin) -> bool {
        let state = self.0.state.lock();
        let Some(mut event) = state.event(signal, container, origin) else {
            tracing::warn!("container {} not found", container);
            return false;
        };
        if !event.value.is_container() {
            tracing::warn!("{} is not a container", container);
            return false;
        }
        event.value = notice;
        self.post(vec![event]);
        true
    }

    /// Create a subtree in one step, announcing it as a whole
    ///
    /// `base` is created as a struct if missing. Each `(relative, value)`
    ///  entry is created below it, missing intermediate nodes as structs.
    ///  Entries that already exist are left alone. Once everything is in
    ///  place one added signal per new node is fired, in pre-order. Returns
    ///  the number of nodes created.
    pub fn insert_subtree(
        &self,
        base: &Path,
        entries: &[(Path, Value)],
        origin: Origin,
    ) -> Result<usize, StoreError> {
        if base.is_root() {
            return Err(StoreError::RootImmutable);
        }
        let mut state = self.0.state.lock();
        // every node created below lies under the topmost missing ancestor
        let start = base
            .ancestors()
            .take_while(|a| !state.nodes.contains_key(a))
            .last()
            .unwrap_or_else(|| base.clone());
        let structure = Value::structure();
        let mut created = Vec::new();
        let mut outcome = Ok(());
        if !state.nodes.contains_key(base) {
            outcome = state.insert(base, Value::structure(), &structure, &mut created);
        }
        for (relative, value) in entries {
            if outcome.is_err() {
                break;
            }
            let path = base.join(relative.as_str());
            if state.nodes.contains_key(&path) {
                continue;
            }
            if value.kind().is_ephemeral() {
                outcome = Err(StoreError::Ephemeral(path));
                break;
            }
            outcome = state.insert(&path, value.clone(), &structure, &mut created);
        }

        let fresh: HashSet<&Path> = created.iter().collect();
        let events = visit::pre_order(&state.nodes, &start)
            .iter()
            .filter(|p| fresh.contains(p))
            .filter_map(|p| state.event(Signal::Added, p, origin))
            .collect();
        self.post(events);
        outcome.map(|_| created.len())
    }

    /// Fire the change signal of `path` alone, without a write
    pub fn notify_changed(&self, path: &Path, origin: Origin) -> bool {
        let state = self.0.state.lock();
        match state.event(Signal::Changed, path, origin) {
            Some(event) => {
                self.post(vec![event]);
                true
            }
            None => false,
        }
    }

    /// Serializes structural container mutations across callers
    pub fn lock_containers(&self) -> MutexGuard<'_, ()> {
        self.0.containers.lock()
    }

    /* Signals */

    pub fn connect_added_listener(
        &self,
        f: impl Fn(&StoreEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.connect(Topic::Signal(Signal::Added), f)
    }

    pub fn connect_changed_listener(
        &self,
        f: impl Fn(&StoreEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.connect(Topic::Signal(Signal::Changed), f)
    }

    pub fn connect_removed_listener(
        &self,
        f: impl Fn(&StoreEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.connect(Topic::Signal(Signal::Removed), f)
    }

    pub fn connect_add_to_container_listener(
        &self,
        f: impl Fn(&StoreEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.connect(Topic::Signal(Signal::ContainerAdded), f)
    }

    pub fn connect_remove_from_container_listener(
        &self,
        f: impl Fn(&StoreEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.connect(Topic::Signal(Signal::ContainerRemoved), f)
    }

    /// Listen to the change signal of the node holding `token`
    pub fn connect_value_listener(
        &self,
        token: Token,
        f: impl Fn(&StoreEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.connect(Topic::Value(token), f)
    }

    pub fn connect(
        &self,
        topic: Topic,
        f: impl Fn(&StoreEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.0.signals.connect(topic, Box::new(f))
    }

    pub fn listener_count(&self, topic: Topic) -> usize {
        self.0.signals.listener_count(topic)
    }

    /// Block until every event queued so far has been delivered
    pub fn flush(&self) {
        self.0.events.flush();
    }

    fn post(&self, events: Vec<StoreEvent>) {
        if events.is_empty() {
            return;
        }
        let signals = self.0.signals.clone();
        let posted = self.0.events.post(move || {
            for event in &events {
                signals.deliver(event);
            }
        });
        if !posted {
            tracing::error!("event loop is gone, dropping store events");
        }
    }
}
