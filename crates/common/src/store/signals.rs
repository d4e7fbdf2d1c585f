use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::path::Path;
use crate::token::Token;
use crate::value::{Origin, Value};

/// The five store-wide signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Added,
    Changed,
    Removed,
    ContainerAdded,
    ContainerRemoved,
}

/// What a listener receives
///
/// For `Removed` the token and value are the ones the node held right
///  before removal. For the container signals `path`/`token` name the
///  container and `value` is the ephemeral add/remove pseudo-value carrying
///  the key.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreEvent {
    pub signal: Signal,
    pub path: Path,
    pub token: Token,
    pub value: Value,
    pub origin: Origin,
}

pub type Listener = Box<dyn Fn(&StoreEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Every event of one signal
    Signal(Signal),
    /// Change signal of a single node
    Value(Token),
}

struct Entry {
    id: u64,
    alive: AtomicBool,
    listener: Listener,
}

/// Topic -> listener list, shared between the store and its subscriptions
#[derive(Default)]
pub(crate) struct Registry {
    topics: Mutex<HashMap<Topic, Vec<Arc<Entry>>>>,
    next_id: AtomicU64,
}

impl Registry {
    pub(crate) fn connect(self: &Arc<Self>, topic: Topic, listener: Listener) -> Subscription {
        let entry = Arc::new(Entry {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            alive: AtomicBool::new(true),
            listener,
        });
        self.topics
            .lock()
            .entry(topic)
            .or_default()
            .push(entry.clone());
        Subscription {
            topic,
            entry,
            registry: Arc::downgrade(self),
        }
    }

    fn disconnect(&self, topic: Topic, id: u64) {
        let mut topics = self.topics.lock();
        if let Some(entries) = topics.get_mut(&topic) {
            entries.retain(|entry| entry.id != id);
            if entries.is_empty() {
                topics.remove(&topic);
            }
        }
    }

    /// Invoke every live listener interested in `event`
    ///
    /// The registry lock is released before listeners run, so listeners may
    ///  connect or drop subscriptions.
    pub(crate) fn deliver(&self, event: &StoreEvent) {
        let targets: Vec<Arc<Entry>> = {
            let topics = self.topics.lock();
            let mut targets: Vec<Arc<Entry>> = topics
                .get(&Topic::Signal(event.signal))
                .map(|entries| entries.to_vec())
                .unwrap_or_default();
            if event.signal == Signal::Changed {
                if let Some(entries) = topics.get(&Topic::Value(event.token)) {
                    targets.extend(entries.iter().cloned());
                }
            }
            targets
        };
        for entry in targets {
            if entry.alive.load(Ordering::Acquire) {
                (entry.listener)(event);
            }
        }
    }

    pub(crate) fn listener_count(&self, topic: Topic) -> usize {
        self.topics.lock().get(&topic).map(Vec::len).unwrap_or(0)
    }
}

/// Scoped listener handle; dropping it disconnects the listener
pub struct Subscription {
    topic: Topic,
    entry: Arc<Entry>,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn topic(&self) -> Topic {
        self.topic
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("id", &self.entry.id)
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.entry.alive.store(false, Ordering::Release);
        if let Some(registry) = self.registry.upgrade() {
            registry.disconnect(self.topic, self.entry.id);
        }
    }
}
