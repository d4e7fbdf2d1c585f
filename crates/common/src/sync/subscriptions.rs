use std::collections::HashMap;

use crate::path::Path;
use crate::store::Subscription;
use crate::token::Token;

/// What a connection is currently listening to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Unsubscribed,
    /// Every value in the store
    Global,
    /// Filtered values and everything below them
    Discrete,
}

struct Filtered {
    path: Path,
    _listener: Subscription,
}

/// Listener bookkeeping for one connection
///
/// Holds the signal-wide listeners of the current mode plus, in discrete
///  mode, one change listener per filtered value. Everything is indexed
///  both by token and by path: removal events arrive after the node is gone,
///  so ancestry can only be established from paths.
#[derive(Default)]
pub(crate) struct Subscriptions {
    mode: Mode,
    signal_listeners: Vec<Subscription>,
    filtered: HashMap<Token, Filtered>,
    by_path: HashMap<Path, Token>,
}

impl Subscriptions {
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn enter(&mut self, mode: Mode, signal_listeners: Vec<Subscription>) {
        self.clear();
        self.mode = mode;
        self.signal_listeners = signal_listeners;
    }

    pub fn is_filtered(&self, token: Token) -> bool {
        self.filtered.contains_key(&token)
    }

    pub fn len(&self) -> usize {
        self.filtered.len()
    }

    pub fn insert(&mut self, path: Path, token: Token, listener: Subscription) {
        if let Some(previous) = self.by_path.insert(path.clone(), token) {
            self.filtered.remove(&previous);
        }
        self.filtered.insert(
            token,
            Filtered {
                path,
                _listener: listener,
            },
        );
    }

    pub fn remove_path(&mut self, path: &Path) -> bool {
        match self.by_path.remove(path) {
            Some(token) => self.filtered.remove(&token).is_some(),
            None => false,
        }
    }

    /// Nearest filtered ancestor of `path`
    pub fn filtered_ancestor(&self, path: &Path) -> Option<&Path> {
        path.ancestors()
            .find_map(|ancestor| self.by_path.get_key_value(&ancestor).map(|(p, _)| p))
    }

    /// Whether events about `path` reach this connection, without attaching
    pub fn covers(&self, path: &Path, token: Token) -> bool {
        match self.mode {
            Mode::Unsubscribed => false,
            Mode::Global => true,
            Mode::Discrete => {
                self.filtered
                    .get(&token)
                    .is_some_and(|filtered| &filtered.path == path)
                    || self.filtered_ancestor(path).is_some()
            }
        }
    }

    /// Drop every listener and return to unsubscribed
    pub fn clear(&mut self) {
        self.filtered.clear();
        self.by_path.clear();
        self.signal_listeners.clear();
        self.mode = Mode::Unsubscribed;
    }
}
