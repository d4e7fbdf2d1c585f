use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::path::Path;
use crate::token::Token;
use crate::value::{FromValue, Value};

/// A node in the store's arena
///
/// Nodes never own each other. The parent link is the parent's path and the
///  children are the keys (last path segments) of the nodes directly below,
///  kept in sorted order. Handing a `Node` out of the store hands out a copy.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    path: Path,
    token: Token,
    value: Value,
    children: BTreeSet<String>,
}

impl Node {
    pub(crate) fn new(path: Path, token: Token, value: Value) -> Self {
        Self {
            path,
            token,
            value,
            children: BTreeSet::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn is_container(&self) -> bool {
        self.value.is_container()
    }

    /// `None` for top-level nodes, whose parent is the synthetic root
    pub fn parent(&self) -> Option<Path> {
        let parent = self.path.parent();
        (!parent.is_root()).then_some(parent)
    }

    pub fn child_keys(&self) -> impl Iterator<Item = &str> {
        self.children.iter().map(String::as_str)
    }

    pub fn children(&self) -> impl Iterator<Item = Path> + '_ {
        self.children.iter().map(|key| self.path.join(key))
    }

    pub fn has_child(&self, key: &str) -> bool {
        self.children.contains(key)
    }

    /// Current state with the resolved id attached
    pub fn get(&self) -> ValueEntry {
        ValueEntry {
            id: self.path.clone(),
            token: self.token,
            value: self.value.clone(),
        }
    }

    pub fn get_as<T: FromValue>(&self) -> Option<T> {
        T::from_value(&self.value)
    }

    pub(crate) fn value_mut(&mut self) -> &mut Value {
        &mut self.value
    }

    pub(crate) fn attach(&mut self, key: &str) {
        self.children.insert(key.to_string());
    }

    pub(crate) fn detach(&mut self, key: &str) {
        self.children.remove(key);
    }
}

/// A value together with the id and token it lives under
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueEntry {
    pub id: Path,
    pub token: Token,
    pub value: Value,
}
