//! Declared shape of the tree
//!
//! The store itself is schemaless. A [`SchemaProvider`] answers the one
//! question the sync layer needs when a container gains a key: which
//! descendants does the new instance start with. [`MemorySchema`] is the
//! in-process implementation, loaded from TOML:
//!
//! ```toml
//! [[value]]
//! path = "net.hostname"
//! kind = "text"
//! default = "device"
//!
//! [[value]]
//! path = "net.ports"
//! kind = "container"
//!
//! [[container]]
//! path = "net.ports"
//!
//! [[container.children]]
//! path = "speed"
//! kind = "uint32"
//! max = 100000
//! ```
//!
//! Container paths may use `*` for keyed instances of an enclosing
//! container, e.g. `net.ports.*.vlans`.

use std::path::PathBuf;

use serde::Deserialize;

use crate::path::{Path, WILDCARD};
use crate::store::{Store, StoreError};
use crate::value::{Access, Declaration, Kind, Origin, Value, ValueError};

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("failed to read schema {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse schema: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid declaration for {path}: {source}")]
    Value { path: String, source: ValueError },
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Lookup of declared descendants for new container keys
pub trait SchemaProvider: Send + Sync {
    /// Paths relative to the new key with their declared values, in
    ///  declaration order; `None` if nothing is declared
    fn children_of(&self, container: &Path) -> Option<Vec<(Path, Value)>>;
}

/// One `[[value]]` table
#[derive(Debug, Clone, Deserialize)]
pub struct ValueDecl {
    pub path: String,
    pub kind: Kind,
    #[serde(default)]
    pub access: Access,
    pub default: Option<toml::Value>,
    pub min: Option<toml::Value>,
    pub max: Option<toml::Value>,
    #[serde(default)]
    pub allowed: Vec<String>,
}

fn scalar_text(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl ValueDecl {
    pub fn to_value(&self) -> Result<Value, SchemaError> {
        let default = self.default.as_ref().map(scalar_text);
        let min = self.min.as_ref().map(scalar_text);
        let max = self.max.as_ref().map(scalar_text);
        let decl = Declaration {
            default: default.as_deref(),
            min: min.as_deref(),
            max: max.as_deref(),
            allowed: &self.allowed,
            access: self.access,
        };
        Value::declare(self.kind, &decl).map_err(|source| SchemaError::Value {
            path: self.path.clone(),
            source,
        })
    }
}

/// One `[[container]]` table
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerDecl {
    pub path: String,
    #[serde(default)]
    pub children: Vec<ValueDecl>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchemaFile {
    #[serde(default, rename = "value")]
    pub values: Vec<ValueDecl>,
    #[serde(default, rename = "container")]
    pub containers: Vec<ContainerDecl>,
}

/// True if `path` matches `pattern`, where a `*` segment matches any one
///  segment
pub fn matches_pattern(pattern: &Path, path: &Path) -> bool {
    pattern.depth() == path.depth()
        && pattern
            .segments()
            .zip(path.segments())
            .all(|(p, s)| p == WILDCARD || p == s)
}

#[derive(Debug, Clone, Default)]
pub struct MemorySchema {
    values: Vec<(Path, Value)>,
    containers: Vec<(Path, Vec<(Path, Value)>)>,
}

impl MemorySchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file(file: &SchemaFile) -> Result<Self, SchemaError> {
        let mut schema = Self::new();
        for decl in &file.values {
            schema = schema.with_value(decl.path.as_str(), decl.to_value()?);
        }
        for container in &file.containers {
            let children = container
                .children
                .iter()
                .map(|decl| Ok((Path::new(&decl.path), decl.to_value()?)))
                .collect::<Result<Vec<_>, SchemaError>>()?;
            schema = schema.with_container(container.path.as_str(), children);
        }
        Ok(schema)
    }

    pub fn from_toml(text: &str) -> Result<Self, SchemaError> {
        let file: SchemaFile = toml::from_str(text)?;
        Self::from_file(&file)
    }

    pub fn load(path: impl Into<PathBuf>) -> Result<Self, SchemaError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|source| SchemaError::Io {
            path: path.clone(),
            source,
        })?;
        let schema = Self::from_toml(&text)?;
        tracing::info!(
            "loaded schema {}: {} values, {} containers",
            path.display(),
            schema.values.len(),
            schema.containers.len()
        );
        Ok(schema)
    }

    /// Declare a value to seed the store with
    pub fn with_value(mut self, path: impl Into<Path>, value: Value) -> Self {
        self.values.push((path.into(), value));
        self
    }

    /// Declare what a new key of the containers matching `pattern` holds
    pub fn with_container(mut self, pattern: impl Into<Path>, children: Vec<(Path, Value)>) -> Self {
        self.containers.push((pattern.into(), children));
        self
    }

    /// Append everything `other` declares; earlier container patterns win
    pub fn extend(mut self, other: MemorySchema) -> Self {
        self.values.extend(other.values);
        self.containers.extend(other.containers);
        self
    }

    pub fn values(&self) -> &[(Path, Value)] {
        &self.values
    }

    /// Create every declared value that is not in the store yet
    ///
    /// Returns how many were created.
    pub fn seed(&self, store: &Store) -> Result<usize, SchemaError> {
        let mut created = 0;
        for (path, value) in &self.values {
            if store.has(path) {
                continue;
            }
            store.set_value(path, value.clone(), Origin::Local)?;
            created += 1;
        }
        Ok(created)
    }
}

impl SchemaProvider for MemorySchema {
    fn children_of(&self, container: &Path) -> Option<Vec<(Path, Value)>> {
        self.containers
            .iter()
            .find(|(pattern, _)| matches_pattern(pattern, container))
            .map(|(_, children)| children.clone())
            .filter(|children| !children.is_empty())
    }
}

/// Create the keyed instance `container.key` with its declared descendants
///
/// Everything is created as a remote write and announced in pre-order once
///  complete. Does not fire the container's own add signal.
pub fn materialize(
    store: &Store,
    schema: &dyn SchemaProvider,
    container: &Path,
    key: &str,
) -> Result<usize, StoreError> {
    let base = container.join(key);
    let children = schema.children_of(container).unwrap_or_default();
    tracing::debug!(
        "materializing {} with {} declared children",
        base,
        children.len()
    );
    store.insert_subtree(&base, &children, Origin::Remote)
}
