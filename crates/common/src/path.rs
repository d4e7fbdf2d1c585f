use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Separator between the segments of a [`Path`]
pub const SEPARATOR: char = '.';

/// Segment literal matching any single key at its depth
pub const WILDCARD: &str = "*";

/**
 * Paths
 * =====
 * A path names a node in the tree, e.g. `net.ifaces.0.addr`.
 *  Paths are always held normalized: boundary separators are
 *  trimmed and doubled separators collapse, so `.a..b.` and `a.b`
 *  are the same path. The empty path is the synthetic root.
 * Ordering is plain string ordering of the normalized form.
 */
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Path(String);

impl Path {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Path(normalize(raw.as_ref()))
    }

    /// The synthetic root path
    pub fn root() -> Self {
        Path(String::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parent path; the parent of a top-level path (and of the root) is the root
    pub fn parent(&self) -> Path {
        match self.0.rfind(SEPARATOR) {
            Some(idx) => Path(self.0[..idx].to_string()),
            None => Path::root(),
        }
    }

    /// Last segment of the path, empty for the root
    pub fn leaf(&self) -> &str {
        match self.0.rfind(SEPARATOR) {
            Some(idx) => &self.0[idx + 1..],
            None => &self.0,
        }
    }

    /// Concatenate a (possibly multi-segment) suffix onto this path
    pub fn join(&self, suffix: impl AsRef<str>) -> Path {
        let suffix = normalize(suffix.as_ref());
        if self.is_root() {
            return Path(suffix);
        }
        if suffix.is_empty() {
            return self.clone();
        }
        Path(format!("{}{}{}", self.0, SEPARATOR, suffix))
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(SEPARATOR).filter(|s| !s.is_empty())
    }

    /// Number of segments, 0 for the root
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// True if `other` lies strictly below this path
    pub fn is_ancestor_of(&self, other: &Path) -> bool {
        if self.is_root() {
            return !other.is_root();
        }
        other.0.len() > self.0.len()
            && other.0.starts_with(&self.0)
            && other.0[self.0.len()..].starts_with(SEPARATOR)
    }

    pub fn has_wildcard(&self) -> bool {
        self.segments().any(|s| s == WILDCARD)
    }

    /// Every proper ancestor, nearest first, excluding the root
    pub fn ancestors(&self) -> impl Iterator<Item = Path> {
        let mut current = self.clone();
        std::iter::from_fn(move || {
            current = current.parent();
            if current.is_root() {
                None
            } else {
                Some(current.clone())
            }
        })
    }
}

fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for segment in raw.split(SEPARATOR).filter(|s| !s.is_empty()) {
        if !out.is_empty() {
            out.push(SEPARATOR);
        }
        out.push_str(segment);
    }
    out
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Path {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Path::new(s))
    }
}

impl From<&str> for Path {
    fn from(s: &str) -> Self {
        Path::new(s)
    }
}

impl From<String> for Path {
    fn from(s: String) -> Self {
        Path::new(s)
    }
}

impl From<&Path> for Path {
    fn from(p: &Path) -> Self {
        p.clone()
    }
}

impl From<Path> for String {
    fn from(p: Path) -> Self {
        p.0
    }
}

impl AsRef<str> for Path {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
