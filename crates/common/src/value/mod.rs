//! Typed, validated node payloads
//!
//! A [`Value`] is a tagged union ([`Data`]) plus an [`Access`] mode. Writes go
//! through [`Value::set`] or [`Value::set_str`], which never fail loudly:
//! they report a [`SetResult`] and leave the value untouched unless the
//! outcome is [`SetResult::Success`].

mod declare;
mod kind;
mod types;

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};

pub use declare::{Declaration, ValueError};
pub use kind::Kind;
pub use types::{Bounded, MacAddr, MacAddrParseError, TimeSpec, TimeVal};

use kind::ops;

/// Who is asking for a mutation
///
/// Local writes come from clients of this store and are subject to access
///  checks. Remote writes mirror state owned elsewhere (a device, a peer)
///  and may update read-only values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Origin {
    Local,
    Remote,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    #[default]
    ReadWrite,
    ReadOnly,
    /// Becomes read-only after the first successful write
    WriteOnce,
}

/// Outcome of a write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SetResult {
    Success,
    /// The write was valid but changed nothing
    SameValue,
    InvalidType,
    RangeError,
    EnumError,
    AccessError,
}

impl SetResult {
    /// Success or SameValue
    pub fn is_ok(&self) -> bool {
        matches!(self, SetResult::Success | SetResult::SameValue)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Data {
    /// Placeholder for nodes created implicitly by a remote write
    Unknown,
    Bool(bool),
    Text(String),
    Int32(Bounded<i32>),
    Uint32(Bounded<u32>),
    Int64(Bounded<i64>),
    Uint64(Bounded<u64>),
    Double(Bounded<f64>),
    Enum {
        value: String,
        allowed: BTreeSet<String>,
    },
    /// Opaque 64-bit identifier
    Id64(u64),
    Mac(MacAddr),
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    TimeVal(TimeVal),
    TimeSpec(TimeSpec),
    Set(BTreeSet<String>),
    UnorderedSet(HashSet<String>),
    Vector(Vec<String>),
    /// Fixed, schema-declared children
    Struct,
    /// Runtime keyed children
    Container,
    /// Notification only: key added to a container
    ContainerAdd(String),
    /// Notification only: key removed from a container
    ContainerRemove(String),
}

impl Data {
    pub fn kind(&self) -> Kind {
        match self {
            Data::Unknown => Kind::Unknown,
            Data::Bool(_) => Kind::Bool,
            Data::Text(_) => Kind::Text,
            Data::Int32(_) => Kind::Int32,
            Data::Uint32(_) => Kind::Uint32,
            Data::Int64(_) => Kind::Int64,
            Data::Uint64(_) => Kind::Uint64,
            Data::Double(_) => Kind::Double,
            Data::Enum { .. } => Kind::Enum,
            Data::Id64(_) => Kind::Id64,
            Data::Mac(_) => Kind::Mac,
            Data::Ipv4(_) => Kind::Ipv4,
            Data::Ipv6(_) => Kind::Ipv6,
            Data::TimeVal(_) => Kind::TimeVal,
            Data::TimeSpec(_) => Kind::TimeSpec,
            Data::Set(_) => Kind::Set,
            Data::UnorderedSet(_) => Kind::UnorderedSet,
            Data::Vector(_) => Kind::Vector,
            Data::Struct => Kind::Struct,
            Data::Container => Kind::Container,
            Data::ContainerAdd(_) => Kind::ContainerAdd,
            Data::ContainerRemove(_) => Kind::ContainerRemove,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Value {
    data: Data,
    access: Access,
}

impl Value {
    pub fn new(data: Data) -> Self {
        Self {
            data,
            access: Access::ReadWrite,
        }
    }

    pub fn unknown() -> Self {
        Self::new(Data::Unknown)
    }

    pub fn boolean(value: bool) -> Self {
        Self::new(Data::Bool(value))
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::new(Data::Text(value.into()))
    }

    pub fn int32(value: i32, min: i32, max: i32) -> Self {
        Self::new(Data::Int32(Bounded::new(value, min, max)))
    }

    pub fn uint32(value: u32, min: u32, max: u32) -> Self {
        Self::new(Data::Uint32(Bounded::new(value, min, max)))
    }

    pub fn int64(value: i64, min: i64, max: i64) -> Self {
        Self::new(Data::Int64(Bounded::new(value, min, max)))
    }

    pub fn uint64(value: u64, min: u64, max: u64) -> Self {
        Self::new(Data::Uint64(Bounded::new(value, min, max)))
    }

    pub fn double(value: f64, min: f64, max: f64) -> Self {
        Self::new(Data::Double(Bounded::new(value, min, max)))
    }

    pub fn enumeration<I, S>(value: impl Into<String>, allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Data::Enum {
            value: value.into(),
            allowed: allowed.into_iter().map(Into::into).collect(),
        })
    }

    pub fn id64(value: u64) -> Self {
        Self::new(Data::Id64(value))
    }

    pub fn mac(value: MacAddr) -> Self {
        Self::new(Data::Mac(value))
    }

    pub fn ipv4(value: Ipv4Addr) -> Self {
        Self::new(Data::Ipv4(value))
    }

    pub fn ipv6(value: Ipv6Addr) -> Self {
        Self::new(Data::Ipv6(value))
    }

    pub fn timeval(secs: i64, micros: u32) -> Self {
        Self::new(Data::TimeVal(TimeVal::new(secs, micros)))
    }

    pub fn timespec(secs: i64, nanos: u32) -> Self {
        Self::new(Data::TimeSpec(TimeSpec::new(secs, nanos)))
    }

    pub fn ordered_set<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Data::Set(items.into_iter().map(Into::into).collect()))
    }

    pub fn unordered_set<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Data::UnorderedSet(items.into_iter().map(Into::into).collect()))
    }

    pub fn vector<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Data::Vector(items.into_iter().map(Into::into).collect()))
    }

    pub fn structure() -> Self {
        Self::new(Data::Struct)
    }

    pub fn container() -> Self {
        Self::new(Data::Container)
    }

    pub fn container_add(key: impl Into<String>) -> Self {
        Self::new(Data::ContainerAdd(key.into())).with_access(Access::ReadOnly)
    }

    pub fn container_remove(key: impl Into<String>) -> Self {
        Self::new(Data::ContainerRemove(key.into())).with_access(Access::ReadOnly)
    }

    pub fn with_access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    pub fn read_only(self) -> Self {
        self.with_access(Access::ReadOnly)
    }

    pub fn write_once(self) -> Self {
        self.with_access(Access::WriteOnce)
    }

    pub fn data(&self) -> &Data {
        &self.data
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn kind(&self) -> Kind {
        self.data.kind()
    }

    pub fn is_container(&self) -> bool {
        self.kind() == Kind::Container
    }

    /// Check a declaration against its own bounds / allowed set
    pub fn validate(&self) -> SetResult {
        (ops(self.kind()).validate)(&self.data, &self.data)
    }

    /// Write another value into this one
    ///
    /// The candidate must be of the same kind; bounds and allowed sets of
    ///  this (declared) value are kept. An `Unknown` placeholder adopts the
    ///  candidate wholesale.
    pub fn set(&mut self, candidate: &Value, origin: Origin) -> SetResult {
        if self.denies(origin) {
            return SetResult::AccessError;
        }
        if self.kind() == Kind::Unknown {
            return self.replace_placeholder(candidate.clone());
        }
        if self.kind() != candidate.kind() {
            return SetResult::InvalidType;
        }
        let row = ops(self.kind());
        let verdict = (row.validate)(&self.data, &candidate.data);
        if verdict != SetResult::Success {
            return verdict;
        }
        let adopted = (row.adopt)(&self.data, &candidate.data);
        self.commit(adopted)
    }

    /// Parse `text` according to this value's kind and write it
    pub fn set_str(&mut self, text: &str, origin: Origin) -> SetResult {
        if self.denies(origin) {
            return SetResult::AccessError;
        }
        if self.kind() == Kind::Unknown {
            return self.replace_placeholder(Value::text(text));
        }
        let row = ops(self.kind());
        let parsed = match (row.parse)(&self.data, text) {
            Ok(parsed) => parsed,
            Err(verdict) => return verdict,
        };
        let verdict = (row.validate)(&self.data, &parsed);
        if verdict != SetResult::Success {
            return verdict;
        }
        self.commit(parsed)
    }

    fn denies(&self, origin: Origin) -> bool {
        self.access == Access::ReadOnly && origin == Origin::Local
    }

    fn replace_placeholder(&mut self, candidate: Value) -> SetResult {
        if candidate.kind() == Kind::Unknown {
            return SetResult::SameValue;
        }
        if candidate.kind().is_ephemeral() {
            return SetResult::InvalidType;
        }
        let verdict = candidate.validate();
        if verdict != SetResult::Success {
            return verdict;
        }
        *self = candidate;
        SetResult::Success
    }

    fn commit(&mut self, data: Data) -> SetResult {
        if (ops(self.kind()).same)(&self.data, &data) {
            return SetResult::SameValue;
        }
        self.data = data;
        if self.access == Access::WriteOnce {
            self.access = Access::ReadOnly;
        }
        SetResult::Success
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (ops(self.kind()).format)(&self.data, f)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::boolean(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::text(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::text(value)
    }
}

/// Checked extraction of a plain Rust value
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Option<Self>;
}

macro_rules! from_value {
    ($ty:ty, $($pattern:pat => $out:expr),+) => {
        impl FromValue for $ty {
            fn from_value(value: &Value) -> Option<Self> {
                match value.data() {
                    $($pattern => Some($out),)+
                    _ => None,
                }
            }
        }
    };
}

from_value!(bool, Data::Bool(b) => *b);
from_value!(String, Data::Text(s) => s.clone(), Data::Enum { value, .. } => value.clone());
from_value!(i32, Data::Int32(b) => b.value);
from_value!(u32, Data::Uint32(b) => b.value);
from_value!(i64, Data::Int64(b) => b.value);
from_value!(u64, Data::Uint64(b) => b.value, Data::Id64(id) => *id);
from_value!(f64, Data::Double(b) => b.value);
from_value!(MacAddr, Data::Mac(mac) => *mac);
from_value!(Ipv4Addr, Data::Ipv4(addr) => *addr);
from_value!(Ipv6Addr, Data::Ipv6(addr) => *addr);
from_value!(TimeVal, Data::TimeVal(t) => *t);
from_value!(TimeSpec, Data::TimeSpec(t) => *t);
from_value!(BTreeSet<String>, Data::Set(items) => items.clone());
from_value!(Vec<String>, Data::Vector(items) => items.clone());
