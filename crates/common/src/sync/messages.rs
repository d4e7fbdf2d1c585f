use serde::{Deserialize, Serialize};

use crate::path::Path;
use crate::token::Token;
use crate::value::{SetResult, Value};

pub use crate::store::ValueEntry;

/// Per-id outcome, as seen by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    ErrorNotFound,
    WrongValueType,
    RangeError,
    EnumError,
    AccessError,
    UnknownError,
}

impl From<SetResult> for Status {
    fn from(result: SetResult) -> Self {
        match result {
            SetResult::Success | SetResult::SameValue => Status::Success,
            SetResult::InvalidType => Status::WrongValueType,
            SetResult::RangeError => Status::RangeError,
            SetResult::EnumError => Status::EnumError,
            SetResult::AccessError => Status::AccessError,
        }
    }
}

/// One entry of an inbound `ValueChanged` batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChangeEntry {
    /// Mirror a value owned elsewhere; creates the node if missing
    Set { id: Path, value: Value },
    AddToContainer { id: Path, key: String },
    RemoveFromContainer { id: Path, key: String },
}

/// Everything a client can ask of a connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    /// Snapshot and subscribe; empty ids means the whole tree
    Sync { ids: Vec<Path> },
    /// Like `Sync`, but answered with per-status results
    Subscribe { ids: Vec<Path> },
    Unsubscribe,
    GetAll,
    GetValue { id: Path },
    /// `id` may contain `*` segments
    GetObject { id: Path },
    MultiGet { ids: Vec<Path> },
    SetValue { id: Path, value: String },
    MultiSet { pairs: Vec<(Path, String)> },
    ValueChanged { entries: Vec<ChangeEntry> },
    ValueRemoved { ids: Vec<Path> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovedEntry {
    pub id: Path,
    pub token: Token,
}

/// Values or ids sharing one status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub status: Status,
    pub values: Vec<ValueEntry>,
    /// Targeted ids that have no value to show, e.g. not found
    pub ids: Vec<Path>,
}

impl ResultSet {
    pub fn values(status: Status, values: Vec<ValueEntry>) -> Self {
        Self {
            status,
            values,
            ids: Vec::new(),
        }
    }

    pub fn ids(status: Status, ids: Vec<Path>) -> Self {
        Self {
            status,
            values: Vec::new(),
            ids,
        }
    }
}

/// Outcome for one id of a multi-request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemResult {
    pub id: Path,
    pub status: Status,
    pub value: Option<ValueEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    SyncCompleted,
    ValueChanged(Vec<ValueEntry>),
    ValueRemoved(Vec<RemovedEntry>),
    Result(ResultSet),
    MultiGetResult(Vec<ItemResult>),
    MultiSetResult(Vec<ItemResult>),
}

/// Outbound envelope; several messages may travel together
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub messages: Vec<Message>,
}

impl Response {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn single(message: Message) -> Self {
        Self {
            messages: vec![message],
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// All changed entries across the envelope
    pub fn changed(&self) -> impl Iterator<Item = &ValueEntry> {
        self.messages.iter().flat_map(|message| match message {
            Message::ValueChanged(entries) => entries.as_slice(),
            _ => &[][..],
        })
    }

    /// All removed entries across the envelope
    pub fn removed(&self) -> impl Iterator<Item = &RemovedEntry> {
        self.messages.iter().flat_map(|message| match message {
            Message::ValueRemoved(entries) => entries.as_slice(),
            _ => &[][..],
        })
    }

    pub fn results(&self) -> impl Iterator<Item = &ResultSet> {
        self.messages.iter().filter_map(|message| match message {
            Message::Result(result) => Some(result),
            _ => None,
        })
    }
}
