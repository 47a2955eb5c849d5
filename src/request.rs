//! Request/response shapes crossing the dispatch boundary.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::clock::{SharedClock, SystemClock};
use crate::secret::Secret;
use crate::storage::{InmemStorage, SharedStorage};

/// Kind of logical operation a request performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Read,
    Write,
    Delete,
    List,
    Help,
    Rollback,
    Renew,
    Revoke,
}

impl Operation {
    /// All operation kinds, in declaration order.
    pub const ALL: [Operation; 8] = [
        Operation::Read,
        Operation::Write,
        Operation::Delete,
        Operation::List,
        Operation::Help,
        Operation::Rollback,
        Operation::Renew,
        Operation::Revoke,
    ];

    /// Stable lowercase label.
    pub fn label(self) -> &'static str {
        match self {
            Operation::Read => "read",
            Operation::Write => "write",
            Operation::Delete => "delete",
            Operation::List => "list",
            Operation::Help => "help",
            Operation::Rollback => "rollback",
            Operation::Renew => "renew",
            Operation::Revoke => "revoke",
        }
    }

    /// Whether requests of this kind are dispatched to a path callback.
    ///
    /// Help, rollback, renew and revoke are answered by the backend itself.
    pub fn is_routed(self) -> bool {
        matches!(self, Operation::Read | Operation::Write | Operation::Delete | Operation::List)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// An inbound logical request.
#[derive(Debug, Clone)]
pub struct Request {
    pub operation: Operation,
    pub path: String,
    /// Raw, untyped field data from the body or query.
    pub data: Map<String, Value>,
    pub storage: SharedStorage,
    /// Previously issued secret, for renew and revoke.
    pub secret: Option<Secret>,
    /// Time source for issue stamps and lease math inside callbacks.
    /// [`Backend::handle_request`](crate::Backend::handle_request) sets it to
    /// the backend's clock before dispatching.
    pub clock: SharedClock,
}

impl Request {
    /// Request against fresh in-memory storage.
    pub fn new(operation: Operation, path: impl Into<String>) -> Self {
        Self {
            operation,
            path: path.into(),
            data: Map::new(),
            storage: Arc::new(InmemStorage::new()),
            secret: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_storage(mut self, storage: SharedStorage) -> Self {
        self.storage = storage;
        self
    }

    /// Replace the raw data. Non-object values leave the data empty.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = match data {
            Value::Object(m) => m,
            _ => Map::new(),
        };
        self
    }

    /// Set a single raw field.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(name.into(), value.into());
        self
    }

    pub fn with_secret(mut self, secret: Secret) -> Self {
        self.secret = Some(secret);
        self
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }
}

/// Successful outcome of a request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Secret issued or renewed by this response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<Secret>,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    /// Response carrying `data`; non-object values yield empty data.
    pub fn with_data(data: Value) -> Self {
        match data {
            Value::Object(data) => Self { data, secret: None },
            _ => Self::default(),
        }
    }

    /// Help response with the rendered text under `help`.
    pub fn help(text: impl Into<String>) -> Self {
        let mut data = Map::new();
        data.insert("help".to_string(), Value::String(text.into()));
        Self { data, secret: None }
    }

    /// Insert one data key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.data.insert(key.into(), value.into());
        self
    }
}
