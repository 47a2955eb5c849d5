#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # keyward
//!
//! Request dispatch and secret lifecycle core for pluggable secret-management
//! backends.
//!
//! ## Features
//!
//! - **Ordered path routing** over anchored regular expressions, with named
//!   captures merged into the request data
//! - **Typed fields** coerced from untyped JSON with defaults and zero values
//! - **Secret lifecycle** hooks for renew and revoke, resolved from a secret's
//!   internal data, with bounded lease extension
//! - **WAL rollback** of partially completed multi-step operations, gated by a
//!   minimum entry age
//! - **`tower` adapter** to run a backend behind standard middleware
//!
//! ## Quick Start
//!
//! ```rust
//! use keyward::{Backend, FieldSchema, FieldType, Operation, Path, Request, Response};
//! use serde_json::json;
//!
//! let backend = Backend::builder()
//!     .path(
//!         Path::new(r"greet/(?P<name>\w+)")
//!             .field("name", FieldSchema::new(FieldType::String))
//!             .callback(Operation::Read, |_req, data| {
//!                 let name = data.get("name")?;
//!                 Ok(Some(Response::with_data(json!({ "hello": name.as_str() }))))
//!             }),
//!     )
//!     .build()?;
//!
//! let resp = backend.handle_request(&Request::new(Operation::Read, "greet/world"))?;
//! assert_eq!(resp.unwrap().data["hello"], json!("world"));
//! # Ok::<(), keyward::Error>(())
//! ```

pub mod backend;
pub mod clock;
pub mod config;
pub mod error;
pub mod field;
pub mod lease;
pub mod path;
pub mod prelude;
pub mod request;
pub mod rollback;
pub mod router;
pub mod secret;
pub mod service;
pub mod storage;
pub mod wal;

// Re-exports
pub use backend::{Backend, BackendBuilder};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{BackendConfig, DEFAULT_ROLLBACK_MIN_AGE};
pub use error::{BoxError, Error, Result, StorageError};
pub use field::{FieldData, FieldSchema, FieldSchemas, FieldType, FieldValue};
pub use lease::{lease_extend, LeaseExtend, LeasePolicy};
pub use path::{generic_name_regex, OperationFn, Path};
pub use request::{Operation, Request, Response};
pub use rollback::{RollbackEngine, RollbackFn, RollbackReport};
pub use router::{RouteMatch, Router};
pub use secret::{LeaseOptions, Secret, SecretDefinition, SECRET_TYPE_KEY};
pub use service::BackendService;
pub use storage::{InmemStorage, SharedStorage, Storage, StorageEntry};
pub use wal::{WalEntry, WAL_PREFIX};
