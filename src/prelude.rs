//! Convenient re-exports for writing a backend.
pub use crate::{
    backend::{Backend, BackendBuilder},
    clock::{Clock, SharedClock},
    error::{Error, Result},
    field::{FieldData, FieldSchema, FieldType, FieldValue},
    lease::{lease_extend, LeaseExtend, LeasePolicy},
    path::{generic_name_regex, Path},
    request::{Operation, Request, Response},
    secret::{Secret, SecretDefinition},
    storage::{InmemStorage, Storage, StorageEntry},
};
