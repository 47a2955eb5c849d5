//! Age-gated WAL rollback.
//!
//! Semantics:
//! - Entries younger than `min_age` are skipped without being attempted, so a
//!   rollback pass never undoes a mutation whose request may still be running.
//! - Eligible entries are passed to the cleanup callback once per pass; `Ok`
//!   deletes the entry, `Err` keeps it for a later pass.
//! - Per-entry failures (cleanup errors, unreadable entries) are logged and
//!   reported, never propagated. Only failing to list the WAL aborts a pass.
//! - Concurrent passes may attempt the same entry; cleanup must be idempotent
//!   and deleting a vanished entry is a no-op. Each such pass counts the entry
//!   in its own `rolled_back`, so totals summed across overlapping passes can
//!   exceed the number of entries.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::clock::{elapsed_since, Clock};
use crate::error::Result;
use crate::request::Response;
use crate::storage::Storage;
use crate::wal;

/// Cleanup callback: undo the partial work described by `(kind, data)`.
pub type RollbackFn = Arc<dyn Fn(&str, &Value) -> Result<()> + Send + Sync + 'static>;

/// Outcome of one rollback pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RollbackReport {
    /// Entries handed to the cleanup callback.
    pub attempted: usize,
    /// Entries whose cleanup this pass confirmed and which are no longer stored.
    /// An overlapping pass may have done the delete.
    pub rolled_back: usize,
    /// Entries still in storage: too young, failed, or unreadable.
    pub pending: usize,
    /// One message per failed entry.
    pub errors: Vec<String>,
}

impl RollbackReport {
    /// Response data for a rollback request.
    pub fn into_response(self) -> Response {
        Response::with_data(json!({
            "attempted": self.attempted,
            "rolled_back": self.rolled_back,
            "pending": self.pending,
            "errors": self.errors,
        }))
    }
}

/// Cleanup callback plus the age gate guarding it.
#[derive(Clone)]
pub struct RollbackEngine {
    cleanup: RollbackFn,
    min_age: Duration,
}

impl fmt::Debug for RollbackEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RollbackEngine")
            .field("min_age", &self.min_age)
            .field("cleanup", &"<callback>")
            .finish()
    }
}

impl RollbackEngine {
    pub fn new(cleanup: RollbackFn, min_age: Duration) -> Self {
        Self { cleanup, min_age }
    }

    pub fn min_age(&self) -> Duration {
        self.min_age
    }

    /// Run one pass over every WAL entry in `storage`.
    pub fn run(&self, storage: &dyn Storage, clock: &dyn Clock) -> Result<RollbackReport> {
        let ids = wal::list(storage)?;
        let mut report = RollbackReport::default();

        for id in ids {
            let entry = match wal::get(storage, &id) {
                Ok(Some(entry)) => entry,
                // Removed by a concurrent pass.
                Ok(None) => continue,
                Err(e) => {
                    warn!(target: "keyward::rollback", id = %id, error = %e, "unreadable wal entry");
                    report.pending += 1;
                    report.errors.push(format!("wal entry {id}: {e}"));
                    continue;
                }
            };

            let age = elapsed_since(clock.now_millis(), entry.created_at);
            if age < self.min_age {
                debug!(target: "keyward::rollback", id = %id, kind = %entry.kind, age_ms = age.as_millis() as u64, "wal entry too young");
                report.pending += 1;
                continue;
            }

            report.attempted += 1;
            let outcome = (self.cleanup)(&entry.kind, &entry.data)
                .and_then(|()| wal::delete(storage, &id).map_err(Into::into));
            match outcome {
                Ok(()) => {
                    info!(target: "keyward::rollback", id = %id, kind = %entry.kind, "wal entry rolled back");
                    report.rolled_back += 1;
                }
                Err(e) => {
                    warn!(target: "keyward::rollback", id = %id, kind = %entry.kind, error = %e, "rollback failed; entry kept");
                    report.pending += 1;
                    report.errors.push(format!("rolling back {:?} entry {id}: {e}", entry.kind));
                }
            }
        }
        Ok(report)
    }
}
