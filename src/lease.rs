//! Lease renewal policy.
//!
//! Semantics of [`LeaseExtend`]:
//! - The ceiling is `max`, or the secret's current ttl when `max_from_lease` is set.
//! - A zero requested increment, or one above a non-zero ceiling, becomes the ceiling.
//!   With neither an increment nor a ceiling the current ttl is kept.
//! - The ceiling bounds each extension measured from the moment of renewal, so
//!   repeated renewals can keep a secret alive indefinitely unless `max_session`
//!   is set.
//! - A non-zero `max_session` caps total lifetime measured from the original issue
//!   time: the new ttl never reaches past `issued_at + max_session`, and renewing
//!   after that point fails.
//! - "Now" comes from the request's clock unless one is set explicitly.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Map;

use crate::clock::{duration_millis, SharedClock};
use crate::config::duration_serde;
use crate::error::{Error, Result};
use crate::field::FieldData;
use crate::path::OperationFn;
use crate::request::{Request, Response};
use crate::storage::{Storage, StorageEntry};

/// Renewal policy applied to a request's secret.
#[derive(Debug, Clone)]
pub struct LeaseExtend {
    max: Duration,
    max_session: Duration,
    max_from_lease: bool,
    clock: Option<SharedClock>,
}

impl LeaseExtend {
    /// Cap each extension at `max` and total lifetime at `max_session` (zero disables either).
    pub fn new(max: Duration, max_session: Duration) -> Self {
        Self { max, max_session, max_from_lease: false, clock: None }
    }

    /// Use the secret's current ttl as the ceiling instead of `max`.
    pub fn max_from_lease(mut self, enabled: bool) -> Self {
        self.max_from_lease = enabled;
        self
    }

    /// Override the request's clock.
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Extend the lease of `req.secret` and return it in the response.
    pub fn apply(&self, req: &Request) -> Result<Option<Response>> {
        let mut secret = req
            .secret
            .clone()
            .ok_or_else(|| Error::InvalidRequest("no secret on request".to_string()))?;
        let lease = &mut secret.lease;

        let max = if self.max_from_lease { lease.ttl } else { self.max };
        let mut increment = lease.increment;
        if !max.is_zero() && (increment.is_zero() || increment > max) {
            increment = max;
        }
        if increment.is_zero() {
            increment = lease.ttl;
        }

        let now = self.clock.as_ref().unwrap_or(&req.clock).now_millis();
        let mut ttl = increment;
        if !self.max_session.is_zero() {
            let session_end = lease.issued_at.saturating_add(duration_millis(self.max_session));
            if session_end < now {
                return Err(Error::InvalidRequest(format!(
                    "lease can only be renewed up to {} past original issue",
                    humantime::format_duration(self.max_session)
                )));
            }
            if now.saturating_add(duration_millis(increment)) > session_end {
                ttl = Duration::from_millis(session_end - now);
            }
        }

        lease.ttl = ttl;
        lease.increment = Duration::ZERO;
        Ok(Some(Response { data: Map::new(), secret: Some(secret) }))
    }
}

/// Renew callback applying `LeaseExtend::new(max, max_session).max_from_lease(max_from_lease)`.
pub fn lease_extend(max: Duration, max_session: Duration, max_from_lease: bool) -> OperationFn {
    let policy = LeaseExtend::new(max, max_session).max_from_lease(max_from_lease);
    Arc::new(move |req: &Request, _data: &FieldData| policy.apply(req))
}

/// Named lease parameters persisted by a backend (typically per role).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LeasePolicy {
    /// Initial lease granted on issue.
    #[serde(with = "duration_serde")]
    pub lease: Duration,
    /// Ceiling for a single renewal; zero falls back to `lease`.
    #[serde(default, with = "duration_serde")]
    pub lease_max: Duration,
}

impl LeasePolicy {
    pub fn new(lease: Duration, lease_max: Duration) -> Self {
        Self { lease, lease_max }
    }

    /// Load the policy stored under `key`.
    pub fn load(storage: &dyn Storage, key: &str) -> Result<Option<Self>> {
        match storage.get(key)? {
            Some(entry) => Ok(Some(entry.decode_json()?)),
            None => Ok(None),
        }
    }

    /// Load the policy under `key`, failing when it no longer exists.
    pub fn require(storage: &dyn Storage, key: &str) -> Result<Self> {
        Self::load(storage, key)?
            .ok_or_else(|| Error::InvalidRequest(format!("unable to load lease policy {key:?}")))
    }

    pub fn store(&self, storage: &dyn Storage, key: &str) -> Result<()> {
        storage.put(StorageEntry::json(key, self)?)?;
        Ok(())
    }

    /// Renewal ceiling for this policy.
    pub fn ceiling(&self) -> Duration {
        if self.lease_max.is_zero() {
            self.lease
        } else {
            self.lease_max
        }
    }

    /// Extension policy capped at [`LeasePolicy::ceiling`], with no session limit.
    pub fn extend(&self) -> LeaseExtend {
        LeaseExtend::new(self.ceiling(), Duration::ZERO)
    }
}
