//! Request dispatcher.
//!
//! A [`Backend`] is assembled once through [`BackendBuilder`] and then shared
//! read-only between concurrent requests. [`Backend::handle_request`] is the
//! single entry point:
//!
//! - `help` answers from the matched path's help text (or the backend's own
//!   help on the empty path) without invoking any callback;
//! - `rollback` runs the WAL rollback pass;
//! - `renew` and `revoke` resolve the secret definition from the secret's
//!   internal data, never from the URL;
//! - every other operation is routed, validated and handed to the path's
//!   callback for that operation.
//!
//! Callbacks always see the backend's clock on [`Request::clock`], so issue
//! stamps, lease math, WAL timestamps and the rollback age gate share one
//! time source.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::clock::{SharedClock, SystemClock};
use crate::config::{BackendConfig, DEFAULT_ROLLBACK_MIN_AGE};
use crate::error::{Error, Result};
use crate::field::FieldData;
use crate::path::Path;
use crate::request::{Operation, Request, Response};
use crate::rollback::{RollbackEngine, RollbackFn, RollbackReport};
use crate::router::Router;
use crate::secret::SecretDefinition;
use crate::storage::Storage;
use crate::wal;

/// An assembled, immutable backend.
#[derive(Debug, Clone)]
pub struct Backend {
    router: Router,
    secrets: HashMap<String, SecretDefinition>,
    rollback: Option<RollbackEngine>,
    help: String,
    clock: SharedClock,
}

impl Backend {
    pub fn builder() -> BackendBuilder {
        BackendBuilder::new()
    }

    /// Dispatch one request.
    pub fn handle_request(&self, req: &Request) -> Result<Option<Response>> {
        debug!(target: "keyward::backend", operation = %req.operation, path = %req.path, "handling request");
        let stamped = self.stamp_clock(req);
        let req = stamped.as_ref();
        match req.operation {
            Operation::Help => self.handle_help(req).map(Some),
            Operation::Rollback => self.handle_rollback(req).map(Some),
            Operation::Renew | Operation::Revoke => self.handle_secret(req),
            _ => self.handle_routed(req),
        }
    }

    /// First registered path matching `path`.
    pub fn route(&self, path: &str) -> Option<&Path> {
        self.router.route(path)
    }

    /// Registered paths in routing order.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.router.paths()
    }

    pub fn secret(&self, secret_type: &str) -> Option<&SecretDefinition> {
        self.secrets.get(secret_type)
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Minimum WAL entry age, if rollback is enabled.
    pub fn rollback_min_age(&self) -> Option<Duration> {
        self.rollback.as_ref().map(RollbackEngine::min_age)
    }

    /// Record a WAL entry stamped with this backend's clock.
    pub fn put_wal(&self, storage: &dyn Storage, kind: &str, data: Value) -> Result<String> {
        wal::put(storage, self.clock.as_ref(), kind, data)
    }

    /// Run one rollback pass directly, outside of a request.
    pub fn rollback(&self, storage: &dyn Storage) -> Result<RollbackReport> {
        let engine = self.rollback.as_ref().ok_or(Error::UnsupportedOperation)?;
        engine.run(storage, self.clock.as_ref())
    }

    /// Backend-level help: help text plus the registered patterns.
    pub fn render_help(&self) -> String {
        let mut out = String::new();
        if !self.help.trim().is_empty() {
            let _ = write!(out, "{}\n\n", self.help.trim());
        }
        out.push_str("## PATHS\n");
        for path in self.router.paths() {
            let _ = writeln!(out, "\n    ^(?:{})$", path.pattern());
            if !path.synopsis().is_empty() {
                let _ = writeln!(out, "        {}", path.synopsis().trim());
            }
        }
        out
    }

    fn stamp_clock<'a>(&self, req: &'a Request) -> Cow<'a, Request> {
        if Arc::ptr_eq(&req.clock, &self.clock) {
            Cow::Borrowed(req)
        } else {
            Cow::Owned(req.clone().with_clock(Arc::clone(&self.clock)))
        }
    }

    fn handle_help(&self, req: &Request) -> Result<Response> {
        if req.path.is_empty() {
            return Ok(Response::help(self.render_help()));
        }
        let path = self.router.route(&req.path).ok_or(Error::UnsupportedPath)?;
        Ok(Response::help(path.render_help(&req.path)))
    }

    fn handle_rollback(&self, req: &Request) -> Result<Response> {
        let report = self.rollback(req.storage.as_ref())?;
        debug!(
            target: "keyward::backend",
            attempted = report.attempted,
            rolled_back = report.rolled_back,
            pending = report.pending,
            "rollback pass finished"
        );
        Ok(report.into_response())
    }

    fn handle_secret(&self, req: &Request) -> Result<Option<Response>> {
        let secret = req
            .secret
            .as_ref()
            .ok_or_else(|| Error::InvalidRequest(format!("{} request carries no secret", req.operation)))?;
        let secret_type = secret.secret_type()?;
        let def = self
            .secrets
            .get(secret_type)
            .ok_or_else(|| Error::UnsupportedSecret(secret_type.to_string()))?;
        debug!(target: "keyward::backend", operation = %req.operation, secret_type = %secret_type, "secret lifecycle");
        match req.operation {
            Operation::Renew => def.handle_renew(req),
            _ => def.handle_revoke(req),
        }
    }

    fn handle_routed(&self, req: &Request) -> Result<Option<Response>> {
        let matched = self.router.route_match(&req.path).ok_or(Error::UnsupportedPath)?;
        let callback = matched
            .path
            .callback_for(req.operation)
            .ok_or(Error::UnsupportedOperation)?;
        let data = FieldData::new(matched.merge_into(&req.data), Arc::clone(matched.path.fields()));
        data.validate()?;
        callback(req, &data)
    }
}

/// Fluent builder for [`Backend`].
pub struct BackendBuilder {
    paths: Vec<Path>,
    secrets: Vec<SecretDefinition>,
    rollback: Option<RollbackFn>,
    rollback_min_age: Duration,
    help: String,
    clock: SharedClock,
}

impl std::fmt::Debug for BackendBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendBuilder")
            .field("paths", &self.paths.len())
            .field("secrets", &self.secrets.len())
            .field("rollback", &self.rollback.as_ref().map(|_| "<callback>"))
            .field("rollback_min_age", &self.rollback_min_age)
            .finish()
    }
}

impl Default for BackendBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendBuilder {
    pub fn new() -> Self {
        Self {
            paths: Vec::new(),
            secrets: Vec::new(),
            rollback: None,
            rollback_min_age: DEFAULT_ROLLBACK_MIN_AGE,
            help: String::new(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Register a path. Earlier registrations take routing priority.
    pub fn path(mut self, path: Path) -> Self {
        self.paths.push(path);
        self
    }

    /// Register a secret type.
    pub fn secret(mut self, def: SecretDefinition) -> Self {
        self.secrets.push(def);
        self
    }

    /// Enable rollback with the given cleanup callback.
    pub fn rollback<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &Value) -> Result<()> + Send + Sync + 'static,
    {
        self.rollback = Some(Arc::new(f));
        self
    }

    pub fn rollback_min_age(mut self, min_age: Duration) -> Self {
        self.rollback_min_age = min_age;
        self
    }

    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = help.into();
        self
    }

    /// Apply declarative settings. Help is only replaced when the config sets it.
    pub fn config(mut self, config: &BackendConfig) -> Self {
        self.rollback_min_age = config.rollback_min_age;
        if let Some(help) = &config.help {
            self.help = help.clone();
        }
        self
    }

    /// Compile patterns and validate definitions.
    pub fn build(self) -> Result<Backend> {
        let router = Router::new(self.paths)?;

        let mut secrets = HashMap::with_capacity(self.secrets.len());
        for def in self.secrets {
            def.validate()?;
            if secrets.contains_key(def.secret_type()) {
                warn!(target: "keyward::backend", secret_type = %def.secret_type(), "duplicate secret type ignored");
                continue;
            }
            secrets.insert(def.secret_type().to_string(), def);
        }

        let min_age = self.rollback_min_age;
        let rollback = self.rollback.map(|f| RollbackEngine::new(f, min_age));
        debug!(
            target: "keyward::backend",
            paths = router.len(),
            secrets = secrets.len(),
            rollback = rollback.is_some(),
            "backend built"
        );
        Ok(Backend { router, secrets, rollback, help: self.help, clock: self.clock })
    }
}
