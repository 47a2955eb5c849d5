//! Secret definitions and issued secret instances.
//!
//! A [`SecretDefinition`] is registered once per secret type. Issuing a secret
//! through [`SecretDefinition::response`] stamps the lease defaults and tags the
//! internal data with [`SECRET_TYPE_KEY`], which is how renew and revoke
//! requests find their way back to the definition without a URL.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};
use crate::field::{FieldData, FieldSchema, FieldSchemas};
use crate::path::OperationFn;
use crate::request::{Request, Response};

/// Internal-data key naming the secret's definition.
pub const SECRET_TYPE_KEY: &str = "secret_type";

/// Lease parameters carried by an issued secret.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LeaseOptions {
    /// Current lease length, counted from the last issue or renewal.
    pub ttl: Duration,
    /// Extra time the host may wait past expiry before revoking.
    pub grace_period: Duration,
    pub renewable: bool,
    /// Increment requested by the caller on renewal; zero means "use the ceiling".
    pub increment: Duration,
    /// Original issue time, unix epoch milliseconds.
    pub issued_at: u64,
}

/// An issued secret as seen by renew/revoke callbacks.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Secret {
    /// Assigned by the host when the lease is persisted.
    #[serde(default)]
    pub lease_id: String,
    pub lease: LeaseOptions,
    /// Opaque context attached at issuance for this secret's own callbacks.
    #[serde(default)]
    pub internal_data: Map<String, Value>,
}

impl Secret {
    /// Raw internal value, or [`Error::MissingInternalData`].
    pub fn internal(&self, key: &str) -> Result<&Value> {
        self.internal_data
            .get(key)
            .ok_or_else(|| Error::MissingInternalData { key: key.to_string() })
    }

    /// Internal value that must be a string.
    pub fn internal_str(&self, key: &str) -> Result<&str> {
        self.internal(key)?
            .as_str()
            .ok_or_else(|| Error::InvalidInternalData { key: key.to_string(), expected: "string" })
    }

    /// Name of the definition that issued this secret.
    pub fn secret_type(&self) -> Result<&str> {
        self.internal_str(SECRET_TYPE_KEY)
    }

    /// Request a specific renewal increment.
    pub fn with_increment(mut self, increment: Duration) -> Self {
        self.lease.increment = increment;
        self
    }
}

/// Registration of one secret type.
#[derive(Clone)]
pub struct SecretDefinition {
    secret_type: String,
    fields: Arc<FieldSchemas>,
    default_duration: Duration,
    default_grace_period: Duration,
    renew: Option<OperationFn>,
    revoke: Option<OperationFn>,
}

impl fmt::Debug for SecretDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretDefinition")
            .field("secret_type", &self.secret_type)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .field("default_duration", &self.default_duration)
            .field("default_grace_period", &self.default_grace_period)
            .field("renew", &self.renew.as_ref().map(|_| "<callback>"))
            .field("revoke", &self.revoke.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

impl SecretDefinition {
    pub fn new(secret_type: impl Into<String>) -> Self {
        Self {
            secret_type: secret_type.into(),
            fields: Arc::new(FieldSchemas::new()),
            default_duration: Duration::ZERO,
            default_grace_period: Duration::ZERO,
            renew: None,
            revoke: None,
        }
    }

    /// Declare a response field (e.g. a generated username).
    pub fn field(mut self, name: impl Into<String>, schema: FieldSchema) -> Self {
        Arc::make_mut(&mut self.fields).insert(name.into(), schema);
        self
    }

    pub fn default_duration(mut self, d: Duration) -> Self {
        self.default_duration = d;
        self
    }

    pub fn default_grace_period(mut self, d: Duration) -> Self {
        self.default_grace_period = d;
        self
    }

    pub fn renew<F>(mut self, f: F) -> Self
    where
        F: Fn(&Request, &FieldData) -> Result<Option<Response>> + Send + Sync + 'static,
    {
        self.renew = Some(Arc::new(f));
        self
    }

    pub fn revoke<F>(mut self, f: F) -> Self
    where
        F: Fn(&Request, &FieldData) -> Result<Option<Response>> + Send + Sync + 'static,
    {
        self.revoke = Some(Arc::new(f));
        self
    }

    pub fn secret_type(&self) -> &str {
        &self.secret_type
    }

    pub fn fields(&self) -> &Arc<FieldSchemas> {
        &self.fields
    }

    pub fn renewable(&self) -> bool {
        self.renew.is_some()
    }

    /// Issue a secret stamped with the request's clock.
    ///
    /// Inside a callback this is the backend's clock.
    pub fn response_for(&self, req: &Request, data: Value, internal: Value) -> Response {
        self.response_at(data, internal, req.clock.now_millis())
    }

    /// Issue a secret stamped with the wall clock, for use outside dispatch.
    pub fn response(&self, data: Value, internal: Value) -> Response {
        self.response_at(data, internal, SystemClock.now_millis())
    }

    /// Issue a secret with an explicit issue time (unix epoch milliseconds).
    ///
    /// Non-object `data`/`internal` values are treated as empty.
    pub fn response_at(&self, data: Value, internal: Value, issued_at: u64) -> Response {
        let mut internal_data = match internal {
            Value::Object(m) => m,
            _ => Map::new(),
        };
        internal_data.insert(SECRET_TYPE_KEY.to_string(), Value::String(self.secret_type.clone()));

        let mut resp = Response::with_data(data);
        resp.secret = Some(Secret {
            lease_id: String::new(),
            lease: LeaseOptions {
                ttl: self.default_duration,
                grace_period: self.default_grace_period,
                renewable: self.renewable(),
                increment: Duration::ZERO,
                issued_at,
            },
            internal_data,
        });
        resp
    }

    /// Run the renew callback. Secrets without one are not renewable.
    pub fn handle_renew(&self, req: &Request) -> Result<Option<Response>> {
        let renew = self.renew.as_ref().ok_or(Error::UnsupportedOperation)?;
        let data = self.field_data(req)?;
        renew(req, &data)
    }

    /// Run the revoke callback.
    ///
    /// Without one the secret cannot be revoked here, so the host must not
    /// treat its lease as cleaned up.
    pub fn handle_revoke(&self, req: &Request) -> Result<Option<Response>> {
        let revoke = self.revoke.as_ref().ok_or(Error::UnsupportedOperation)?;
        let data = self.field_data(req)?;
        revoke(req, &data)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        for (name, schema) in self.fields.iter() {
            schema.validate(name)?;
        }
        Ok(())
    }

    fn field_data(&self, req: &Request) -> Result<FieldData> {
        let data = FieldData::new(req.data.clone(), Arc::clone(&self.fields));
        data.validate()?;
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::field::FieldType;
    use crate::request::Operation;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn creds() -> SecretDefinition {
        SecretDefinition::new("creds")
            .field("username", FieldSchema::new(FieldType::String))
            .default_duration(Duration::from_secs(3600))
            .default_grace_period(Duration::from_secs(600))
    }

    #[test]
    fn response_stamps_lease_and_type() {
        let resp = creds().response_at(json!({"username": "u1"}), json!({"role": "web"}), 42);
        assert_eq!(resp.data["username"], json!("u1"));
        let secret = resp.secret.unwrap();
        assert_eq!(secret.lease.ttl, Duration::from_secs(3600));
        assert_eq!(secret.lease.grace_period, Duration::from_secs(600));
        assert_eq!(secret.lease.issued_at, 42);
        assert!(!secret.lease.renewable);
        assert_eq!(secret.secret_type().unwrap(), "creds");
        assert_eq!(secret.internal_str("role").unwrap(), "web");
    }

    #[test]
    fn response_for_uses_request_clock() {
        let req = Request::new(Operation::Read, "creds/web").with_clock(Arc::new(ManualClock::new(9_000)));
        let secret = creds().response_for(&req, json!({}), json!({})).secret.unwrap();
        assert_eq!(secret.lease.issued_at, 9_000);
    }

    #[test]
    fn internal_data_errors_are_distinct() {
        let secret = creds().response_at(json!({}), json!({"n": 1}), 0).secret.unwrap();
        assert!(matches!(
            secret.internal_str("role"),
            Err(Error::MissingInternalData { key }) if key == "role"
        ));
        assert!(matches!(
            secret.internal_str("n"),
            Err(Error::InvalidInternalData { expected: "string", .. })
        ));
    }

    #[test]
    fn renew_without_callback_is_unsupported() {
        let req = Request::new(Operation::Renew, "");
        assert!(creds().handle_renew(&req).unwrap_err().is_unsupported_operation());
    }

    #[test]
    fn revoke_without_callback_is_unsupported() {
        let req = Request::new(Operation::Revoke, "");
        assert!(creds().handle_revoke(&req).unwrap_err().is_unsupported_operation());
    }

    #[test]
    fn callbacks_receive_field_data() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let def = creds().renew(move |_req, data| {
            seen.fetch_add(1, Ordering::SeqCst);
            assert_eq!(data.get("username")?.as_str(), Some("u1"));
            Ok(None)
        });
        assert!(def.renewable());
        let req = Request::new(Operation::Renew, "").with_field("username", "u1");
        def.handle_renew(&req).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
