//! Shared fixtures: a database-credentials backend over an in-memory admin session.
#![allow(dead_code)]

use std::collections::BTreeSet;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use keyward::prelude::*;
use keyward::{wal, ManualClock, SharedStorage};
use serde_json::{json, Value};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::MakeWriter;

pub const SECRET_TYPE: &str = "db_creds";
pub const WAL_KIND_USER: &str = "user";
pub const MIN_AGE: Duration = Duration::from_secs(5);

/// Records statements and tracks which users exist.
#[derive(Debug, Default)]
pub struct AdminSession {
    state: Mutex<SessionState>,
}

#[derive(Debug, Default)]
struct SessionState {
    users: BTreeSet<String>,
    statements: Vec<String>,
    fail_prefix: Option<String>,
}

impl AdminSession {
    pub fn execute(&self, stmt: &str) -> keyward::Result<()> {
        let mut st = self.state.lock().unwrap();
        st.statements.push(stmt.to_string());
        if let Some(prefix) = &st.fail_prefix {
            if stmt.starts_with(prefix.as_str()) {
                return Err(Error::external(
                    format!("executing {stmt:?}"),
                    io::Error::new(io::ErrorKind::ConnectionReset, "connection reset"),
                ));
            }
        }
        let user = stmt.rsplit(' ').next().unwrap_or_default().trim_matches('\'').to_string();
        if stmt.starts_with("CREATE USER") {
            st.users.insert(user);
        } else if stmt.starts_with("DROP USER") {
            st.users.remove(&user);
        }
        Ok(())
    }

    /// Make every statement starting with `prefix` fail.
    pub fn fail_on(&self, prefix: &str) {
        self.state.lock().unwrap().fail_prefix = Some(prefix.to_string());
    }

    pub fn heal(&self) {
        self.state.lock().unwrap().fail_prefix = None;
    }

    pub fn users(&self) -> Vec<String> {
        self.state.lock().unwrap().users.iter().cloned().collect()
    }

    pub fn statements(&self) -> Vec<String> {
        self.state.lock().unwrap().statements.clone()
    }
}

pub struct Fixture {
    pub backend: Arc<Backend>,
    pub session: Arc<AdminSession>,
    pub clock: ManualClock,
    pub storage: SharedStorage,
}

impl Fixture {
    /// Request against the fixture's shared storage.
    pub fn request(&self, op: Operation, path: &str) -> Request {
        Request::new(op, path).with_storage(Arc::clone(&self.storage))
    }

    pub fn handle(&self, req: &Request) -> keyward::Result<Option<Response>> {
        self.backend.handle_request(req)
    }

    /// Create role `name` with the given lease settings.
    pub fn write_role(&self, name: &str, lease: &str, lease_max: &str) {
        let req = self
            .request(Operation::Write, &format!("role/{name}"))
            .with_data(json!({ "lease": lease, "lease_max": lease_max }));
        self.handle(&req).unwrap();
    }

    /// Issue credentials for `role` and return the secret.
    pub fn issue(&self, role: &str) -> Secret {
        let resp = self.handle(&self.request(Operation::Read, &format!("creds/{role}"))).unwrap();
        resp.unwrap().secret.unwrap()
    }
}

fn role_key(name: &str) -> String {
    format!("role/{name}")
}

fn creds_secret(session: &Arc<AdminSession>) -> SecretDefinition {
    let revoke_session = Arc::clone(session);
    SecretDefinition::new(SECRET_TYPE)
        .field("username", FieldSchema::new(FieldType::String).with_description("Generated login"))
        .field("password", FieldSchema::new(FieldType::String).with_description("Generated password"))
        .default_duration(Duration::from_secs(3600))
        .renew(move |req, _data| {
            let secret = req.secret.as_ref().ok_or_else(|| Error::InvalidRequest("no secret".into()))?;
            let role = secret.internal_str("role")?;
            let policy = LeasePolicy::require(req.storage.as_ref(), &role_key(role))?;
            policy.extend().apply(req)
        })
        .revoke(move |req, _data| {
            let secret = req.secret.as_ref().ok_or_else(|| Error::InvalidRequest("no secret".into()))?;
            let username = secret.internal_str("username")?;
            revoke_session.execute(&format!("REVOKE ALL PERMISSIONS ON ALL KEYSPACES FROM '{username}'"))?;
            revoke_session.execute(&format!("DROP USER IF EXISTS '{username}'"))?;
            Ok(None)
        })
}

fn role_path() -> Path {
    Path::new(format!("role/{}", generic_name_regex("name")))
        .field("name", FieldSchema::new(FieldType::String).with_description("Name of the role"))
        .field(
            "lease",
            FieldSchema::new(FieldType::Duration)
                .with_default(Duration::from_secs(3600))
                .with_description("Lease granted to issued credentials"),
        )
        .field(
            "lease_max",
            FieldSchema::new(FieldType::Duration).with_description("Ceiling for a single renewal"),
        )
        .callback(Operation::Write, |req, data| {
            let name = data.get("name")?;
            let policy = LeasePolicy::new(
                data.get("lease")?.as_duration().unwrap_or_default(),
                data.get("lease_max")?.as_duration().unwrap_or_default(),
            );
            policy.store(req.storage.as_ref(), &role_key(name.as_str().unwrap_or_default()))?;
            Ok(None)
        })
        .callback(Operation::Read, |req, data| {
            let name = data.get("name")?;
            let Some(policy) = LeasePolicy::load(req.storage.as_ref(), &role_key(name.as_str().unwrap_or_default()))?
            else {
                return Ok(None);
            };
            Ok(Some(Response::with_data(json!({
                "lease": policy.lease.as_secs(),
                "lease_max": policy.lease_max.as_secs(),
            }))))
        })
        .callback(Operation::Delete, |req, data| {
            let name = data.get("name")?;
            req.storage.delete(&role_key(name.as_str().unwrap_or_default()))?;
            Ok(None)
        })
        .help("Manage the roles that credentials are issued for.", "Stores the lease settings of a role.")
}

fn creds_path(def: SecretDefinition, session: &Arc<AdminSession>) -> Path {
    let session = Arc::clone(session);
    let counter = Arc::new(AtomicUsize::new(0));
    Path::new(format!("creds/{}", generic_name_regex("name")))
        .field("name", FieldSchema::new(FieldType::String).with_description("Name of the role"))
        .callback(Operation::Read, move |req, data| {
            let name = data.get("name")?;
            let name = name.as_str().unwrap_or_default();
            let policy = LeasePolicy::require(req.storage.as_ref(), &role_key(name))?;

            let username = format!("{name}_{}", counter.fetch_add(1, Ordering::SeqCst));
            let wal_id = wal::put(req.storage.as_ref(), req.clock.as_ref(), WAL_KIND_USER, json!({ "username": username }))?;
            session.execute(&format!("CREATE USER '{username}'"))?;
            session.execute(&format!("GRANT ALL PERMISSIONS ON ALL KEYSPACES TO '{username}'"))?;
            wal::delete(req.storage.as_ref(), &wal_id)?;

            let mut resp = def.response_for(
                req,
                json!({ "username": username, "password": "hunter2" }),
                json!({ "username": username, "role": name }),
            );
            if let Some(secret) = resp.secret.as_mut() {
                secret.lease.ttl = policy.lease;
            }
            Ok(Some(resp))
        })
        .help("Issue database credentials for a role.", "")
}

/// Backend with `role/<name>` and `creds/<name>` paths, the `db_creds` secret type
/// and a rollback callback that drops half-created users.
pub fn fixture() -> Fixture {
    let session = Arc::new(AdminSession::default());
    let clock = ManualClock::new(1_700_000_000_000);
    let def = creds_secret(&session);

    let rollback_session = Arc::clone(&session);
    let backend = Backend::builder()
        .help("Dynamic database credentials.")
        .path(role_path())
        .path(creds_path(def.clone(), &session))
        .secret(def)
        .rollback(move |kind: &str, data: &Value| match kind {
            WAL_KIND_USER => {
                let username = data["username"]
                    .as_str()
                    .ok_or_else(|| Error::Backend("wal entry without username".into()))?;
                rollback_session.execute(&format!("DROP USER IF EXISTS '{username}'"))
            }
            other => Err(Error::Backend(format!("unknown wal kind {other:?}"))),
        })
        .rollback_min_age(MIN_AGE)
        .clock(Arc::new(clock.clone()))
        .build()
        .unwrap();

    Fixture {
        backend: Arc::new(backend),
        session,
        clock,
        storage: Arc::new(InmemStorage::new()),
    }
}

#[derive(Clone)]
struct SharedWriter(Arc<Mutex<Vec<u8>>>);

impl<'a> MakeWriter<'a> for SharedWriter {
    type Writer = SharedGuard;
    fn make_writer(&'a self) -> Self::Writer {
        SharedGuard(self.0.clone())
    }
}

struct SharedGuard(Arc<Mutex<Vec<u8>>>);

impl io::Write for SharedGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `f` with a thread-local subscriber and return everything it logged.
pub fn capture_logs<F: FnOnce()>(f: F) -> String {
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let subscriber = tracing_subscriber::fmt()
        .with_writer(BoxMakeWriter::new(SharedWriter(buffer.clone())))
        .with_max_level(tracing::Level::DEBUG)
        .with_target(true)
        .with_ansi(false)
        .without_time()
        .finish();
    tracing::subscriber::with_default(subscriber, f);
    let bytes = buffer.lock().unwrap().clone();
    String::from_utf8(bytes).unwrap()
}
