//! Path definitions: pattern, field schema, per-operation callbacks and help.

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;
use crate::field::{FieldData, FieldSchema, FieldSchemas};
use crate::request::{Operation, Request, Response};

/// Callback invoked for a routed operation.
pub type OperationFn =
    Arc<dyn Fn(&Request, &FieldData) -> Result<Option<Response>> + Send + Sync + 'static>;

/// Pattern fragment capturing one path segment of word characters as `name`.
pub fn generic_name_regex(name: &str) -> String {
    format!(r"(?P<{name}>\w+)")
}

/// A registered path definition. Immutable once handed to the backend.
#[derive(Clone)]
pub struct Path {
    pattern: String,
    fields: Arc<FieldSchemas>,
    callbacks: BTreeMap<Operation, OperationFn>,
    help_synopsis: String,
    help_description: String,
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Path")
            .field("pattern", &self.pattern)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .field("operations", &self.callbacks.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Path {
    /// Path matching `pattern`. The pattern is anchored at both ends when routed.
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            fields: Arc::new(FieldSchemas::new()),
            callbacks: BTreeMap::new(),
            help_synopsis: String::new(),
            help_description: String::new(),
        }
    }

    /// Declare a field.
    pub fn field(mut self, name: impl Into<String>, schema: FieldSchema) -> Self {
        Arc::make_mut(&mut self.fields).insert(name.into(), schema);
        self
    }

    /// Register the callback for `operation`, replacing any previous one.
    ///
    /// Only routed operations (see [`Operation::is_routed`]) are accepted;
    /// the backend build rejects the rest.
    pub fn callback<F>(mut self, operation: Operation, f: F) -> Self
    where
        F: Fn(&Request, &FieldData) -> Result<Option<Response>> + Send + Sync + 'static,
    {
        self.callbacks.insert(operation, Arc::new(f));
        self
    }

    /// Register an already shared callback.
    pub fn callback_fn(mut self, operation: Operation, f: OperationFn) -> Self {
        self.callbacks.insert(operation, f);
        self
    }

    /// Attach help text.
    pub fn help(mut self, synopsis: impl Into<String>, description: impl Into<String>) -> Self {
        self.help_synopsis = synopsis.into();
        self.help_description = description.into();
        self
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn fields(&self) -> &Arc<FieldSchemas> {
        &self.fields
    }

    pub fn synopsis(&self) -> &str {
        &self.help_synopsis
    }

    /// Callback for `operation`; `None` means the operation is unsupported here.
    pub fn callback_for(&self, operation: Operation) -> Option<&OperationFn> {
        self.callbacks.get(&operation)
    }

    /// Operations with a registered callback, in declaration order.
    pub fn operations(&self) -> Vec<Operation> {
        Operation::ALL.into_iter().filter(|op| self.callbacks.contains_key(op)).collect()
    }

    /// Human help for a request to `request_path`. Never depends on field values.
    pub fn render_help(&self, request_path: &str) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Request:        {request_path}");
        let _ = writeln!(out, "Matching Route: ^(?:{})$", self.pattern);
        let ops: Vec<&str> = self.operations().into_iter().map(Operation::label).collect();
        if !ops.is_empty() {
            let _ = writeln!(out, "Operations:     {}", ops.join(", "));
        }
        out.push('\n');
        if !self.help_synopsis.is_empty() {
            let _ = writeln!(out, "{}\n", self.help_synopsis.trim());
        }

        out.push_str("## PARAMETERS\n");
        let mut names: Vec<&String> = self.fields.keys().collect();
        names.sort();
        for name in names {
            let schema = &self.fields[name];
            let _ = writeln!(out, "\n    {name} ({})", schema.field_type);
            if !schema.description.is_empty() {
                let _ = writeln!(out, "        {}", schema.description.trim());
            }
            if schema.default.is_some() {
                let default = Value::from(schema.default_or_zero());
                let _ = writeln!(out, "        default: {default}");
            }
        }

        let _ = write!(out, "\n## DESCRIPTION\n\n{}", self.help_description.trim());
        out
    }
}
