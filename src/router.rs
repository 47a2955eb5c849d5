//! Ordered path router.
//!
//! Semantics:
//! - Every pattern is matched as `^(?:pattern)$` against the whole request path,
//!   so a literal pattern only matches the identical string.
//! - Paths are tried in registration order and the first match wins. There is
//!   no specificity ranking; an earlier pattern shadows later overlapping ones.
//! - Named capture groups become string field values that override same-named
//!   raw request data.
//! - Only read, write, delete and list callbacks may be registered on a path;
//!   anything else fails the build with [`Error::InvalidCallback`].

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::path::Path;

#[derive(Debug, Clone)]
struct CompiledPath {
    regex: Regex,
    path: Path,
}

/// Result of a successful route: the path plus its captured segments.
#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub path: &'a Path,
    pub captures: Map<String, Value>,
}

impl RouteMatch<'_> {
    /// Raw request data with captured segments layered on top.
    pub fn merge_into(&self, raw: &Map<String, Value>) -> Map<String, Value> {
        let mut merged = raw.clone();
        for (k, v) in &self.captures {
            merged.insert(k.clone(), v.clone());
        }
        merged
    }
}

/// Compiled, immutable routing table.
#[derive(Debug, Clone, Default)]
pub struct Router {
    paths: Vec<CompiledPath>,
}

impl Router {
    /// Compile `paths`, preserving their order.
    pub fn new(paths: Vec<Path>) -> Result<Self> {
        let paths = paths
            .into_iter()
            .map(|path| {
                let regex = compile(path.pattern())?;
                if let Some(operation) = path.operations().into_iter().find(|op| !op.is_routed()) {
                    return Err(Error::InvalidCallback { pattern: path.pattern().to_string(), operation });
                }
                for (name, schema) in path.fields().iter() {
                    schema.validate(name)?;
                }
                Ok(CompiledPath { regex, path })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { paths })
    }

    /// First registered path whose pattern covers all of `path`.
    pub fn route(&self, path: &str) -> Option<&Path> {
        self.paths.iter().find(|c| c.regex.is_match(path)).map(|c| &c.path)
    }

    /// Like [`Router::route`], also returning named captures.
    pub fn route_match(&self, path: &str) -> Option<RouteMatch<'_>> {
        self.paths.iter().find_map(|c| {
            let caps = c.regex.captures(path)?;
            let mut captures = Map::new();
            for name in c.regex.capture_names().flatten() {
                if let Some(m) = caps.name(name) {
                    captures.insert(name.to_string(), Value::String(m.as_str().to_string()));
                }
            }
            Some(RouteMatch { path: &c.path, captures })
        })
    }

    /// Registered paths in routing order.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().map(|c| &c.path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    if pattern.is_empty() {
        return Err(Error::InvalidPattern {
            pattern: pattern.to_string(),
            reason: "routing pattern cannot be blank".to_string(),
        });
    }
    Regex::new(&format!("^(?:{pattern})$"))
        .map_err(|e| Error::InvalidPattern { pattern: pattern.to_string(), reason: e.to_string() })
}
