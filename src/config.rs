//! Declarative backend configuration.
//!
//! Everything here can also be set through [`crate::BackendBuilder`]; the config
//! struct exists so hosts can load it from their own JSON/TOML/YAML files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default minimum age before a WAL entry is eligible for rollback.
pub const DEFAULT_ROLLBACK_MIN_AGE: Duration = Duration::from_secs(10 * 60);

/// Backend settings that are not code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendConfig {
    /// WAL entries younger than this are never rolled back.
    #[serde(with = "duration_serde")]
    pub rollback_min_age: Duration,
    /// Backend-level help text.
    pub help: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self { rollback_min_age: DEFAULT_ROLLBACK_MIN_AGE, help: None }
    }
}

/// Durations as whole seconds on output; seconds or human strings (`"5m"`) on input.
pub mod duration_serde {
    use serde::de::{self, Deserializer, Visitor};
    use serde::{Serialize, Serializer};
    use std::fmt;
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(DurationVisitor)
    }

    struct DurationVisitor;

    impl<'de> Visitor<'de> for DurationVisitor {
        type Value = Duration;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a number of seconds or a duration string such as \"5m\"")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Duration, E> {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Duration, E> {
            u64::try_from(v)
                .map(Duration::from_secs)
                .map_err(|_| E::custom(format!("negative duration: {v}")))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Duration, E> {
            let v = v.trim();
            if let Ok(secs) = v.parse::<u64>() {
                return Ok(Duration::from_secs(secs));
            }
            humantime::parse_duration(v).map_err(E::custom)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_apply_for_missing_keys() {
        let cfg: BackendConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(cfg, BackendConfig::default());
        assert_eq!(cfg.rollback_min_age, DEFAULT_ROLLBACK_MIN_AGE);
    }

    #[test]
    fn min_age_accepts_seconds_and_human_strings() {
        let cfg: BackendConfig =
            serde_json::from_value(json!({"rollback_min_age": "1m 30s", "help": "db"})).unwrap();
        assert_eq!(cfg.rollback_min_age, Duration::from_secs(90));
        assert_eq!(cfg.help.as_deref(), Some("db"));

        let cfg: BackendConfig = serde_json::from_value(json!({"rollback_min_age": 5})).unwrap();
        assert_eq!(cfg.rollback_min_age, Duration::from_secs(5));
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(serde_json::from_value::<BackendConfig>(json!({"rollback_min_age": -1})).is_err());
        assert!(serde_json::from_value::<BackendConfig>(json!({"rollback_min_age": "later"})).is_err());
        assert!(serde_json::from_value::<BackendConfig>(json!({"unknown": 1})).is_err());
    }

    #[test]
    fn serializes_as_seconds() {
        let cfg = BackendConfig { rollback_min_age: Duration::from_secs(120), help: None };
        assert_eq!(serde_json::to_value(&cfg).unwrap()["rollback_min_age"], json!(120));
    }
}
