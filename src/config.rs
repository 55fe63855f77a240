//! Database handle configuration.

use serde::{Deserialize, Serialize};

const MEMORY_PATH: &str = ":memory:";

/// SQLite database configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file, or ":memory:"
    pub db_path: String,
    /// Create the file when it does not exist yet
    pub create_if_missing: bool,
    /// How long SQLite waits on a locked database before failing
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_path: MEMORY_PATH.to_string(),
            create_if_missing: true,
            busy_timeout_ms: 5_000,
        }
    }
}

impl DatabaseConfig {
    /// Create a new config for the database file at `db_path`
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Self::default()
        }
    }

    /// Config for a private in-memory database
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn with_create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    pub fn with_busy_timeout_ms(mut self, ms: u64) -> Self {
        self.busy_timeout_ms = ms;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.db_path == MEMORY_PATH
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_memory() {
        let config = DatabaseConfig::default();
        assert!(config.is_in_memory());
        assert!(config.create_if_missing);
    }

    #[test]
    fn test_partial_deserialize_fills_defaults() {
        let config: DatabaseConfig =
            serde_json::from_str(r#"{"db_path": "app.sqlite", "create_if_missing": false}"#)
                .unwrap();
        assert_eq!(config.db_path, "app.sqlite");
        assert!(!config.create_if_missing);
        assert_eq!(config.busy_timeout_ms, 5_000);
    }
}
