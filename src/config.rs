//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Default remote collection host.
pub const DEFAULT_API_BASE: &str = "https://jsonplaceholder.typicode.com";

/// Runtime configuration for the todo client.
#[derive(Debug, Clone)]
pub struct TodoConfig {
    /// Base URL of the REST host; `/todos` is appended.
    pub api_base: String,
    /// Directory holding the persisted mirror.
    pub data_dir: PathBuf,
    /// User id attached to newly created todos.
    pub user_id: i64,
    /// Per-request HTTP timeout.
    pub http_timeout: Duration,
}

impl Default for TodoConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            data_dir: default_data_dir(),
            user_id: 1,
            http_timeout: Duration::from_secs(10),
        }
    }
}

impl TodoConfig {
    /// Build config from `TODO_*` environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let api_base = std::env::var("TODO_API_BASE")
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .unwrap_or(defaults.api_base);

        let data_dir = std::env::var("TODO_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let user_id: i64 = std::env::var("TODO_USER_ID")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.user_id);

        let http_timeout = std::env::var("TODO_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.http_timeout);

        Self {
            api_base,
            data_dir,
            user_id,
            http_timeout,
        }
    }

    /// Reject values that would make every request fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "TODO_API_BASE".into(),
                message: "must not be empty".into(),
            });
        }
        if self.http_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "TODO_HTTP_TIMEOUT_SECS".into(),
                message: "must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

fn default_data_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".todo-sync")
}
