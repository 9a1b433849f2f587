//! Engine and pool configuration.
//!
//! Settings follow the option-with-default pattern: every knob is optional
//! and resolved through a `*_or_default()` accessor, with a `validate()`
//! step that rejects values the engine cannot work with.

use std::time::Duration;

/// Number of full-batch attempts a write gets before giving up.
pub const DEFAULT_RETRY_BUDGET: u32 = 5;

// Pool configuration defaults used by the sqlx backend.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_MAX_CONNECTIONS_SQLITE: u32 = 1;
pub const DEFAULT_MIN_CONNECTIONS: u32 = 1;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

/// Engine-level settings.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct EngineConfig {
    /// Full-batch attempts permitted per write invocation (default: 5).
    pub retry_budget: Option<u32>,
}

impl EngineConfig {
    /// Get retry_budget with default value.
    pub fn retry_budget_or_default(&self) -> u32 {
        self.retry_budget.unwrap_or(DEFAULT_RETRY_BUDGET)
    }

    /// Validate engine settings and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(budget) = self.retry_budget {
            if budget == 0 {
                return Err("retry_budget must be greater than 0".to_string());
            }
        }
        Ok(())
    }
}

/// Connection pool settings consumed by the sqlx backend.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct PoolSettings {
    /// Maximum connections in pool (default: 10, 1 for SQLite).
    pub max_connections: Option<u32>,
    /// Minimum connections in pool (default: 1).
    pub min_connections: Option<u32>,
    /// Connection acquire timeout in seconds (default: 30).
    pub acquire_timeout_secs: Option<u64>,
    /// Idle timeout in seconds (default: 600).
    pub idle_timeout_secs: Option<u64>,
}

impl PoolSettings {
    /// Get max_connections with default value based on database type.
    pub fn max_connections_or_default(&self, is_sqlite: bool) -> u32 {
        self.max_connections.unwrap_or(if is_sqlite {
            DEFAULT_MAX_CONNECTIONS_SQLITE
        } else {
            DEFAULT_MAX_CONNECTIONS
        })
    }

    /// Get min_connections with default value.
    pub fn min_connections_or_default(&self) -> u32 {
        self.min_connections.unwrap_or(DEFAULT_MIN_CONNECTIONS)
    }

    /// Get acquire_timeout with default value.
    pub fn acquire_timeout_or_default(&self) -> Duration {
        Duration::from_secs(
            self.acquire_timeout_secs
                .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_SECS),
        )
    }

    /// Get idle_timeout with default value.
    pub fn idle_timeout_or_default(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS))
    }

    /// Validate pool settings and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(max) = self.max_connections {
            if max == 0 {
                return Err("max_connections must be greater than 0".to_string());
            }
        }
        if let Some(min) = self.min_connections {
            if let Some(max) = self.max_connections {
                if min > max {
                    return Err(format!(
                        "min_connections ({}) cannot exceed max_connections ({})",
                        min, max
                    ));
                }
            }
        }
        Ok(())
    }
}
