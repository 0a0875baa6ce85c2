use std::env;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Scheduler configuration, from env vars or serde defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum number of concurrently off-loaded blocking action bodies.
    /// Bounds the `spawn_blocking` pool pressure a single scheduler can
    /// generate. 0 = auto (available parallelism).
    #[serde(default = "default_blocking_limit")]
    pub blocking_limit: usize,

    /// Log every action completion at info level instead of debug.
    /// Useful when following a measurement sequence interactively.
    #[serde(default)]
    pub verbose_actions: bool,
}

fn default_blocking_limit() -> usize {
    0
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            blocking_limit: default_blocking_limit(),
            verbose_actions: false,
        }
    }
}

impl SchedulerConfig {
    /// Build config from environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Self {
        Self {
            blocking_limit: env_usize("LABFLOW_BLOCKING_LIMIT", default_blocking_limit()),
            verbose_actions: env_or("LABFLOW_VERBOSE_ACTIONS", "false") == "true",
        }
    }

    /// Resolve the blocking off-load bound (0 means use available parallelism).
    pub fn resolved_blocking_limit(&self) -> usize {
        if self.blocking_limit == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.blocking_limit
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.blocking_limit, 0);
        assert!(!config.verbose_actions);
    }

    #[test]
    fn resolved_blocking_limit() {
        let mut config = SchedulerConfig::default();
        // 0 means auto-detect
        assert!(config.resolved_blocking_limit() > 0);

        config.blocking_limit = 8;
        assert_eq!(config.resolved_blocking_limit(), 8);
    }
}
