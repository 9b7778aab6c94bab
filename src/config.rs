//! Reconciliation configuration.
//!
//! ## Environment
//!
//! - `TOPOLOGY_HISTORY_LEN`: generations to keep; `0` (default) disables
//!   versioning and reconciles rows in place
//! - `TOPOLOGY_FETCH_TIMEOUT_SECS`: fetch timeout (default: 5)
//! - `TOPOLOGY_LINK_KEY`: `directed` (default) or `undirected`

use std::time::Duration;

use crate::types::LinkKeyMode;

/// Default fetch timeout in seconds.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 5;

/// History retention and link identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HistoryConfig {
    /// Generations to keep. `0` means mutate-in-place with no per-pass rows.
    pub max_generations: usize,
    /// Link matching mode.
    pub link_key: LinkKeyMode,
}

impl HistoryConfig {
    /// Mutate-in-place mode.
    pub fn in_place() -> Self {
        Self::default()
    }

    /// Versioned mode keeping `max_generations` generations.
    ///
    /// `0` falls back to mutate-in-place.
    pub fn versioned(max_generations: usize) -> Self {
        Self {
            max_generations,
            ..Self::default()
        }
    }

    /// Set the link matching mode.
    pub fn with_link_key(mut self, mode: LinkKeyMode) -> Self {
        self.link_key = mode;
        self
    }

    /// True when every pass writes a fresh generation of rows.
    ///
    /// In this mode the diff baseline is always empty, so every element of
    /// the latest fetch is reported as added and `changed`/`removed` stay empty.
    pub fn is_versioned(&self) -> bool {
        self.max_generations > 0
    }

    /// Load from environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            max_generations: std::env::var("TOPOLOGY_HISTORY_LEN")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            link_key: std::env::var("TOPOLOGY_LINK_KEY")
                .ok()
                .and_then(|s| LinkKeyMode::from_str(&s))
                .unwrap_or_default(),
        }
    }
}

/// Configuration of the update cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdaterConfig {
    /// History retention and link identity.
    pub history: HistoryConfig,
    /// Upper bound on one fetch.
    pub fetch_timeout: Duration,
}

impl UpdaterConfig {
    /// Build with the default timeout.
    pub fn new(history: HistoryConfig) -> Self {
        Self {
            history,
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
        }
    }

    /// Override the fetch timeout.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Load configuration from environment variables with defaults.
    pub fn from_env() -> Self {
        let timeout_secs = std::env::var("TOPOLOGY_FETCH_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS);
        Self::new(HistoryConfig::from_env()).with_fetch_timeout(Duration::from_secs(timeout_secs))
    }
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self::new(HistoryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_history_is_in_place() {
        assert!(!HistoryConfig::versioned(0).is_versioned());
        assert!(HistoryConfig::versioned(3).is_versioned());
        assert_eq!(HistoryConfig::in_place(), HistoryConfig::default());
    }

    #[test]
    fn test_default_timeout() {
        assert_eq!(UpdaterConfig::default().fetch_timeout, Duration::from_secs(5));
        let config = UpdaterConfig::default().with_fetch_timeout(Duration::from_millis(50));
        assert_eq!(config.fetch_timeout, Duration::from_millis(50));
    }
}
