//! Orchestrator configuration.
//!
//! This module contains [`OrchestratorConfig`] and the default concurrency
//! calculation.

use std::time::Duration;

// =============================================================================
// Configuration Constants
// =============================================================================

/// Fallback CPU count when detection fails.
pub const FALLBACK_CPU_COUNT: usize = 4;

/// Cores left for the runtime, the UI and the rest of the system.
pub const DEFAULT_RESERVED_CORES: usize = 1;

/// Default interval between progress reports from the root host.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;

/// Computes the default ceiling on running units.
///
/// Formula: `max(available_parallelism - reserved, 1)`.
pub fn default_max_concurrent(reserved_cores: usize) -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(FALLBACK_CPU_COUNT);
    cpus.saturating_sub(reserved_cores).max(1)
}

// =============================================================================
// Orchestrator Configuration
// =============================================================================

/// Configuration for an [`Orchestrator`](super::Orchestrator).
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Maximum number of units holding a run slot at once. Always >= 1.
    pub max_concurrent: usize,

    /// Interval between progress reports from the root host.
    pub poll_interval: Duration,
}

impl OrchestratorConfig {
    /// Config with an explicit concurrency ceiling. Zero is raised to one.
    pub fn with_max_concurrent(max_concurrent: usize) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            ..Self::default()
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(DEFAULT_RESERVED_CORES),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

impl From<&crate::config::OrchestratorSettings> for OrchestratorConfig {
    fn from(settings: &crate::config::OrchestratorSettings) -> Self {
        let max_concurrent = settings
            .max_concurrent
            .unwrap_or_else(|| default_max_concurrent(settings.reserved_cores));
        Self {
            max_concurrent: max_concurrent.max(1),
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrchestratorSettings;

    #[test]
    fn test_default_is_at_least_one() {
        assert!(default_max_concurrent(0) >= 1);
        assert_eq!(default_max_concurrent(usize::MAX), 1);
    }

    #[test]
    fn test_explicit_zero_is_raised() {
        assert_eq!(OrchestratorConfig::with_max_concurrent(0).max_concurrent, 1);
    }

    #[test]
    fn test_from_settings() {
        let settings = OrchestratorSettings {
            max_concurrent: Some(3),
            reserved_cores: 1,
            poll_interval_ms: 100,
        };
        let config = OrchestratorConfig::from(&settings);
        assert_eq!(config.max_concurrent, 3);
        assert_eq!(config.poll_interval, Duration::from_millis(100));

        let auto = OrchestratorConfig::from(&OrchestratorSettings {
            max_concurrent: None,
            ..settings
        });
        assert_eq!(auto.max_concurrent, default_max_concurrent(1));
    }
}
