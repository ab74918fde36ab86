//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file.
//! These are pure data types with no parsing or serialization logic.

use std::path::PathBuf;

/// Complete application configuration loaded from config.ini.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub orchestrator: OrchestratorSettings,
    pub logging: LoggingSettings,
    pub wordlist: WordlistSettings,
    pub keystore: KeystoreSettings,
}

/// `[orchestrator]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorSettings {
    /// Ceiling on running units. `None` derives it from the CPU count.
    pub max_concurrent: Option<usize>,
    /// Cores subtracted from the CPU count when deriving the ceiling.
    pub reserved_cores: usize,
    /// Interval between progress reports.
    pub poll_interval_ms: u64,
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Log file, truncated at the start of every session.
    pub file: PathBuf,
}

/// `[wordlist]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordlistSettings {
    /// Where downloaded wordlists are stored.
    pub directory: PathBuf,
    /// Default download URL.
    pub url: Option<String>,
    /// Expected SHA-256 of the default download, hex encoded.
    pub sha256: Option<String>,
}

/// `[keystore]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeystoreSettings {
    pub path: PathBuf,
}
