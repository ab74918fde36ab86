//! Default values for all configuration settings.

use std::path::PathBuf;

use super::file::config_directory;
use super::settings::*;
use crate::executor::{DEFAULT_POLL_INTERVAL_MS, DEFAULT_RESERVED_CORES};

/// Smallest accepted poll interval.
pub const MIN_POLL_INTERVAL_MS: u64 = 10;

pub const DEFAULT_LOG_FILE_NAME: &str = "lockstep.log";

pub const DEFAULT_WORDLIST_DIR_NAME: &str = "wordlists";

pub const DEFAULT_KEYSTORE_FILE_NAME: &str = "keystore.bin";

/// Default log file (`~/.lockstep/lockstep.log`).
pub fn default_log_file() -> PathBuf {
    config_directory().join(DEFAULT_LOG_FILE_NAME)
}

/// Default wordlist directory (`~/.lockstep/wordlists`).
pub fn default_wordlist_directory() -> PathBuf {
    config_directory().join(DEFAULT_WORDLIST_DIR_NAME)
}

/// Default keystore (`~/.lockstep/keystore.bin`).
pub fn default_keystore_path() -> PathBuf {
    config_directory().join(DEFAULT_KEYSTORE_FILE_NAME)
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_concurrent: None,
            reserved_cores: DEFAULT_RESERVED_CORES,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            file: default_log_file(),
        }
    }
}

impl Default for WordlistSettings {
    fn default() -> Self {
        Self {
            directory: default_wordlist_directory(),
            url: None,
            sha256: None,
        }
    }
}

impl Default for KeystoreSettings {
    fn default() -> Self {
        Self {
            path: default_keystore_path(),
        }
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            orchestrator: OrchestratorSettings::default(),
            logging: LoggingSettings::default(),
            wordlist: WordlistSettings::default(),
            keystore: KeystoreSettings::default(),
        }
    }
}
