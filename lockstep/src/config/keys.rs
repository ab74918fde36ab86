//! Configuration key access and validation.
//!
//! A type-safe interface for getting and setting configuration values by
//! `section.key` name, with validation via value specifications.

use std::str::FromStr;
use thiserror::Error;

use super::defaults::MIN_POLL_INTERVAL_MS;
use super::file::ConfigFile;
use super::parser::expand_tilde;
use super::writer::path_to_string;
use crate::digest::parse_hex;

/// Errors that can occur when getting or setting configuration values.
#[derive(Debug, Error)]
pub enum ConfigKeyError {
    #[error("Unknown configuration key '{0}'")]
    UnknownKey(String),

    #[error("Invalid value for {key}: {reason}")]
    ValidationFailed { key: String, reason: String },
}

/// Supported configuration keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    OrchestratorMaxConcurrent,
    OrchestratorReservedCores,
    OrchestratorPollIntervalMs,
    LoggingFile,
    WordlistDirectory,
    WordlistUrl,
    WordlistSha256,
    KeystorePath,
}

impl FromStr for ConfigKey {
    type Err = ConfigKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        ConfigKey::all()
            .iter()
            .copied()
            .find(|key| key.name() == lower)
            .ok_or_else(|| ConfigKeyError::UnknownKey(s.to_string()))
    }
}

impl ConfigKey {
    /// Canonical key name, e.g. `orchestrator.max_concurrent`.
    pub fn name(&self) -> &'static str {
        match self {
            ConfigKey::OrchestratorMaxConcurrent => "orchestrator.max_concurrent",
            ConfigKey::OrchestratorReservedCores => "orchestrator.reserved_cores",
            ConfigKey::OrchestratorPollIntervalMs => "orchestrator.poll_interval_ms",
            ConfigKey::LoggingFile => "logging.file",
            ConfigKey::WordlistDirectory => "wordlist.directory",
            ConfigKey::WordlistUrl => "wordlist.url",
            ConfigKey::WordlistSha256 => "wordlist.sha256",
            ConfigKey::KeystorePath => "keystore.path",
        }
    }

    pub fn section(&self) -> &'static str {
        self.name().split('.').next().unwrap_or(self.name())
    }

    pub fn key_name(&self) -> &'static str {
        self.name().split('.').nth(1).unwrap_or(self.name())
    }

    /// Get the value from a config file as a string.
    pub fn get(&self, config: &ConfigFile) -> String {
        match self {
            ConfigKey::OrchestratorMaxConcurrent => config
                .orchestrator
                .max_concurrent
                .unwrap_or(0)
                .to_string(),
            ConfigKey::OrchestratorReservedCores => config.orchestrator.reserved_cores.to_string(),
            ConfigKey::OrchestratorPollIntervalMs => {
                config.orchestrator.poll_interval_ms.to_string()
            }
            ConfigKey::LoggingFile => path_to_string(&config.logging.file),
            ConfigKey::WordlistDirectory => path_to_string(&config.wordlist.directory),
            ConfigKey::WordlistUrl => config.wordlist.url.clone().unwrap_or_default(),
            ConfigKey::WordlistSha256 => config.wordlist.sha256.clone().unwrap_or_default(),
            ConfigKey::KeystorePath => path_to_string(&config.keystore.path),
        }
    }

    /// Set the value in a config file after validating it.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigKeyError> {
        self.validate(value)?;
        let value = value.trim();
        match self {
            ConfigKey::OrchestratorMaxConcurrent => {
                config.orchestrator.max_concurrent = match self.parse_u64(value)? {
                    0 => None,
                    n => Some(n as usize),
                };
            }
            ConfigKey::OrchestratorReservedCores => {
                config.orchestrator.reserved_cores = self.parse_u64(value)? as usize;
            }
            ConfigKey::OrchestratorPollIntervalMs => {
                config.orchestrator.poll_interval_ms = self.parse_u64(value)?;
            }
            ConfigKey::LoggingFile => config.logging.file = expand_tilde(value),
            ConfigKey::WordlistDirectory => config.wordlist.directory = expand_tilde(value),
            ConfigKey::WordlistUrl => config.wordlist.url = optional_string(value),
            ConfigKey::WordlistSha256 => {
                config.wordlist.sha256 = optional_string(value).map(|v| v.to_lowercase());
            }
            ConfigKey::KeystorePath => config.keystore.path = expand_tilde(value),
        }
        Ok(())
    }

    /// Validate a value according to this key's specification.
    pub fn validate(&self, value: &str) -> Result<(), ConfigKeyError> {
        self.specification()
            .is_satisfied_by(value.trim())
            .map_err(|reason| ConfigKeyError::ValidationFailed {
                key: self.name().to_string(),
                reason,
            })
    }

    fn specification(&self) -> Box<dyn ValueSpecification> {
        match self {
            ConfigKey::OrchestratorMaxConcurrent => Box::new(IntegerSpec { min: 0 }),
            ConfigKey::OrchestratorReservedCores => Box::new(IntegerSpec { min: 0 }),
            ConfigKey::OrchestratorPollIntervalMs => Box::new(IntegerSpec {
                min: MIN_POLL_INTERVAL_MS,
            }),
            ConfigKey::LoggingFile | ConfigKey::WordlistDirectory | ConfigKey::KeystorePath => {
                Box::new(PathSpec)
            }
            ConfigKey::WordlistUrl => Box::new(OptionalUrlSpec),
            ConfigKey::WordlistSha256 => Box::new(OptionalDigestSpec { len: 32 }),
        }
    }

    fn parse_u64(&self, value: &str) -> Result<u64, ConfigKeyError> {
        value.parse().map_err(|_| ConfigKeyError::ValidationFailed {
            key: self.name().to_string(),
            reason: "must be an integer".to_string(),
        })
    }

    /// Get all supported configuration keys.
    pub fn all() -> &'static [ConfigKey] {
        &[
            ConfigKey::OrchestratorMaxConcurrent,
            ConfigKey::OrchestratorReservedCores,
            ConfigKey::OrchestratorPollIntervalMs,
            ConfigKey::LoggingFile,
            ConfigKey::WordlistDirectory,
            ConfigKey::WordlistUrl,
            ConfigKey::WordlistSha256,
            ConfigKey::KeystorePath,
        ]
    }
}

fn optional_string(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

// ============================================================================
// Value Specifications
// ============================================================================

trait ValueSpecification {
    /// Returns Ok(()) if valid, Err(reason) if invalid.
    fn is_satisfied_by(&self, value: &str) -> Result<(), String>;
}

/// Integer at or above a floor.
struct IntegerSpec {
    min: u64,
}

impl ValueSpecification for IntegerSpec {
    fn is_satisfied_by(&self, value: &str) -> Result<(), String> {
        match value.parse::<u64>() {
            Ok(n) if n >= self.min => Ok(()),
            Ok(_) => Err(format!("must be at least {}", self.min)),
            Err(_) => Err("must be a non-negative integer".to_string()),
        }
    }
}

/// Non-empty path.
struct PathSpec;

impl ValueSpecification for PathSpec {
    fn is_satisfied_by(&self, value: &str) -> Result<(), String> {
        if value.is_empty() {
            Err("must be a valid path".to_string())
        } else {
            Ok(())
        }
    }
}

/// Empty, or an http(s) URL.
struct OptionalUrlSpec;

impl ValueSpecification for OptionalUrlSpec {
    fn is_satisfied_by(&self, value: &str) -> Result<(), String> {
        if value.is_empty() || value.starts_with("http://") || value.starts_with("https://") {
            Ok(())
        } else {
            Err("must be a URL starting with 'http://' or 'https://'".to_string())
        }
    }
}

/// Empty, or a hex digest of `len` bytes.
struct OptionalDigestSpec {
    len: usize,
}

impl ValueSpecification for OptionalDigestSpec {
    fn is_satisfied_by(&self, value: &str) -> Result<(), String> {
        if value.is_empty() || parse_hex(value).map(|b| b.len()) == Some(self.len) {
            Ok(())
        } else {
            Err(format!("must be {} hexadecimal characters", self.len * 2))
        }
    }
}
