//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This is the single place where INI key names are mapped to struct fields.

use ini::Ini;
use std::path::PathBuf;

use super::defaults::MIN_POLL_INTERVAL_MS;
use super::file::ConfigFileError;
use super::settings::ConfigFile;
use crate::digest::parse_hex;

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [orchestrator] section
    if let Some(section) = ini.section(Some("orchestrator")) {
        if let Some(v) = section.get("max_concurrent") {
            let v = v.trim();
            config.orchestrator.max_concurrent = if v.is_empty() {
                None
            } else {
                match v.parse::<usize>() {
                    Ok(0) => None,
                    Ok(n) => Some(n),
                    Err(_) => {
                        return Err(invalid(
                            "orchestrator",
                            "max_concurrent",
                            v,
                            "must be a non-negative integer (0 = auto)",
                        ))
                    }
                }
            };
        }
        if let Some(v) = section.get("reserved_cores") {
            config.orchestrator.reserved_cores = v.trim().parse().map_err(|_| {
                invalid(
                    "orchestrator",
                    "reserved_cores",
                    v,
                    "must be a non-negative integer",
                )
            })?;
        }
        if let Some(v) = section.get("poll_interval_ms") {
            let interval: u64 = v.trim().parse().map_err(|_| {
                invalid(
                    "orchestrator",
                    "poll_interval_ms",
                    v,
                    "must be a positive integer (milliseconds)",
                )
            })?;
            if interval < MIN_POLL_INTERVAL_MS {
                return Err(invalid(
                    "orchestrator",
                    "poll_interval_ms",
                    v,
                    &format!("must be at least {}", MIN_POLL_INTERVAL_MS),
                ));
            }
            config.orchestrator.poll_interval_ms = interval;
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.file = expand_tilde(v);
            }
        }
    }

    // [wordlist] section
    if let Some(section) = ini.section(Some("wordlist")) {
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if !v.is_empty() {
                config.wordlist.directory = expand_tilde(v);
            }
        }
        if let Some(v) = section.get("url") {
            let v = v.trim();
            if !v.is_empty() {
                if !(v.starts_with("http://") || v.starts_with("https://")) {
                    return Err(invalid(
                        "wordlist",
                        "url",
                        v,
                        "must start with 'http://' or 'https://'",
                    ));
                }
                config.wordlist.url = Some(v.to_string());
            }
        }
        if let Some(v) = section.get("sha256") {
            let v = v.trim();
            if !v.is_empty() {
                if parse_hex(v).map(|bytes| bytes.len()) != Some(32) {
                    return Err(invalid(
                        "wordlist",
                        "sha256",
                        v,
                        "must be 64 hexadecimal characters",
                    ));
                }
                config.wordlist.sha256 = Some(v.to_lowercase());
            }
        }
    }

    // [keystore] section
    if let Some(section) = ini.section(Some("keystore")) {
        if let Some(v) = section.get("path") {
            let v = v.trim();
            if !v.is_empty() {
                config.keystore.path = expand_tilde(v);
            }
        }
    }

    Ok(config)
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Expand ~ to home directory in paths.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
