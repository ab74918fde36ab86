//! INI serialization logic for converting `ConfigFile` → INI string.
//!
//! Produces the commented representation written to `config.ini`.

use std::path::Path;

use super::settings::ConfigFile;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let max_concurrent = config.orchestrator.max_concurrent.unwrap_or(0);
    let url = config.wordlist.url.as_deref().unwrap_or("");
    let sha256 = config.wordlist.sha256.as_deref().unwrap_or("");

    format!(
        r#"[orchestrator]
; Maximum number of units running at once (0 = CPU count minus reserved_cores)
max_concurrent = {}
; Cores left free when max_concurrent is derived automatically (default: 1)
reserved_cores = {}
; Interval between progress updates in milliseconds (default: 250, minimum: 10)
poll_interval_ms = {}

[logging]
; Log file, cleared at the start of every session
file = {}

[wordlist]
; Directory downloaded wordlists are stored in
directory = {}
; Default download URL for 'lockstep wordlist download'
url = {}
; Expected SHA-256 of the download (64 hex characters); empty skips verification
sha256 = {}

[keystore]
; Keystore used by 'lockstep estimate' when no --keystore or --keys is given
path = {}
"#,
        max_concurrent,
        config.orchestrator.reserved_cores,
        config.orchestrator.poll_interval_ms,
        path_to_string(&config.logging.file),
        path_to_string(&config.wordlist.directory),
        url,
        sha256,
        path_to_string(&config.keystore.path),
    )
}

/// Convert path to string, collapsing the home directory to ~.
pub(super) fn path_to_string(path: &Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(stripped) = path.strip_prefix(&home) {
            return format!("~/{}", stripped.display());
        }
    }
    path.display().to_string()
}
