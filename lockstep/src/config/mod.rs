//! User configuration for lockstep.
//!
//! Settings live in `~/.lockstep/config.ini`. Loading starts from the
//! defaults and overlays whatever the file provides; unknown sections and
//! keys are ignored so older binaries can read newer files.
//!
//! # Example
//!
//! ```ignore
//! use lockstep::config::{ConfigFile, ConfigKey};
//!
//! let mut config = ConfigFile::load()?;
//! ConfigKey::OrchestratorMaxConcurrent.set(&mut config, "4")?;
//! config.save()?;
//! ```

mod defaults;
mod file;
mod keys;
mod parser;
mod settings;
mod writer;

pub use defaults::*;
pub use file::{config_directory, config_file_path, ConfigFile, ConfigFileError};
pub use keys::{ConfigKey, ConfigKeyError};
pub use settings::{
    KeystoreSettings, LoggingSettings, OrchestratorSettings, WordlistSettings,
};
