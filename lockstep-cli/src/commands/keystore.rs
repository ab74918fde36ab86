//! `lockstep keystore`: keystore inspection.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Subcommand;
use console::style;
use lockstep::executor::WorkUnit;
use lockstep::jobs::LoadKeystoreJob;
use lockstep::keystore::FileKeystoreLoader;

use super::common::settle;
use crate::error::CliError;
use crate::runner::CliRunner;

/// Keystore subcommands.
#[derive(Debug, Subcommand)]
pub enum KeystoreCommands {
    /// Show the key count and fingerprint of a keystore
    Info {
        /// Keystore file (default: keystore.path)
        path: Option<PathBuf>,
    },
}

pub async fn run(runner: &CliRunner, command: KeystoreCommands) -> Result<(), CliError> {
    match command {
        KeystoreCommands::Info { path } => run_info(runner, path).await,
    }
}

async fn run_info(runner: &CliRunner, path: Option<PathBuf>) -> Result<(), CliError> {
    runner.log_startup("keystore info");
    let path = path.unwrap_or_else(|| runner.config().keystore.path.clone());

    let root = runner.root_host();
    let load = Arc::new(LoadKeystoreJob::new(
        Arc::new(FileKeystoreLoader::default()),
        path,
    ));
    let output = load.output();
    root.launch(load.clone())?;

    runner.drive(&root).await?;
    settle(&[load as Arc<dyn WorkUnit>])?;

    let loaded = output.require().map_err(|e| CliError::UnitFailed {
        unit: "LoadKeystore".to_string(),
        error: Arc::new(e),
    })?;

    println!("{}", style("Keystore").bold());
    println!("  Path:        {}", loaded.path.display());
    println!("  Size:        {} bytes", loaded.keystore.len());
    println!("  Keys:        {}", loaded.key_count);
    println!("  Fingerprint: {}", loaded.fingerprint_hex());
    Ok(())
}
