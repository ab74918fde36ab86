//! `lockstep estimate`: extrapolated time to brute-force a keystore.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use console::style;
use lockstep::executor::WorkUnit;
use lockstep::jobs::{group_thousands, CrackEstimateJob, KeySource, LoadKeystoreJob};
use lockstep::keystore::FileKeystoreLoader;

use super::common::settle;
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the estimate command.
#[derive(Debug, Args)]
pub struct EstimateArgs {
    /// Keystore whose key count scales the estimate (default: keystore.path)
    #[arg(long, conflicts_with = "keys")]
    pub keystore: Option<PathBuf>,

    /// Use a fixed key count instead of loading a keystore
    #[arg(long)]
    pub keys: Option<u64>,
}

pub async fn run(runner: &CliRunner, args: EstimateArgs) -> Result<(), CliError> {
    runner.log_startup("estimate");
    let root = runner.root_host();

    let (units, output): (Vec<Arc<dyn WorkUnit>>, _) = match args.keys {
        Some(0) => return Err(CliError::Usage("--keys must be at least 1".to_string())),
        Some(keys) => {
            let estimate = Arc::new(CrackEstimateJob::new(KeySource::Fixed(keys)));
            let output = estimate.output();
            root.launch(estimate.clone())?;
            (vec![estimate as Arc<dyn WorkUnit>], output)
        }
        None => {
            let path = args
                .keystore
                .unwrap_or_else(|| runner.config().keystore.path.clone());
            let loader = Arc::new(FileKeystoreLoader::default());
            let load = LoadKeystoreJob::new(loader, path);
            let estimate = Arc::new(CrackEstimateJob::new(KeySource::Keystore(load.output())));
            let output = estimate.output();
            let load = Arc::new(load.then(estimate.clone()));
            root.launch(load.clone())?;
            (vec![load as Arc<dyn WorkUnit>, estimate as Arc<dyn WorkUnit>], output)
        }
    };

    runner.drive(&root).await?;
    settle(&units)?;

    let estimate = output.require().map_err(|e| CliError::UnitFailed {
        unit: "CrackEstimate".to_string(),
        error: Arc::new(e),
    })?;

    println!(
        "Sample key {:02x}{:02x}{:02x} found in shard {:#04x} after {:.3}s",
        estimate.winner.candidate[0],
        estimate.winner.candidate[1],
        estimate.winner.candidate[2],
        estimate.winner.shard,
        estimate.elapsed.as_secs_f64()
    );
    println!(
        "Estimated time to crack {} key(s): {} years",
        estimate.key_count,
        style(group_thousands(estimate.years)).bold()
    );
    Ok(())
}
