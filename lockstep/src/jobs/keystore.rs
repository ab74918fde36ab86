//! Keystore load job.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::executor::{
    checkpoint, handoff, HandoffReceiver, HandoffSender, HostCapability, Progress, UnitCore,
    UnitError, UnitFuture, WorkUnit,
};
use crate::keystore::{KeystoreLoader, LoadedKeystore};

use super::error::JobError;

/// Loads a keystore and hands it to whatever runs next.
///
/// The usual successor is a [`CrackEstimateJob`](super::CrackEstimateJob)
/// reading the key count:
///
/// ```ignore
/// let load = LoadKeystoreJob::new(loader, path);
/// let estimate = Arc::new(CrackEstimateJob::new(KeySource::Keystore(load.output())));
/// let load = load.then(estimate.clone());
/// host.launch(Arc::new(load))?;
/// ```
pub struct LoadKeystoreJob<L: KeystoreLoader> {
    core: UnitCore,
    loader: Arc<L>,
    path: PathBuf,
    output: HandoffSender<LoadedKeystore>,
}

impl<L: KeystoreLoader> LoadKeystoreJob<L> {
    pub fn new(loader: Arc<L>, path: impl Into<PathBuf>) -> Self {
        let (output, _) = handoff("keystore");
        Self {
            core: UnitCore::new(),
            loader,
            path: path.into(),
            output,
        }
    }

    /// Attaches the unit that runs once the keystore is loaded.
    pub fn then(mut self, next: Arc<dyn WorkUnit>) -> Self {
        self.core = self.core.with_continuation(next);
        self
    }

    /// Receiver for the loaded keystore.
    pub fn output(&self) -> HandoffReceiver<LoadedKeystore> {
        self.output.receiver()
    }
}

impl<L: KeystoreLoader> WorkUnit for LoadKeystoreJob<L> {
    fn name(&self) -> &str {
        "LoadKeystore"
    }

    fn core(&self) -> &UnitCore {
        &self.core
    }

    fn run<'a>(&'a self, _host: &'a dyn HostCapability, cancel: CancellationToken) -> UnitFuture<'a> {
        Box::pin(async move {
            checkpoint(&cancel)?;
            self.core
                .set_description(format!("loading {}", self.path.display()));

            let loaded = tokio::select! {
                _ = cancel.cancelled() => return Err(UnitError::Cancelled),
                result = self.loader.load(&self.path) => result.map_err(JobError::from)?,
            };

            info!(
                path = %loaded.path.display(),
                key_count = loaded.key_count,
                fingerprint = %loaded.fingerprint_hex(),
                "Keystore ready"
            );
            self.core.set_description(format!(
                "{} key(s), fingerprint {}",
                loaded.key_count,
                loaded.fingerprint_hex()
            ));
            self.core.set_progress(Progress::percent(100.0));
            let _ = self.output.publish(loaded);
            Ok(true)
        })
    }
}
