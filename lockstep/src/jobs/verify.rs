//! Digest verification job.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::digest::{to_hex, Digest, Sha256Digest};
use crate::executor::{
    checkpoint, HandoffReceiver, HostCapability, Progress, UnitCore, UnitError, UnitFuture,
    WorkUnit,
};
use crate::wordlist::transfer::FILE_CHUNK_SIZE;

use super::download::DownloadedFile;
use super::error::JobError;

/// File to verify: known up front, or produced by a predecessor.
#[derive(Debug, Clone)]
pub enum VerifyTarget {
    Path(PathBuf),
    Download(HandoffReceiver<DownloadedFile>),
}

/// Checks a file against an expected digest, reading it in chunks so it
/// can be cancelled and report progress.
pub struct VerifyDigestJob {
    core: UnitCore,
    target: VerifyTarget,
    expected: Vec<u8>,
    digest: Arc<dyn Digest>,
}

impl VerifyDigestJob {
    pub fn new(target: VerifyTarget, expected: Vec<u8>) -> Self {
        Self {
            core: UnitCore::new(),
            target,
            expected,
            digest: Arc::new(Sha256Digest),
        }
    }

    pub fn with_digest(mut self, digest: Arc<dyn Digest>) -> Self {
        self.digest = digest;
        self
    }

    fn path(&self) -> Result<PathBuf, UnitError> {
        match &self.target {
            VerifyTarget::Path(path) => Ok(path.clone()),
            VerifyTarget::Download(download) => Ok(download.require()?.path.clone()),
        }
    }
}

impl WorkUnit for VerifyDigestJob {
    fn name(&self) -> &str {
        "VerifyDigest"
    }

    fn core(&self) -> &UnitCore {
        &self.core
    }

    fn run<'a>(&'a self, _host: &'a dyn HostCapability, cancel: CancellationToken) -> UnitFuture<'a> {
        Box::pin(async move {
            let path = self.path()?;
            self.core
                .set_description(format!("verifying {}", path.display()));

            let mut file = tokio::fs::File::open(&path).await?;
            let total = file.metadata().await?.len();
            let mut state = self.digest.start();
            let mut buf = vec![0u8; FILE_CHUNK_SIZE];
            let mut read = 0u64;

            loop {
                checkpoint(&cancel)?;
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                state.update(&buf[..n]);
                read += n as u64;
                self.core.set_progress(Progress::fraction(read, total));
            }

            let actual = state.finalize();
            if actual != self.expected {
                warn!(
                    path = %path.display(),
                    expected = %to_hex(&self.expected),
                    actual = %to_hex(&actual),
                    "Digest mismatch"
                );
                return Err(JobError::DigestMismatch {
                    path,
                    expected: to_hex(&self.expected),
                    actual: to_hex(&actual),
                }
                .into());
            }

            info!(path = %path.display(), digest = self.digest.name(), "Digest verified");
            self.core.set_progress(Progress::percent(100.0));
            self.core.set_description(format!(
                "{} {} ok",
                self.digest.name(),
                to_hex(&actual)
            ));
            Ok(true)
        })
    }
}
