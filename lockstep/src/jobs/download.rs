//! Wordlist download job.
//!
//! Bytes are written to `<dest>.part` and the part file is renamed into
//! place once the source is exhausted. A later run resumes from the part
//! file's length when the source honours the offset.

use std::ffi::OsString;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::executor::{
    checkpoint, handoff, HandoffReceiver, HandoffSender, HostCapability, HostCapabilityExt,
    HostRequest, Progress, UnitCore, UnitError, UnitFuture, WorkUnit,
};
use crate::wordlist::ChunkSource;

use super::error::JobError;

/// Asks whoever drives the run whether an existing file may be replaced.
#[derive(Debug, Clone)]
pub struct ConfirmOverwrite {
    pub path: PathBuf,
}

impl HostRequest for ConfirmOverwrite {
    type Response = bool;
    const NAME: &'static str = "confirm-overwrite";
}

/// A finished download.
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub path: PathBuf,
    pub bytes: u64,
    /// Bytes taken from an earlier partial download.
    pub resumed_from: u64,
}

/// Downloads a wordlist from a [`ChunkSource`].
pub struct DownloadWordlistJob {
    core: UnitCore,
    source: Arc<dyn ChunkSource>,
    dest: PathBuf,
    overwrite: bool,
    output: HandoffSender<DownloadedFile>,
}

impl DownloadWordlistJob {
    pub fn new(source: Arc<dyn ChunkSource>, dest: impl Into<PathBuf>) -> Self {
        let (output, _) = handoff("downloaded wordlist");
        Self {
            core: UnitCore::new(),
            source,
            dest: dest.into(),
            overwrite: false,
            output,
        }
    }

    /// Replaces an existing destination without asking.
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Attaches the unit that runs once the download completes.
    pub fn then(mut self, next: Arc<dyn WorkUnit>) -> Self {
        self.core = self.core.with_continuation(next);
        self
    }

    pub fn output(&self) -> HandoffReceiver<DownloadedFile> {
        self.output.receiver()
    }

    /// Decides whether an existing destination may be replaced. Hosts that
    /// cannot ask fall back to refusing.
    async fn may_replace(&self, host: &dyn HostCapability) -> Result<bool, UnitError> {
        if self.overwrite {
            return Ok(true);
        }
        let request = ConfirmOverwrite {
            path: self.dest.clone(),
        };
        match host.request(request).await {
            Ok(answer) => Ok(answer),
            Err(e) if e.is_not_supported() => {
                debug!(path = %self.dest.display(), "Host cannot confirm overwrite");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// `<dest>.part`.
pub fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("download"));
    name.push(".part");
    dest.with_file_name(name)
}

impl WorkUnit for DownloadWordlistJob {
    fn name(&self) -> &str {
        "DownloadWordlist"
    }

    fn core(&self) -> &UnitCore {
        &self.core
    }

    fn run<'a>(&'a self, host: &'a dyn HostCapability, cancel: CancellationToken) -> UnitFuture<'a> {
        Box::pin(async move {
            checkpoint(&cancel)?;

            if tokio::fs::try_exists(&self.dest).await? && !self.may_replace(host).await? {
                return Err(JobError::DestinationExists {
                    path: self.dest.clone(),
                }
                .into());
            }
            if let Some(parent) = self.dest.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }

            let part = part_path(&self.dest);
            let existing = match tokio::fs::metadata(&part).await {
                Ok(meta) => meta.len(),
                Err(_) => 0,
            };

            self.core
                .set_description(format!("connecting to {}", self.source.describe()));
            let stream = tokio::select! {
                _ = cancel.cancelled() => return Err(UnitError::Cancelled),
                result = self.source.open(existing) => result.map_err(JobError::from)?,
            };
            if existing > 0 {
                debug!(
                    requested = existing,
                    granted = stream.offset,
                    "Resuming partial download"
                );
            }

            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(false)
                .open(&part)
                .await?;
            file.set_len(stream.offset).await?;
            file.seek(SeekFrom::Start(stream.offset)).await?;

            let resumed_from = stream.offset;
            let mut written = resumed_from;
            let total = stream.total_len;
            let mut chunks = stream.chunks;
            self.core
                .set_description(format!("downloading {}", self.source.describe()));

            loop {
                let chunk = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        file.flush().await?;
                        debug!(written, part = %part.display(), "Download cancelled, keeping part file");
                        return Err(UnitError::Cancelled);
                    }
                    chunk = chunks.next() => chunk,
                };
                let Some(chunk) = chunk else {
                    break;
                };
                let chunk = chunk.map_err(JobError::from)?;
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
                match total {
                    Some(total) => self.core.set_progress(Progress::fraction(written, total)),
                    None => self.core.set_progress(Progress::Indeterminate),
                }
            }

            file.flush().await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&part, &self.dest).await?;

            info!(
                path = %self.dest.display(),
                bytes = written,
                resumed_from,
                "Wordlist downloaded"
            );
            self.core.set_progress(Progress::percent(100.0));
            self.core
                .set_description(format!("saved {} bytes to {}", written, self.dest.display()));
            let _ = self.output.publish(DownloadedFile {
                path: self.dest.clone(),
                bytes: written,
                resumed_from,
            });
            Ok(true)
        })
    }
}
