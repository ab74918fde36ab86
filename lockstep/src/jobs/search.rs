//! One shard of the crack-time search.
//!
//! A shard fixes the first byte of a 3-byte candidate and walks the
//! remaining 65 536 combinations, comparing each candidate's digest with the
//! reference. The loop runs on the blocking pool and checks its cancellation
//! token on every iteration, so cancelling the shared scope stops every
//! shard within one digest computation.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::digest::Digest;
use crate::executor::{
    checkpoint, HostCapability, Progress, Signal, StatusHandle, UnitCore, UnitError, UnitFuture,
    WorkUnit,
};

/// Candidates per shard.
pub const SHARD_SIZE: u32 = 1 << 16;

/// How often a shard refreshes its progress.
const PROGRESS_STRIDE: u32 = 4096;

/// Payload of the "verified" signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Verified {
    pub shard: u8,
    pub candidate: [u8; 3],
}

/// Searches the candidates whose first byte is `shard`.
pub struct ShardSearchJob {
    core: UnitCore,
    shard: u8,
    digest: Arc<dyn Digest>,
    reference: Arc<[u8]>,
    verified: Arc<Signal<Verified>>,
}

impl ShardSearchJob {
    pub fn new(
        shard: u8,
        digest: Arc<dyn Digest>,
        reference: Arc<[u8]>,
        verified: Arc<Signal<Verified>>,
    ) -> Self {
        Self {
            core: UnitCore::new(),
            shard,
            digest,
            reference,
            verified,
        }
    }

    pub fn shard(&self) -> u8 {
        self.shard
    }
}

impl WorkUnit for ShardSearchJob {
    fn name(&self) -> &str {
        "ShardSearch"
    }

    fn core(&self) -> &UnitCore {
        &self.core
    }

    fn run<'a>(&'a self, _host: &'a dyn HostCapability, cancel: CancellationToken) -> UnitFuture<'a> {
        Box::pin(async move {
            checkpoint(&cancel)?;

            let shard = self.shard;
            let digest = Arc::clone(&self.digest);
            let reference = Arc::clone(&self.reference);
            let status = self.core.status_handle();
            status.set_description(format!("shard {:#04x}", shard));

            let found = tokio::task::spawn_blocking(move || {
                search_shard(shard, digest.as_ref(), &reference, &cancel, &status)
            })
            .await
            .map_err(|e| UnitError::Panicked(e.to_string()))??;

            if let Some(candidate) = found {
                debug!(shard, ?candidate, "Shard verified candidate");
                self.verified.raise(Verified { shard, candidate });
            } else {
                trace!(shard, "Shard exhausted without a match");
            }
            Ok(true)
        })
    }
}

/// Walks one shard. Returns the first matching candidate, `None` if the
/// shard holds no match, or `Err(Cancelled)` once `cancel` fires.
fn search_shard(
    shard: u8,
    digest: &dyn Digest,
    reference: &[u8],
    cancel: &CancellationToken,
    status: &StatusHandle,
) -> Result<Option<[u8; 3]>, UnitError> {
    let mut candidate = [shard, 0, 0];
    for i in 0..SHARD_SIZE {
        checkpoint(cancel)?;

        candidate[1] = (i >> 8) as u8;
        candidate[2] = i as u8;
        if digest.matches(&candidate, reference) {
            status.set_progress(Progress::percent(100.0));
            return Ok(Some(candidate));
        }

        if i % PROGRESS_STRIDE == 0 {
            status.set_progress(Progress::fraction(i as u64, SHARD_SIZE as u64));
        }
    }
    status.set_progress(Progress::percent(100.0));
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::Sha256Digest;
    use crate::executor::UnitCore;

    fn status() -> StatusHandle {
        UnitCore::new().status_handle()
    }

    #[test]
    fn test_search_finds_candidate_in_its_shard() {
        let digest = Sha256Digest;
        let reference = digest.digest(&[9, 1, 2]);
        let found = search_shard(9, &digest, &reference, &CancellationToken::new(), &status());
        assert_eq!(found.unwrap(), Some([9, 1, 2]));
    }

    #[test]
    fn test_search_misses_other_shards() {
        let digest = Sha256Digest;
        let reference = digest.digest(&[9, 1, 2]);
        let found = search_shard(10, &digest, &reference, &CancellationToken::new(), &status());
        assert_eq!(found.unwrap(), None);
    }

    #[test]
    fn test_search_stops_when_cancelled() {
        let digest = Sha256Digest;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = search_shard(0, &digest, &[0u8; 32], &cancel, &status());
        assert!(matches!(result, Err(UnitError::Cancelled)));
    }
}
