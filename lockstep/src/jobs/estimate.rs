//! Crack-time estimator.
//!
//! [`CrackEstimateJob`] measures how long this machine takes to brute-force
//! a 3-byte sample and extrapolates to a full key:
//!
//! 1. Digest the sample to get the reference.
//! 2. Open a cancellation scope and submit one [`ShardSearchJob`] per value
//!    of the first byte (256 children, auto-started, kept after finishing).
//! 3. Wait for the children while listening on the "verified" signal. The
//!    first hit stops the clock, records the winner and cancels the scope;
//!    a compare-and-swap latch makes that sequence run exactly once.
//! 4. Scale the elapsed time by `2^32 / 2^3` and by the number of stored
//!    keys, and express it in years.
//!
//! A search that ends without a hit is a failure, never a time.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::digest::{Digest, Sha256Digest};
use crate::executor::{
    checkpoint, handoff, CancellationScope, FoundLatch, HandoffReceiver, HandoffSender,
    HostCapability, Progress, Signal, Stopwatch, SubmitOptions, UnitCore, UnitError, UnitFuture,
    WorkUnit,
};
use crate::keystore::LoadedKeystore;

use super::error::JobError;
use super::search::{ShardSearchJob, Verified};

/// Sample whose digest the search has to reproduce.
pub const DEFAULT_SAMPLE: [u8; 3] = [127, 255, 255];

/// One shard per value of the first byte.
pub const SHARD_COUNT: usize = 256;

/// Ratio between a 32-byte keyspace and the measured 3-byte one.
pub const KEYSPACE_SCALE: f64 = (1u64 << 32) as f64 / (1u64 << 3) as f64;

pub const SECONDS_PER_YEAR: f64 = 365.25 * 24.0 * 60.0 * 60.0;

/// Where the number of keys to extrapolate over comes from.
#[derive(Debug, Clone)]
pub enum KeySource {
    Fixed(u64),
    /// Read from a keystore loaded by a predecessor unit.
    Keystore(HandoffReceiver<LoadedKeystore>),
}

/// Result of a successful estimate.
#[derive(Debug, Clone)]
pub struct CrackEstimate {
    pub winner: Verified,
    /// Time the sample search took.
    pub elapsed: Duration,
    pub key_count: u64,
    /// Extrapolated time to break every key.
    pub seconds: f64,
    pub years: f64,
}

impl CrackEstimate {
    fn new(winner: Verified, elapsed: Duration, key_count: u64) -> Self {
        let seconds = elapsed.as_secs_f64() * KEYSPACE_SCALE * key_count as f64;
        Self {
            winner,
            elapsed,
            key_count,
            seconds,
            years: seconds / SECONDS_PER_YEAR,
        }
    }
}

impl fmt::Display for CrackEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} years for {} key(s) (sample searched in {:.3}s)",
            group_thousands(self.years),
            self.key_count,
            self.elapsed.as_secs_f64()
        )
    }
}

/// Formats a non-negative number rounded to an integer with `,` separators.
pub fn group_thousands(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let digits = format!("{:.0}", value.max(0.0));
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Coordinates the 256-shard search.
pub struct CrackEstimateJob {
    core: UnitCore,
    sample: [u8; 3],
    digest: Arc<dyn Digest>,
    keys: KeySource,
    verified: Arc<Signal<Verified>>,
    latch: FoundLatch,
    output: HandoffSender<CrackEstimate>,
}

impl CrackEstimateJob {
    pub fn new(keys: KeySource) -> Self {
        let (output, _) = handoff("crack estimate");
        Self {
            core: UnitCore::new(),
            sample: DEFAULT_SAMPLE,
            digest: Arc::new(Sha256Digest),
            keys,
            verified: Arc::new(Signal::new("verified")),
            latch: FoundLatch::new(),
            output,
        }
    }

    pub fn with_digest(mut self, digest: Arc<dyn Digest>) -> Self {
        self.digest = digest;
        self
    }

    pub fn with_sample(mut self, sample: [u8; 3]) -> Self {
        self.sample = sample;
        self
    }

    /// Receiver for the estimate, populated before the job completes.
    pub fn output(&self) -> HandoffReceiver<CrackEstimate> {
        self.output.receiver()
    }

    /// The signal raised by shards that reproduce the sample.
    pub fn verified_signal(&self) -> Arc<Signal<Verified>> {
        Arc::clone(&self.verified)
    }

    fn key_count(&self) -> Result<u64, UnitError> {
        let count = match &self.keys {
            KeySource::Fixed(count) => *count,
            KeySource::Keystore(loaded) => loaded.require()?.key_count,
        };
        if count == 0 {
            return Err(JobError::InvalidInput("no keys to estimate for".to_string()).into());
        }
        Ok(count)
    }

    /// Handles one "verified" payload. Only the first caller stops the
    /// clock and cancels the siblings.
    fn on_verified(
        &self,
        hit: Verified,
        clock: &Stopwatch,
        host: &dyn HostCapability,
        scope: &CancellationScope,
        winner: &mut Option<Verified>,
    ) -> Result<(), UnitError> {
        if !self.latch.try_claim() {
            debug!(shard = hit.shard, "Ignoring late verified signal");
            return Ok(());
        }
        let elapsed = clock.stop();
        *winner = Some(hit);
        info!(
            shard = hit.shard,
            elapsed_ms = elapsed.as_millis() as u64,
            "Sample reproduced, cancelling remaining shards"
        );
        host.cancel_scope(scope)?;
        Ok(())
    }

    /// Submits every shard into `scope` and waits for all of them. Returns
    /// the first shard to reproduce the sample, if any.
    async fn search(
        &self,
        host: &dyn HostCapability,
        cancel: &CancellationToken,
        reference: &Arc<[u8]>,
        scope: &CancellationScope,
        clock: &Stopwatch,
    ) -> Result<Option<Verified>, UnitError> {
        let mut hits = self.verified.subscribe();

        self.core.set_description("submitting shards");
        for shard in 0..SHARD_COUNT {
            checkpoint(cancel)?;
            let child = ShardSearchJob::new(
                shard as u8,
                Arc::clone(&self.digest),
                Arc::clone(reference),
                Arc::clone(&self.verified),
            );
            host.submit_child(
                Arc::new(child),
                SubmitOptions::new(false, true).in_scope(scope.clone()),
            )?;
        }
        self.core
            .set_description(format!("searching {} shards", SHARD_COUNT));

        let mut winner = None;
        {
            let join = host.join_children();
            tokio::pin!(join);
            loop {
                tokio::select! {
                    result = &mut join => {
                        result?;
                        break;
                    }
                    Some(hit) = hits.recv() => {
                        self.on_verified(hit, clock, host, scope, &mut winner)?;
                    }
                }
            }
        }
        // Hits raised just before the last shard finished.
        while let Some(hit) = hits.try_recv() {
            self.on_verified(hit, clock, host, scope, &mut winner)?;
        }
        Ok(winner)
    }
}

impl WorkUnit for CrackEstimateJob {
    fn name(&self) -> &str {
        "CrackEstimate"
    }

    fn core(&self) -> &UnitCore {
        &self.core
    }

    fn run<'a>(&'a self, host: &'a dyn HostCapability, cancel: CancellationToken) -> UnitFuture<'a> {
        Box::pin(async move {
            let key_count = self.key_count()?;
            let reference: Arc<[u8]> = self.digest.digest(&self.sample).into();
            let scope = host.open_scope()?;
            let clock = Stopwatch::start();

            let searched = self
                .search(host, &cancel, &reference, &scope, &clock)
                .await;
            if let Err(error) = &searched {
                // Shards already submitted must not outlive the estimate.
                debug!(error = %error, "Shard search aborted, cancelling scope");
                let _ = host.cancel_scope(&scope);
                let _ = host.join_children().await;
            }
            let _ = host.close_scope(&scope);
            let winner = searched?;

            checkpoint(&cancel)?;
            let Some(winner) = winner else {
                warn!(sample = ?self.sample, "Search exhausted without a match");
                return Err(JobError::NoMatch.into());
            };

            let estimate = CrackEstimate::new(winner, clock.elapsed(), key_count);
            info!(
                years = estimate.years,
                key_count,
                elapsed_ms = estimate.elapsed.as_millis() as u64,
                "Crack time estimated"
            );
            self.core.set_description(estimate.to_string());
            self.core.set_progress(Progress::percent(100.0));
            let _ = self.output.publish(estimate);
            Ok(true)
        })
    }
}
