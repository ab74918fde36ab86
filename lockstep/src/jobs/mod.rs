//! Concrete lockstep jobs.
//!
//! Every user-facing workflow is a [`WorkUnit`](crate::executor::WorkUnit)
//! tree running on the orchestrator:
//!
//! - [`CrackEstimateJob`] fans out 256 [`ShardSearchJob`]s and stops at the
//!   first hit.
//! - [`LoadKeystoreJob`] hands a keystore to its continuation, usually a
//!   crack estimate over its key count.
//! - [`DownloadWordlistJob`] streams a wordlist to disk and is followed by
//!   a [`VerifyDigestJob`].
//! - [`QueryWordlistJob`] runs one hidden [`LookupWordJob`] per word.
//!
//! # Example
//!
//! ```ignore
//! use lockstep::jobs::{DownloadWordlistJob, VerifyDigestJob, VerifyTarget};
//!
//! let download = DownloadWordlistJob::new(source, dest);
//! let verify = VerifyDigestJob::new(VerifyTarget::Download(download.output()), expected);
//! root.launch(Arc::new(download.then(Arc::new(verify))))?;
//! ```

mod download;
mod error;
mod estimate;
mod keystore;
mod query;
mod search;
mod verify;

pub use download::{part_path, ConfirmOverwrite, DownloadWordlistJob, DownloadedFile};
pub use error::{exit_class_of, ExitClass, JobError};
pub use estimate::{
    group_thousands, CrackEstimate, CrackEstimateJob, KeySource, DEFAULT_SAMPLE, KEYSPACE_SCALE,
    SECONDS_PER_YEAR, SHARD_COUNT,
};
pub use keystore::LoadKeystoreJob;
pub use query::{LookupWordJob, QueryWordlistJob, WordMatch};
pub use search::{ShardSearchJob, Verified, SHARD_SIZE};
pub use verify::{VerifyDigestJob, VerifyTarget};
