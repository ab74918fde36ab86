//! Domain errors raised by the concrete jobs.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::executor::UnitError;
use crate::keystore::KeystoreError;
use crate::wordlist::{TransferError, WordlistError};

/// Broad failure class, used by front ends to pick an exit status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExitClass {
    UserError,
    NotFound,
    Corrupted,
    Mismatch,
    Internal,
}

/// Errors from the lockstep jobs.
#[derive(Debug, Error)]
pub enum JobError {
    /// The shard search finished without reproducing the sample.
    #[error("search finished without a match for the reference digest")]
    NoMatch,

    #[error(transparent)]
    Keystore(#[from] KeystoreError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Wordlist(#[from] WordlistError),

    #[error("digest mismatch for {}: expected {expected}, got {actual}", path.display())]
    DigestMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("{} already exists", path.display())]
    DestinationExists { path: PathBuf },

    #[error("not in wordlist: {}", words.join(", "))]
    WordsNotFound { words: Vec<String> },

    /// A lookup child failed before producing an answer.
    #[error("lookup of '{word}' failed: {source}")]
    LookupFailed {
        word: String,
        #[source]
        source: Arc<UnitError>,
    },

    #[error("{0}")]
    InvalidInput(String),
}

impl JobError {
    pub fn exit_class(&self) -> ExitClass {
        match self {
            Self::NoMatch => ExitClass::Internal,
            Self::Keystore(KeystoreError::NotFound { .. }) => ExitClass::NotFound,
            Self::Keystore(KeystoreError::Corrupted { .. }) => ExitClass::Corrupted,
            Self::Keystore(KeystoreError::Io { .. }) => ExitClass::Internal,
            Self::Transfer(TransferError::NotFound(_)) => ExitClass::NotFound,
            Self::Transfer(_) => ExitClass::Internal,
            Self::Wordlist(WordlistError::NotFound { .. }) => ExitClass::NotFound,
            Self::Wordlist(_) => ExitClass::Internal,
            Self::DigestMismatch { .. } => ExitClass::Mismatch,
            Self::DestinationExists { .. } | Self::InvalidInput(_) => ExitClass::UserError,
            Self::WordsNotFound { .. } => ExitClass::NotFound,
            Self::LookupFailed { source, .. } => exit_class_of(source),
        }
    }
}

impl From<JobError> for UnitError {
    fn from(error: JobError) -> Self {
        match error {
            // Cancellation is an outcome, not a failure.
            JobError::Wordlist(WordlistError::Cancelled) => UnitError::Cancelled,
            other => UnitError::job(other),
        }
    }
}

/// Exit class of a unit's recorded error. A missing file is "not found";
/// other errors the jobs do not own are internal.
pub fn exit_class_of(error: &UnitError) -> ExitClass {
    match error {
        UnitError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => ExitClass::NotFound,
        _ => match error.downcast_job::<JobError>() {
            Some(job) => job.exit_class(),
            None => ExitClass::Internal,
        },
    }
}
