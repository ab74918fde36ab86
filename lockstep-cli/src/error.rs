//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and the documented exit codes:
//!
//! | Code | Meaning          |
//! |------|------------------|
//! | 0    | success          |
//! | 1    | user error       |
//! | 2    | not found        |
//! | 3    | corrupted input  |
//! | 4    | mismatch         |
//! | 5    | internal failure |
//! | 130  | cancelled        |

use std::fmt;
use std::process;
use std::sync::Arc;

use lockstep::config::ConfigFileError;
use lockstep::executor::{HostError, UnitError};
use lockstep::jobs::{exit_class_of, ExitClass, JobError};
use lockstep::wordlist::TransferError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration error
    Config(String),
    /// Bad command-line input
    Usage(String),
    /// A unit finished in the failed state
    UnitFailed { unit: String, error: Arc<UnitError> },
    /// A job error raised before any unit ran
    Job(JobError),
    /// The orchestrator refused an operation
    Host(HostError),
    /// Interrupted by the user
    Cancelled,
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) | CliError::Usage(_) => 1,
            CliError::UnitFailed { error, .. } => exit_code_for(exit_class_of(error)),
            CliError::Job(e) => exit_code_for(e.exit_class()),
            CliError::LoggingInit(_) | CliError::Host(_) => 5,
            CliError::Cancelled => 130,
        }
    }

    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        if !matches!(self, CliError::Cancelled) {
            eprintln!("Error: {}", self);
        } else {
            eprintln!("Cancelled.");
        }

        match self.job_error() {
            Some(JobError::DestinationExists { .. }) => {
                eprintln!();
                eprintln!("Re-run with --force to replace it.");
            }
            Some(JobError::DigestMismatch { .. }) => {
                eprintln!();
                eprintln!("The file was kept. Check the URL and the expected digest,");
                eprintln!("then delete the file and download it again.");
            }
            Some(JobError::Transfer(TransferError::Http { .. })) => {
                eprintln!();
                eprintln!("The partial download was kept and will be resumed next time.");
            }
            _ => {}
        }

        process::exit(self.exit_code())
    }

    fn job_error(&self) -> Option<&JobError> {
        match self {
            CliError::UnitFailed { error, .. } => error.downcast_job::<JobError>(),
            CliError::Job(e) => Some(e),
            _ => None,
        }
    }
}

fn exit_code_for(class: ExitClass) -> i32 {
    match class {
        ExitClass::UserError => 1,
        ExitClass::NotFound => 2,
        ExitClass::Corrupted => 3,
        ExitClass::Mismatch => 4,
        ExitClass::Internal => 5,
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Usage(msg) => write!(f, "{}", msg),
            CliError::UnitFailed { unit, error } => write!(f, "{} failed: {}", unit, error),
            CliError::Job(e) => write!(f, "{}", e),
            CliError::Host(e) => write!(f, "{}", e),
            CliError::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::UnitFailed { error, .. } => Some(error.as_ref()),
            CliError::Job(e) => Some(e),
            CliError::Host(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<HostError> for CliError {
    fn from(e: HostError) -> Self {
        CliError::Host(e)
    }
}

impl From<JobError> for CliError {
    fn from(e: JobError) -> Self {
        CliError::Job(e)
    }
}
