//! Shared helpers for command handlers.

use std::sync::Arc;

use lockstep::digest::parse_hex;
use lockstep::executor::{EndReason, WorkUnit};
use tracing::debug;

use crate::error::CliError;

/// Turns the end states of a chain of units into a command result.
///
/// `units` are listed in chain order. The first failure wins; a unit that
/// never started is skipped because its predecessor already explains why.
pub fn settle(units: &[Arc<dyn WorkUnit>]) -> Result<(), CliError> {
    for unit in units {
        let reason = unit.core().end_reason();
        debug!(unit = %unit.name(), reason = ?reason, "Unit settled");
        match reason {
            Some(EndReason::Failed) => {
                if let Some(error) = unit.core().last_error() {
                    return Err(CliError::UnitFailed {
                        unit: unit.name().to_string(),
                        error,
                    });
                }
            }
            Some(EndReason::Canceled) => return Err(CliError::Cancelled),
            Some(EndReason::Completed) | Some(EndReason::NeverStarted) | None => {}
        }
    }
    Ok(())
}

/// Parses a SHA-256 digest given on the command line.
pub fn parse_digest(hex: &str) -> Result<Vec<u8>, CliError> {
    match parse_hex(hex) {
        Some(bytes) if bytes.len() == 32 => Ok(bytes),
        _ => Err(CliError::Usage(format!(
            "'{}' is not a SHA-256 digest (expected 64 hex characters)",
            hex
        ))),
    }
}
