//! Closed error taxonomy for the listing pipeline.
//!
//! Every stage returns `Result<_, ListingError>`; platform errors from the child-process
//! layer are translated here and never reach a caller verbatim.

use std::path::PathBuf;
use std::time::Duration;

use crate::command::Rejection;

/// Reply text for anything the caller should not see the details of.
pub const UNKNOWN_MESSAGE: &str = "unknown";

#[derive(Debug, thiserror::Error)]
pub enum ListingError {
    #[error("command rejected: {0}")]
    Rejected(#[from] Rejection),

    #[error("path not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("path outside sandbox root: {}", .0.display())]
    OutsideSandbox(PathBuf),

    #[error("spawn failed: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("child still running after {after:?}")]
    TimedOut { after: Duration },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ListingError {
    /// Message sent to the caller. `program` is the configured executable name, used in the rejection text.
    pub fn caller_message(&self, program: &str) -> String {
        match self {
            ListingError::Rejected(_) => rejected_message(program),
            ListingError::NotFound(_) => "Dir or file does not exist".to_string(),
            ListingError::NotADirectory(_) => "Invalid path or not a directory".to_string(),
            ListingError::OutsideSandbox(_) => "Path is outside the sandbox root".to_string(),
            ListingError::TimedOut { .. } => "Command timed out".to_string(),
            ListingError::Spawn(_) | ListingError::Io(_) => UNKNOWN_MESSAGE.to_string(),
        }
    }

    /// True for failures that point at the host rather than the caller's input.
    pub fn is_operational(&self) -> bool {
        matches!(
            self,
            ListingError::Spawn(_) | ListingError::TimedOut { .. } | ListingError::Io(_)
        )
    }
}

/// Fixed rejection text; never echoes the offending input.
pub fn rejected_message(program: &str) -> String {
    format!(
        "Invalid command. Only \"{}\" commands are allowed and no special characters.",
        program
    )
}
