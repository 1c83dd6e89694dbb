//! Map a finished pipeline to the single reply a caller receives.

use serde::Serialize;

use crate::error::ListingError;
use crate::exec::Outcome;

/// Event name for a successful listing.
pub const CONTENT_EVENT: &str = "content";
/// Event name for any failure.
pub const ERROR_EVENT: &str = "error";

/// Exactly one of these is produced per inbound command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "lowercase")]
pub enum Reply {
    Content(String),
    Error(String),
}

impl Reply {
    pub fn event(&self) -> &'static str {
        match self {
            Reply::Content(_) => CONTENT_EVENT,
            Reply::Error(_) => ERROR_EVENT,
        }
    }

    pub fn payload(&self) -> &str {
        match self {
            Reply::Content(s) | Reply::Error(s) => s,
        }
    }
}

/// Turn a pipeline result into a reply. Host-side failures are logged and reported as "unknown" (or a
/// timeout notice); stderr from the program is relayed verbatim.
pub fn dispatch(result: Result<Outcome, ListingError>, program: &str) -> Reply {
    match result {
        Ok(Outcome::Success(stdout)) => Reply::Content(stdout),
        Ok(Outcome::Failure(stderr)) => Reply::Error(stderr),
        Err(e) => {
            if e.is_operational() {
                log::warn!("{}: {}", program, e);
            } else {
                log::debug!("{}: {}", program, e);
            }
            Reply::Error(e.caller_message(program))
        }
    }
}
