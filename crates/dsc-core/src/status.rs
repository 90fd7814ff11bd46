//! # Flat Status Codes
//!
//! Glue layers (bus attach/detach, administrative command handlers) usually
//! translate outcomes into their own error numbers and only need the status
//! class, not the reason. [`Status`] is that class.

use serde::{Deserialize, Serialize};

use crate::error::DscError;

/// The status class of a core call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// The call succeeded.
    Success,
    /// Programming error or hard reject. Do not retry.
    Invalid,
    /// Transient contention. Retry, or use the `_wait` variant.
    Again,
    /// A queued wait was flushed during teardown.
    Aborted,
    /// Diagnostic bookkeeping could not be allocated.
    OutOfMemory,
}

impl Status {
    /// Classify any core result.
    pub fn of<T>(result: &Result<T, DscError>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(err) => Self::from(err),
        }
    }

    /// The canonical name (e.g., "AGAIN").
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Invalid => "INVALID",
            Self::Again => "AGAIN",
            Self::Aborted => "ABORTED",
            Self::OutOfMemory => "OUT_OF_MEMORY",
        }
    }

    /// Whether this is [`Status::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl From<&DscError> for Status {
    fn from(err: &DscError) -> Self {
        match err {
            DscError::Invalid(_) => Self::Invalid,
            DscError::Again(_) => Self::Again,
            DscError::Aborted => Self::Aborted,
            DscError::OutOfMemory => Self::OutOfMemory,
        }
    }
}

impl From<DscError> for Status {
    fn from(err: DscError) -> Self {
        Self::from(&err)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
