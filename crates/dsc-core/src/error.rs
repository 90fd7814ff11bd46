//! # Error Types: Status Taxonomy
//!
//! Defines the errors returned by every admission entry point of the core.
//! All errors use `thiserror` for derive-based `Display` and `Error`
//! implementations.
//!
//! ## Design
//!
//! - Contention ([`DscError::Again`]) names the [`Blocker`] that caused it,
//!   so a caller can decide between retrying and using a `_wait` variant.
//! - Structural rejection ([`DscError::Invalid`]) names the [`Rejection`]
//!   reason. Callers must not retry these blindly.
//! - Protocol violations (stop without start, destroying a busy node) are
//!   not represented here. They panic.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error type for the driver synchronization core.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DscError {
    /// The request is inadmissible right now and must not be retried blindly.
    #[error("request rejected: {0}")]
    Invalid(Rejection),

    /// Transient contention. Safe to retry, or to use the `_wait` variant.
    #[error("resource busy: {0}")]
    Again(Blocker),

    /// A queued transition was flushed while its node was being destroyed.
    #[error("queued transition aborted during teardown")]
    Aborted,

    /// Allocation of bookkeeping state failed.
    #[error("out of memory while recording synchronization state")]
    OutOfMemory,
}

impl DscError {
    /// Whether the caller may retry (or queue) the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Again(_))
    }
}

/// Why a request was hard-rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    /// The owning driver has an active or queued transition.
    DriverTransition,
    /// The owning psoc has an active transition, or a queued/active one while
    /// the system is unloading.
    PsocTransition,
    /// The system is recovering from a firmware failure.
    Recovering,
    /// The node has already been destroyed.
    Destroyed,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::DriverTransition => "driver transition in progress",
            Self::PsocTransition => "psoc transition in progress",
            Self::Recovering => "system is recovering",
            Self::Destroyed => "node has been destroyed",
        };
        f.write_str(s)
    }
}

/// What caused a retry-later outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Blocker {
    /// The node's own transition is active, or others are already queued.
    OwnTransition,
    /// A descendant node has an active transition.
    DescendantTransition,
    /// The owning psoc has an active or queued transition.
    PsocTransition,
}

impl std::fmt::Display for Blocker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::OwnTransition => "own transition active or queued",
            Self::DescendantTransition => "descendant transition active",
            Self::PsocTransition => "psoc transition active or queued",
        };
        f.write_str(s)
    }
}

/// Errors raised while loading or validating a [`crate::DscConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The YAML document could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A field holds a value outside its permitted range.
    #[error("invalid configuration value for {field}: {reason}")]
    InvalidValue {
        /// Name of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// An environment override could not be parsed.
    #[error("invalid environment override {var}={value:?}")]
    InvalidEnv {
        /// Environment variable name.
        var: &'static str,
        /// The raw value found.
        value: String,
    },
}
