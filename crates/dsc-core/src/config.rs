//! # Configuration
//!
//! Tunables for the diagnostic extensions of the core. None of these change
//! admission behavior; they only control how much is recorded and how stuck
//! synchronization is surfaced.
//!
//! ## Sources
//!
//! Defaults come from the build profile (`debug_tracking` follows
//! `debug_assertions`). A YAML document may override any field, and
//! `DSC_*` environment variables override the result:
//!
//! | Variable | Field |
//! |---|---|
//! | `DSC_DEBUG_TRACKING` | `debug_tracking` |
//! | `DSC_TRANSITION_TIMEOUT_MS` | `transition_timeout_ms` |
//! | `DSC_WAIT_TIMEOUT_MS` | `wait_timeout_ms` |
//! | `DSC_OP_TIMEOUT_MS` | `op_timeout_ms` |
//! | `DSC_FATAL_TIMEOUTS` | `fatal_timeouts` |

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default bound on how long a transition may stay active.
pub const DEFAULT_TRANSITION_TIMEOUT_MS: u64 = 2 * 60 * 1000;
/// Default bound on how long a queued transition may wait.
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 2 * 60 * 1000;
/// Default bound on how long a single operation may stay in flight.
pub const DEFAULT_OP_TIMEOUT_MS: u64 = 60 * 1000;

/// Diagnostic configuration shared by every node of a driver tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DscConfig {
    /// Attach operation records, watchdogs, deadlock detection and
    /// protection assertions to every tracker.
    pub debug_tracking: bool,
    /// Stuck-transition watchdog bound, in milliseconds.
    pub transition_timeout_ms: u64,
    /// Queued-wait deadlock detection bound, in milliseconds.
    pub wait_timeout_ms: u64,
    /// Per-operation watchdog bound, in milliseconds.
    pub op_timeout_ms: u64,
    /// Abort the process when a watchdog expires (unless firmware is down).
    /// When false, expiries are only logged.
    pub fatal_timeouts: bool,
}

impl Default for DscConfig {
    fn default() -> Self {
        Self {
            debug_tracking: cfg!(debug_assertions),
            transition_timeout_ms: DEFAULT_TRANSITION_TIMEOUT_MS,
            wait_timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            op_timeout_ms: DEFAULT_OP_TIMEOUT_MS,
            fatal_timeouts: true,
        }
    }
}

impl DscConfig {
    /// Configuration with diagnostics enabled regardless of build profile.
    pub fn debug() -> Self {
        Self {
            debug_tracking: true,
            ..Self::default()
        }
    }

    /// Configuration with diagnostics disabled regardless of build profile.
    pub fn release() -> Self {
        Self {
            debug_tracking: false,
            ..Self::default()
        }
    }

    /// Parse and validate a YAML document. Missing fields take defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the watchdogs meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let timeouts = [
            ("transition_timeout_ms", self.transition_timeout_ms),
            ("wait_timeout_ms", self.wait_timeout_ms),
            ("op_timeout_ms", self.op_timeout_ms),
        ];
        for (field, value) in timeouts {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "timeout must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Apply `DSC_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides_from(|var| std::env::var(var).ok())
    }

    /// Apply `DSC_*` overrides from an arbitrary lookup.
    pub fn with_overrides_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(v) = lookup("DSC_DEBUG_TRACKING") {
            self.debug_tracking = parse_bool("DSC_DEBUG_TRACKING", v)?;
        }
        if let Some(v) = lookup("DSC_TRANSITION_TIMEOUT_MS") {
            self.transition_timeout_ms = parse_ms("DSC_TRANSITION_TIMEOUT_MS", v)?;
        }
        if let Some(v) = lookup("DSC_WAIT_TIMEOUT_MS") {
            self.wait_timeout_ms = parse_ms("DSC_WAIT_TIMEOUT_MS", v)?;
        }
        if let Some(v) = lookup("DSC_OP_TIMEOUT_MS") {
            self.op_timeout_ms = parse_ms("DSC_OP_TIMEOUT_MS", v)?;
        }
        if let Some(v) = lookup("DSC_FATAL_TIMEOUTS") {
            self.fatal_timeouts = parse_bool("DSC_FATAL_TIMEOUTS", v)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Stuck-transition watchdog bound.
    pub fn transition_timeout(&self) -> Duration {
        Duration::from_millis(self.transition_timeout_ms)
    }

    /// Queued-wait deadlock detection bound.
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    /// Per-operation watchdog bound.
    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }
}

fn parse_bool(var: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnv { var, value }),
    }
}

fn parse_ms(var: &'static str, value: String) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { var, value })
}
