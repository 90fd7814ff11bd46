//! # System Status Flags
//!
//! Process-wide conditions that change how the admission policy and the
//! watchdogs behave:
//!
//! - **recovering**: a firmware recovery is in progress; vdev transitions
//!   are hard-rejected.
//! - **unloading**: the driver is being unloaded; a vdev transition that
//!   would otherwise wait behind its psoc is hard-rejected instead.
//! - **firmware down**: firmware is known to be dead; watchdog expiries are
//!   logged rather than escalated, so the root cause is not masked.
//!
//! A single [`SystemStatus`] is shared (`Arc`) by every driver created
//! against it. The flags are plain atomics; they are read under the driver
//! lock but written by whoever detects the condition.

use std::sync::atomic::{AtomicBool, Ordering};

/// Shared system-wide status flags.
#[derive(Debug, Default)]
pub struct SystemStatus {
    recovering: AtomicBool,
    unloading: AtomicBool,
    firmware_down: AtomicBool,
}

impl SystemStatus {
    /// Create a status with every flag cleared.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a firmware recovery is in progress.
    pub fn is_recovering(&self) -> bool {
        self.recovering.load(Ordering::Acquire)
    }

    /// Set or clear the recovering flag.
    pub fn set_recovering(&self, value: bool) {
        tracing::debug!(value, "system recovering flag changed");
        self.recovering.store(value, Ordering::Release);
    }

    /// Whether the driver is being unloaded.
    pub fn is_unloading(&self) -> bool {
        self.unloading.load(Ordering::Acquire)
    }

    /// Set or clear the unloading flag.
    pub fn set_unloading(&self, value: bool) {
        tracing::debug!(value, "system unloading flag changed");
        self.unloading.store(value, Ordering::Release);
    }

    /// Whether firmware is known to be down.
    pub fn is_firmware_down(&self) -> bool {
        self.firmware_down.load(Ordering::Acquire)
    }

    /// Set or clear the firmware-down flag.
    pub fn set_firmware_down(&self, value: bool) {
        tracing::debug!(value, "system firmware-down flag changed");
        self.firmware_down.store(value, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_start_cleared() {
        let status = SystemStatus::new();
        assert!(!status.is_recovering());
        assert!(!status.is_unloading());
        assert!(!status.is_firmware_down());
    }

    #[test]
    fn flags_are_independent() {
        let status = SystemStatus::new();
        status.set_recovering(true);
        assert!(status.is_recovering());
        assert!(!status.is_unloading());

        status.set_unloading(true);
        status.set_recovering(false);
        assert!(!status.is_recovering());
        assert!(status.is_unloading());

        status.set_firmware_down(true);
        assert!(status.is_firmware_down());
    }
}
