//! # Identity Newtypes
//!
//! Identifiers for the nodes of a synchronization tree. Each identifier is a
//! distinct type, so you cannot pass a [`PsocId`] where a [`VdevId`] is
//! expected.
//!
//! [`DriverId`] is UUID-based and unique per process. [`PsocId`] and
//! [`VdevId`] are sequential within their driver and reflect creation order.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unique identifier for a driver instance (the root of a tree).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DriverId(Uuid);

impl DriverId {
    /// Create a new random driver identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a driver identifier from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Access the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for DriverId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DriverId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a psoc within its driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PsocId(u32);

impl PsocId {
    /// Wrap a raw sequence number.
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw sequence number.
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for PsocId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "psoc-{}", self.0)
    }
}

/// Identifier of a vdev within its driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VdevId(u32);

impl VdevId {
    /// Wrap a raw sequence number.
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw sequence number.
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for VdevId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "vdev-{}", self.0)
    }
}

/// A north-bound administrative command deferred while a vdev recovers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandId(u8);

impl CommandId {
    /// Wrap a raw command number.
    pub fn new(raw: u8) -> Self {
        Self(raw)
    }

    /// The raw command number.
    pub fn as_u8(&self) -> u8 {
        self.0
    }
}

impl From<u8> for CommandId {
    fn from(raw: u8) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for CommandId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cmd-{}", self.0)
    }
}
