//! Node types and identification
//!
//! Explicit node lifecycle with validated identifiers.

use crate::capabilities::Capabilities;
use crate::error::{RegistryError, RegistryResult};
use crate::slot::{Slot, SlotId};
use serde::{Deserialize, Serialize};
use slotgrid_core::constants::{
    HEARTBEAT_PERIOD_MS_DEFAULT, NODE_ID_LENGTH_BYTES_MAX, NODE_SLOTS_COUNT_MAX,
    SESSION_TIMEOUT_MS_DEFAULT,
};
use slotgrid_core::io::RngProvider;
use std::collections::HashSet;
use std::fmt;

/// Unique identifier for a node process
///
/// A restarted node process gets a new ID even when it comes back on the
/// same address; the registry relies on that to detect restarts.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    /// Create a new NodeId with validation
    ///
    /// # Arguments
    /// * `id` - The node identifier (alphanumeric, dashes, underscores, dots)
    ///
    /// # Errors
    /// Returns error if id is empty, too long, or contains invalid characters.
    pub fn new(id: impl Into<String>) -> RegistryResult<Self> {
        let id = id.into();

        if id.is_empty() {
            return Err(RegistryError::InvalidNodeId {
                id,
                reason: "node ID cannot be empty".into(),
            });
        }

        if id.len() > NODE_ID_LENGTH_BYTES_MAX {
            return Err(RegistryError::InvalidNodeId {
                reason: format!(
                    "node ID length {} exceeds limit {}",
                    id.len(),
                    NODE_ID_LENGTH_BYTES_MAX
                ),
                id,
            });
        }

        let valid = id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');

        if !valid {
            return Err(RegistryError::InvalidNodeId {
                id,
                reason: "node ID contains invalid characters".into(),
            });
        }

        Ok(Self(id))
    }

    /// Generate a fresh node ID from the injected RNG
    pub fn generate(rng: &dyn RngProvider) -> Self {
        let id = rng.gen_uuid();
        debug_assert!(id.len() <= NODE_ID_LENGTH_BYTES_MAX);
        Self(id)
    }

    /// Get the node ID as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Admission eligibility of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Availability {
    /// Accepting new reservations
    Up,
    /// Not accepting reservations; removed if it stays down
    Down,
    /// Finishing in-flight sessions, not accepting new ones
    Draining,
}

impl Availability {
    /// Check if the node can accept new reservations
    pub fn accepts_reservations(&self) -> bool {
        matches!(self, Self::Up)
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => write!(f, "UP"),
            Self::Down => write!(f, "DOWN"),
            Self::Draining => write!(f, "DRAINING"),
        }
    }
}

/// Operating system a node runs on
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsInfo {
    /// CPU architecture (e.g. `x86_64`)
    pub arch: String,
    /// OS family (e.g. `linux`)
    pub name: String,
    /// OS release, when the node reports one
    pub version: String,
}

impl OsInfo {
    /// Describe the OS this process runs on
    pub fn current() -> Self {
        Self {
            arch: std::env::consts::ARCH.to_string(),
            name: std::env::consts::OS.to_string(),
            version: String::new(),
        }
    }
}

/// Complete advertised state of one node
///
/// Treated as an immutable value once it reaches the registry: every change
/// builds a new `NodeStatus` that replaces the old one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    /// Unique node identifier
    pub node_id: NodeId,
    /// Address the grid uses to reach the node
    pub external_uri: String,
    /// Maximum concurrent sessions the node runs
    pub max_session_count: u32,
    /// Capacity units owned by this node
    pub slots: Vec<Slot>,
    /// Admission eligibility
    pub availability: Availability,
    /// How often the node is expected to report, in milliseconds
    pub heartbeat_period_ms: u64,
    /// Idle time after which the node kills a session, in milliseconds
    pub session_timeout_ms: u64,
    /// Node software version
    pub version: String,
    /// Operating system descriptor
    pub os_info: OsInfo,
}

impl NodeStatus {
    /// Create a status for a node with the given slots
    ///
    /// Defaults: one session per slot, `UP`, default heartbeat period and
    /// session timeout, this crate's version and the current OS.
    pub fn new(node_id: NodeId, external_uri: impl Into<String>, slots: Vec<Slot>) -> Self {
        Self {
            node_id,
            external_uri: external_uri.into(),
            max_session_count: u32::try_from(slots.len()).unwrap_or(u32::MAX),
            slots,
            availability: Availability::Up,
            heartbeat_period_ms: HEARTBEAT_PERIOD_MS_DEFAULT,
            session_timeout_ms: SESSION_TIMEOUT_MS_DEFAULT,
            version: env!("CARGO_PKG_VERSION").to_string(),
            os_info: OsInfo::current(),
        }
    }

    /// Set the heartbeat period
    pub fn with_heartbeat_period_ms(mut self, heartbeat_period_ms: u64) -> Self {
        self.heartbeat_period_ms = heartbeat_period_ms;
        self
    }

    /// Copy of this status with a different availability
    pub fn with_availability(&self, availability: Availability) -> Self {
        Self {
            availability,
            ..self.clone()
        }
    }

    /// Copy of this status with `slot` replacing the slot of the same ID
    pub fn with_slot(&self, slot: Slot) -> Self {
        let slots = self
            .slots
            .iter()
            .map(|s| if s.id == slot.id { slot.clone() } else { s.clone() })
            .collect();

        Self {
            slots,
            ..self.clone()
        }
    }

    /// Find a slot by ID
    pub fn slot(&self, slot_id: &SlotId) -> Option<&Slot> {
        self.slots.iter().find(|s| &s.id == slot_id)
    }

    /// Check if any slot is free
    pub fn has_capacity(&self) -> bool {
        self.slots.iter().any(Slot::is_free)
    }

    /// Check if a free slot can serve the requested capabilities
    pub fn has_capacity_for(&self, requested: &Capabilities) -> bool {
        self.slots
            .iter()
            .any(|s| s.is_free() && s.is_supporting(requested))
    }

    /// Number of occupied slots, reservations included
    pub fn session_count(&self) -> usize {
        self.slots.iter().filter(|s| !s.is_free()).count()
    }

    /// Occupied slots as a percentage (0-100)
    pub fn load_percent(&self) -> u8 {
        if self.slots.is_empty() {
            return 100;
        }
        let load = (self.session_count() as f64 / self.slots.len() as f64) * 100.0;
        load.min(100.0) as u8
    }

    /// Most recent slot start time, if any slot was ever started
    pub fn last_session_created_ms(&self) -> Option<u64> {
        self.slots
            .iter()
            .map(|s| s.last_started_ms)
            .filter(|ms| *ms > 0)
            .max()
    }

    /// Structural checks applied before the status reaches the registry
    ///
    /// # Errors
    /// Returns `InvalidNodeStatus` describing the first violation found.
    pub fn validate(&self) -> RegistryResult<()> {
        let invalid = |reason: String| RegistryError::invalid_node_status(self.node_id.as_str(), reason);

        if self.external_uri.trim().is_empty() {
            return Err(invalid("external URI cannot be empty".into()));
        }

        if self.heartbeat_period_ms == 0 {
            return Err(invalid("heartbeat period must be positive".into()));
        }

        if self.slots.len() > NODE_SLOTS_COUNT_MAX {
            return Err(invalid(format!(
                "slot count {} exceeds limit {}",
                self.slots.len(),
                NODE_SLOTS_COUNT_MAX
            )));
        }

        let mut seen = HashSet::with_capacity(self.slots.len());
        for slot in &self.slots {
            if slot.id.owning_node_id != self.node_id {
                return Err(invalid(format!(
                    "slot {} is owned by node {}",
                    slot.id, slot.id.owning_node_id
                )));
            }
            if !seen.insert(&slot.id) {
                return Err(invalid(format!("duplicate slot {}", slot.id)));
            }
        }

        Ok(())
    }
}
