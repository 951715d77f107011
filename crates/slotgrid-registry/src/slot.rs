//! Slots and sessions
//!
//! A slot is one unit of a node's concurrent-session capacity. Its session
//! is either absent, the reservation sentinel, or a confirmed session.

use crate::capabilities::Capabilities;
use crate::error::{RegistryError, RegistryResult};
use crate::node::NodeId;
use serde::{Deserialize, Serialize};
use slotgrid_core::constants::SESSION_ID_LENGTH_BYTES_MAX;
use slotgrid_core::io::RngProvider;
use std::fmt;

/// Session ID occupying a slot between reservation and confirmation
pub const RESERVED_SESSION_ID: &str = "reserved";

/// Identifier of one slot: owning node plus a node-local ID
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotId {
    /// Node that owns the slot for its whole lifetime
    pub owning_node_id: NodeId,
    /// Node-local slot identifier
    pub id: String,
}

impl SlotId {
    /// Create a slot ID
    ///
    /// # Errors
    /// Returns `InvalidSlotId` if the local ID is empty.
    pub fn new(owning_node_id: NodeId, id: impl Into<String>) -> RegistryResult<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(RegistryError::InvalidSlotId {
                id,
                reason: "slot ID cannot be empty".into(),
            });
        }
        Ok(Self { owning_node_id, id })
    }

    /// Generate a slot ID with a random local part
    pub fn generate(owning_node_id: NodeId, rng: &dyn RngProvider) -> Self {
        Self {
            owning_node_id,
            id: rng.gen_uuid(),
        }
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owning_node_id, self.id)
    }
}

/// Identifier of an automation session
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Create a session ID for a real session
    ///
    /// # Errors
    /// Returns `InvalidSessionId` if the ID is empty, too long, or equal to
    /// the reservation sentinel.
    pub fn new(id: impl Into<String>) -> RegistryResult<Self> {
        let id = id.into();

        if id.is_empty() {
            return Err(RegistryError::InvalidSessionId {
                id,
                reason: "session ID cannot be empty".into(),
            });
        }

        if id.len() > SESSION_ID_LENGTH_BYTES_MAX {
            return Err(RegistryError::InvalidSessionId {
                reason: format!(
                    "session ID length {} exceeds limit {}",
                    id.len(),
                    SESSION_ID_LENGTH_BYTES_MAX
                ),
                id,
            });
        }

        if id == RESERVED_SESSION_ID {
            return Err(RegistryError::InvalidSessionId {
                id,
                reason: "reserved for pending reservations".into(),
            });
        }

        Ok(Self(id))
    }

    /// The reservation sentinel
    pub fn reserved() -> Self {
        Self(RESERVED_SESSION_ID.to_string())
    }

    /// Whether this is the reservation sentinel
    pub fn is_reserved(&self) -> bool {
        self.0 == RESERVED_SESSION_ID
    }

    /// Get the session ID as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A running (or reserved) automation session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Session identifier
    pub id: SessionId,
    /// URI of the node running the session
    pub uri: String,
    /// Stereotype of the slot the session was matched against
    pub stereotype: Capabilities,
    /// Capabilities of the session
    pub capabilities: Capabilities,
    /// Start time (Unix ms)
    pub start_time_ms: u64,
}

impl Session {
    /// Create a session record
    pub fn new(
        id: SessionId,
        uri: impl Into<String>,
        stereotype: Capabilities,
        capabilities: Capabilities,
        start_time_ms: u64,
    ) -> Self {
        Self {
            id,
            uri: uri.into(),
            stereotype,
            capabilities,
            start_time_ms,
        }
    }

    /// Placeholder session marking a slot as reserved
    pub fn reserved(uri: impl Into<String>, stereotype: Capabilities, now_ms: u64) -> Self {
        Self::new(
            SessionId::reserved(),
            uri,
            stereotype.clone(),
            stereotype,
            now_ms,
        )
    }

    /// Whether this is the reservation placeholder
    pub fn is_reserved(&self) -> bool {
        self.id.is_reserved()
    }
}

/// One schedulable execution unit of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    /// Slot identifier
    pub id: SlotId,
    /// What kind of session the slot can run
    pub stereotype: Capabilities,
    /// When a session was last started in this slot (Unix ms, 0 if never)
    pub last_started_ms: u64,
    /// Session currently occupying the slot
    pub session: Option<Session>,
}

impl Slot {
    /// Create a free slot that has never run a session
    pub fn new(id: SlotId, stereotype: Capabilities) -> Self {
        Self {
            id,
            stereotype,
            last_started_ms: 0,
            session: None,
        }
    }

    /// Check if no session occupies the slot
    pub fn is_free(&self) -> bool {
        self.session.is_none()
    }

    /// Check if the slot holds the reservation sentinel
    pub fn is_reserved(&self) -> bool {
        self.session.as_ref().is_some_and(Session::is_reserved)
    }

    /// Check if the slot's stereotype can serve the requested capabilities
    pub fn is_supporting(&self, requested: &Capabilities) -> bool {
        self.stereotype.supports(requested)
    }

    /// Copy of this slot holding `session`
    pub fn with_session(&self, session: Option<Session>, last_started_ms: u64) -> Self {
        Self {
            id: self.id.clone(),
            stereotype: self.stereotype.clone(),
            last_started_ms,
            session,
        }
    }

    /// Copy of this slot with no session, keeping `last_started_ms`
    pub fn released(&self) -> Self {
        self.with_session(None, self.last_started_ms)
    }
}
