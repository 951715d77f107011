//! Slotgrid Registry
//!
//! Node registry and admission control for a browser-automation grid.
//!
//! # Overview
//!
//! The registry provides:
//! - A single authoritative view of the node fleet ([`GridModel`])
//! - Slot reservation with a sentinel session until the node confirms
//! - Heartbeat and health-check driven demotion and eviction
//! - Event-bus integration for drain, restart, removal and session close
//!
//! All state lives in memory behind one fair read/write lock. Values that
//! leave the registry ([`NodeStatus`], [`GridSnapshot`]) are immutable.

pub mod capabilities;
pub mod error;
pub mod events;
pub mod model;
pub mod node;
pub mod reaper;
pub mod slot;
pub mod snapshot;

pub use capabilities::Capabilities;
pub use error::{RegistryError, RegistryResult};
pub use events::{EventBus, GridEvent, LocalEventBus};
pub use model::{GridModel, PurgeReport};
pub use node::{Availability, NodeId, NodeStatus, OsInfo};
pub use reaper::Reaper;
pub use slot::{Session, SessionId, Slot, SlotId};
pub use snapshot::GridSnapshot;
