//! Grid events
//!
//! The registry publishes node restarts and removals, and reacts to drain
//! and session-closed notifications from the rest of the grid.

use crate::node::{NodeId, NodeStatus};
use crate::slot::SessionId;
use slotgrid_core::config::EventBusConfig;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

/// An event exchanged over the grid's event bus
#[derive(Debug, Clone, PartialEq)]
pub enum GridEvent {
    /// An operator asked the node to stop taking new sessions
    NodeDrainStarted(NodeId),
    /// A node came back on a known address under a new ID; carries the stale entry
    NodeRestarted(Arc<NodeStatus>),
    /// The reaper removed a node; carries its last known status
    NodeRemoved(Arc<NodeStatus>),
    /// A session ended and its slot can be freed
    SessionClosed(SessionId),
}

impl GridEvent {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NodeDrainStarted(_) => "node_drain_started",
            Self::NodeRestarted(_) => "node_restarted",
            Self::NodeRemoved(_) => "node_removed",
            Self::SessionClosed(_) => "session_closed",
        }
    }
}

/// Publish/subscribe transport for grid events
///
/// Delivery guarantees belong to the implementation; the registry only
/// assumes that subscribers see events published after they subscribed.
pub trait EventBus: Send + Sync + fmt::Debug {
    /// Publish an event to all current subscribers
    fn publish(&self, event: GridEvent);

    /// Subscribe to events published from now on
    fn subscribe(&self) -> broadcast::Receiver<GridEvent>;
}

/// In-process event bus backed by a broadcast channel
#[derive(Debug, Clone)]
pub struct LocalEventBus {
    sender: broadcast::Sender<GridEvent>,
}

impl LocalEventBus {
    /// Create a bus buffering `config.capacity` events per subscriber
    pub fn new(config: &EventBusConfig) -> Self {
        assert!(config.capacity > 0, "event bus capacity must be positive");
        let (sender, _) = broadcast::channel(config.capacity);
        Self { sender }
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for LocalEventBus {
    fn default() -> Self {
        Self::new(&EventBusConfig::default())
    }
}

impl EventBus for LocalEventBus {
    fn publish(&self, event: GridEvent) {
        let kind = event.kind();
        // No subscribers is not an error for a fire-and-forget bus
        if self.sender.send(event).is_err() {
            tracing::trace!(kind, "Event published with no subscribers");
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<GridEvent> {
        self.sender.subscribe()
    }
}
