//! Point-in-time view of the registry

use crate::capabilities::Capabilities;
use crate::node::{NodeId, NodeStatus};
use crate::slot::{Slot, SlotId};
use std::sync::Arc;

/// Immutable copy of the node set taken under the registry's read lock
///
/// Holding a snapshot never blocks writers. Nodes are ordered by ID.
#[derive(Debug, Clone, Default)]
pub struct GridSnapshot {
    nodes: Vec<Arc<NodeStatus>>,
    taken_at_ms: u64,
}

impl GridSnapshot {
    pub(crate) fn new(mut nodes: Vec<Arc<NodeStatus>>, taken_at_ms: u64) -> Self {
        nodes.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        Self { nodes, taken_at_ms }
    }

    /// When the snapshot was taken (Unix ms)
    pub fn taken_at_ms(&self) -> u64 {
        self.taken_at_ms
    }

    /// All nodes, ordered by ID
    pub fn nodes(&self) -> &[Arc<NodeStatus>] {
        &self.nodes
    }

    /// Look up a node
    pub fn node(&self, node_id: &NodeId) -> Option<&Arc<NodeStatus>> {
        self.nodes
            .binary_search_by(|n| n.node_id.cmp(node_id))
            .ok()
            .map(|idx| &self.nodes[idx])
    }

    /// Look up a slot through its owning node
    pub fn slot(&self, slot_id: &SlotId) -> Option<&Slot> {
        self.node(&slot_id.owning_node_id)
            .and_then(|n| n.slot(slot_id))
    }

    /// Free slots on nodes currently accepting reservations
    pub fn available_slots(&self) -> impl Iterator<Item = &Slot> {
        self.nodes
            .iter()
            .filter(|n| n.availability.accepts_reservations())
            .flat_map(|n| n.slots.iter())
            .filter(|s| s.is_free())
    }

    /// Free slots able to serve `requested`, on nodes accepting reservations
    pub fn available_slots_for<'a>(
        &'a self,
        requested: &'a Capabilities,
    ) -> impl Iterator<Item = &'a Slot> + 'a {
        self.available_slots()
            .filter(move |s| s.is_supporting(requested))
    }

    /// Check if any node could take a new session right now
    pub fn has_capacity(&self) -> bool {
        self.available_slots().next().is_some()
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the registry was empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
