//! Grid model: the authoritative node registry
//!
//! One fair read/write lock guards the node set together with the
//! last-touched timestamps and the consecutive-unhealthy counters, so a node
//! and its bookkeeping are never observed out of step.
//!
//! # Node lifecycle
//!
//! ```text
//! (none) ──add──> DOWN ──set_availability──> UP
//!                  ▲  │                       │
//!                  │  │ dead / unhealthy      │ lost (purge sweep)
//!                  │  ▼                       │
//!                  │ (removed)                │
//!                  └──────────────────────────┘
//!
//! UP / DOWN ──NodeDrainStarted──> DRAINING
//! ```
//!
//! Every stored `NodeStatus` is an `Arc` that is swapped, never mutated.
//! Events are published only after the write lock is released.

use crate::error::RegistryResult;
use crate::events::{EventBus, GridEvent};
use crate::node::{Availability, NodeId, NodeStatus};
use crate::slot::{Session, SessionId, SlotId};
use crate::snapshot::GridSnapshot;
use slotgrid_core::config::RegistryConfig;
use slotgrid_core::io::TimeProvider;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Outcome of one purge sweep
#[derive(Debug, Clone, Default)]
pub struct PurgeReport {
    /// Nodes demoted from `UP` to `DOWN` for missing heartbeats
    pub demoted: Vec<NodeId>,
    /// Nodes removed from the registry, with their last known status
    pub removed: Vec<Arc<NodeStatus>>,
}

impl PurgeReport {
    /// Whether the sweep changed nothing
    pub fn is_empty(&self) -> bool {
        self.demoted.is_empty() && self.removed.is_empty()
    }
}

/// Everything guarded by the registry lock
#[derive(Debug, Default)]
struct GridState {
    nodes: HashMap<NodeId, Arc<NodeStatus>>,
    last_touched_ms: HashMap<NodeId, u64>,
    unhealthy_counts: HashMap<NodeId, u32>,
}

impl GridState {
    fn insert(&mut self, status: NodeStatus, now_ms: u64) {
        let node_id = status.node_id.clone();
        self.last_touched_ms.insert(node_id.clone(), now_ms);
        self.nodes.insert(node_id, Arc::new(status));
    }

    fn remove(&mut self, node_id: &NodeId) -> Option<Arc<NodeStatus>> {
        self.last_touched_ms.remove(node_id);
        self.unhealthy_counts.remove(node_id);
        self.nodes.remove(node_id)
    }

    fn record_health_check(&mut self, node_id: &NodeId, availability: Availability, threshold: u32) {
        match availability {
            Availability::Down => {
                let count = self.unhealthy_counts.entry(node_id.clone()).or_insert(0);
                *count = count.saturating_add(1);
            }
            Availability::Up => {
                // Past the threshold the node is already marked for removal
                let count = self.unhealthy_counts.get(node_id).copied().unwrap_or(0);
                if count < threshold {
                    self.unhealthy_counts.remove(node_id);
                }
            }
            Availability::Draining => {}
        }
    }
}

/// In-memory registry of grid nodes and their slots
///
/// Construct one per control plane and share it through `Arc`.
pub struct GridModel {
    state: RwLock<GridState>,
    events: Arc<dyn EventBus>,
    time: Arc<dyn TimeProvider>,
    config: RegistryConfig,
}

impl std::fmt::Debug for GridModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GridModel")
            .field("events", &self.events)
            .field("time", &self.time)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl GridModel {
    /// Create an empty registry
    pub fn new(
        events: Arc<dyn EventBus>,
        time: Arc<dyn TimeProvider>,
        config: RegistryConfig,
    ) -> Self {
        Self {
            state: RwLock::new(GridState::default()),
            events,
            time,
            config,
        }
    }

    /// Registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Start reacting to drain and session-closed events
    ///
    /// The subscription is taken before this returns, so no event published
    /// afterwards is missed. Abort the returned handle to stop listening.
    pub fn spawn_event_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let mut receiver = self.events.subscribe();
        let model = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(GridEvent::NodeDrainStarted(node_id)) => {
                        model
                            .set_availability(&node_id, Availability::Draining)
                            .await;
                    }
                    Ok(GridEvent::SessionClosed(session_id)) => {
                        model.release(&session_id).await;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Grid event listener lagged, events were dropped");
                    }
                    Err(RecvError::Closed) => {
                        debug!("Event bus closed, grid event listener exiting");
                        break;
                    }
                }
            }
        })
    }

    // =========================================================================
    // Node Management
    // =========================================================================

    /// Register a node, or refresh it if it is already known
    ///
    /// A known (ID, URI) pair keeps its current availability. Anything else
    /// is admitted as `DOWN` until a health check promotes it. A new ID on a
    /// known URI means the node restarted: the stale entry is dropped and
    /// `NodeRestarted` is published.
    ///
    /// # Errors
    /// Returns `InvalidNodeStatus` if the status fails validation; the
    /// registry is left untouched.
    #[instrument(skip(self, node), fields(node_id = %node.node_id, uri = %node.external_uri))]
    pub async fn add(&self, node: NodeStatus) -> RegistryResult<()> {
        node.validate()?;

        let threshold = self.config.unhealthy_threshold;
        let node_id = node.node_id.clone();
        let mut restarted = None;

        {
            let mut guard = self.state.write().await;
            let state = &mut *guard;
            let now_ms = self.time.now_ms();

            let known = state
                .nodes
                .get(&node_id)
                .map(|existing| (existing.external_uri == node.external_uri, existing.availability));

            if let Some((true, availability)) = known {
                debug!("Refreshing known node");
                // The announcement itself, not the stored state, is the health signal
                let reported = node.availability;
                state.insert(
                    NodeStatus {
                        availability,
                        ..node
                    },
                    now_ms,
                );
                state.record_health_check(&node_id, reported, threshold);
                return Ok(());
            }

            let stale_id = state
                .nodes
                .values()
                .find(|n| n.external_uri == node.external_uri && n.node_id != node_id)
                .map(|n| n.node_id.clone());

            if let Some(stale_id) = stale_id {
                info!(stale_node_id = %stale_id, "Node restarted on a known address");
                restarted = state.remove(&stale_id);
            }

            if let Some(previous) = state.remove(&node_id) {
                info!(
                    previous_uri = %previous.external_uri,
                    "Node moved to a new address, registering it as new"
                );
            }

            let reported = node.availability;
            info!(reported = %reported, "Adding node as DOWN until a health check passes");
            state.insert(
                NodeStatus {
                    availability: Availability::Down,
                    ..node
                },
                now_ms,
            );
            state.record_health_check(&node_id, reported, threshold);
        }

        if let Some(stale) = restarted {
            self.events.publish(GridEvent::NodeRestarted(stale));
        }

        Ok(())
    }

    /// Apply an updated status for a known node
    ///
    /// A `DOWN` node stays `DOWN` whatever it reports; only
    /// [`set_availability`](Self::set_availability) can promote it. Unknown
    /// nodes are ignored.
    ///
    /// # Errors
    /// Returns `InvalidNodeStatus` if the status fails validation.
    #[instrument(skip(self, status), fields(node_id = %status.node_id))]
    pub async fn refresh(&self, status: NodeStatus) -> RegistryResult<()> {
        status.validate()?;

        let mut guard = self.state.write().await;
        let Some(current) = guard.nodes.get(&status.node_id).map(|n| n.availability) else {
            debug!("Ignoring refresh for unknown node");
            return Ok(());
        };

        let now_ms = self.time.now_ms();
        let status = if current == Availability::Down {
            NodeStatus {
                availability: Availability::Down,
                ..status
            }
        } else {
            status
        };

        guard.insert(status, now_ms);
        Ok(())
    }

    /// Record a heartbeat that carried no status payload
    pub async fn touch(&self, node_id: &NodeId) {
        let mut guard = self.state.write().await;
        if guard.nodes.contains_key(node_id) {
            let now_ms = self.time.now_ms();
            guard.last_touched_ms.insert(node_id.clone(), now_ms);
        }
    }

    /// Remove a node and its bookkeeping
    ///
    /// Returns the removed status, or `None` if the node was unknown.
    #[instrument(skip(self), fields(node_id = %node_id))]
    pub async fn remove(&self, node_id: &NodeId) -> Option<Arc<NodeStatus>> {
        let removed = self.state.write().await.remove(node_id);
        if removed.is_some() {
            info!("Removed node");
        }
        removed
    }

    /// Change a node's availability
    ///
    /// The only path from `DOWN` back to `UP`. Re-asserting `UP` counts as a
    /// heartbeat. Unknown nodes are ignored.
    pub async fn set_availability(&self, node_id: &NodeId, availability: Availability) {
        let mut guard = self.state.write().await;
        let Some(node) = guard.nodes.get(node_id).cloned() else {
            debug!(node_id = %node_id, "Ignoring availability change for unknown node");
            return;
        };

        let now_ms = self.time.now_ms();

        if node.availability == availability {
            if availability == Availability::Up {
                guard.last_touched_ms.insert(node_id.clone(), now_ms);
            }
            return;
        }

        info!(
            node_id = %node_id,
            uri = %node.external_uri,
            from = %node.availability,
            to = %availability,
            "Switching node availability"
        );
        guard.insert(node.with_availability(availability), now_ms);
    }

    /// Record one health-check result for a node
    ///
    /// `DOWN` increments the consecutive-failure counter. `UP` clears it
    /// unless it already reached the unhealthy threshold. Unknown nodes are
    /// ignored so the counters never outlive the node set.
    pub async fn update_health_check_count(&self, node_id: &NodeId, availability: Availability) {
        let mut guard = self.state.write().await;
        if !guard.nodes.contains_key(node_id) {
            return;
        }
        guard.record_health_check(node_id, availability, self.config.unhealthy_threshold);
    }

    /// Demote silent nodes and remove dead or persistently unhealthy ones
    ///
    /// Every node is judged against the same view; all changes are applied
    /// together, then `NodeRemoved` is published for each removed node.
    pub async fn purge_dead_nodes(&self) -> PurgeReport {
        let threshold = self.config.unhealthy_threshold;
        let lost_multiplier = u64::from(self.config.lost_timeout_multiplier());
        let dead_multiplier = u64::from(self.config.purge_timeout_multiplier);

        let report = {
            let mut guard = self.state.write().await;
            let state = &mut *guard;
            let now_ms = self.time.now_ms();

            let mut demote = Vec::new();
            let mut remove = Vec::new();

            for (node_id, node) in &state.nodes {
                let unhealthy = state.unhealthy_counts.get(node_id).copied().unwrap_or(0);
                if unhealthy > threshold {
                    info!(
                        node_id = %node_id,
                        uri = %node.external_uri,
                        unhealthy,
                        "Removing node that failed too many health checks"
                    );
                    remove.push(node_id.clone());
                    continue;
                }

                let last_touched_ms = state.last_touched_ms.get(node_id).copied().unwrap_or(now_ms);
                let period_ms = node.heartbeat_period_ms;
                let lost_at_ms = last_touched_ms.saturating_add(period_ms.saturating_mul(lost_multiplier));
                let dead_at_ms = last_touched_ms.saturating_add(period_ms.saturating_mul(dead_multiplier));

                match node.availability {
                    Availability::Up if now_ms >= lost_at_ms => {
                        info!(
                            node_id = %node_id,
                            uri = %node.external_uri,
                            silent_ms = now_ms.saturating_sub(last_touched_ms),
                            "Node missed heartbeats, marking DOWN"
                        );
                        demote.push(node_id.clone());
                    }
                    Availability::Down if now_ms >= dead_at_ms => {
                        info!(
                            node_id = %node_id,
                            uri = %node.external_uri,
                            silent_ms = now_ms.saturating_sub(last_touched_ms),
                            "Node is dead, removing"
                        );
                        remove.push(node_id.clone());
                    }
                    _ => {}
                }
            }

            for node_id in &demote {
                let demoted = state
                    .nodes
                    .get(node_id)
                    .map(|n| Arc::new(n.with_availability(Availability::Down)));
                if let Some(demoted) = demoted {
                    state.nodes.insert(node_id.clone(), demoted);
                }
            }

            let removed = remove.iter().filter_map(|id| state.remove(id)).collect();

            PurgeReport { demoted: demote, removed }
        };

        for node in &report.removed {
            self.events.publish(GridEvent::NodeRemoved(Arc::clone(node)));
        }

        if !report.is_empty() {
            debug!(
                demoted = report.demoted.len(),
                removed = report.removed.len(),
                "Purge sweep finished"
            );
        }

        report
    }

    // =========================================================================
    // Slot Admission
    // =========================================================================

    /// Claim a free slot for a session that is about to be created
    ///
    /// Returns `false` without changing anything if the node is unknown or
    /// not `UP`, the slot does not exist, or the slot is occupied. The check
    /// and the claim happen under one write lock.
    pub async fn reserve(&self, slot_id: &SlotId) -> bool {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let Some(node) = state.nodes.get(&slot_id.owning_node_id) else {
            warn!(slot_id = %slot_id, "Asked to reserve a slot on an unknown node");
            return false;
        };

        if !node.availability.accepts_reservations() {
            warn!(
                slot_id = %slot_id,
                availability = %node.availability,
                "Asked to reserve a slot on a node that is not UP"
            );
            return false;
        }

        let Some(slot) = node.slot(slot_id) else {
            warn!(slot_id = %slot_id, "Asked to reserve a slot the node does not have");
            return false;
        };

        if !slot.is_free() {
            debug!(slot_id = %slot_id, "Slot already occupied");
            return false;
        }

        let now_ms = self.time.now_ms();
        let reservation = Session::reserved(&node.external_uri, slot.stereotype.clone(), now_ms);
        let updated = Arc::new(node.with_slot(slot.with_session(Some(reservation), now_ms)));
        state.nodes.insert(slot_id.owning_node_id.clone(), updated);

        true
    }

    /// Replace a reservation with the session the node actually started
    ///
    /// `None` gives up the reservation instead. Does nothing, with a warning,
    /// if the slot is no longer holding a reservation.
    pub async fn set_session(&self, slot_id: &SlotId, session: Option<Session>) {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let Some(node) = state.nodes.get(&slot_id.owning_node_id) else {
            warn!(slot_id = %slot_id, "Grid model and reality have diverged: node is gone");
            return;
        };

        let Some(slot) = node.slot(slot_id) else {
            warn!(slot_id = %slot_id, "Grid model and reality have diverged: slot is gone");
            return;
        };

        match &slot.session {
            None => {
                warn!(slot_id = %slot_id, "Grid model and reality have diverged: slot is not reserved");
                return;
            }
            Some(current) if !current.is_reserved() => {
                warn!(
                    slot_id = %slot_id,
                    session_id = %current.id,
                    "Grid model and reality have diverged: slot holds another session"
                );
                return;
            }
            Some(_) => {}
        }

        let last_started_ms = session
            .as_ref()
            .map(|s| s.start_time_ms)
            .unwrap_or(slot.last_started_ms);
        let updated = Arc::new(node.with_slot(slot.with_session(session, last_started_ms)));
        state.nodes.insert(slot_id.owning_node_id.clone(), updated);
    }

    /// Free the slot holding `session_id`
    ///
    /// Returns whether a slot was freed. Unknown sessions are ignored.
    pub async fn release(&self, session_id: &SessionId) -> bool {
        if session_id.is_reserved() {
            debug!("Ignoring release of the reservation sentinel");
            return false;
        }

        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let found = state.nodes.values().find_map(|node| {
            node.slots
                .iter()
                .find(|slot| slot.session.as_ref().is_some_and(|s| &s.id == session_id))
                .map(|slot| (node.node_id.clone(), Arc::new(node.with_slot(slot.released()))))
        });

        match found {
            Some((node_id, updated)) => {
                debug!(session_id = %session_id, node_id = %node_id, "Released slot");
                state.nodes.insert(node_id, updated);
                true
            }
            None => false,
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Point-in-time copy of every node
    pub async fn snapshot(&self) -> GridSnapshot {
        let guard = self.state.read().await;
        let nodes = guard.nodes.values().cloned().collect();
        GridSnapshot::new(nodes, self.time.now_ms())
    }

    /// Current status of one node
    pub async fn node(&self, node_id: &NodeId) -> Option<Arc<NodeStatus>> {
        self.state.read().await.nodes.get(node_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::Capabilities;
    use crate::events::LocalEventBus;
    use crate::slot::Slot;
    use slotgrid_dst::{SimClock, SimTime};

    const HEARTBEAT_MS: u64 = 10_000;

    struct Fixture {
        model: GridModel,
        clock: Arc<SimClock>,
        bus: Arc<LocalEventBus>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(SimClock::from_millis(1_000_000));
        let bus = Arc::new(LocalEventBus::default());
        let model = GridModel::new(
            bus.clone(),
            Arc::new(SimTime::new(clock.clone())),
            RegistryConfig::default(),
        );
        Fixture { model, clock, bus }
    }

    fn node_id(id: &str) -> NodeId {
        NodeId::new(id).unwrap()
    }

    fn status(id: &str, uri: &str, slot_count: usize) -> NodeStatus {
        let node_id = node_id(id);
        let slots = (0..slot_count)
            .map(|i| {
                Slot::new(
                    SlotId::new(node_id.clone(), format!("slot-{}", i)).unwrap(),
                    Capabilities::browser("chrome"),
                )
            })
            .collect();
        NodeStatus::new(node_id, uri, slots).with_heartbeat_period_ms(HEARTBEAT_MS)
    }

    fn slot_id(node: &str, idx: usize) -> SlotId {
        SlotId::new(node_id(node), format!("slot-{}", idx)).unwrap()
    }

    async fn add_up(model: &GridModel, status: NodeStatus) {
        let id = status.node_id.clone();
        model.add(status).await.unwrap();
        model.set_availability(&id, Availability::Up).await;
    }

    #[tokio::test]
    async fn test_add_starts_down() {
        let f = fixture();
        f.model.add(status("n1", "http://u1", 1)).await.unwrap();

        let node = f.model.node(&node_id("n1")).await.unwrap();
        assert_eq!(node.availability, Availability::Down);
    }

    #[tokio::test]
    async fn test_add_twice_is_idempotent() {
        let f = fixture();
        f.model.add(status("n1", "http://u1", 2)).await.unwrap();
        f.model.add(status("n1", "http://u1", 2)).await.unwrap();

        let snapshot = f.model.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.nodes()[0].slots.len(), 2);
    }

    #[tokio::test]
    async fn test_add_refresh_keeps_availability() {
        let f = fixture();
        f.model.add(status("n1", "http://u1", 1)).await.unwrap();
        f.model
            .set_availability(&node_id("n1"), Availability::Draining)
            .await;

        // Re-announcement claims UP
        f.model.add(status("n1", "http://u1", 1)).await.unwrap();

        let node = f.model.node(&node_id("n1")).await.unwrap();
        assert_eq!(node.availability, Availability::Draining);
    }

    #[tokio::test]
    async fn test_readd_of_down_node_is_not_a_failed_health_check() {
        let f = fixture();

        for _ in 0..6 {
            f.model.add(status("n1", "http://u1", 1)).await.unwrap();
        }
        assert_eq!(
            f.model.node(&node_id("n1")).await.unwrap().availability,
            Availability::Down
        );

        let report = f.model.purge_dead_nodes().await;
        assert!(report.removed.is_empty());
        assert_eq!(f.model.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn test_readd_reporting_down_counts_toward_threshold() {
        let f = fixture();
        let mut down = status("n1", "http://u1", 1);
        down.availability = Availability::Down;

        // First add plus five re-announcements: six DOWN reports
        for _ in 0..6 {
            f.model.add(down.clone()).await.unwrap();
        }

        let report = f.model.purge_dead_nodes().await;
        assert_eq!(report.removed.len(), 1);
    }

    #[tokio::test]
    async fn test_add_same_uri_new_id_is_restart() {
        let f = fixture();
        let mut rx = f.bus.subscribe();

        add_up(&f.model, status("n1", "http://u1", 1)).await;
        f.model.add(status("n2", "http://u1", 1)).await.unwrap();

        let snapshot = f.model.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.node(&node_id("n1")).is_none());
        assert_eq!(
            snapshot.node(&node_id("n2")).unwrap().availability,
            Availability::Down
        );

        match rx.recv().await.unwrap() {
            GridEvent::NodeRestarted(stale) => {
                assert_eq!(stale.node_id, node_id("n1"));
                assert_eq!(stale.availability, Availability::Up);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_add_same_id_new_uri_is_new_node() {
        let f = fixture();
        add_up(&f.model, status("n1", "http://u1", 1)).await;

        f.model.add(status("n1", "http://u2", 1)).await.unwrap();

        let snapshot = f.model.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        let node = snapshot.node(&node_id("n1")).unwrap();
        assert_eq!(node.external_uri, "http://u2");
        assert_eq!(node.availability, Availability::Down);
    }

    #[tokio::test]
    async fn test_add_invalid_status_rejected() {
        let f = fixture();
        let bad = status("n1", "http://u1", 1).with_heartbeat_period_ms(0);

        assert!(f.model.add(bad).await.is_err());
        assert!(f.model.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_down_node_stays_down() {
        let f = fixture();
        f.model.add(status("n1", "http://u1", 1)).await.unwrap();

        f.model.refresh(status("n1", "http://u1", 1)).await.unwrap();

        let node = f.model.node(&node_id("n1")).await.unwrap();
        assert_eq!(node.availability, Availability::Down);
    }

    #[tokio::test]
    async fn test_refresh_up_node_trusts_report() {
        let f = fixture();
        add_up(&f.model, status("n1", "http://u1", 1)).await;

        let mut report = status("n1", "http://u1", 1);
        report.availability = Availability::Draining;
        report.version = "2.0.0".into();
        f.model.refresh(report).await.unwrap();

        let node = f.model.node(&node_id("n1")).await.unwrap();
        assert_eq!(node.availability, Availability::Draining);
        assert_eq!(node.version, "2.0.0");
    }

    #[tokio::test]
    async fn test_refresh_unknown_node_ignored() {
        let f = fixture();
        f.model.refresh(status("n1", "http://u1", 1)).await.unwrap();
        assert!(f.model.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_touch_postpones_demotion() {
        let f = fixture();
        add_up(&f.model, status("n1", "http://u1", 1)).await;

        f.clock.advance_ms(HEARTBEAT_MS * 2 - 1);
        f.model.touch(&node_id("n1")).await;
        f.clock.advance_ms(HEARTBEAT_MS);

        let report = f.model.purge_dead_nodes().await;
        assert!(report.is_empty());

        // Unknown IDs are a no-op
        f.model.touch(&node_id("ghost")).await;
        assert_eq!(f.model.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn test_remove() {
        let f = fixture();
        f.model.add(status("n1", "http://u1", 1)).await.unwrap();

        assert!(f.model.remove(&node_id("n1")).await.is_some());
        assert!(f.model.remove(&node_id("n1")).await.is_none());
        assert!(f.model.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_set_availability_unknown_ignored() {
        let f = fixture();
        f.model
            .set_availability(&node_id("ghost"), Availability::Up)
            .await;
        assert!(f.model.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_reserve_set_session_release() {
        let f = fixture();
        add_up(&f.model, status("n1", "http://u1", 1)).await;
        let slot = slot_id("n1", 0);

        assert!(f.model.reserve(&slot).await);
        let snapshot = f.model.snapshot().await;
        let reserved = snapshot.slot(&slot).unwrap();
        assert!(reserved.is_reserved());
        assert_eq!(reserved.session.as_ref().unwrap().uri, "http://u1");

        let session = Session::new(
            SessionId::new("session-1").unwrap(),
            "http://u1",
            Capabilities::browser("chrome"),
            Capabilities::browser("chrome"),
            f.clock.now_ms() + 5,
        );
        f.model.set_session(&slot, Some(session.clone())).await;

        let snapshot = f.model.snapshot().await;
        let running = snapshot.slot(&slot).unwrap();
        assert_eq!(running.session.as_ref(), Some(&session));
        assert_eq!(running.last_started_ms, session.start_time_ms);

        assert!(f.model.release(&session.id).await);
        let snapshot = f.model.snapshot().await;
        let freed = snapshot.slot(&slot).unwrap();
        assert!(freed.is_free());
        assert_eq!(freed.last_started_ms, session.start_time_ms);
    }

    #[tokio::test]
    async fn test_reserve_rejects_down_unknown_missing_and_occupied() {
        let f = fixture();
        f.model.add(status("n1", "http://u1", 1)).await.unwrap();

        // DOWN node
        assert!(!f.model.reserve(&slot_id("n1", 0)).await);
        assert!(f.model.snapshot().await.slot(&slot_id("n1", 0)).unwrap().is_free());

        // Unknown node
        assert!(!f.model.reserve(&slot_id("ghost", 0)).await);

        f.model.set_availability(&node_id("n1"), Availability::Up).await;

        // Missing slot
        assert!(!f.model.reserve(&slot_id("n1", 7)).await);

        // Occupied slot
        assert!(f.model.reserve(&slot_id("n1", 0)).await);
        assert!(!f.model.reserve(&slot_id("n1", 0)).await);
    }

    #[tokio::test]
    async fn test_set_session_requires_reservation() {
        let f = fixture();
        add_up(&f.model, status("n1", "http://u1", 1)).await;
        let slot = slot_id("n1", 0);
        let session = Session::new(
            SessionId::new("session-1").unwrap(),
            "http://u1",
            Capabilities::browser("chrome"),
            Capabilities::browser("chrome"),
            1,
        );

        // Not reserved
        f.model.set_session(&slot, Some(session.clone())).await;
        assert!(f.model.snapshot().await.slot(&slot).unwrap().is_free());

        // Reserved, then confirmed, then a second confirmation is refused
        assert!(f.model.reserve(&slot).await);
        f.model.set_session(&slot, Some(session.clone())).await;

        let other = Session {
            id: SessionId::new("session-2").unwrap(),
            ..session.clone()
        };
        f.model.set_session(&slot, Some(other)).await;

        let snapshot = f.model.snapshot().await;
        assert_eq!(
            snapshot.slot(&slot).unwrap().session.as_ref().map(|s| &s.id),
            Some(&session.id)
        );
    }

    #[tokio::test]
    async fn test_set_session_none_abandons_reservation() {
        let f = fixture();
        add_up(&f.model, status("n1", "http://u1", 1)).await;
        let slot = slot_id("n1", 0);

        assert!(f.model.reserve(&slot).await);
        let reserved_at = f.model.snapshot().await.slot(&slot).unwrap().last_started_ms;

        f.model.set_session(&slot, None).await;

        let snapshot = f.model.snapshot().await;
        let freed = snapshot.slot(&slot).unwrap();
        assert!(freed.is_free());
        assert_eq!(freed.last_started_ms, reserved_at);
        assert!(f.model.reserve(&slot).await);
    }

    #[tokio::test]
    async fn test_release_unknown_and_sentinel_ignored() {
        let f = fixture();
        add_up(&f.model, status("n1", "http://u1", 1)).await;
        assert!(f.model.reserve(&slot_id("n1", 0)).await);

        let before = f.model.snapshot().await;
        assert!(!f.model.release(&SessionId::new("nope").unwrap()).await);
        assert!(!f.model.release(&SessionId::reserved()).await);
        let after = f.model.snapshot().await;

        assert_eq!(before.nodes(), after.nodes());
    }

    #[tokio::test]
    async fn test_purge_demotes_then_removes() {
        let f = fixture();
        let mut rx = f.bus.subscribe();
        add_up(&f.model, status("n1", "http://u1", 1)).await;

        f.clock.advance_ms(HEARTBEAT_MS * 2 - 1);
        assert!(f.model.purge_dead_nodes().await.is_empty());

        f.clock.advance_ms(1);
        let report = f.model.purge_dead_nodes().await;
        assert_eq!(report.demoted, vec![node_id("n1")]);
        assert!(report.removed.is_empty());
        assert_eq!(
            f.model.node(&node_id("n1")).await.unwrap().availability,
            Availability::Down
        );

        f.clock.advance_ms(HEARTBEAT_MS * 2);
        let report = f.model.purge_dead_nodes().await;
        assert_eq!(report.removed.len(), 1);
        assert!(f.model.snapshot().await.is_empty());

        match rx.recv().await.unwrap() {
            GridEvent::NodeRemoved(node) => assert_eq!(node.node_id, node_id("n1")),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_purge_leaves_draining_nodes() {
        let f = fixture();
        f.model.add(status("n1", "http://u1", 1)).await.unwrap();
        f.model
            .set_availability(&node_id("n1"), Availability::Draining)
            .await;

        f.clock.advance_ms(HEARTBEAT_MS * 10);
        assert!(f.model.purge_dead_nodes().await.is_empty());
        assert_eq!(f.model.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unhealthy_threshold_removes_node() {
        let f = fixture();
        add_up(&f.model, status("n1", "http://u1", 1)).await;
        let id = node_id("n1");

        for _ in 0..4 {
            f.model.update_health_check_count(&id, Availability::Down).await;
        }
        assert!(f.model.purge_dead_nodes().await.is_empty());

        f.model.update_health_check_count(&id, Availability::Down).await;
        let report = f.model.purge_dead_nodes().await;
        assert_eq!(report.removed.len(), 1);
    }

    #[tokio::test]
    async fn test_health_recovery_resets_below_threshold_only() {
        let f = fixture();
        add_up(&f.model, status("n1", "http://u1", 1)).await;
        let id = node_id("n1");

        // Three failures then a recovery: counter cleared
        for _ in 0..3 {
            f.model.update_health_check_count(&id, Availability::Down).await;
        }
        f.model.update_health_check_count(&id, Availability::Up).await;
        for _ in 0..4 {
            f.model.update_health_check_count(&id, Availability::Down).await;
        }
        assert!(f.model.purge_dead_nodes().await.removed.is_empty());

        // Counter now at the threshold: recovery no longer clears it
        f.model.update_health_check_count(&id, Availability::Up).await;
        f.model.update_health_check_count(&id, Availability::Down).await;
        assert_eq!(f.model.purge_dead_nodes().await.removed.len(), 1);
    }

    #[tokio::test]
    async fn test_event_listener_drains_and_releases() {
        let f = fixture();
        let model = Arc::new(f.model);
        let listener = model.spawn_event_listener();

        add_up(&model, status("n1", "http://u1", 2)).await;
        let slot = slot_id("n1", 0);
        assert!(model.reserve(&slot).await);
        let session = Session::new(
            SessionId::new("session-1").unwrap(),
            "http://u1",
            Capabilities::browser("chrome"),
            Capabilities::browser("chrome"),
            1,
        );
        model.set_session(&slot, Some(session.clone())).await;

        f.bus.publish(GridEvent::SessionClosed(session.id.clone()));
        f.bus.publish(GridEvent::NodeDrainStarted(node_id("n1")));

        let mut drained = false;
        for _ in 0..100 {
            tokio::task::yield_now().await;
            let node = model.node(&node_id("n1")).await.unwrap();
            if node.availability == Availability::Draining {
                drained = true;
                assert!(node.slot(&slot).unwrap().is_free());
                break;
            }
        }
        assert!(drained);
        assert!(!model.reserve(&slot_id("n1", 1)).await);

        listener.abort();
    }
}
