//! DST tests for concurrent slot admission
//!
//! Reservation and the occupancy check share one write-lock critical
//! section, so for any slot at most one concurrent `reserve` wins, even
//! while the reaper and heartbeats contend for the same lock.

use futures::future::join_all;
use slotgrid_core::config::RegistryConfig;
use slotgrid_dst::{DeterministicRng, SimClock, SimTime};
use slotgrid_registry::{
    Availability, Capabilities, GridModel, LocalEventBus, NodeId, NodeStatus, Session,
    SessionId, Slot, SlotId,
};
use std::sync::Arc;

fn test_model() -> (Arc<GridModel>, Arc<SimClock>) {
    let clock = Arc::new(SimClock::default());
    let model = Arc::new(GridModel::new(
        Arc::new(LocalEventBus::default()),
        Arc::new(SimTime::new(clock.clone())),
        RegistryConfig::default(),
    ));
    (model, clock)
}

fn test_status(node: &str, slots: usize) -> NodeStatus {
    let node_id = NodeId::new(node).unwrap();
    let slots = (0..slots)
        .map(|i| {
            Slot::new(
                SlotId::new(node_id.clone(), format!("slot-{}", i)).unwrap(),
                Capabilities::browser("chrome"),
            )
        })
        .collect();
    NodeStatus::new(node_id, format!("http://{}:5555", node), slots)
}

async fn add_up(model: &GridModel, status: NodeStatus) {
    let id = status.node_id.clone();
    model.add(status).await.unwrap();
    model.set_availability(&id, Availability::Up).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dst_concurrent_reserve_single_winner() {
    let (model, _clock) = test_model();
    add_up(&model, test_status("node-1", 1)).await;
    let slot_id = SlotId::new(NodeId::new("node-1").unwrap(), "slot-0").unwrap();

    for _round in 0..50 {
        let attempts = (0..2).map(|_| {
            let model = model.clone();
            let slot_id = slot_id.clone();
            tokio::spawn(async move { model.reserve(&slot_id).await })
        });
        let results: Vec<bool> = join_all(attempts)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(
            results.iter().filter(|won| **won).count(),
            1,
            "exactly one reservation must win: {:?}",
            results
        );

        // Abandon so the next round starts from a free slot
        model.set_session(&slot_id, None).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dst_reservations_never_oversubscribe() {
    let (model, clock) = test_model();
    let rng = DeterministicRng::from_env_or_random();

    const NODES: usize = 4;
    const SLOTS_PER_NODE: usize = 3;
    for n in 0..NODES {
        add_up(&model, test_status(&format!("node-{}", n), SLOTS_PER_NODE)).await;
    }

    let mut slot_ids: Vec<SlotId> = (0..NODES)
        .flat_map(|n| {
            (0..SLOTS_PER_NODE).map(move |s| {
                SlotId::new(NodeId::new(format!("node-{}", n)).unwrap(), format!("slot-{}", s))
                    .unwrap()
            })
        })
        .collect();

    // Every slot targeted by several racing callers, in seeded order
    let mut targets: Vec<SlotId> = slot_ids
        .iter()
        .flat_map(|id| std::iter::repeat(id.clone()).take(5))
        .collect();
    rng.shuffle(&mut targets);

    let reaper = {
        let model = model.clone();
        let clock = clock.clone();
        tokio::spawn(async move {
            for _ in 0..20 {
                clock.advance_ms(1);
                model.purge_dead_nodes().await;
                tokio::task::yield_now().await;
            }
        })
    };

    let attempts = targets.into_iter().map(|slot_id| {
        let model = model.clone();
        tokio::spawn(async move { (model.reserve(&slot_id).await, slot_id) })
    });
    let results: Vec<(bool, SlotId)> = join_all(attempts)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();
    reaper.await.unwrap();

    slot_ids.sort();
    for slot_id in &slot_ids {
        let wins = results
            .iter()
            .filter(|(won, id)| *won && id == slot_id)
            .count();
        assert_eq!(wins, 1, "slot {} won {} times", slot_id, wins);
    }

    let snapshot = model.snapshot().await;
    assert!(!snapshot.has_capacity());
    assert!(slot_ids
        .iter()
        .all(|id| snapshot.slot(id).is_some_and(|s| s.is_reserved())));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dst_release_races_with_reserve() {
    let (model, clock) = test_model();
    add_up(&model, test_status("node-1", 1)).await;
    let slot_id = SlotId::new(NodeId::new("node-1").unwrap(), "slot-0").unwrap();

    for round in 0..30 {
        assert!(model.reserve(&slot_id).await);
        let session = Session::new(
            SessionId::new(format!("session-{}", round)).unwrap(),
            "http://node-1:5555",
            Capabilities::browser("chrome"),
            Capabilities::browser("chrome"),
            clock.now_ms(),
        );
        model.set_session(&slot_id, Some(session.clone())).await;

        let release = {
            let model = model.clone();
            let id = session.id.clone();
            tokio::spawn(async move { model.release(&id).await })
        };
        let reserve = {
            let model = model.clone();
            let slot_id = slot_id.clone();
            tokio::spawn(async move { model.reserve(&slot_id).await })
        };

        assert!(release.await.unwrap());
        let reserved = reserve.await.unwrap();

        // Either the reserve ran first and lost, or ran second and won
        let snapshot = model.snapshot().await;
        let slot = snapshot.slot(&slot_id).unwrap();
        assert_eq!(slot.is_reserved(), reserved);
        assert!(!slot.session.as_ref().is_some_and(|s| s.id == session.id));

        if reserved {
            model.set_session(&slot_id, None).await;
        }
        clock.advance_ms(1);
    }
}
