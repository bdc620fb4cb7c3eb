//! End-to-end flow against the mock PD backend: transactions build the
//! graph, clumps feed the planner, the dispatcher sends the resulting
//! operators, with graph and route snapshots exercised along the way.

use std::sync::Arc;

use hotclump::config::{DispatchSettings, PlannerSettings};
use hotclump::dispatch::{self, Dispatcher, Op};
use hotclump::graph::Graph;
use hotclump::pd::{MockPd, PeerInfo, RecordRegion, TableRegionsResponse};
use hotclump::planner::{store_loads, Planner};
use hotclump::route::Route;

fn peer(id: u64, store_id: u64) -> PeerInfo {
    PeerInfo { id, store_id, role_name: None }
}

/// Nine regions (real ids 9001..=9009), every replica set on stores
/// {1,2,3}, every leader on store 1.
fn skewed_route() -> Route {
    let mut record_regions = Vec::new();
    for i in 0..9u64 {
        let region_id = 9001 + i;
        let peers: Vec<PeerInfo> = (1u64..=3).map(|s| peer(region_id * 10 + s, s)).collect();
        let leader = peers[0].clone();
        record_regions.push(RecordRegion { region_id, leader, peers });
    }
    Route::from_response(&TableRegionsResponse { record_regions }, 1)
}

fn fast_dispatch() -> DispatchSettings {
    DispatchSettings { max_retry: 10, retry_interval_ms: 0, max_workers: 4 }
}

#[tokio::test]
async fn clumps_plan_and_dispatch_through_snapshots() {
    let dir = tempfile::tempdir().unwrap();

    // Build the co-access graph the ingest service would have built.
    let graph = Graph::new(1, 1, 5);
    graph.add_transaction(&[1, 2, 3], 2);
    graph.add_transaction(&[2, 3, 4], 2);
    graph.add_transaction(&[3, 4, 5], 2);
    graph.add_transaction(&[6, 7, 8], 1);

    // Persist and reload both inputs, as the rebalance driver does.
    let graph_path = dir.path().join("graph.bin");
    let route_path = dir.path().join("route.bin");
    graph.save(&graph_path).unwrap();
    skewed_route().save(&route_path).unwrap();
    let graph = Graph::load(&graph_path).unwrap();
    let route = Route::load(&route_path).unwrap();

    let clumps = graph.hot_clumps(0);
    assert_eq!(clumps.len(), 2);

    let planner = Planner::new(PlannerSettings::default());
    let subplans = planner.generate_subplans(&clumps, &route).unwrap();
    assert_eq!(subplans.len(), 2);
    // phase 1 stacks everything on the leader store; phase 2 moves the hot
    // clump off to the lightest store
    let loads = store_loads(&subplans);
    assert_eq!(loads.get(&2), Some(&18));
    assert_eq!(loads.get(&1), Some(&3));

    let plans = dispatch::generate_op_plans(&subplans, &route).unwrap();
    // five regions move to store 2, the cold clump's three stay on store 1
    assert_eq!(plans.len(), 8);
    assert_eq!(plans.iter().filter(|p| !p.is_empty()).count(), 5);

    let pd = MockPd::new();
    let dispatcher = Dispatcher::new(pd.clone(), fast_dispatch());
    dispatcher.run(plans).await;

    let mut sent = pd.submissions();
    sent.sort_by_key(|op| op.region());
    let expected: Vec<Op> = (2..=6u64)
        .map(|i| Op::TransferLeader { region: 9000 + i, to: 2 })
        .collect();
    assert_eq!(sent, expected);
}

#[tokio::test]
async fn round_robin_spreads_leaders_across_stores() {
    let route = skewed_route();
    let plans = dispatch::round_robin_op_plans(&route).unwrap();
    // virtual ids 0,3,6 already sit on store 1; the other six move
    assert_eq!(plans.len(), 6);

    let pd = MockPd::new();
    let dispatcher = Dispatcher::new(pd.clone(), fast_dispatch());
    dispatcher.run(plans).await;

    let sent = pd.submissions();
    assert_eq!(sent.len(), 6);
    assert!(sent.contains(&Op::TransferLeader { region: 9002, to: 2 }));
    assert!(sent.contains(&Op::TransferLeader { region: 9003, to: 3 }));
    assert!(sent.contains(&Op::TransferLeader { region: 9008, to: 2 }));
    assert!(sent.contains(&Op::TransferLeader { region: 9009, to: 3 }));
}
