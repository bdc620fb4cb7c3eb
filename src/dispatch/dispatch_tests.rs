use super::*;
use std::collections::BTreeSet;

use crate::config::DispatchSettings;
use crate::graph::clump::Clump;
use crate::pd::{MockPd, PeerInfo, RecordRegion, RegionResponse, TableRegionsResponse};

fn peer(id: u64, store_id: u64) -> PeerInfo {
    PeerInfo { id, store_id, role_name: None }
}

fn learner(id: u64, store_id: u64) -> PeerInfo {
    PeerInfo { id, store_id, role_name: Some("Learner".to_string()) }
}

/// Three regions on stores {1,2,3}, each led by the store matching its
/// index: real region 1 led by store 1, and so on.
fn diagonal_route() -> Route {
    let mut record_regions = Vec::new();
    for region_id in 1u64..=3 {
        let peers: Vec<PeerInfo> = (1u64..=3).map(|s| peer(region_id * 10 + s, s)).collect();
        let leader = peers[(region_id - 1) as usize].clone();
        record_regions.push(RecordRegion { region_id, leader, peers });
    }
    Route::from_response(&TableRegionsResponse { record_regions }, 1)
}

fn subplan(regions: &[u64], target_store: StoreId) -> SubPlan {
    SubPlan {
        clump: Clump::new(BTreeSet::from_iter(regions.iter().copied()), 1),
        origin_stores: Vec::new(),
        target_store,
    }
}

fn fast_settings() -> DispatchSettings {
    DispatchSettings { max_retry: 10, retry_interval_ms: 0, max_workers: 2 }
}

#[test]
fn plan_for_target_already_leading_is_empty() {
    let plan = generate_op_plan(5, 3, &[1, 2], 3, 0);
    assert!(plan.is_empty());
    assert!(plan.all_done());
}

#[test]
fn plan_for_follower_target_is_a_leader_transfer() {
    let plan = generate_op_plan(5, 3, &[1, 2], 2, 0);
    assert_eq!(plan.ops(), &[Op::TransferLeader { region: 5, to: 2 }]);
    assert_eq!(plan.target_store(), Some(2));
}

#[test]
fn plan_for_foreign_target_moves_a_peer_first() {
    let plan = generate_op_plan(5, 3, &[1, 2], 4, 0);
    assert_eq!(
        plan.ops(),
        &[
            Op::TransferPeer { region: 5, from: 1, to: 4 },
            Op::TransferLeader { region: 5, to: 4 },
        ]
    );
    assert_eq!(plan.target_store(), Some(4));
}

#[test]
fn plan_without_followers_is_empty() {
    let plan = generate_op_plan(5, 3, &[], 4, 0);
    assert!(plan.is_empty());
}

#[test]
fn subplans_expand_per_region_and_idempotently() {
    let route = diagonal_route();
    // clump of all three regions targeted at store 1: region 1 stays,
    // regions 2 and 3 get leader transfers (store 1 follows both)
    let subplans = vec![subplan(&[0, 1, 2], 1)];
    let plans = generate_op_plans(&subplans, &route).unwrap();
    assert_eq!(plans.len(), 3);
    assert!(plans[0].is_empty());
    assert_eq!(plans[1].ops(), &[Op::TransferLeader { region: 2, to: 1 }]);
    assert_eq!(plans[2].ops(), &[Op::TransferLeader { region: 3, to: 1 }]);
    for plan in &plans {
        assert_eq!(plan.subplan_index, 0);
    }

    let again = generate_op_plans(&subplans, &route).unwrap();
    for (a, b) in plans.iter().zip(&again) {
        assert_eq!(a.ops(), b.ops());
    }
}

#[test]
fn round_robin_skips_already_placed_regions() {
    // diagonal route: region i is already led by store i = stores[i mod 3],
    // so a full round-robin pass has nothing to do
    let route = diagonal_route();
    assert!(round_robin_op_plans(&route).unwrap().is_empty());

    // flip every leader to store 1 and the pass moves regions 2 and 3
    let mut record_regions = Vec::new();
    for region_id in 1u64..=3 {
        let peers: Vec<PeerInfo> = (1u64..=3).map(|s| peer(region_id * 10 + s, s)).collect();
        let leader = peers[0].clone();
        record_regions.push(RecordRegion { region_id, leader, peers });
    }
    let route = Route::from_response(&TableRegionsResponse { record_regions }, 2);
    let plans = round_robin_op_plans(&route).unwrap();
    assert_eq!(plans.len(), 2);
    assert_eq!(plans[0].ops(), &[Op::TransferLeader { region: 2, to: 2 }]);
    assert_eq!(plans[1].ops(), &[Op::TransferLeader { region: 3, to: 3 }]);
}

#[tokio::test]
async fn accepted_plans_run_to_completion() {
    let pd = MockPd::new();
    let dispatcher = Dispatcher::new(pd.clone(), fast_settings());
    let route = diagonal_route();
    let plans = generate_op_plans(&[subplan(&[0, 1, 2], 1)], &route).unwrap();
    dispatcher.run(plans).await;
    let sent = pd.submissions();
    assert_eq!(sent.len(), 2);
    assert!(sent.contains(&Op::TransferLeader { region: 2, to: 1 }));
    assert!(sent.contains(&Op::TransferLeader { region: 3, to: 1 }));
}

#[tokio::test]
async fn no_voter_rejection_retries_then_waits_for_learner() {
    let pd = MockPd::new();
    // first attempt: transfer-peer rejected, straight retry (no fetch)
    pd.push_outcome(false, "[500] region has no voter in store 4");
    // second attempt: rejected again, reconciliation sees a learner at the
    // target and parks the plan once more
    pd.push_outcome(false, "[500] region has no voter in store 4");
    pd.push_region(RegionResponse {
        leader: peer(51, 3),
        peers: vec![peer(51, 3), peer(52, 1), learner(53, 4)],
    });
    // third attempt: both ops go through

    let mut plan = OpPlan::new(0, 5);
    plan.push_op(Op::TransferPeer { region: 5, from: 1, to: 4 });
    plan.push_op(Op::TransferLeader { region: 5, to: 4 });

    let dispatcher = Dispatcher::new(pd.clone(), fast_settings());
    dispatcher.run(vec![plan]).await;

    let sent = pd.submissions();
    // transfer-peer three times (two rejections), then the leader transfer
    assert_eq!(sent.len(), 4);
    assert_eq!(sent[0], Op::TransferPeer { region: 5, from: 1, to: 4 });
    assert_eq!(sent[1], Op::TransferPeer { region: 5, from: 1, to: 4 });
    assert_eq!(sent[2], Op::TransferPeer { region: 5, from: 1, to: 4 });
    assert_eq!(sent[3], Op::TransferLeader { region: 5, to: 4 });
}

#[tokio::test]
async fn reconciliation_drops_plan_when_target_already_leads() {
    let pd = MockPd::new();
    pd.push_outcome(false, "Fail: no operator step is built");
    pd.push_region(RegionResponse {
        leader: peer(53, 4),
        peers: vec![peer(51, 3), peer(52, 1), peer(53, 4)],
    });

    let mut plan = OpPlan::new(0, 5);
    plan.push_op(Op::TransferLeader { region: 5, to: 4 });

    let dispatcher = Dispatcher::new(pd.clone(), fast_settings());
    dispatcher.run(vec![plan]).await;
    assert_eq!(pd.submissions().len(), 1);
}

#[tokio::test]
async fn reconciliation_regenerates_from_live_placement() {
    let pd = MockPd::new();
    // the plan below thinks store 1 holds a follower; live placement says
    // followers sit on stores 2 and 6, so the regenerated plan moves the
    // peer from store 2 instead
    pd.push_outcome(false, "Fail: region has no peer in store 1");
    pd.push_region(RegionResponse {
        leader: peer(51, 3),
        peers: vec![peer(51, 3), peer(52, 2), peer(54, 6)],
    });

    let mut plan = OpPlan::new(0, 5);
    plan.push_op(Op::TransferPeer { region: 5, from: 1, to: 4 });
    plan.push_op(Op::TransferLeader { region: 5, to: 4 });

    let dispatcher = Dispatcher::new(pd.clone(), fast_settings());
    dispatcher.run(vec![plan]).await;

    let sent = pd.submissions();
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[0], Op::TransferPeer { region: 5, from: 1, to: 4 });
    assert_eq!(sent[1], Op::TransferPeer { region: 5, from: 2, to: 4 });
    assert_eq!(sent[2], Op::TransferLeader { region: 5, to: 4 });
}

#[tokio::test]
async fn retry_budget_bounds_rejected_plans() {
    let pd = MockPd::new();
    for _ in 0..3 {
        pd.push_outcome(false, "Fail: region has no peer in store 9");
        pd.push_region(RegionResponse {
            leader: peer(51, 1),
            peers: vec![peer(51, 1), peer(52, 2)],
        });
    }

    let mut plan = OpPlan::new(0, 5);
    plan.push_op(Op::TransferPeer { region: 5, from: 9, to: 3 });
    plan.push_op(Op::TransferLeader { region: 5, to: 3 });

    let settings = DispatchSettings { max_retry: 2, retry_interval_ms: 0, max_workers: 1 };
    let dispatcher = Dispatcher::new(pd.clone(), settings);
    dispatcher.run(vec![plan]).await;

    // attempt at retry 0 and the regenerated attempt at retry 1 both send;
    // the retry-2 plan hits the budget and drops without sending
    assert_eq!(pd.submissions().len(), 2);
}

#[tokio::test]
async fn reconciliation_fetch_failure_drops_the_plan() {
    let pd = MockPd::new();
    pd.push_outcome(false, "some unclassified pd failure");
    pd.push_region_error();

    let mut plan = OpPlan::new(0, 5);
    plan.push_op(Op::TransferLeader { region: 5, to: 2 });

    let dispatcher = Dispatcher::new(pd.clone(), fast_settings());
    dispatcher.run(vec![plan]).await;
    assert_eq!(pd.submissions().len(), 1);
}

#[tokio::test]
async fn empty_plans_terminate_immediately() {
    let pd = MockPd::new();
    let dispatcher = Dispatcher::new(pd.clone(), fast_settings());
    dispatcher.run(vec![OpPlan::new(0, 1), OpPlan::new(1, 2)]).await;
    assert!(pd.submissions().is_empty());
}
