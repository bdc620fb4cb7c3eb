//!
//! Operator dispatch
//! -----------------
//! Expands SubPlans into ordered operator sequences and drives them to PD
//! through a bounded worker pool with retry scheduling, failure
//! classification, and live peer reconciliation.
//!
//! Accounting contract: the outstanding counter starts at the number of
//! input plans and every plan decrements it exactly once, at its terminal
//! state (all ops sent, empty plan, retry budget exhausted, or reconciled
//! away). A rescheduled or regenerated plan keeps its slot, so `run`
//! returns exactly when the last plan terminates.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::DispatchSettings;
use crate::error::{Error, Result};
use crate::pd::PdBackend;
use crate::planner::SubPlan;
use crate::route::{RegionId, Route, StoreId};

pub mod opplan;
pub use opplan::{Op, OpPlan};

/// Build the operator sequence that moves leadership of `region` to
/// `target`, given its current placement.
pub fn generate_op_plan(
    region: RegionId,
    leader: StoreId,
    followers: &[StoreId],
    target: StoreId,
    subplan_index: usize,
) -> OpPlan {
    let mut plan = OpPlan::new(subplan_index, region);
    if target == leader {
        // already in place
    } else if followers.contains(&target) {
        plan.push_op(Op::TransferLeader { region, to: target });
    } else if let Some(&from) = followers.first() {
        plan.push_op(Op::TransferPeer { region, from, to: target });
        plan.push_op(Op::TransferLeader { region, to: target });
    }
    // A region with no followers at all stays where it is; placing it would
    // take an add-peer/remove-peer pair and PD's own scheduler handles that
    // case better than we would.
    plan
}

/// Expand every subplan into per-region OpPlans against the given route.
pub fn generate_op_plans(subplans: &[SubPlan], route: &Route) -> Result<Vec<OpPlan>> {
    let mut plans = Vec::new();
    for (index, subplan) in subplans.iter().enumerate() {
        for &virt in &subplan.clump.region_ids {
            let region = route.to_real(virt)?;
            let leader = route.leader_of(virt)?;
            let followers = route.followers_of(virt)?;
            plans.push(generate_op_plan(region, leader, &followers, subplan.target_store, index));
        }
    }
    Ok(plans)
}

/// Planner bypass: spread leadership round-robin over all stores. Regions
/// already led by their assigned store are skipped, as are regions the
/// plan generator cannot move (no followers).
pub fn round_robin_op_plans(route: &Route) -> Result<Vec<OpPlan>> {
    let stores = route.all_stores();
    if stores.is_empty() {
        return Ok(Vec::new());
    }
    let mut plans = Vec::new();
    for virt in route.virtual_ids() {
        let target = stores[virt as usize % stores.len()];
        let leader = route.leader_of(virt)?;
        if leader == target {
            continue;
        }
        let region = route.to_real(virt)?;
        let followers = route.followers_of(virt)?;
        let plan = generate_op_plan(region, leader, &followers, target, virt as usize);
        if !plan.is_empty() {
            plans.push(plan);
        }
    }
    Ok(plans)
}

/// What became of one pass over a plan.
enum PlanFate {
    /// The plan reached a terminal state; its counter slot is released.
    Terminal,
    /// The plan (or a regenerated successor) went back on the queue.
    Requeued,
}

#[derive(Clone)]
pub struct Dispatcher {
    pd: Arc<dyn PdBackend>,
    settings: DispatchSettings,
    queue: Arc<Mutex<VecDeque<OpPlan>>>,
    outstanding: Arc<AtomicUsize>,
}

impl Dispatcher {
    pub fn new(pd: Arc<dyn PdBackend>, settings: DispatchSettings) -> Self {
        Self {
            pd,
            settings,
            queue: Arc::new(Mutex::new(VecDeque::new())),
            outstanding: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Drive every plan to a terminal state, then return.
    pub async fn run(&self, plans: Vec<OpPlan>) {
        if plans.is_empty() {
            return;
        }
        info!(target: "hotclump::dispatch", "dispatching {} op plans", plans.len());
        self.outstanding.store(plans.len(), Ordering::SeqCst);
        {
            let mut queue = self.queue.lock();
            for plan in plans {
                queue.push_back(plan);
            }
        }
        let mut workers = tokio::task::JoinSet::new();
        for worker_id in 0..self.settings.max_workers.max(1) {
            let dispatcher = self.clone();
            workers.spawn(async move { dispatcher.worker_loop(worker_id).await });
        }
        while workers.join_next().await.is_some() {}
        info!(target: "hotclump::dispatch", "all op plans terminated");
    }

    async fn worker_loop(&self, worker_id: usize) {
        loop {
            if self.outstanding.load(Ordering::SeqCst) == 0 {
                return;
            }
            let plan = self.queue.lock().pop_front();
            let Some(plan) = plan else {
                // plans may be parked with other workers; check back shortly
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                continue;
            };
            if let PlanFate::Terminal = self.process_plan(worker_id, plan).await {
                self.outstanding.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }

    async fn process_plan(&self, worker_id: usize, mut plan: OpPlan) -> PlanFate {
        if let Some(at) = plan.earliest_retry_at {
            if at > Instant::now() {
                tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await;
            }
        }
        if plan.retry_count >= self.settings.max_retry {
            warn!(
                target: "hotclump::dispatch",
                "worker {}: dropping plan {}/{}: {}",
                worker_id,
                plan.subplan_index,
                plan.region_id,
                Error::MaxRetriesExceeded { region: plan.region_id, retries: plan.retry_count }
            );
            return PlanFate::Terminal;
        }
        if plan.is_empty() {
            debug!(
                target: "hotclump::dispatch",
                "worker {}: no operator needed for region {}", worker_id, plan.region_id
            );
            return PlanFate::Terminal;
        }
        for index in 0..plan.ops().len() {
            if plan.is_done(index) {
                debug!(
                    target: "hotclump::dispatch",
                    "worker {}: region {} op {} done earlier, skipping", worker_id, plan.region_id, index
                );
                continue;
            }
            let op = plan.ops()[index].clone();
            match self.pd.submit_operator(&op).await {
                Ok(outcome) if outcome.accepted => {
                    debug!(
                        target: "hotclump::dispatch",
                        "worker {}: region {} op {} accepted", worker_id, plan.region_id, index
                    );
                    plan.mark_done(index);
                }
                Ok(outcome) => {
                    let rejection =
                        Error::OperatorRejected { response: outcome.response.trim().to_string() };
                    warn!(
                        target: "hotclump::dispatch",
                        "worker {}: region {} op {} (retry {}): {}",
                        worker_id, plan.region_id, index, plan.retry_count, rejection
                    );
                    return self.classify_rejection(plan, &outcome.response).await;
                }
                Err(err) => {
                    // The invocation itself failed; nothing was classified,
                    // so the plan goes back untouched.
                    warn!(
                        target: "hotclump::dispatch",
                        "worker {}: region {} op send failed, requeueing: {}", worker_id, plan.region_id, err
                    );
                    self.queue.lock().push_back(plan);
                    return PlanFate::Requeued;
                }
            }
        }
        debug!(target: "hotclump::dispatch", "worker {}: region {} plan complete", worker_id, plan.region_id);
        PlanFate::Terminal
    }

    /// Route a PD rejection: a missing voter gets one straight retry, since
    /// the usual cause is a transfer-peer still materializing; everything
    /// else goes through reconciliation against live placement.
    async fn classify_rejection(&self, mut plan: OpPlan, response: &str) -> PlanFate {
        if response.contains("region has no voter in store") && plan.retry_count < 1 {
            plan.schedule_retry(self.settings.retry_interval());
            debug!(
                target: "hotclump::dispatch",
                "region {}: no voter yet, retry {} scheduled", plan.region_id, plan.retry_count
            );
            self.queue.lock().push_back(plan);
            return PlanFate::Requeued;
        }
        // "no operator step is built", "region has no peer in store", and
        // anything unrecognized all mean our picture of the region is off.
        self.reconcile(plan).await
    }

    /// Ask PD what the region really looks like and decide whether the plan
    /// is already satisfied, still in progress, or needs regenerating.
    async fn reconcile(&self, mut plan: OpPlan) -> PlanFate {
        let Some(target) = plan.target_store() else {
            return PlanFate::Terminal;
        };
        let region = match self.pd.fetch_region(plan.region_id).await {
            Ok(resp) => resp,
            Err(err) => {
                warn!(
                    target: "hotclump::dispatch",
                    "region {}: reconciliation fetch failed, dropping plan: {}", plan.region_id, err
                );
                return PlanFate::Terminal;
            }
        };
        let followers = region.follower_stores();
        if region.leader.store_id == target {
            debug!(
                target: "hotclump::dispatch",
                "region {}: store {} already leads, plan satisfied", plan.region_id, target
            );
            return PlanFate::Terminal;
        }
        let learner_at_target =
            region.peer_at_store(target).map(|p| p.is_learner()).unwrap_or(false);
        if followers.contains(&target) && learner_at_target {
            debug!(
                target: "hotclump::dispatch",
                "region {}: peer on store {} still a learner, waiting", plan.region_id, target
            );
            plan.schedule_retry(self.settings.retry_interval());
            self.queue.lock().push_back(plan);
            return PlanFate::Requeued;
        }
        debug!(
            target: "hotclump::dispatch",
            "region {}: regenerating plan toward store {}", plan.region_id, target
        );
        let mut fresh = generate_op_plan(
            plan.region_id,
            region.leader.store_id,
            &followers,
            target,
            plan.subplan_index,
        );
        fresh.retry_count = plan.retry_count + 1;
        fresh.earliest_retry_at = Some(Instant::now() + self.settings.retry_interval());
        self.queue.lock().push_back(fresh);
        PlanFate::Requeued
    }
}

#[cfg(test)]
mod dispatch_tests;
