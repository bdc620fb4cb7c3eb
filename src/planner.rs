//!
//! Placement planner
//! -----------------
//! Turns hot clumps into per-clump target stores in two phases: a
//! minimum-cost assignment that favors stores already holding a clump's
//! replicas (leaders weighted extra), then variance-driven equalization
//! that migrates clumps off overloaded stores until normalized loads are
//! flat enough. Deterministic for a fixed input: stores iterate in id
//! order and clumps in input order.

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crate::config::PlannerSettings;
use crate::error::Result;
use crate::graph::clump::Clump;
use crate::route::{Route, StoreId};

/// One clump's placement decision. The clump itself stays immutable; the
/// assignment lives here and nowhere else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubPlan {
    pub clump: Clump,
    /// Stores currently holding any replica of a member region (leaders and
    /// followers, duplicates preserved). Diagnostic: shows what the move
    /// displaces.
    pub origin_stores: Vec<StoreId>,
    pub target_store: StoreId,
}

pub struct Planner {
    settings: PlannerSettings,
}

impl Planner {
    pub fn new(settings: PlannerSettings) -> Self {
        Self { settings }
    }

    /// Cost of concentrating `clump` on each store: `-(leaders·w_leader +
    /// followers)`, so the store already holding the most of the clump wins.
    fn evaluate(&self, clump: &Clump, route: &Route) -> Result<BTreeMap<StoreId, i64>> {
        let mut costs: BTreeMap<StoreId, i64> =
            route.all_stores().into_iter().map(|s| (s, 0)).collect();
        for &region in &clump.region_ids {
            let leader = route.leader_of(region)?;
            let followers = route.followers_of(region)?;
            for (store, cost) in costs.iter_mut() {
                if leader == *store {
                    *cost -= self.settings.w_leader as i64;
                }
                if followers.contains(store) {
                    *cost -= 1;
                }
            }
        }
        Ok(costs)
    }

    /// Assign every clump a target store and equalize the resulting loads.
    /// Every clump lands in exactly one SubPlan.
    pub fn generate_subplans(&self, clumps: &[Clump], route: &Route) -> Result<Vec<SubPlan>> {
        if route.store_count() == 0 || clumps.is_empty() {
            return Ok(Vec::new());
        }
        let mut load: BTreeMap<StoreId, u64> =
            route.all_stores().into_iter().map(|s| (s, 0)).collect();
        let mut subplans = Vec::with_capacity(clumps.len());
        for clump in clumps {
            let costs = self.evaluate(clump, route)?;
            // ties go to the lowest store id (min_by_key keeps the first minimum)
            let Some(target) = costs.iter().min_by_key(|(_, &c)| c).map(|(&s, _)| s) else {
                continue;
            };
            let mut origin_stores = Vec::new();
            for &region in &clump.region_ids {
                origin_stores.push(route.leader_of(region)?);
                origin_stores.extend(route.followers_of(region)?);
            }
            *load.entry(target).or_insert(0) += clump.hot;
            subplans.push(SubPlan { clump: clump.clone(), origin_stores, target_store: target });
        }
        debug!(target: "hotclump::planner", "phase-1 store loads: {:?}", load);
        self.balance(&mut subplans, &mut load);
        debug!(target: "hotclump::planner", "phase-2 store loads: {:?}", load);
        Ok(subplans)
    }

    /// Phase 2: migrate clumps from overloaded stores to the lightest store
    /// until the normalized load variance drops below the threshold, the
    /// overloaded set empties twice in a row, or a pass makes no progress.
    /// A clump moves at most once, which rules out oscillation.
    fn balance(&self, subplans: &mut [SubPlan], load: &mut BTreeMap<StoreId, u64>) {
        if load.is_empty() {
            return;
        }
        // total load is invariant under moves, so the mean is fixed up front
        let mean = load.values().sum::<u64>() as f64 / load.len() as f64;
        let mut moved: HashSet<usize> = HashSet::new();
        let mut overloaded = Self::overloaded_stores(load, mean);
        let mut empty_rebuilds = 0u32;
        let mut round = 0u32;
        loop {
            let variance = Self::normalized_variance(load);
            if variance <= self.settings.variance_threshold {
                break;
            }
            if overloaded.is_empty() {
                empty_rebuilds += 1;
                if empty_rebuilds >= 2 {
                    break;
                }
                overloaded = Self::overloaded_stores(load, mean);
                if overloaded.is_empty() {
                    break;
                }
                continue;
            }
            empty_rebuilds = 0;
            round += 1;
            debug!(
                target: "hotclump::planner",
                "balance round {}: variance {:.6} over {} overloaded stores",
                round, variance, overloaded.len()
            );
            let mut moved_any = false;
            for donor in overloaded.clone() {
                if (load[&donor] as f64) <= mean {
                    overloaded.retain(|s| *s != donor);
                    continue;
                }
                let Some(receiver) = load.iter().min_by_key(|&(&s, &l)| (l, s)).map(|(&s, _)| s)
                else {
                    break;
                };
                let batch: Vec<usize> = subplans
                    .iter()
                    .enumerate()
                    .filter(|(i, sp)| sp.target_store == donor && !moved.contains(i))
                    .map(|(i, _)| i)
                    .take(self.settings.batch_size)
                    .collect();
                for index in batch {
                    let hot = subplans[index].clump.hot;
                    load.entry(donor).and_modify(|l| *l -= hot);
                    load.entry(receiver).and_modify(|l| *l += hot);
                    subplans[index].target_store = receiver;
                    moved.insert(index);
                    moved_any = true;
                    if (load[&donor] as f64) <= mean || (load[&receiver] as f64) >= mean {
                        break;
                    }
                }
                if (load[&donor] as f64) <= mean {
                    overloaded.retain(|s| *s != donor);
                }
            }
            if !moved_any {
                debug!(target: "hotclump::planner", "balance stalled after round {}, stopping", round);
                break;
            }
        }
    }

    /// Population variance of loads normalized by their sum.
    fn normalized_variance(load: &BTreeMap<StoreId, u64>) -> f64 {
        let total: u64 = load.values().sum();
        let total = if total == 0 { 1.0 } else { total as f64 };
        let n = load.len() as f64;
        let mean = load.values().map(|&l| l as f64 / total).sum::<f64>() / n;
        load.values().map(|&l| l as f64 / total - mean).map(|d| d * d).sum::<f64>() / n
    }

    /// Stores above the mean, heaviest first, ties by ascending id.
    fn overloaded_stores(load: &BTreeMap<StoreId, u64>, mean: f64) -> Vec<StoreId> {
        let mut stores: Vec<StoreId> = load
            .iter()
            .filter(|(_, &l)| (l as f64) > mean)
            .map(|(&s, _)| s)
            .collect();
        stores.sort_by(|a, b| load[b].cmp(&load[a]).then(a.cmp(b)));
        stores
    }
}

/// Per-store load implied by a set of subplans. Used by callers to report
/// the balance a plan would produce.
pub fn store_loads(subplans: &[SubPlan]) -> BTreeMap<StoreId, u64> {
    let mut load: BTreeMap<StoreId, u64> = BTreeMap::new();
    for subplan in subplans {
        *load.entry(subplan.target_store).or_insert(0) += subplan.clump.hot;
    }
    load
}
