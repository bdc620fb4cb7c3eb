//! A clump is a set of regions observed to be tightly co-accessed, treated
//! as one placement unit. It is derived data: target assignment lives on
//! the planner's SubPlan, never here.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::graph::VirtualRegionId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clump {
    pub region_ids: BTreeSet<VirtualRegionId>,
    /// Sum of member vertex weights at extraction time.
    pub hot: u64,
}

impl Clump {
    pub fn new(region_ids: BTreeSet<VirtualRegionId>, hot: u64) -> Self {
        Self { region_ids, hot }
    }

    pub fn len(&self) -> usize { self.region_ids.len() }

    pub fn is_empty(&self) -> bool { self.region_ids.is_empty() }

    pub fn contains(&self, region: VirtualRegionId) -> bool { self.region_ids.contains(&region) }
}
