//! Operator plans: the ordered PD command sequence for one region, with
//! per-command completion and retry state. A plan is owned by exactly one
//! dispatcher worker at a time; it changes hands through the queue, never
//! through shared access.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::route::{RegionId, StoreId};

/// A single PD operator command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    TransferLeader { region: RegionId, to: StoreId },
    TransferPeer { region: RegionId, from: StoreId, to: StoreId },
    AddPeer { region: RegionId, to: StoreId },
    RemovePeer { region: RegionId, to: StoreId },
}

impl Op {
    pub fn region(&self) -> RegionId {
        match self {
            Op::TransferLeader { region, .. }
            | Op::TransferPeer { region, .. }
            | Op::AddPeer { region, .. }
            | Op::RemovePeer { region, .. } => *region,
        }
    }

    /// The store this operator moves work toward.
    pub fn to_store(&self) -> StoreId {
        match self {
            Op::TransferLeader { to, .. }
            | Op::TransferPeer { to, .. }
            | Op::AddPeer { to, .. }
            | Op::RemovePeer { to, .. } => *to,
        }
    }

    /// Arguments for `pd-ctl ... operator add`.
    pub fn ctl_args(&self) -> Vec<String> {
        match self {
            Op::TransferLeader { region, to } => {
                vec!["transfer-leader".into(), region.to_string(), to.to_string()]
            }
            Op::TransferPeer { region, from, to } => {
                vec!["transfer-peer".into(), region.to_string(), from.to_string(), to.to_string()]
            }
            Op::AddPeer { region, to } => {
                vec!["add-peer".into(), region.to_string(), to.to_string()]
            }
            Op::RemovePeer { region, to } => {
                vec!["remove-peer".into(), region.to_string(), to.to_string()]
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpPlan {
    /// Index of the subplan this plan came from; diagnostic only.
    pub subplan_index: usize,
    pub region_id: RegionId,
    ops: Vec<Op>,
    op_done: Vec<bool>,
    pub retry_count: u32,
    pub earliest_retry_at: Option<Instant>,
}

impl OpPlan {
    pub fn new(subplan_index: usize, region_id: RegionId) -> Self {
        Self {
            subplan_index,
            region_id,
            ops: Vec::new(),
            op_done: Vec::new(),
            retry_count: 0,
            earliest_retry_at: None,
        }
    }

    pub fn push_op(&mut self, op: Op) {
        self.ops.push(op);
        self.op_done.push(false);
    }

    pub fn is_empty(&self) -> bool { self.ops.is_empty() }

    pub fn ops(&self) -> &[Op] { &self.ops }

    pub fn is_done(&self, index: usize) -> bool { self.op_done[index] }

    /// Completion is one-way: a done op never reverts.
    pub fn mark_done(&mut self, index: usize) { self.op_done[index] = true; }

    pub fn all_done(&self) -> bool { self.op_done.iter().all(|d| *d) }

    /// Final destination of the whole plan: the first operator's target.
    pub fn target_store(&self) -> Option<StoreId> {
        self.ops.first().map(|op| op.to_store())
    }

    /// Bump the retry count and push the plan's next eligible run time out
    /// by `after`.
    pub fn schedule_retry(&mut self, after: Duration) {
        self.retry_count += 1;
        self.earliest_retry_at = Some(Instant::now() + after);
    }
}
