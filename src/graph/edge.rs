//! Co-access edge record, keyed by the unordered region pair.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::graph::VirtualRegionId;

/// Unordered pair key. Stored smaller-id-first so `{a,b}` and `{b,a}`
/// resolve to the same edge. A self-loop (`a == b`) is a legal key and
/// carries a transaction's intra-region association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeKey {
    pub a: VirtualRegionId,
    pub b: VirtualRegionId,
}

impl EdgeKey {
    pub fn new(x: VirtualRegionId, y: VirtualRegionId) -> Self {
        if x <= y { Self { a: x, b: y } } else { Self { a: y, b: x } }
    }

    pub fn is_loop(&self) -> bool { self.a == self.b }
}

pub struct Edge {
    pub key: EdgeKey,
    weight: AtomicU64,
}

impl Edge {
    pub fn new(key: EdgeKey) -> Self {
        Self { key, weight: AtomicU64::new(0) }
    }

    /// Add `value` to the edge weight and return the post-add value.
    pub fn increment_weight(&self, value: u64) -> u64 {
        self.weight.fetch_add(value, Ordering::Relaxed) + value
    }

    pub fn weight(&self) -> u64 { self.weight.load(Ordering::Relaxed) }
}
