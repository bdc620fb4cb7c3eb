//! Per-region vertex record. The weight rides an atomic so the hot ingest
//! path never takes the record lock; the lock only guards the neighbor set.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::graph::VirtualRegionId;

pub struct Vertex {
    pub region_id: VirtualRegionId,
    weight: AtomicU64,
    neighbors: Mutex<HashSet<VirtualRegionId>>,
}

impl Vertex {
    pub fn new(region_id: VirtualRegionId) -> Self {
        Self { region_id, weight: AtomicU64::new(0), neighbors: Mutex::new(HashSet::new()) }
    }

    /// Add `value` to the vertex weight and return the post-add value.
    pub fn increment_weight(&self, value: u64) -> u64 {
        self.weight.fetch_add(value, Ordering::Relaxed) + value
    }

    pub fn weight(&self) -> u64 { self.weight.load(Ordering::Relaxed) }

    pub fn add_neighbor(&self, region: VirtualRegionId) {
        self.neighbors.lock().insert(region);
    }

    /// Snapshot copy of the adjacency set, so callers iterate without
    /// holding the record lock.
    pub fn neighbors(&self) -> Vec<VirtualRegionId> {
        self.neighbors.lock().iter().copied().collect()
    }

    pub fn neighbor_count(&self) -> usize { self.neighbors.lock().len() }
}
