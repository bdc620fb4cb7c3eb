//!
//! Co-access graph engine
//! ----------------------
//! Ingests transactions and maintains, fully online: a weight per region
//! (how often it is touched), a weight per unordered region pair (how often
//! the two are touched together), and a max-heap over region weights from
//! which hot regions and connected hot clumps are extracted for planning.
//!
//! Key responsibilities:
//! - Commutative weight accumulation so transactions may apply in any order
//!   across ingest queues without changing the final graph.
//! - A stale-tolerant top heap: every weight bump pushes a fresh entry and
//!   readers skip entries that no longer match the live vertex weight.
//!   Keeping the heap exact would serialize the ingest path for no benefit.
//! - Clump extraction by BFS over edges above a weight threshold, seeded
//!   from the heap in descending weight order.
//! - Versioned bincode snapshots sufficient to rebuild the engine.
//!
//! Vertices and edges are created on first touch and never deleted during
//! normal operation. The graph is keyed by virtual region ids and is only
//! meaningful against the route generation those ids were assigned under.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeSet, BinaryHeap, HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::graph::clump::Clump;
use crate::graph::edge::{Edge, EdgeKey};
use crate::graph::sharded::{ShardedMap, DEFAULT_BUCKETS};
use crate::graph::vertex::Vertex;

/// Dense 0-based region index, valid for a single route generation.
pub type VirtualRegionId = u64;

/// Heap entry: max by weight, FIFO among equal weights. The sequence number
/// makes the ordering total so extraction is deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct HeapEntry {
    weight: u64,
    seq: u64,
    region: VirtualRegionId,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // BinaryHeap is a max-heap: heavier first, then earlier push first.
        self.weight.cmp(&other.weight).then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> { Some(self.cmp(other)) }
}

pub struct Graph {
    vertices: ShardedMap<VirtualRegionId, Arc<Vertex>>,
    edges: ShardedMap<EdgeKey, Arc<Edge>>,
    top_heap: Mutex<BinaryHeap<HeapEntry>>,
    heap_seq: AtomicU64,
    w_inter: u64,
    w_intra: u64,
    hot_threshold: u64,
}

impl Graph {
    pub fn new(w_inter: u64, w_intra: u64, hot_threshold: u64) -> Self {
        Self::with_buckets(w_inter, w_intra, hot_threshold, DEFAULT_BUCKETS)
    }

    pub fn with_buckets(w_inter: u64, w_intra: u64, hot_threshold: u64, buckets: usize) -> Self {
        Self {
            vertices: ShardedMap::new(buckets),
            edges: ShardedMap::new(buckets),
            top_heap: Mutex::new(BinaryHeap::new()),
            heap_seq: AtomicU64::new(0),
            w_inter,
            w_intra,
            hot_threshold,
        }
    }

    pub fn hot_threshold(&self) -> u64 { self.hot_threshold }

    fn vertex(&self, region: VirtualRegionId) -> Arc<Vertex> {
        self.vertices.get_or_insert_with(region, || Arc::new(Vertex::new(region))).0
    }

    fn bump_vertex(&self, region: VirtualRegionId, value: u64) {
        let vertex = self.vertex(region);
        let weight = vertex.increment_weight(value);
        let seq = self.heap_seq.fetch_add(1, Ordering::Relaxed);
        self.top_heap.lock().push(HeapEntry { weight, seq, region });
    }

    fn bump_edge(&self, x: VirtualRegionId, y: VirtualRegionId, value: u64) {
        let key = EdgeKey::new(x, y);
        let delta = if key.is_loop() { self.w_intra * value } else { self.w_inter * value };
        let (edge, created) = self.edges.get_or_insert_with(key, || Arc::new(Edge::new(key)));
        if created {
            // Racy double-insert from two threads is harmless: set insert is
            // idempotent and both sides record the same adjacency.
            self.vertex(key.a).add_neighbor(key.b);
            self.vertex(key.b).add_neighbor(key.a);
        }
        edge.increment_weight(delta);
    }

    /// Apply one transaction: every touched region's weight grows by
    /// `weight` per occurrence, and every unordered position pair grows the
    /// corresponding edge (intra coefficient when the pair hits the same
    /// region twice, inter otherwise). Infallible by design: ingestion never
    /// fails the caller.
    ///
    /// Never holds one lock while acquiring another, so it cannot deadlock
    /// against concurrent ingest or readers.
    pub fn add_transaction(&self, regions: &[VirtualRegionId], weight: u64) {
        for &region in regions {
            self.bump_vertex(region, weight);
        }
        for i in 0..regions.len() {
            for j in i + 1..regions.len() {
                self.bump_edge(regions[i], regions[j], weight);
            }
        }
    }

    pub fn vertex_weight(&self, region: VirtualRegionId) -> u64 {
        self.vertices.get(&region).map(|v| v.weight()).unwrap_or(0)
    }

    pub fn edge_weight(&self, x: VirtualRegionId, y: VirtualRegionId) -> u64 {
        self.edges.get(&EdgeKey::new(x, y)).map(|e| e.weight()).unwrap_or(0)
    }

    /// Snapshot copy of a region's adjacency; empty for unknown regions.
    pub fn neighbors(&self, region: VirtualRegionId) -> Vec<VirtualRegionId> {
        self.vertices.get(&region).map(|v| v.neighbors()).unwrap_or_default()
    }

    pub fn vertex_count(&self) -> usize { self.vertices.len() }

    pub fn edge_count(&self) -> usize { self.edges.len() }

    /// Every region whose current weight meets the hot threshold, heaviest
    /// first. Stale heap entries (weight no longer current) and duplicates
    /// are dropped; every current entry is pushed back so the heap keeps at
    /// least one live entry per region.
    pub fn top_hot_regions(&self) -> Vec<(VirtualRegionId, u64)> {
        let mut heap = self.top_heap.lock();
        let mut keep = Vec::with_capacity(heap.len());
        let mut seen: HashSet<VirtualRegionId> = HashSet::new();
        let mut hot = Vec::new();
        while let Some(entry) = heap.pop() {
            if entry.weight != self.vertex_weight(entry.region) || !seen.insert(entry.region) {
                continue;
            }
            if entry.weight >= self.hot_threshold {
                hot.push((entry.region, entry.weight));
            }
            keep.push(entry);
        }
        for entry in keep {
            heap.push(entry);
        }
        hot
    }

    /// Extract connected hot clumps. Seeds pop from a working copy of the
    /// heap in descending weight order (FIFO among ties); from each unvisited
    /// seed a BFS spreads over edges whose weight is strictly above
    /// `edge_thresh`. Every touched region lands in exactly one clump, and a
    /// clump's `hot` is the sum of its members' current weights.
    ///
    /// The persistent heap is left untouched.
    pub fn hot_clumps(&self, edge_thresh: u64) -> Vec<Clump> {
        let mut heap = self.top_heap.lock().clone();
        let mut visited: HashSet<VirtualRegionId> = HashSet::new();
        let mut clumps = Vec::new();
        while let Some(entry) = heap.pop() {
            if visited.contains(&entry.region) {
                continue;
            }
            let mut members: BTreeSet<VirtualRegionId> = BTreeSet::new();
            let mut hot = 0u64;
            let mut queue = VecDeque::from([entry.region]);
            while let Some(region) = queue.pop_front() {
                if !visited.insert(region) {
                    continue;
                }
                members.insert(region);
                hot += self.vertex_weight(region);
                for neighbor in self.neighbors(region) {
                    if !visited.contains(&neighbor) && self.edge_weight(region, neighbor) > edge_thresh {
                        queue.push_back(neighbor);
                    }
                }
            }
            if !members.is_empty() {
                clumps.push(Clump::new(members, hot));
            }
        }
        debug!(target: "hotclump::graph", "extracted {} clumps (edge_thresh={})", clumps.len(), edge_thresh);
        clumps
    }

    /// Write a snapshot sufficient to reconstruct the engine. Locks are not
    /// part of the snapshot; they are rebuilt on load.
    pub fn save(&self, path: &Path) -> Result<()> {
        let snap = GraphSnapshot {
            version: SNAPSHOT_VERSION,
            w_inter: self.w_inter,
            w_intra: self.w_intra,
            hot_threshold: self.hot_threshold,
            heap_seq: self.heap_seq.load(Ordering::Relaxed),
            vertices: self.vertices.snapshot().into_iter().map(|(k, v)| (k, v.weight())).collect(),
            edges: self.edges.snapshot().into_iter().map(|(k, e)| (k, e.weight())).collect(),
            heap: self.top_heap.lock().iter().copied().collect(),
        };
        let bytes = bincode::serialize(&snap).map_err(Error::snapshot_io)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let tmp = path.with_extension("bin.tmp");
        std::fs::write(&tmp, bytes).map_err(Error::snapshot_io)?;
        std::fs::rename(&tmp, path).map_err(Error::snapshot_io)?;
        debug!(target: "hotclump::graph", "snapshot written to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Graph> {
        let bytes = std::fs::read(path).map_err(Error::snapshot_io)?;
        let snap: GraphSnapshot = bincode::deserialize(&bytes).map_err(Error::snapshot_io)?;
        if snap.version != SNAPSHOT_VERSION {
            return Err(Error::SnapshotIo {
                reason: format!("unsupported graph snapshot version {}", snap.version),
            });
        }
        let graph = Graph::new(snap.w_inter, snap.w_intra, snap.hot_threshold);
        for (region, weight) in snap.vertices {
            let vertex = graph.vertex(region);
            if weight > 0 {
                vertex.increment_weight(weight);
            }
        }
        // Adjacency is derivable from the edge set, so it is rebuilt here
        // instead of being stored twice.
        for (key, weight) in snap.edges {
            let (edge, _) = graph.edges.get_or_insert_with(key, || Arc::new(Edge::new(key)));
            graph.vertex(key.a).add_neighbor(key.b);
            graph.vertex(key.b).add_neighbor(key.a);
            if weight > 0 {
                edge.increment_weight(weight);
            }
        }
        *graph.top_heap.lock() = snap.heap.into_iter().collect();
        graph.heap_seq.store(snap.heap_seq, Ordering::Relaxed);
        Ok(graph)
    }
}

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct GraphSnapshot {
    version: u32,
    w_inter: u64,
    w_intra: u64,
    hot_threshold: u64,
    heap_seq: u64,
    vertices: Vec<(VirtualRegionId, u64)>,
    edges: Vec<(EdgeKey, u64)>,
    heap: Vec<HeapEntry>,
}

pub mod clump;
pub mod edge;
pub mod sharded;
pub mod vertex;
