//!
//! Runtime configuration
//! ---------------------
//! All tunables for the graph engine, ingest pool, planner, dispatcher, PD
//! access and snapshotting, as one serde record with per-field defaults.
//! Binaries load an optional JSON file and layer environment variables and
//! CLI flags on top (flag > env > file > default).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub graph: GraphSettings,
    #[serde(default)]
    pub ingest: IngestSettings,
    #[serde(default)]
    pub planner: PlannerSettings,
    #[serde(default)]
    pub dispatch: DispatchSettings,
    #[serde(default)]
    pub pd: PdSettings,
    #[serde(default)]
    pub snapshot: SnapshotSettings,
}

impl Config {
    /// Load a config record from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSettings {
    /// Edge-weight coefficient applied to pairs of distinct regions.
    #[serde(default = "GraphSettings::default_w_inter")]
    pub w_inter: u64,
    /// Edge-weight coefficient applied when a transaction touches the same region twice.
    #[serde(default = "GraphSettings::default_w_intra")]
    pub w_intra: u64,
    /// Minimum vertex weight for a region to count as hot.
    #[serde(default)]
    pub hot_threshold: u64,
    /// Minimum edge weight for two regions to clump together.
    #[serde(default)]
    pub edge_thresh: u64,
    /// Bucket count for the sharded vertex/edge maps. Rounded up to a power of two.
    #[serde(default = "GraphSettings::default_buckets")]
    pub buckets: usize,
}

impl GraphSettings {
    fn default_w_inter() -> u64 { 10 }
    fn default_w_intra() -> u64 { 1 }
    fn default_buckets() -> usize { 1024 }
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            w_inter: Self::default_w_inter(),
            w_intra: Self::default_w_intra(),
            hot_threshold: 0,
            edge_thresh: 0,
            buckets: Self::default_buckets(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestSettings {
    /// Number of independent ingest queues.
    #[serde(default = "IngestSettings::default_queue_count")]
    pub queue_count: usize,
    /// Worker threads per queue.
    #[serde(default = "IngestSettings::default_workers_per_queue")]
    pub workers_per_queue: usize,
    /// Maximum queued transactions per queue before submissions are rejected.
    #[serde(default = "IngestSettings::default_queue_capacity")]
    pub queue_capacity: usize,
}

impl IngestSettings {
    fn default_queue_count() -> usize { 10 }
    fn default_workers_per_queue() -> usize { 2 }
    fn default_queue_capacity() -> usize { 10_000 }
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            queue_count: Self::default_queue_count(),
            workers_per_queue: Self::default_workers_per_queue(),
            queue_capacity: Self::default_queue_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerSettings {
    /// Weight of an existing leader replica when costing a clump against a store.
    #[serde(default = "PlannerSettings::default_w_leader")]
    pub w_leader: u64,
    /// Stop equalizing once the population variance of normalized loads drops below this.
    #[serde(default = "PlannerSettings::default_variance_threshold")]
    pub variance_threshold: f64,
    /// Clumps migrated off an overloaded store per balancing step.
    #[serde(default = "PlannerSettings::default_batch_size")]
    pub batch_size: usize,
}

impl PlannerSettings {
    fn default_w_leader() -> u64 { 10 }
    fn default_variance_threshold() -> f64 { 1e-4 }
    fn default_batch_size() -> usize { 5 }
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            w_leader: Self::default_w_leader(),
            variance_threshold: Self::default_variance_threshold(),
            batch_size: Self::default_batch_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSettings {
    /// Retry budget per operator plan.
    #[serde(default = "DispatchSettings::default_max_retry")]
    pub max_retry: u32,
    /// Delay before a rescheduled plan runs again.
    #[serde(default = "DispatchSettings::default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    /// Dispatcher worker pool size.
    #[serde(default = "DispatchSettings::default_max_workers")]
    pub max_workers: usize,
}

impl DispatchSettings {
    fn default_max_retry() -> u32 { 10 }
    fn default_retry_interval_ms() -> u64 { 20_000 }
    fn default_max_workers() -> usize { 20 }

    pub fn retry_interval(&self) -> Duration { Duration::from_millis(self.retry_interval_ms) }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            max_retry: Self::default_max_retry(),
            retry_interval_ms: Self::default_retry_interval_ms(),
            max_workers: Self::default_max_workers(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdSettings {
    /// Base URL of the placement director.
    #[serde(default = "PdSettings::default_url")]
    pub url: String,
    /// Database whose table regions feed the route refresh.
    #[serde(default = "PdSettings::default_db")]
    pub db: String,
    /// Table whose regions feed the route refresh.
    #[serde(default = "PdSettings::default_table")]
    pub table: String,
    /// Per-request timeout for PD calls.
    #[serde(default = "PdSettings::default_timeout_ms")]
    pub timeout_ms: u64,
    /// Binary invoked to submit operators (`<ctl_bin> -u <url> operator add ...`).
    #[serde(default = "PdSettings::default_ctl_bin")]
    pub ctl_bin: String,
}

impl PdSettings {
    fn default_url() -> String { "http://127.0.0.1:2379".to_string() }
    fn default_db() -> String { "test".to_string() }
    fn default_table() -> String { "usertable".to_string() }
    fn default_timeout_ms() -> u64 { 10_000 }
    fn default_ctl_bin() -> String { "pd-ctl".to_string() }

    pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_ms) }
}

impl Default for PdSettings {
    fn default() -> Self {
        Self {
            url: Self::default_url(),
            db: Self::default_db(),
            table: Self::default_table(),
            timeout_ms: Self::default_timeout_ms(),
            ctl_bin: Self::default_ctl_bin(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotSettings {
    /// Enable the periodic graph snapshot thread.
    #[serde(default)]
    pub enabled: bool,
    /// Interval between snapshots.
    #[serde(default = "SnapshotSettings::default_interval_ms")]
    pub interval_ms: u64,
    /// How many snapshot files to keep before the oldest is deleted.
    #[serde(default = "SnapshotSettings::default_window")]
    pub window: usize,
    /// Directory snapshot files are written to.
    #[serde(default = "SnapshotSettings::default_dir")]
    pub dir: String,
}

impl SnapshotSettings {
    fn default_interval_ms() -> u64 { 60_000 }
    fn default_window() -> usize { 10 }
    fn default_dir() -> String { "history".to_string() }

    pub fn interval(&self) -> Duration { Duration::from_millis(self.interval_ms) }
}

impl Default for SnapshotSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: Self::default_interval_ms(),
            window: Self::default_window(),
            dir: Self::default_dir(),
        }
    }
}
