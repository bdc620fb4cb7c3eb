//!
//! Snapshot rotation
//! -----------------
//! Periodic persistence of the graph as opaque blobs under a history
//! directory, keeping a bounded window of files and deleting the oldest
//! beyond it. The route is persisted on demand through `Route::save`; only
//! the graph churns enough to need a background loop.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use crate::config::SnapshotSettings;
use crate::error::Result;
use crate::graph::Graph;

pub struct SnapshotRotator {
    dir: PathBuf,
    prefix: String,
    window: usize,
    seq: u64,
    saved: Vec<PathBuf>,
}

impl SnapshotRotator {
    pub fn new(dir: impl Into<PathBuf>, prefix: &str, window: usize) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.to_string(),
            window: window.max(1),
            seq: 0,
            saved: Vec::new(),
        }
    }

    /// Write the graph to the next timestamped file, then delete the oldest
    /// file beyond the window. Rotation failures are best-effort.
    pub fn save_graph(&mut self, graph: &Graph) -> Result<PathBuf> {
        let path = self.next_path();
        graph.save(&path)?;
        self.retire_old(path.clone());
        Ok(path)
    }

    fn next_path(&mut self) -> PathBuf {
        let ms = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        self.seq += 1;
        // the sequence suffix keeps names unique within one millisecond
        self.dir.join(format!("{}_{}_{}.bin", self.prefix, ms, self.seq))
    }

    fn retire_old(&mut self, latest: PathBuf) {
        self.saved.push(latest);
        while self.saved.len() > self.window {
            let oldest = self.saved.remove(0);
            if std::fs::remove_file(&oldest).is_ok() {
                info!(target: "hotclump::snapshot", "removed old snapshot {}", oldest.display());
            }
        }
    }

    pub fn saved_files(&self) -> &[PathBuf] { &self.saved }

    pub fn dir(&self) -> &Path { &self.dir }
}

/// Handle for the background snapshot thread. The loop is detached; call
/// `stop` to let it wind down at the next tick boundary.
pub struct SnapshotLoop {
    stop: Arc<AtomicBool>,
}

impl SnapshotLoop {
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

/// Spawn the periodic graph snapshot thread.
pub fn start_graph_snapshots(graph: Arc<Graph>, settings: &SnapshotSettings) -> SnapshotLoop {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    let mut rotator = SnapshotRotator::new(&settings.dir, "graph", settings.window);
    let interval = settings.interval();
    std::thread::spawn(move || loop {
        // sleep in short slices so stop() takes effect promptly
        let mut waited = Duration::ZERO;
        while waited < interval {
            if flag.load(Ordering::Relaxed) {
                return;
            }
            let slice = Duration::from_millis(200).min(interval - waited);
            std::thread::sleep(slice);
            waited += slice;
        }
        match rotator.save_graph(&graph) {
            Ok(path) => info!(target: "hotclump::snapshot", "graph snapshot saved to {}", path.display()),
            Err(err) => warn!(target: "hotclump::snapshot", "graph snapshot failed: {}", err),
        }
    });
    SnapshotLoop { stop }
}

#[cfg(test)]
mod snapshot_tests;
