//!
//! Transaction ingest front door
//! -----------------------------
//! Hashes each incoming transaction onto one of a fixed set of bounded
//! queues, each drained by a few worker threads that apply it to the graph.
//! Submission returns as soon as the task is enqueued and never blocks on
//! graph work; a full queue rejects instead. Transactions that hash to the
//! same queue dequeue in FIFO order; across queues there is no ordering,
//! which is fine because graph updates commute.

use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Sender, TrySendError};
use tracing::{debug, warn};
use xxhash_rust::xxh3::Xxh3;

use crate::config::IngestSettings;
use crate::error::{Error, Result};
use crate::graph::{Graph, VirtualRegionId};

struct Task {
    regions: Vec<VirtualRegionId>,
    weight: u64,
}

pub struct IngestPool {
    graph: Arc<Graph>,
    queues: Vec<Sender<Task>>,
    workers: Vec<JoinHandle<()>>,
}

impl IngestPool {
    /// Spawn `queue_count * workers_per_queue` worker threads over bounded
    /// queues and start accepting transactions.
    pub fn start(graph: Arc<Graph>, settings: &IngestSettings) -> Self {
        let queue_count = settings.queue_count.max(1);
        let mut queues = Vec::with_capacity(queue_count);
        let mut workers = Vec::new();
        for queue_index in 0..queue_count {
            let (tx, rx) = bounded::<Task>(settings.queue_capacity.max(1));
            queues.push(tx);
            for _ in 0..settings.workers_per_queue {
                let rx = rx.clone();
                let graph = graph.clone();
                workers.push(std::thread::spawn(move || {
                    while let Ok(task) = rx.recv() {
                        graph.add_transaction(&task.regions, task.weight);
                    }
                    debug!(target: "hotclump::ingest", "worker for queue {} drained, exiting", queue_index);
                }));
            }
        }
        Self { graph, queues, workers }
    }

    /// Enqueue one transaction with weight 1.
    pub fn submit(&self, regions: &[VirtualRegionId]) -> Result<()> {
        self.submit_weighted(regions, 1)
    }

    /// Enqueue one transaction. The ordered region tuple picks the queue, so
    /// identical transactions always serialize behind each other.
    pub fn submit_weighted(&self, regions: &[VirtualRegionId], weight: u64) -> Result<()> {
        let queue_index = queue_for(regions, self.queues.len());
        let task = Task { regions: regions.to_vec(), weight };
        match self.queues[queue_index].try_send(task) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!(target: "hotclump::ingest", "queue {} full, rejecting transaction", queue_index);
                Err(Error::Overloaded)
            }
            Err(TrySendError::Disconnected(_)) => Err(Error::Overloaded),
        }
    }

    pub fn graph(&self) -> &Arc<Graph> { &self.graph }

    /// Close the submission side, let every worker drain its queue, and join
    /// them. Consumes the pool: after this no further transactions apply.
    pub fn shutdown(mut self) {
        self.queues.clear();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn queue_for(regions: &[VirtualRegionId], queue_count: usize) -> usize {
    let mut hasher = Xxh3::new();
    regions.hash(&mut hasher);
    (hasher.finish() as usize) % queue_count
}
