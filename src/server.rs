//!
//! hotclump HTTP service
//! ---------------------
//! Axum surface for the ingest service: transaction submission plus
//! read-only hot-region and clump inspection. All semantics live in the
//! core modules; this layer only adapts HTTP.
//!
//! Endpoints:
//! - `POST /transactions` with `{"region_ids": [..], "weight": n}` enqueues
//!   one transaction and answers `{"success": true}` (503 and `false` when
//!   the ingest queues are saturated).
//! - `GET /hot/regions` lists regions at or above the hot threshold.
//! - `GET /hot/clumps?edge_thresh=N` extracts clumps at the given (or
//!   configured) edge threshold.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::Config;
use crate::graph::Graph;
use crate::ingest::IngestPool;
use crate::snapshot;

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub graph: Arc<Graph>,
    pub ingest: Arc<IngestPool>,
    /// Default edge threshold for clump extraction when the query string
    /// does not override it.
    pub edge_thresh: u64,
}

#[derive(Deserialize)]
struct TransactionBody {
    region_ids: Vec<u64>,
    #[serde(default = "default_weight")]
    weight: u64,
}

fn default_weight() -> u64 { 1 }

#[derive(Serialize)]
struct SubmitResponse {
    success: bool,
}

async fn submit_transaction(
    State(state): State<AppState>,
    Json(body): Json<TransactionBody>,
) -> (StatusCode, Json<SubmitResponse>) {
    match state.ingest.submit_weighted(&body.region_ids, body.weight) {
        Ok(()) => (StatusCode::OK, Json(SubmitResponse { success: true })),
        Err(err) => {
            warn!(target: "hotclump::server", "transaction rejected: {}", err);
            (StatusCode::SERVICE_UNAVAILABLE, Json(SubmitResponse { success: false }))
        }
    }
}

#[derive(Serialize)]
struct HotRegionView {
    region: u64,
    weight: u64,
}

async fn hot_regions(State(state): State<AppState>) -> Json<Vec<HotRegionView>> {
    let hot = state
        .graph
        .top_hot_regions()
        .into_iter()
        .map(|(region, weight)| HotRegionView { region, weight })
        .collect();
    Json(hot)
}

#[derive(Deserialize)]
struct ClumpQuery {
    edge_thresh: Option<u64>,
}

#[derive(Serialize)]
struct ClumpView {
    region_ids: Vec<u64>,
    hot: u64,
}

async fn hot_clumps(
    State(state): State<AppState>,
    Query(query): Query<ClumpQuery>,
) -> Json<Vec<ClumpView>> {
    let thresh = query.edge_thresh.unwrap_or(state.edge_thresh);
    let clumps = state
        .graph
        .hot_clumps(thresh)
        .into_iter()
        .map(|c| ClumpView { region_ids: c.region_ids.iter().copied().collect(), hot: c.hot })
        .collect();
    Json(clumps)
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/transactions", post(submit_transaction))
        .route("/hot/regions", get(hot_regions))
        .route("/hot/clumps", get(hot_clumps))
        .with_state(state)
}

/// Start the ingest service: one graph for the life of the process, the
/// ingest worker pool, the optional snapshot loop, and the HTTP listener.
pub async fn run(http_port: u16, config: Config) -> anyhow::Result<()> {
    let graph = Arc::new(Graph::with_buckets(
        config.graph.w_inter,
        config.graph.w_intra,
        config.graph.hot_threshold,
        config.graph.buckets,
    ));
    let ingest = Arc::new(IngestPool::start(graph.clone(), &config.ingest));
    let snapshot_loop = config
        .snapshot
        .enabled
        .then(|| snapshot::start_graph_snapshots(graph.clone(), &config.snapshot));

    let state = AppState { graph, ingest, edge_thresh: config.graph.edge_thresh };
    let addr = SocketAddr::from(([0, 0, 0, 0], http_port));
    info!(target: "hotclump::server", "listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;

    if let Some(snapshot_loop) = snapshot_loop {
        snapshot_loop.stop();
    }
    Ok(())
}
