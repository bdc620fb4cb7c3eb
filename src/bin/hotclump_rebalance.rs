//!
//! hotclump rebalance driver
//! -------------------------
//! One-shot pipeline: load (or refresh) the route, load a graph snapshot
//! taken against that route generation, extract hot clumps, plan target
//! stores, and dispatch the operator sequences to PD. `--round-robin`
//! bypasses the planner entirely and `--mock` records operators instead of
//! sending them.

use anyhow::{bail, Context, Result};
use std::env;
use std::path::Path;
use std::sync::Arc;

use hotclump::config::Config;
use hotclump::dispatch::{self, Dispatcher};
use hotclump::graph::Graph;
use hotclump::pd::{CtlBackend, MockPd, PdBackend, PdHttpClient};
use hotclump::planner::{store_loads, Planner};
use hotclump::route::Route;

fn parse_u64_arg(args: &[String], flag: &str) -> Option<u64> {
    parse_string_arg(args, flag).and_then(|v| v.parse::<u64>().ok())
}

fn parse_string_arg(args: &[String], flag: &str) -> Option<String> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
        i += 1;
    }
    None
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let args: Vec<String> = env::args().collect();

    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        println!(
            "hotclump rebalance driver\n\n\
             USAGE:\n  hotclump_rebalance --graph PATH [--route PATH] [--pd URL] [--config PATH]\n                     [--edge-thresh N] [--save-route PATH] [--round-robin] [--mock]\n\n\
             OPTIONS:\n  --graph PATH       Graph snapshot to plan from (not needed with --round-robin)\n  --route PATH       Route snapshot; omitted means refresh from PD\n  --pd URL           PD base URL (overrides config)\n  --config PATH      JSON config file (env: HOTCLUMP_CONFIG)\n  --edge-thresh N    Edge weight needed to clump two regions together\n  --save-route PATH  Persist the refreshed route before planning\n  --round-robin      Spread leaders round-robin instead of planning\n  --mock             Record operators instead of invoking pd-ctl\n"
        );
        return Ok(());
    }

    let config_path = parse_string_arg(&args, "--config").or_else(|| env::var("HOTCLUMP_CONFIG").ok());
    let mut config = match &config_path {
        Some(path) => Config::load(Path::new(path))
            .with_context(|| format!("While loading config file: {}", path))?,
        None => Config::default(),
    };
    if let Some(url) = parse_string_arg(&args, "--pd") {
        config.pd.url = url;
    }
    let edge_thresh = parse_u64_arg(&args, "--edge-thresh").unwrap_or(config.graph.edge_thresh);

    // Route first: the graph snapshot is only meaningful against the route
    // generation it was built with.
    let route = match parse_string_arg(&args, "--route") {
        Some(path) => Route::load(Path::new(&path))
            .with_context(|| format!("While loading route snapshot: {}", path))?,
        None => {
            let client = PdHttpClient::new(&config.pd)?;
            Route::refresh_from_pd(&client, 1)
                .await
                .with_context(|| format!("While refreshing route from {}", config.pd.url))?
        }
    };
    println!(
        "route generation {}: {} regions over {} stores",
        route.generation(),
        route.region_count(),
        route.store_count()
    );
    if let Some(path) = parse_string_arg(&args, "--save-route") {
        route.save(Path::new(&path))?;
        println!("route snapshot saved to {}", path);
    }

    let mock = has_flag(&args, "--mock");
    let mock_pd = mock.then(MockPd::new);
    let backend: Arc<dyn PdBackend> = match &mock_pd {
        Some(pd) => pd.clone(),
        None => Arc::new(CtlBackend::new(&config.pd)?),
    };

    let plans = if has_flag(&args, "--round-robin") {
        dispatch::round_robin_op_plans(&route)?
    } else {
        let Some(graph_path) = parse_string_arg(&args, "--graph") else {
            bail!("--graph PATH is required unless --round-robin is given");
        };
        let graph = Graph::load(Path::new(&graph_path))
            .with_context(|| format!("While loading graph snapshot: {}", graph_path))?;
        let clumps = graph.hot_clumps(edge_thresh);
        println!("extracted {} clumps at edge threshold {}", clumps.len(), edge_thresh);

        let planner = Planner::new(config.planner.clone());
        let subplans = planner.generate_subplans(&clumps, &route)?;
        println!("planned store loads: {:?}", store_loads(&subplans));
        dispatch::generate_op_plans(&subplans, &route)?
    };

    let actionable = plans.iter().filter(|p| !p.is_empty()).count();
    println!("dispatching {} op plans ({} actionable)", plans.len(), actionable);

    let dispatcher = Dispatcher::new(backend, config.dispatch.clone());
    dispatcher.run(plans).await;

    if let Some(pd) = &mock_pd {
        for op in pd.submissions() {
            println!("mock operator: {}", op.ctl_args().join(" "));
        }
    }
    println!("done");
    Ok(())
}
