//!
//! hotclump ingest server binary
//! -----------------------------
//! Command-line entry point for the long-running ingest service: one graph
//! for the life of the process, the ingest worker pool, the periodic
//! snapshot loop, and the HTTP API. Configuration comes from an optional
//! JSON file with environment variables and CLI flags layered on top.

use anyhow::{Context, Result};
use std::env;
use std::path::Path;

use hotclump::config::Config;

fn parse_u64_env(name: &str) -> Option<u64> {
    env::var(name).ok().and_then(|v| v.parse::<u64>().ok())
}

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
    // Initialize tracing subscriber with env filter if provided
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let args: Vec<String> = env::args().collect();

    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        println!(
            "hotclump ingest server\n\n\
             USAGE:\n  hotclump_server [--http-port N] [--config PATH] [--hot-threshold N]\n                  [--w-inter N] [--w-intra N] [--snapshot-dir PATH] [--no-snapshots]\n\n\
             OPTIONS:\n  --http-port N        HTTP API port (env: HOTCLUMP_HTTP_PORT, default 7979)\n  --config PATH        JSON config file (env: HOTCLUMP_CONFIG)\n  --hot-threshold N    Vertex weight needed to count as hot\n  --w-inter N          Edge coefficient for distinct region pairs\n  --w-intra N          Edge coefficient for same-region pairs\n  --snapshot-dir PATH  Where periodic graph snapshots go (enables them)\n  --no-snapshots       Disable the periodic snapshot loop\n"
        );
        return Ok(());
    }

    let default_http: u16 = 7979;

    let config_path = parse_string_arg(&args, "--config").or_else(|| env::var("HOTCLUMP_CONFIG").ok());
    let mut config = match &config_path {
        Some(path) => Config::load(Path::new(path))
            .with_context(|| format!("While loading config file: {}", path))?,
        None => Config::default(),
    };

    // CLI arguments override environment, which overrides the file
    if let Some(v) = parse_u64_env("HOTCLUMP_HOT_THRESHOLD") {
        config.graph.hot_threshold = v;
    }
    if let Some(v) = parse_u64_arg(&args, "--hot-threshold") {
        config.graph.hot_threshold = v;
    }
    if let Some(v) = parse_u64_arg(&args, "--w-inter") {
        config.graph.w_inter = v;
    }
    if let Some(v) = parse_u64_arg(&args, "--w-intra") {
        config.graph.w_intra = v;
    }
    if let Some(dir) = parse_string_arg(&args, "--snapshot-dir") {
        config.snapshot.dir = dir;
        config.snapshot.enabled = true;
    }
    if has_flag(&args, "--no-snapshots") {
        config.snapshot.enabled = false;
    }

    let http_port = parse_u64_arg(&args, "--http-port")
        .or_else(|| parse_u64_env("HOTCLUMP_HTTP_PORT"))
        .map(|v| v as u16)
        .unwrap_or(default_http);

    println!(
        "hotclump server starting: http={}, w_inter={}, w_intra={}, hot_threshold={}, snapshots={}",
        http_port,
        config.graph.w_inter,
        config.graph.w_intra,
        config.graph.hot_threshold,
        config.snapshot.enabled
    );
    tracing::info!(
        "Using port http={}, queues={}x{}, snapshot_dir={}",
        http_port,
        config.ingest.queue_count,
        config.ingest.workers_per_queue,
        config.snapshot.dir
    );

    hotclump::server::run(http_port, config).await
}
