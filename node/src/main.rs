// Copyright (c) 2026 Caravan Contributors. MIT License.
// See LICENSE for details.

//! # Caravan Escrow Node
//!
//! Entry point for the `caravan-node` binary. Parses CLI arguments,
//! initializes logging and metrics, and serves the escrow-plan HTTP API over
//! a devnet ledger.
//!
//! The binary supports three subcommands:
//!
//! - `run`     — start the escrow node
//! - `keygen`  — generate a party keypair
//! - `version` — print build version information

mod api;
mod cli;
mod logging;
mod metrics;
mod store;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;

use caravan_protocol::config::{DELIVERY_TOKEN_CODE, PROTOCOL_VERSION};
use caravan_protocol::crypto::keys::{fmt_locked, fmt_unlocked};
use caravan_protocol::{Asset, CaravanKeypair, InMemoryLedger};

use cli::{CaravanNodeCli, Commands};
use logging::LogFormat;
use metrics::NodeMetrics;
use store::PackageStore;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = CaravanNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Keygen(args) => keygen(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the escrow node: devnet ledger, package store, HTTP API, and
/// metrics endpoint.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(
        "caravan_node=info,caravan_escrow=info,caravan_protocol=info,tower_http=debug",
        LogFormat::from_str_lossy(&args.log_format),
    );

    tracing::info!(
        api_port = args.api_port,
        metrics_port = args.metrics_port,
        snapshot = %args.snapshot.display(),
        network = %args.network,
        "starting caravan-node"
    );

    // --- Issuer identity ---
    let issuer = match &args.issuer_seed {
        Some(seed) => CaravanKeypair::from_hex(seed)
            .map_err(|e| anyhow::anyhow!("invalid issuer seed: {e}"))?,
        None => {
            let generated = CaravanKeypair::generate();
            tracing::warn!(
                issuer = %generated.public_key(),
                "no issuer seed provided, generated a fresh devnet issuer"
            );
            generated
        }
    };

    // --- Ledger ---
    let ledger = Arc::new(InMemoryLedger::new());
    ledger
        .create_account(issuer.public_key(), 1_000_000_000)
        .map_err(|e| anyhow::anyhow!("failed to seed issuer account: {e}"))?;
    let asset = Asset::Token {
        code: DELIVERY_TOKEN_CODE.to_string(),
        issuer: issuer.public_key(),
    };
    tracing::info!(issuer = %issuer.public_key(), token = DELIVERY_TOKEN_CODE, "ledger ready");

    // --- Package store ---
    let store = Arc::new(
        PackageStore::load_snapshot(&args.snapshot)
            .with_context(|| format!("failed to load snapshot {}", args.snapshot.display()))?,
    );
    tracing::info!(packages = store.len(), "package store loaded");

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new());
    node_metrics.packages_open.set(store.open_count() as i64);

    // --- Application state ---
    let app_state = api::AppState {
        version: format!("{} (protocol {})", env!("CARGO_PKG_VERSION"), PROTOCOL_VERSION),
        network: args.network.clone(),
        ledger,
        store: Arc::clone(&store),
        issuer: issuer.public_key(),
        asset,
        metrics: Arc::clone(&node_metrics),
        started_at: chrono::Utc::now(),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    store
        .save_snapshot(&args.snapshot)
        .with_context(|| format!("failed to write snapshot {}", args.snapshot.display()))?;
    tracing::info!("caravan-node stopped");
    Ok(())
}

/// Generates a party keypair, prints the public key, and writes the seed to
/// a file readable only by the owner.
fn keygen(args: cli::KeygenArgs) -> Result<()> {
    let keypair = CaravanKeypair::generate();

    std::fs::write(&args.out, hex::encode(keypair.secret_seed()))
        .with_context(|| format!("failed to write key file {}", args.out.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&args.out, std::fs::Permissions::from_mode(0o600))?;
    }

    println!("Keypair generated.");
    if args.show_seed {
        println!("  {}", fmt_unlocked(&keypair));
    } else {
        println!("  {}", fmt_locked(&keypair.public_key()));
    }
    println!("  Hex  : {}", keypair.public_key().to_hex());
    println!("  Seed : written to {}", args.out.display());

    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("caravan-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol     {}", PROTOCOL_VERSION);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
