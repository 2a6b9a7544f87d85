//! # CLI Interface
//!
//! Command-line argument structure for `caravan-node` using `clap` derive.
//! Three subcommands: `run`, `keygen`, and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Caravan escrow node.
///
/// Serves the escrow-plan HTTP API over a devnet ledger, persists package
/// records, and exposes Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "caravan-node",
    about = "Caravan escrow service node",
    version,
    propagate_version = true
)]
pub struct CaravanNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the escrow node.
    Run(RunArgs),
    /// Generate a party keypair: prints the public key, writes the seed to
    /// a file with 0600 permissions.
    Keygen(KeygenArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Port for the HTTP API.
    #[arg(long, env = "CARAVAN_API_PORT", default_value_t = 8841)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "CARAVAN_METRICS_PORT", default_value_t = 8842)]
    pub metrics_port: u16,

    /// Path for the package-store JSON snapshot. Loaded on startup if it
    /// exists; written on shutdown.
    #[arg(long, env = "CARAVAN_SNAPSHOT", default_value = "caravan-packages.json")]
    pub snapshot: PathBuf,

    /// Hex-encoded Ed25519 seed for the token issuer account.
    ///
    /// When omitted, a fresh devnet issuer is generated at startup.
    /// **Never pass this flag in production** — use a key file instead.
    #[arg(long, env = "CARAVAN_ISSUER_SEED")]
    pub issuer_seed: Option<String>,

    /// Network label reported by `/status`: devnet, testnet, or mainnet.
    #[arg(long, env = "CARAVAN_NETWORK", default_value = "devnet")]
    pub network: String,

    /// Log output format: pretty or json.
    #[arg(long, env = "CARAVAN_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

/// Arguments for the `keygen` subcommand.
#[derive(Parser, Debug)]
pub struct KeygenArgs {
    /// Path to write the hex-encoded seed to.
    #[arg(long, short = 'o', default_value = "caravan.key")]
    pub out: PathBuf,

    /// Also print the seed to stdout. Devnet convenience only.
    #[arg(long)]
    pub show_seed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        // Ensures the derive macros produce a valid CLI definition.
        CaravanNodeCli::command().debug_assert();
    }
}
