use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use crate::resolver::RowSelection;
use crate::runtime::{OptimizationLevel, RuntimeConfig};

/// Command-line arguments of the `salescast` server.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Host name or address to listen on
    #[arg(long, env = "SALESCAST_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "SALESCAST_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Directory holding the model artifacts (defaults to the platform data directory)
    #[arg(long, env = "SALESCAST_ARTIFACTS")]
    pub artifacts_dir: Option<PathBuf>,

    /// Historical records CSV file
    #[arg(long, env = "SALESCAST_DATASET", default_value = "data/ERP_dataset_new.csv")]
    pub dataset: PathBuf,

    /// Text encoding of the dataset file
    #[arg(long, env = "SALESCAST_DATASET_ENCODING", default_value = "windows-1252")]
    pub dataset_encoding: String,

    /// How to pick a row when several historical records match: latest or random
    #[arg(long, env = "SALESCAST_ROW_SELECTION", default_value = "latest")]
    pub row_selection: RowSelection,

    /// Seed for random row selection
    #[arg(long, env = "SALESCAST_SEED")]
    pub seed: Option<u64>,

    /// Download missing or corrupted artifacts listed in the manifest
    #[arg(short, long)]
    pub fetch: bool,

    /// ONNX Runtime inter-op threads (0 lets the runtime decide)
    #[arg(long, default_value_t = 0)]
    pub inter_threads: usize,

    /// ONNX Runtime intra-op threads (0 lets the runtime decide)
    #[arg(long, default_value_t = 0)]
    pub intra_threads: usize,

    /// ONNX Runtime graph optimization level
    #[arg(long, value_enum, default_value_t = OptimizationLevel::All)]
    pub optimization_level: OptimizationLevel,
}

/// Resolved server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub artifacts_dir: Option<PathBuf>,
    pub dataset: PathBuf,
    pub dataset_encoding: String,
    pub row_selection: RowSelection,
    pub fetch: bool,
    pub runtime: RuntimeConfig,
}

impl TryFrom<Args> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        if args.host.trim().is_empty() {
            anyhow::bail!("Listen host must not be empty");
        }

        let row_selection = match (args.row_selection, args.seed) {
            (RowSelection::Random { .. }, seed) => RowSelection::Random { seed },
            (RowSelection::Latest, Some(_)) => {
                log::warn!("--seed has no effect with latest row selection");
                RowSelection::Latest
            }
            (RowSelection::Latest, None) => RowSelection::Latest,
        };

        Ok(Self {
            host: args.host,
            port: args.port,
            artifacts_dir: args.artifacts_dir,
            dataset: args.dataset,
            dataset_encoding: args.dataset_encoding,
            row_selection,
            fetch: args.fetch,
            runtime: RuntimeConfig {
                inter_threads: args.inter_threads,
                intra_threads: args.intra_threads,
                optimization_level: args.optimization_level,
            },
        })
    }
}

impl ServerConfig {
    /// Resolves the listen host, which may be a name such as `localhost`.
    pub async fn resolve_addr(&self) -> anyhow::Result<SocketAddr> {
        tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .with_context(|| format!("Failed to resolve listen address {}:{}", self.host, self.port))?
            .next()
            .with_context(|| format!("No address found for {}:{}", self.host, self.port))
    }
}
