use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ledgerline_deploy::{DEFAULT_NETWORK, DeployConfig};
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "ledgerline")]
#[command(
    author,
    version,
    about = "Deploy smart contracts once, attach to them every time after"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "LEDGERLINE_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to a Ledgerline.toml configuration file, or a directory containing one.
    #[arg(long, alias = "conf", env = "LEDGERLINE_CONFIG")]
    pub config: Option<PathBuf>,

    /// The network to deploy to, as named in the configuration.
    #[arg(short, long, env = "LEDGERLINE_NETWORK", default_value = DEFAULT_NETWORK)]
    pub network: String,

    /// Number of confirmations to wait for on every transaction.
    #[arg(long, env = "LEDGERLINE_CONFIRMATIONS")]
    pub confirmations: Option<u64>,

    /// Skip source verification on the block explorer.
    #[arg(long, env = "LEDGERLINE_NO_VERIFY")]
    pub no_verify: bool,

    /// Directory holding the deployment ledgers.
    #[arg(long, env = "LEDGERLINE_DEPLOYMENTS_DIR")]
    pub deployments_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Deploy the configured plan, attaching to contracts already in the ledger.
    Deploy,
    /// Print the recorded deployments of every network.
    List,
    /// Write a default configuration file.
    Init {
        /// Where to write the configuration.
        #[arg(default_value = ledgerline_deploy::CONFIG_FILENAME)]
        path: PathBuf,
    },
}

impl Cli {
    /// Apply the command line overrides on top of the loaded configuration.
    pub fn apply(&self, config: &mut DeployConfig) {
        if let Some(confirmations) = self.confirmations {
            config.tx_confirmations = confirmations;
        }
        if self.no_verify {
            config.verify = false;
        }
        if let Some(dir) = &self.deployments_dir {
            config.deployments_dir = dir.clone();
        }
    }
}
