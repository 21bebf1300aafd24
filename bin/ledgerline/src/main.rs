//! ledgerline deploys smart contracts idempotently, recording every deployment
//! in a per-network ledger file.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::{Table, presets::UTF8_FULL};

use cli::{Cli, Command};
use ledgerline_deploy::{
    DeployConfig, Deployer, DeploymentHelper, JsonRpcChain, ledger::list_ledgers,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    match cli.command.clone().unwrap_or(Command::Deploy) {
        Command::Init { path } => init(&path),
        Command::List => {
            let config = load_config(&cli)?;
            list(&config)
        }
        Command::Deploy => {
            let config = load_config(&cli)?;
            deploy(&cli, config).await
        }
    }
}

fn load_config(cli: &Cli) -> Result<DeployConfig> {
    let mut config = DeployConfig::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    Ok(config)
}

fn init(path: &std::path::Path) -> Result<()> {
    if path.exists() {
        anyhow::bail!("{} already exists", path.display());
    }
    DeployConfig::default().save_to_file(path)
}

async fn deploy(cli: &Cli, config: DeployConfig) -> Result<()> {
    tracing::info!(
        network = %cli.network,
        deployments_dir = %config.deployments_dir.display(),
        artifacts_dir = %config.artifacts_dir.display(),
        "Loading deployment configuration..."
    );

    let chain = JsonRpcChain::connect(config.chain_config(&cli.network)?)
        .await
        .with_context(|| format!("Failed to connect to network {}", cli.network))?;

    let helper = DeploymentHelper::new(chain, config.helper_config());
    let mut deployer = Deployer::new(helper, config.plan);

    let summary = deployer.deploy().await?;

    tracing::info!(
        transactions = summary.transactions.len(),
        "Deployed {} new contract(s)",
        summary.fresh_count()
    );

    Ok(())
}

fn list(config: &DeployConfig) -> Result<()> {
    let ledgers = list_ledgers(&config.deployments_dir)?;
    if ledgers.is_empty() {
        tracing::info!(
            deployments_dir = %config.deployments_dir.display(),
            "No deployments recorded yet"
        );
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Network", "Identity", "Address", "Proxy Admin"]);

    for (network, entries) in &ledgers {
        for (identity, record) in entries {
            table.add_row(vec![
                network.to_string(),
                identity.clone(),
                record.address.clone(),
                record.proxy_admin.clone().unwrap_or_default(),
            ]);
        }
    }

    println!("{table}");
    Ok(())
}
