//! Layered configuration: built-in defaults, then `Ledgerline.toml`, then
//! `LEDGERLINE_*` environment variables.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    chain::{DEFAULT_RECEIPT_TIMEOUT, JsonRpcChainConfig},
    helper::HelperConfig,
    plan::DeploymentPlan,
    verify::ExplorerConfig,
};

/// The default name for the configuration file.
pub const CONFIG_FILENAME: &str = "Ledgerline.toml";

/// Prefix of the environment variables overriding the configuration.
pub const ENV_PREFIX: &str = "LEDGERLINE_";

/// Network used when none is selected.
pub const DEFAULT_NETWORK: &str = "localhost";

/// Default RPC endpoint of the `localhost` network.
pub const DEFAULT_RPC_URL: &str = "http://localhost:8545";

/// Connection settings of one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub rpc_url: Url,
    /// Hex private key used to sign transactions. Without one the node's first
    /// unlocked account sends them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    /// Fixed gas price in wei.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<u64>,
    /// Block explorer used to verify sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explorer: Option<ExplorerConfig>,
}

impl NetworkConfig {
    pub fn new(rpc_url: Url) -> Self {
        Self {
            rpc_url,
            private_key: None,
            gas_price: None,
            explorer: None,
        }
    }
}

/// Everything a deployment run needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Directory holding one ledger file per network.
    pub deployments_dir: PathBuf,
    /// Directory holding the compiled artifacts.
    pub artifacts_dir: PathBuf,
    /// Confirmations awaited for every transaction.
    pub tx_confirmations: u64,
    /// Verify freshly deployed contracts when the network has an explorer.
    pub verify: bool,
    /// Upper bound on the wait for a single transaction.
    pub receipt_timeout_secs: u64,
    pub networks: BTreeMap<String, NetworkConfig>,
    pub plan: DeploymentPlan,
}

impl Default for DeployConfig {
    fn default() -> Self {
        let localhost = Url::parse(DEFAULT_RPC_URL).map(NetworkConfig::new);

        Self {
            deployments_dir: PathBuf::from("scripts/deployments"),
            artifacts_dir: PathBuf::from("out"),
            tx_confirmations: 1,
            verify: true,
            receipt_timeout_secs: DEFAULT_RECEIPT_TIMEOUT.as_secs(),
            networks: localhost
                .into_iter()
                .map(|network| (DEFAULT_NETWORK.to_string(), network))
                .collect(),
            plan: DeploymentPlan::default(),
        }
    }
}

impl DeployConfig {
    /// Load the configuration.
    ///
    /// `path` is a file or a directory containing [`CONFIG_FILENAME`]. Without
    /// one, `./Ledgerline.toml` is read when it exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) if path.is_dir() => path.join(CONFIG_FILENAME),
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Configuration file not found: {}", path.display());
                }
                path.to_path_buf()
            }
            None => PathBuf::from(CONFIG_FILENAME),
        };

        let config: Self = Self::figment(&file)
            .extract()
            .with_context(|| format!("Failed to load configuration from {}", file.display()))?;

        tracing::debug!(path = %file.display(), networks = config.networks.len(), "Configuration loaded");
        Ok(config)
    }

    fn figment(file: &Path) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    pub fn network(&self, name: &str) -> Result<&NetworkConfig> {
        self.networks.get(name).with_context(|| {
            let known = self.networks.keys().cloned().collect::<Vec<_>>().join(", ");
            format!("Unknown network {name}, configured networks: {known}")
        })
    }

    /// Settings of the JSON-RPC client for the network called `name`.
    pub fn chain_config(&self, name: &str) -> Result<JsonRpcChainConfig> {
        let network = self.network(name)?;

        Ok(JsonRpcChainConfig {
            rpc_url: network.rpc_url.clone(),
            private_key: network.private_key.clone(),
            gas_price: network.gas_price.map(u128::from),
            explorer: network.explorer.clone(),
            artifacts_dir: self.artifacts_dir.clone(),
            confirmations: self.tx_confirmations,
            receipt_timeout: Duration::from_secs(self.receipt_timeout_secs),
        })
    }

    pub fn helper_config(&self) -> HelperConfig {
        HelperConfig {
            deployments_dir: self.deployments_dir.clone(),
            tx_confirmations: self.tx_confirmations,
            verify: self.verify,
        }
    }
}
