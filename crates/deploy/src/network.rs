//! Network identity used to scope deployment ledgers.

use std::{fmt, path::Path, path::PathBuf};

use serde::{Deserialize, Serialize};

/// Chains that have a well-known name.
///
/// Names follow the ethers convention so ledger files written by earlier
/// tooling resolve to the same path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum KnownChain {
    Homestead,
    Ropsten,
    Rinkeby,
    Goerli,
    Kovan,
    Sepolia,
}

impl KnownChain {
    pub fn from_chain_id(chain_id: u64) -> Option<Self> {
        match chain_id {
            1 => Some(KnownChain::Homestead),
            3 => Some(KnownChain::Ropsten),
            4 => Some(KnownChain::Rinkeby),
            5 => Some(KnownChain::Goerli),
            42 => Some(KnownChain::Kovan),
            11155111 => Some(KnownChain::Sepolia),
            _ => None,
        }
    }

    pub fn to_chain_id(&self) -> u64 {
        match self {
            KnownChain::Homestead => 1,
            KnownChain::Ropsten => 3,
            KnownChain::Rinkeby => 4,
            KnownChain::Goerli => 5,
            KnownChain::Kovan => 42,
            KnownChain::Sepolia => 11155111,
        }
    }
}

/// Suffix shared by every ledger file name.
pub const LEDGER_FILE_SUFFIX: &str = "_deployment.json";

/// Name reported for chains without a well-known name.
pub const UNKNOWN_NETWORK_NAME: &str = "unknown";

/// The `(name, chain id)` pair a ledger is keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Network {
    pub name: String,
    pub chain_id: u64,
}

impl Network {
    pub fn new(name: impl Into<String>, chain_id: u64) -> Self {
        Self {
            name: name.into(),
            chain_id,
        }
    }

    /// Build the network identity the chain reports for `chain_id`.
    pub fn from_chain_id(chain_id: u64) -> Self {
        let name = KnownChain::from_chain_id(chain_id)
            .map(|chain| chain.to_string())
            .unwrap_or_else(|| UNKNOWN_NETWORK_NAME.to_string());

        Self { name, chain_id }
    }

    /// File name of this network's ledger: `<name>(<chainId>)_deployment.json`.
    pub fn ledger_file_name(&self) -> String {
        format!("{}({}){}", self.name, self.chain_id, LEDGER_FILE_SUFFIX)
    }

    /// Inverse of [`Network::ledger_file_name`].
    pub fn from_ledger_file_name(file_name: &str) -> Option<Self> {
        let stem = file_name.strip_suffix(LEDGER_FILE_SUFFIX)?;
        let (name, chain_id) = stem.strip_suffix(')')?.rsplit_once('(')?;
        let chain_id = chain_id.parse().ok()?;

        Some(Self::new(name, chain_id))
    }

    /// Full path of this network's ledger under `base_dir`.
    pub fn ledger_path(&self, base_dir: &Path) -> PathBuf {
        base_dir.join(self.ledger_file_name())
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.chain_id)
    }
}
