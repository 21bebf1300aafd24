//! Per-network deployment ledger.
//!
//! The ledger maps caller-chosen identities to deployed addresses and lives in
//! one JSON file per network:
//!
//! ```json
//! {
//!   "CardToken": {
//!     "address": "0x5FbDB2315678afecb367f032d93F642f64180aa3"
//!   },
//!   "Vault": {
//!     "address": "0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512",
//!     "proxyAdmin": "0x9fE46736679d2D9a65F0992F2272dE9f3c7fa6e0"
//!   }
//! }
//! ```
//!
//! Upgradeable deployments also record their proxy admin under
//! [`PROXY_ADMIN_IDENTITY`] and their implementation under
//! `<identity>_Implementation` as soon as each is confirmed, so a run that
//! fails halfway through a proxy deployment reuses them on retry.
//!
//! The whole file is rewritten after every new entry. Writes go to a sibling
//! temporary file that is renamed over the ledger, so a crash leaves either the
//! previous or the new state on disk.

use std::{
    collections::BTreeMap,
    fs::File,
    io::Write,
    path::{Path, PathBuf},
};

use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::network::Network;

/// Identity of the proxy admin shared by upgradeable deployments.
pub const PROXY_ADMIN_IDENTITY: &str = "DefaultProxyAdmin";

/// Identity of the implementation behind the upgradeable `identity`.
pub fn implementation_identity(identity: &str) -> String {
    format!("{identity}_Implementation")
}

/// Errors raised while loading or writing a ledger file.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("failed to read deployment ledger {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("deployment ledger {path} is malformed: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to write deployment ledger {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("deployment ledger {path} is in use by another process")]
    Locked { path: PathBuf },
    #[error("failed to serialize deployment ledger: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A single recorded deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    /// Address of the deployed contract (the proxy for upgradeable deployments).
    pub address: String,
    /// Address of the shared proxy admin, only set for upgradeable deployments.
    #[serde(
        rename = "proxyAdmin",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub proxy_admin: Option<String>,
}

impl DeploymentRecord {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            proxy_admin: None,
        }
    }

    pub fn upgradeable(address: impl Into<String>, proxy_admin: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            proxy_admin: Some(proxy_admin.into()),
        }
    }
}

/// Identity -> record mapping. Sorted so that the file diffs cleanly.
pub type LedgerEntries = BTreeMap<String, DeploymentRecord>;

/// An opened deployment ledger for one network.
///
/// Holds an exclusive advisory lock on `<ledger>.lock` until dropped.
#[derive(Debug)]
pub struct DeploymentLedger {
    network: Network,
    path: PathBuf,
    entries: LedgerEntries,
    _lock: File,
}

impl DeploymentLedger {
    /// Open the ledger of `network` under `base_dir`.
    ///
    /// A missing file yields an empty ledger. A file that exists but does not
    /// parse is an error: treating it as empty would redeploy everything.
    pub fn open(base_dir: &Path, network: &Network) -> Result<Self, LedgerError> {
        std::fs::create_dir_all(base_dir).map_err(|source| LedgerError::Write {
            path: base_dir.to_path_buf(),
            source,
        })?;

        let path = network.ledger_path(base_dir);
        let lock = Self::acquire_lock(&path)?;

        let entries = read_entries(&path)?;

        tracing::debug!(
            network = %network,
            path = %path.display(),
            entries = entries.len(),
            "Deployment ledger loaded"
        );

        Ok(Self {
            network: network.clone(),
            path,
            entries,
            _lock: lock,
        })
    }

    fn acquire_lock(path: &Path) -> Result<File, LedgerError> {
        let lock_path = path.with_extension("lock");
        let lock = File::create(&lock_path).map_err(|source| LedgerError::Write {
            path: lock_path.clone(),
            source,
        })?;

        FileExt::try_lock_exclusive(&lock).map_err(|_| LedgerError::Locked {
            path: path.to_path_buf(),
        })?;

        Ok(lock)
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &LedgerEntries {
        &self.entries
    }

    /// Look up the record stored under `identity`.
    pub fn lookup(&self, identity: &str) -> Option<&DeploymentRecord> {
        self.entries.get(identity)
    }

    /// The proxy admin already used by upgradeable deployments on this
    /// network, with the identity it was recorded under.
    ///
    /// The [`PROXY_ADMIN_IDENTITY`] entry wins over admins found on proxies.
    pub fn shared_proxy_admin(&self) -> Option<(&str, &str)> {
        if let Some((identity, record)) = self.entries.get_key_value(PROXY_ADMIN_IDENTITY) {
            return Some((identity.as_str(), record.address.as_str()));
        }

        self.entries.iter().find_map(|(identity, record)| {
            record
                .proxy_admin
                .as_deref()
                .map(|admin| (identity.as_str(), admin))
        })
    }

    /// Insert or overwrite `identity`, then rewrite the ledger file.
    ///
    /// The in-memory entry is kept even when the write fails.
    pub fn record(
        &mut self,
        identity: impl Into<String>,
        record: DeploymentRecord,
    ) -> Result<(), LedgerError> {
        self.entries.insert(identity.into(), record);
        self.persist()
    }

    /// Write the full ledger to disk through a temporary file and a rename.
    pub fn persist(&self) -> Result<(), LedgerError> {
        let json = serde_json::to_string_pretty(&self.entries)?;
        let tmp_path = self.path.with_extension("json.tmp");

        let write = || -> std::io::Result<()> {
            let mut file = File::create(&tmp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
            std::fs::rename(&tmp_path, &self.path)
        };

        write().map_err(|source| {
            let _ = std::fs::remove_file(&tmp_path);
            LedgerError::Write {
                path: self.path.clone(),
                source,
            }
        })?;

        tracing::debug!(
            path = %self.path.display(),
            entries = self.entries.len(),
            "Deployment ledger saved"
        );

        Ok(())
    }
}

/// Read a ledger file without locking it. A missing file has no entries.
pub fn read_entries(path: &Path) -> Result<LedgerEntries, LedgerError> {
    if !path.exists() {
        return Ok(LedgerEntries::new());
    }

    let content = std::fs::read_to_string(path).map_err(|source| LedgerError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&content).map_err(|source| LedgerError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

/// Every ledger found in `base_dir`, ordered by file name.
pub fn list_ledgers(base_dir: &Path) -> Result<Vec<(Network, LedgerEntries)>, LedgerError> {
    if !base_dir.exists() {
        return Ok(Vec::new());
    }

    let read_error = |source| LedgerError::Read {
        path: base_dir.to_path_buf(),
        source,
    };

    let mut files = std::fs::read_dir(base_dir)
        .map_err(read_error)?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(read_error)?;
    files.sort();

    files
        .iter()
        .filter_map(|path| {
            let file_name = path.file_name()?.to_str()?;
            Network::from_ledger_file_name(file_name).map(|network| (network, path))
        })
        .map(|(network, path)| Ok((network, read_entries(path)?)))
        .collect()
}
