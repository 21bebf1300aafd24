//! ledgerline-deploy - Idempotent smart contract deployments.
//!
//! Every deployed contract is recorded in a per-network ledger file under a
//! caller-chosen identity. Deploying an identity that is already recorded
//! attaches to the recorded address instead, so deployment scripts can be
//! re-run safely after a partial failure.

pub mod artifacts;
pub mod chain;
pub mod config;
mod deployer;
mod error;
pub mod helper;
pub mod ledger;
pub mod network;
pub mod plan;
pub mod verify;

pub use artifacts::{ArtifactStore, BuildInfo, ContractFactory};
pub use chain::{
    ChainClient, Contract, Initializer, JsonRpcChain, JsonRpcChainConfig, PendingDeployment,
    ProxyDeployment, TransactionReceipt,
};
pub use config::{CONFIG_FILENAME, DEFAULT_NETWORK, DeployConfig, NetworkConfig};
pub use deployer::{DeployedContract, Deployer, DeploymentSummary};
pub use error::DeployError;
pub use helper::{DeploymentHelper, HelperConfig};
pub use ledger::{DeploymentLedger, DeploymentRecord, LedgerError};
pub use network::{KnownChain, Network};
pub use plan::{CallStep, ContractStep, DeploymentPlan};
