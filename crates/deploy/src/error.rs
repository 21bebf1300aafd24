use alloy_core::primitives::{Address, TxHash};

use crate::ledger::LedgerError;

/// Errors surfaced by the deployment helper and the deployer.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("failed to determine the active network: {source:#}")]
    Network { source: anyhow::Error },

    /// The ledger file could not be opened. A malformed ledger lands here as
    /// [`LedgerError::Malformed`] and is always fatal.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("deployment of {identity} failed: {source:#}")]
    Deployment {
        identity: String,
        source: anyhow::Error,
    },

    #[error("{identity} was deployed at {address} but the ledger could not be written: {source}")]
    LedgerWrite {
        identity: String,
        address: Address,
        source: LedgerError,
    },

    #[error("ledger entry {identity} holds an invalid address: {address}")]
    InvalidAddress { identity: String, address: String },

    #[error("failed to send transaction: {source:#}")]
    Transaction { source: anyhow::Error },

    #[error("transaction {hash} failed")]
    TransactionFailed { hash: TxHash },

    #[error("verification of {address} failed: {source:#}")]
    Verification {
        address: Address,
        source: anyhow::Error,
    },

    #[error("invalid arguments for {identity}: {source:#}")]
    InvalidArguments {
        identity: String,
        source: anyhow::Error,
    },

    #[error("{step} references unknown identity @{reference}")]
    UnknownReference { step: String, reference: String },

    #[error("identity {0} appears more than once in the deployment plan")]
    DuplicateIdentity(String),
}

impl DeployError {
    /// `true` for [`LedgerError::Malformed`].
    pub fn is_malformed_ledger(&self) -> bool {
        matches!(self, DeployError::Ledger(LedgerError::Malformed { .. }))
    }
}
