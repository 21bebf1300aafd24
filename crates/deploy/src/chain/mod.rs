//! Chain client capability consumed by the deployment helper.
//!
//! The helper never talks to a node directly: everything that touches the
//! chain or the explorer goes through [`ChainClient`], so tests can swap in an
//! in-memory implementation.

mod json_rpc;

use std::future::Future;

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, Bytes, TxHash},
};
use anyhow::Result;

pub use json_rpc::{
    DEFAULT_RECEIPT_TIMEOUT, JsonRpcChain, JsonRpcChainConfig, PROXY_ADMIN_CONTRACT,
    PROXY_ADMIN_STORAGE_SLOT, TRANSPARENT_PROXY_CONTRACT,
};

use crate::{artifacts::ContractFactory, network::Network};

/// Handle to a deployed contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contract {
    /// Contract type name, as found in the artifacts.
    pub name: String,
    /// Address calls should be sent to (the proxy for upgradeable contracts).
    pub address: Address,
    /// Proxy admin of an upgradeable deployment.
    pub proxy_admin: Option<Address>,
}

impl Contract {
    pub fn new(name: impl Into<String>, address: Address) -> Self {
        Self {
            name: name.into(),
            address,
            proxy_admin: None,
        }
    }

    pub fn with_proxy_admin(mut self, proxy_admin: Address) -> Self {
        self.proxy_admin = Some(proxy_admin);
        self
    }
}

/// A creation transaction that was broadcast but not yet mined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDeployment {
    pub contract: String,
    pub transaction_hash: TxHash,
}

/// Receipt of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub transaction_hash: TxHash,
    /// `true` when the transaction succeeded.
    pub status: bool,
    pub block_number: u64,
    /// Set for contract creation transactions.
    pub contract_address: Option<Address>,
}

/// Result of an upgradeable deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyDeployment {
    /// The proxy address, which is the address users interact with.
    pub address: Address,
    /// The implementation behind the proxy.
    pub implementation: Address,
    /// The proxy admin contract.
    pub admin: Address,
}

/// Initializer invoked through the proxy on deployment.
#[derive(Debug, Clone, PartialEq)]
pub struct Initializer {
    pub function: String,
    pub args: Vec<DynSolValue>,
}

impl Initializer {
    pub fn new(function: impl Into<String>, args: Vec<DynSolValue>) -> Self {
        Self {
            function: function.into(),
            args,
        }
    }
}

/// Everything the deployment helper needs from a chain.
pub trait ChainClient: Send + Sync {
    /// Name and chain id of the connected network.
    fn network(&self) -> impl Future<Output = Result<Network>> + Send;

    /// Factory for the compiled contract called `name`.
    fn contract_factory(&self, name: &str) -> impl Future<Output = Result<ContractFactory>> + Send;

    /// Broadcast the creation transaction of `factory` with `args`.
    fn deploy(
        &self,
        factory: &ContractFactory,
        args: &[DynSolValue],
    ) -> impl Future<Output = Result<PendingDeployment>> + Send;

    /// Wait until a creation transaction is confirmed and return the contract.
    fn await_deployment(
        &self,
        pending: PendingDeployment,
    ) -> impl Future<Output = Result<Contract>> + Send;

    /// Wait for `confirmations` blocks on top of the block including `hash`.
    fn wait_for_transaction(
        &self,
        hash: TxHash,
        confirmations: u64,
    ) -> impl Future<Output = Result<TransactionReceipt>> + Send;

    /// Deploy a proxy admin owned by the sending account and wait for it.
    fn deploy_proxy_admin(&self) -> impl Future<Output = Result<Contract>> + Send;

    /// Deploy a transparent upgradeable proxy in front of `implementation`,
    /// administered by `admin`, and wait for it.
    ///
    /// `initializer` is encoded against `factory` and called through the proxy
    /// by its constructor.
    fn deploy_proxy(
        &self,
        factory: &ContractFactory,
        implementation: Address,
        initializer: Option<&Initializer>,
        admin: Address,
    ) -> impl Future<Output = Result<ProxyDeployment>> + Send;

    /// Send a transaction calling `to` with `data`.
    fn send_transaction(
        &self,
        to: Address,
        data: Bytes,
    ) -> impl Future<Output = Result<TxHash>> + Send;

    /// Publish the source of `contract` on the block explorer.
    fn verify(
        &self,
        contract: &Contract,
        factory: &ContractFactory,
        constructor_args: &[DynSolValue],
    ) -> impl Future<Output = Result<()>> + Send;
}
