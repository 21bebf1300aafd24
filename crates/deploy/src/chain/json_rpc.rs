//! [`ChainClient`] backed by an Ethereum JSON-RPC endpoint.

use std::{path::PathBuf, time::Duration};

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, B256, Bytes, TxHash, U256, b256},
};
use alloy_network::{EthereumWallet, ReceiptResponse, TransactionBuilder};
use alloy_provider::{DynProvider, PendingTransactionBuilder, Provider, ProviderBuilder};
use alloy_rpc_types_eth::TransactionRequest;
use alloy_signer_local::PrivateKeySigner;
use anyhow::{Context, Result};
use url::Url;

use super::{
    ChainClient, Contract, Initializer, PendingDeployment, ProxyDeployment, TransactionReceipt,
};
use crate::{
    artifacts::{ArtifactStore, ContractFactory},
    network::Network,
    verify::{EtherscanVerifier, ExplorerConfig},
};

/// Artifact name of the proxy admin contract.
pub const PROXY_ADMIN_CONTRACT: &str = "ProxyAdmin";
/// Artifact name of the transparent upgradeable proxy contract.
pub const TRANSPARENT_PROXY_CONTRACT: &str = "TransparentUpgradeableProxy";

/// EIP-1967 admin slot: `bytes32(uint256(keccak256("eip1967.proxy.admin")) - 1)`.
pub const PROXY_ADMIN_STORAGE_SLOT: B256 =
    b256!("b53127684a568b3173ae13b9f8a6016e243e63b6e8ee1178d6a717850b5d6103");

/// Default time to wait for a transaction to reach the confirmation depth.
pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(600);

/// Connection settings for [`JsonRpcChain`].
#[derive(Debug, Clone)]
pub struct JsonRpcChainConfig {
    pub rpc_url: Url,
    /// Hex private key. Without one, the node's first unlocked account is used.
    pub private_key: Option<String>,
    /// Fixed gas price in wei. Filled from the node when absent.
    pub gas_price: Option<u128>,
    pub explorer: Option<ExplorerConfig>,
    pub artifacts_dir: PathBuf,
    /// Confirmation depth awaited for creation transactions.
    pub confirmations: u64,
    pub receipt_timeout: Duration,
}

/// Chain client speaking JSON-RPC over HTTP.
///
/// Nonce, gas and chain id are filled by the provider. With a private key the
/// transactions are signed locally, otherwise the node signs them.
pub struct JsonRpcChain {
    provider: DynProvider,
    sender: Address,
    gas_price: Option<u128>,
    artifacts: ArtifactStore,
    verifier: Option<EtherscanVerifier>,
    confirmations: u64,
    receipt_timeout: Duration,
}

impl JsonRpcChain {
    /// Connect to the node and resolve the sending account.
    pub async fn connect(config: JsonRpcChainConfig) -> Result<Self> {
        let (provider, sender) = match &config.private_key {
            Some(key) => {
                let signer: PrivateKeySigner =
                    key.trim().parse().context("Invalid private key")?;
                let sender = signer.address();
                let provider = ProviderBuilder::new()
                    .wallet(EthereumWallet::from(signer))
                    .connect_http(config.rpc_url.clone())
                    .erased();
                (provider, sender)
            }
            None => {
                let provider = ProviderBuilder::new()
                    .connect_http(config.rpc_url.clone())
                    .erased();
                let accounts = provider
                    .get_accounts()
                    .await
                    .context("Failed to list node accounts")?;
                let sender = accounts.first().copied().context(
                    "No private key configured and the node exposes no unlocked account",
                )?;
                (provider, sender)
            }
        };

        tracing::info!(rpc_url = %config.rpc_url, sender = %sender, "Connected to chain");
        Self::new(provider, sender, config)
    }

    fn new(provider: DynProvider, sender: Address, config: JsonRpcChainConfig) -> Result<Self> {
        let verifier = config
            .explorer
            .map(EtherscanVerifier::new)
            .transpose()?;

        Ok(Self {
            provider,
            sender,
            gas_price: config.gas_price,
            artifacts: ArtifactStore::new(config.artifacts_dir),
            verifier,
            confirmations: config.confirmations,
            receipt_timeout: config.receipt_timeout,
        })
    }

    /// Address transactions are sent from.
    pub fn sender(&self) -> Address {
        self.sender
    }

    async fn send(&self, tx: TransactionRequest) -> Result<TxHash> {
        let mut tx = tx.with_from(self.sender);
        if let Some(gas_price) = self.gas_price {
            tx = tx.with_gas_price(gas_price);
        }

        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .context("Failed to send transaction")?;
        let hash = *pending.tx_hash();

        tracing::debug!(tx_hash = %hash, "Transaction sent");
        Ok(hash)
    }

    async fn deploy_and_wait(
        &self,
        factory: &ContractFactory,
        args: &[DynSolValue],
    ) -> Result<Contract> {
        let pending = self.deploy(factory, args).await?;
        self.await_deployment(pending).await
    }

    /// Admin recorded in the EIP-1967 slot of `proxy`, if set.
    async fn read_proxy_admin(&self, proxy: Address) -> Result<Option<Address>> {
        let slot = self
            .provider
            .get_storage_at(proxy, U256::from_be_bytes(PROXY_ADMIN_STORAGE_SLOT.0))
            .await
            .context("Failed to read proxy admin slot")?;

        let admin = Address::from_word(B256::from(slot.to_be_bytes::<32>()));
        Ok((!admin.is_zero()).then_some(admin))
    }
}

/// Constructor arguments for the proxy admin, which differ between
/// OpenZeppelin 4 (none) and 5 (initial owner).
fn proxy_admin_args(factory: &ContractFactory, owner: Address) -> Result<Vec<DynSolValue>> {
    let inputs = factory
        .abi()
        .constructor()
        .map(|constructor| constructor.inputs.as_slice())
        .unwrap_or_default();

    match inputs {
        [] => Ok(vec![]),
        [param] if param.ty == "address" => Ok(vec![DynSolValue::Address(owner)]),
        _ => anyhow::bail!("Unsupported {} constructor", PROXY_ADMIN_CONTRACT),
    }
}

fn receipt_from<R: ReceiptResponse>(receipt: &R) -> TransactionReceipt {
    TransactionReceipt {
        transaction_hash: receipt.transaction_hash(),
        status: receipt.status(),
        block_number: receipt.block_number().unwrap_or_default(),
        contract_address: receipt.contract_address(),
    }
}

/// The contract created by a confirmed deployment transaction.
fn deployed_contract(name: String, receipt: &TransactionReceipt) -> Result<Contract> {
    if !receipt.status {
        anyhow::bail!(
            "Deployment of {} reverted in transaction {}",
            name,
            receipt.transaction_hash
        );
    }

    let address = receipt.contract_address.with_context(|| {
        format!(
            "Receipt of {} has no contract address",
            receipt.transaction_hash
        )
    })?;

    Ok(Contract::new(name, address))
}

impl ChainClient for JsonRpcChain {
    async fn network(&self) -> Result<Network> {
        let chain_id = self
            .provider
            .get_chain_id()
            .await
            .context("Failed to fetch chain id")?;
        Ok(Network::from_chain_id(chain_id))
    }

    async fn contract_factory(&self, name: &str) -> Result<ContractFactory> {
        self.artifacts.load(name)
    }

    async fn deploy(
        &self,
        factory: &ContractFactory,
        args: &[DynSolValue],
    ) -> Result<PendingDeployment> {
        let data = factory.deploy_data(args)?;
        let transaction_hash = self
            .send(TransactionRequest::default().with_deploy_code(data))
            .await
            .with_context(|| format!("Failed to deploy {}", factory.name()))?;

        tracing::info!(contract = %factory.name(), tx_hash = %transaction_hash, "Deployment transaction sent");

        Ok(PendingDeployment {
            contract: factory.name().to_string(),
            transaction_hash,
        })
    }

    async fn await_deployment(&self, pending: PendingDeployment) -> Result<Contract> {
        let receipt = self
            .wait_for_transaction(pending.transaction_hash, self.confirmations)
            .await?;
        deployed_contract(pending.contract, &receipt)
    }

    async fn wait_for_transaction(
        &self,
        hash: TxHash,
        confirmations: u64,
    ) -> Result<TransactionReceipt> {
        let receipt = PendingTransactionBuilder::new(self.provider.root().clone(), hash)
            .with_required_confirmations(confirmations.max(1))
            .with_timeout(Some(self.receipt_timeout))
            .get_receipt()
            .await
            .with_context(|| format!("Failed to wait for transaction {}", hash))?;

        Ok(receipt_from(&receipt))
    }

    async fn deploy_proxy_admin(&self) -> Result<Contract> {
        let factory = self.contract_factory(PROXY_ADMIN_CONTRACT).await?;
        let args = proxy_admin_args(&factory, self.sender)?;
        let admin = self.deploy_and_wait(&factory, &args).await?;

        tracing::info!(address = %admin.address, "Deployed proxy admin");
        Ok(admin)
    }

    async fn deploy_proxy(
        &self,
        factory: &ContractFactory,
        implementation: Address,
        initializer: Option<&Initializer>,
        admin: Address,
    ) -> Result<ProxyDeployment> {
        let init_data = match initializer {
            Some(initializer) => factory.encode_call(&initializer.function, &initializer.args)?,
            None => Bytes::new(),
        };

        let proxy_factory = self.contract_factory(TRANSPARENT_PROXY_CONTRACT).await?;
        let proxy = self
            .deploy_and_wait(
                &proxy_factory,
                &[
                    DynSolValue::Address(implementation),
                    DynSolValue::Address(admin),
                    DynSolValue::Bytes(init_data.to_vec()),
                ],
            )
            .await
            .with_context(|| format!("Failed to deploy proxy for {}", factory.name()))?;

        // OpenZeppelin 5 proxies create their own admin owned by `admin`.
        let admin = self.read_proxy_admin(proxy.address).await?.unwrap_or(admin);

        Ok(ProxyDeployment {
            address: proxy.address,
            implementation,
            admin,
        })
    }

    async fn send_transaction(&self, to: Address, data: Bytes) -> Result<TxHash> {
        self.send(TransactionRequest::default().with_to(to).with_input(data))
            .await
    }

    async fn verify(
        &self,
        contract: &Contract,
        factory: &ContractFactory,
        constructor_args: &[DynSolValue],
    ) -> Result<()> {
        let verifier = self
            .verifier
            .as_ref()
            .context("No block explorer configured for this network")?;

        let encoded_args = factory.encode_constructor_args(constructor_args)?;
        verifier
            .verify(
                factory.name(),
                contract.address,
                factory.build_info(),
                &encoded_args,
            )
            .await?;

        Ok(())
    }
}
