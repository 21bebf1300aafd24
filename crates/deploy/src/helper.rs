//! Idempotent deployments on top of the per-network ledger.
//!
//! Every deployment goes through [`DeploymentHelper::deploy_or_attach`]: when
//! the identity is already in the ledger the recorded address is attached to,
//! otherwise the deployment runs and its address is recorded before the helper
//! returns. Running the same script twice therefore never deploys twice.

use std::{future::Future, path::PathBuf};

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, TxHash},
};

use crate::{
    artifacts::ContractFactory,
    chain::{ChainClient, Contract, Initializer, TransactionReceipt},
    error::DeployError,
    ledger::{DeploymentLedger, DeploymentRecord, PROXY_ADMIN_IDENTITY, implementation_identity},
};

/// Settings of a [`DeploymentHelper`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperConfig {
    /// Directory holding the `<network>(<chainId>)_deployment.json` ledgers.
    pub deployments_dir: PathBuf,
    /// Confirmations awaited by [`DeploymentHelper::send_and_wait_for_transaction`].
    pub tx_confirmations: u64,
    /// Verify freshly deployed contracts on the block explorer.
    pub verify: bool,
}

pub struct DeploymentHelper<C> {
    chain: C,
    deployments_dir: PathBuf,
    /// Opened on first use, once the network is known.
    ledger: Option<DeploymentLedger>,
    tx_confirmations: u64,
    verify: bool,
}

impl<C: ChainClient> DeploymentHelper<C> {
    pub fn new(chain: C, config: HelperConfig) -> Self {
        Self {
            chain,
            deployments_dir: config.deployments_dir,
            ledger: None,
            tx_confirmations: config.tx_confirmations,
            verify: config.verify,
        }
    }

    pub fn chain(&self) -> &C {
        &self.chain
    }

    pub fn is_initialized(&self) -> bool {
        self.ledger.is_some()
    }

    /// Resolve the active network and load its ledger.
    ///
    /// Only the first call reads anything. Later calls return the loaded ledger.
    pub async fn initialize(&mut self) -> Result<&mut DeploymentLedger, DeployError> {
        let ledger = match self.ledger.take() {
            Some(ledger) => ledger,
            None => self.open_ledger().await?,
        };
        Ok(self.ledger.insert(ledger))
    }

    async fn open_ledger(&self) -> Result<DeploymentLedger, DeployError> {
        let network = self
            .chain
            .network()
            .await
            .map_err(|source| DeployError::Network { source })?;

        let ledger = DeploymentLedger::open(&self.deployments_dir, &network)?;
        tracing::info!(
            network = %network,
            ledger = %ledger.path().display(),
            entries = ledger.entries().len(),
            "Deployment helper initialized"
        );

        Ok(ledger)
    }

    /// The ledger of the active network, initializing it on first use.
    pub async fn ledger(&mut self) -> Result<&mut DeploymentLedger, DeployError> {
        self.initialize().await
    }

    /// Address recorded under `identity`, if any.
    pub async fn lookup(&mut self, identity: &str) -> Result<Option<String>, DeployError> {
        let ledger = self.ledger().await?;
        Ok(ledger.lookup(identity).map(|record| record.address.clone()))
    }

    /// Attach to `identity` if it is recorded, otherwise run `deploy` and
    /// record the result.
    ///
    /// `deploy` is never invoked for an identity the ledger already knows.
    pub async fn deploy_or_attach<F>(
        &mut self,
        identity: &str,
        factory: &ContractFactory,
        deploy: F,
    ) -> Result<Contract, DeployError>
    where
        F: AsyncFnOnce(&C) -> anyhow::Result<Contract>,
    {
        let (contract, _) = self.resolve(identity, factory, deploy).await?;
        Ok(contract)
    }

    /// Same as [`Self::deploy_or_attach`], also telling whether a deployment happened.
    async fn resolve<F>(
        &mut self,
        identity: &str,
        factory: &ContractFactory,
        deploy: F,
    ) -> Result<(Contract, bool), DeployError>
    where
        F: AsyncFnOnce(&C) -> anyhow::Result<Contract>,
    {
        if let Some(contract) = self.attach_existing(identity, factory).await? {
            return Ok((contract, false));
        }

        let contract = deploy(&self.chain)
            .await
            .map_err(|source| DeployError::Deployment {
                identity: identity.to_string(),
                source,
            })?;

        self.record(identity, &contract).await?;

        tracing::info!(
            identity = %identity,
            address = %contract.address,
            "Deployed {} at {}",
            identity,
            contract.address
        );

        Ok((contract, true))
    }

    async fn attach_existing(
        &mut self,
        identity: &str,
        factory: &ContractFactory,
    ) -> Result<Option<Contract>, DeployError> {
        let ledger = self.ledger().await?;
        let Some(record) = ledger.lookup(identity) else {
            return Ok(None);
        };

        tracing::info!(
            identity = %identity,
            address = %record.address,
            "{} already exists. Loading {}",
            identity,
            record.address
        );

        let mut contract = factory.attach(parse_recorded(identity, &record.address)?);
        if let Some(admin) = &record.proxy_admin {
            contract = contract.with_proxy_admin(parse_recorded(identity, admin)?);
        }

        Ok(Some(contract))
    }

    async fn record(&mut self, identity: &str, contract: &Contract) -> Result<(), DeployError> {
        let address = contract.address.to_checksum(None);
        let record = match contract.proxy_admin {
            Some(admin) => DeploymentRecord::upgradeable(address, admin.to_checksum(None)),
            None => DeploymentRecord::new(address),
        };

        let ledger = self.ledger().await?;
        ledger.record(identity, record).map_err(|source| {
            tracing::error!(
                identity = %identity,
                address = %contract.address,
                error = %source,
                "Contract is deployed but missing from the ledger, record it manually"
            );
            DeployError::LedgerWrite {
                identity: identity.to_string(),
                address: contract.address,
                source,
            }
        })
    }

    /// The proxy admin already shared by upgradeable deployments on this network.
    async fn recorded_proxy_admin(&mut self) -> Result<Option<Address>, DeployError> {
        let ledger = self.ledger().await?;
        ledger
            .shared_proxy_admin()
            .map(|(identity, admin)| parse_recorded(identity, admin))
            .transpose()
    }

    /// Deploy the shared proxy admin and record it under [`PROXY_ADMIN_IDENTITY`].
    async fn deploy_proxy_admin(&mut self) -> Result<Address, DeployError> {
        let admin = self
            .chain
            .deploy_proxy_admin()
            .await
            .map_err(|source| DeployError::Deployment {
                identity: PROXY_ADMIN_IDENTITY.to_string(),
                source,
            })?;
        self.record(PROXY_ADMIN_IDENTITY, &admin).await?;

        tracing::info!(address = %admin.address, "Recorded proxy admin {}", admin.address);
        Ok(admin.address)
    }

    /// Deploy `factory` as `identity` with constructor `args`, then verify it.
    pub async fn deploy_contract(
        &mut self,
        factory: &ContractFactory,
        identity: &str,
        args: Vec<DynSolValue>,
    ) -> Result<Contract, DeployError> {
        let (contract, deployed) = self
            .resolve(identity, factory, async |chain: &C| {
                let pending = chain.deploy(factory, &args).await?;
                chain.await_deployment(pending).await
            })
            .await?;

        if deployed && self.verify {
            if let Err(e) = self.verify_contract(&contract, factory, &args).await {
                tracing::warn!(identity = %identity, error = %e, "Failed to verify {}", contract.address);
            }
        }

        Ok(contract)
    }

    /// Deploy the artifact called `contract_name`. The identity defaults to the
    /// contract name.
    pub async fn deploy_contract_by_name(
        &mut self,
        contract_name: &str,
        identity: Option<&str>,
        args: Vec<DynSolValue>,
    ) -> Result<Contract, DeployError> {
        let identity = identity.unwrap_or(contract_name);
        let factory = self.factory(contract_name, identity).await?;
        self.deploy_contract(&factory, identity, args).await
    }

    /// Deploy `factory` behind an upgradeable proxy as `identity`.
    ///
    /// The implementation, then the shared proxy admin, then the proxy are
    /// deployed, each one recorded as soon as it is confirmed. The proxy entry
    /// holds both the proxy and the proxy admin. Proxies are not verified.
    pub async fn deploy_upgradeable_contract(
        &mut self,
        factory: &ContractFactory,
        identity: &str,
        initializer: Option<Initializer>,
    ) -> Result<Contract, DeployError> {
        if let Some(contract) = self.attach_existing(identity, factory).await? {
            return Ok(contract);
        }

        let recorded_admin = self.recorded_proxy_admin().await?;

        let implementation = self
            .deploy_or_attach(&implementation_identity(identity), factory, async |chain: &C| {
                let pending = chain.deploy(factory, &[]).await?;
                chain.await_deployment(pending).await
            })
            .await?;
        let admin = match recorded_admin {
            Some(admin) => admin,
            None => self.deploy_proxy_admin().await?,
        };

        self.deploy_or_attach(identity, factory, async |chain: &C| {
            let proxy = chain
                .deploy_proxy(factory, implementation.address, initializer.as_ref(), admin)
                .await?;
            Ok(factory.attach(proxy.address).with_proxy_admin(proxy.admin))
        })
        .await
    }

    /// Deploy the artifact called `contract_name` behind an upgradeable proxy.
    pub async fn deploy_upgradeable_contract_with_name(
        &mut self,
        contract_name: &str,
        identity: &str,
        initializer: Option<Initializer>,
    ) -> Result<Contract, DeployError> {
        let factory = self.factory(contract_name, identity).await?;
        self.deploy_upgradeable_contract(&factory, identity, initializer)
            .await
    }

    async fn factory(
        &self,
        contract_name: &str,
        identity: &str,
    ) -> Result<ContractFactory, DeployError> {
        self.chain
            .contract_factory(contract_name)
            .await
            .map_err(|source| DeployError::Deployment {
                identity: identity.to_string(),
                source,
            })
    }

    /// Publish the source of a deployed contract. Callers decide whether a
    /// failure matters.
    pub async fn verify_contract(
        &self,
        contract: &Contract,
        factory: &ContractFactory,
        args: &[DynSolValue],
    ) -> Result<(), DeployError> {
        self.chain
            .verify(contract, factory, args)
            .await
            .map_err(|source| DeployError::Verification {
                address: contract.address,
                source,
            })
    }

    /// Await a submitted transaction and wait for the configured confirmations.
    pub async fn send_and_wait_for_transaction<Fut>(
        &self,
        tx: Fut,
    ) -> Result<TransactionReceipt, DeployError>
    where
        Fut: Future<Output = anyhow::Result<TxHash>>,
    {
        let hash = tx
            .await
            .map_err(|source| DeployError::Transaction { source })?;

        let receipt = self
            .chain
            .wait_for_transaction(hash, self.tx_confirmations)
            .await
            .map_err(|source| DeployError::Transaction { source })?;

        if !receipt.status {
            return Err(DeployError::TransactionFailed { hash });
        }

        tracing::info!(tx_hash = %receipt.transaction_hash, "{} mined successfully", receipt.transaction_hash);
        Ok(receipt)
    }
}

fn parse_recorded(identity: &str, address: &str) -> Result<Address, DeployError> {
    address.parse().map_err(|_| DeployError::InvalidAddress {
        identity: identity.to_string(),
        address: address.to_string(),
    })
}
