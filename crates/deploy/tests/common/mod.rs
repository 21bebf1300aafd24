//! In-memory chain used by the integration tests.

#![allow(dead_code)]

use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use alloy_core::{
    dyn_abi::DynSolValue,
    json_abi::JsonAbi,
    primitives::{Address, Bytes, TxHash},
};
use anyhow::{Context, Result};
use ledgerline_deploy::{
    ChainClient, Contract, ContractFactory, DeploymentHelper, HelperConfig, Initializer, Network,
    PendingDeployment, ProxyDeployment, TransactionReceipt,
};

pub const CARD_TOKEN_ABI: &str = r#"[
    {
        "type": "function",
        "name": "transferOwnership",
        "inputs": [{ "name": "newOwner", "type": "address" }],
        "outputs": [],
        "stateMutability": "nonpayable"
    }
]"#;

pub const VAULT_ABI: &str = r#"[
    {
        "type": "constructor",
        "inputs": [{ "name": "token", "type": "address" }],
        "stateMutability": "nonpayable"
    },
    {
        "type": "function",
        "name": "initialize",
        "inputs": [{ "name": "owner", "type": "address" }],
        "outputs": [],
        "stateMutability": "nonpayable"
    }
]"#;

/// Upgradeable flavour of the vault: no constructor, set up by `initialize`.
pub const UPGRADEABLE_VAULT_ABI: &str = r#"[
    {
        "type": "function",
        "name": "initialize",
        "inputs": [{ "name": "owner", "type": "address" }],
        "outputs": [],
        "stateMutability": "nonpayable"
    }
]"#;

pub fn factory(name: &str, abi: &str) -> ContractFactory {
    let abi: JsonAbi = serde_json::from_str(abi).expect("valid ABI");
    ContractFactory::new(name, abi, Bytes::from_static(&[0x60, 0x80, 0x60, 0x40]))
}

pub fn random_address() -> Address {
    Address::from(rand::random::<[u8; 20]>())
}

fn random_hash() -> TxHash {
    TxHash::from(rand::random::<[u8; 32]>())
}

/// A deployment observed by the mock.
#[derive(Debug, Clone)]
pub struct DeployCall {
    pub contract: String,
    pub args: Vec<DynSolValue>,
    pub address: Address,
}

/// Chain double that deploys to random addresses and counts every call.
pub struct MockChain {
    network: Network,
    factories: BTreeMap<String, ContractFactory>,
    pub fail_deployments: bool,
    pub fail_verification: bool,
    pub revert_transactions: bool,
    /// Makes the next proxy deployment fail, after its implementation and
    /// admin were deployed.
    pub fail_next_proxy: AtomicBool,
    deploys: Mutex<Vec<DeployCall>>,
    pending: Mutex<BTreeMap<TxHash, (String, Address)>>,
    reverted: Mutex<BTreeSet<TxHash>>,
    admin_deployments: Mutex<Vec<Address>>,
    proxies: Mutex<Vec<(Address, Address)>>,
    sent: Mutex<Vec<(Address, Bytes)>>,
    verifications: AtomicUsize,
}

impl MockChain {
    pub fn new(chain_id: u64) -> Self {
        let factories = [
            factory("CardToken", CARD_TOKEN_ABI),
            factory("Vault", VAULT_ABI),
            factory("VaultUpgradeable", UPGRADEABLE_VAULT_ABI),
        ]
        .into_iter()
        .map(|factory| (factory.name().to_string(), factory))
        .collect();

        Self {
            network: Network::from_chain_id(chain_id),
            factories,
            fail_deployments: false,
            fail_verification: false,
            revert_transactions: false,
            fail_next_proxy: AtomicBool::new(false),
            deploys: Mutex::new(Vec::new()),
            pending: Mutex::new(BTreeMap::new()),
            reverted: Mutex::new(BTreeSet::new()),
            admin_deployments: Mutex::new(Vec::new()),
            proxies: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            verifications: AtomicUsize::new(0),
        }
    }

    pub fn local() -> Self {
        Self::new(31337)
    }

    pub fn deploys(&self) -> Vec<DeployCall> {
        self.deploys.lock().unwrap().clone()
    }

    pub fn deploy_count(&self) -> usize {
        self.deploys.lock().unwrap().len()
    }

    /// Every proxy admin deployed.
    pub fn admin_deployments(&self) -> Vec<Address> {
        self.admin_deployments.lock().unwrap().clone()
    }

    /// Admin passed to every successful `deploy_proxy` call.
    pub fn proxy_admins(&self) -> Vec<Address> {
        self.proxies.lock().unwrap().iter().map(|(_, admin)| *admin).collect()
    }

    /// Implementation passed to every successful `deploy_proxy` call.
    pub fn proxy_implementations(&self) -> Vec<Address> {
        self.proxies
            .lock()
            .unwrap()
            .iter()
            .map(|(implementation, _)| *implementation)
            .collect()
    }

    pub fn sent(&self) -> Vec<(Address, Bytes)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn verification_count(&self) -> usize {
        self.verifications.load(Ordering::SeqCst)
    }
}

impl ChainClient for MockChain {
    async fn network(&self) -> Result<Network> {
        Ok(self.network.clone())
    }

    async fn contract_factory(&self, name: &str) -> Result<ContractFactory> {
        self.factories
            .get(name)
            .cloned()
            .with_context(|| format!("No artifact for {name}"))
    }

    async fn deploy(
        &self,
        factory: &ContractFactory,
        args: &[DynSolValue],
    ) -> Result<PendingDeployment> {
        if self.fail_deployments {
            anyhow::bail!("insufficient funds for gas");
        }
        factory.deploy_data(args)?;

        let address = random_address();
        let transaction_hash = random_hash();
        self.deploys.lock().unwrap().push(DeployCall {
            contract: factory.name().to_string(),
            args: args.to_vec(),
            address,
        });
        self.pending
            .lock()
            .unwrap()
            .insert(transaction_hash, (factory.name().to_string(), address));

        Ok(PendingDeployment {
            contract: factory.name().to_string(),
            transaction_hash,
        })
    }

    async fn await_deployment(&self, pending: PendingDeployment) -> Result<Contract> {
        let (name, address) = self
            .pending
            .lock()
            .unwrap()
            .remove(&pending.transaction_hash)
            .context("Unknown deployment")?;
        Ok(Contract::new(name, address))
    }

    async fn wait_for_transaction(
        &self,
        hash: TxHash,
        _confirmations: u64,
    ) -> Result<TransactionReceipt> {
        Ok(TransactionReceipt {
            transaction_hash: hash,
            status: !self.reverted.lock().unwrap().contains(&hash),
            block_number: 1,
            contract_address: None,
        })
    }

    async fn deploy_proxy_admin(&self) -> Result<Contract> {
        if self.fail_deployments {
            anyhow::bail!("insufficient funds for gas");
        }

        let address = random_address();
        self.admin_deployments.lock().unwrap().push(address);
        Ok(Contract::new("ProxyAdmin", address))
    }

    async fn deploy_proxy(
        &self,
        factory: &ContractFactory,
        implementation: Address,
        initializer: Option<&Initializer>,
        admin: Address,
    ) -> Result<ProxyDeployment> {
        if self.fail_deployments || self.fail_next_proxy.swap(false, Ordering::SeqCst) {
            anyhow::bail!("insufficient funds for gas");
        }
        if let Some(initializer) = initializer {
            factory.encode_call(&initializer.function, &initializer.args)?;
        }

        self.proxies.lock().unwrap().push((implementation, admin));

        Ok(ProxyDeployment {
            address: random_address(),
            implementation,
            admin,
        })
    }

    async fn send_transaction(&self, to: Address, data: Bytes) -> Result<TxHash> {
        let hash = random_hash();
        self.sent.lock().unwrap().push((to, data));
        if self.revert_transactions {
            self.reverted.lock().unwrap().insert(hash);
        }
        Ok(hash)
    }

    async fn verify(
        &self,
        _contract: &Contract,
        _factory: &ContractFactory,
        _constructor_args: &[DynSolValue],
    ) -> Result<()> {
        self.verifications.fetch_add(1, Ordering::SeqCst);
        if self.fail_verification {
            anyhow::bail!("explorer unavailable");
        }
        Ok(())
    }
}

pub fn helper_config(dir: &Path) -> HelperConfig {
    HelperConfig {
        deployments_dir: dir.to_path_buf(),
        tx_confirmations: 1,
        verify: true,
    }
}

pub fn helper(chain: MockChain, dir: &Path) -> DeploymentHelper<MockChain> {
    DeploymentHelper::new(chain, helper_config(dir))
}

/// Parsed content of the ledger file of `network` under `dir`.
pub fn read_ledger(dir: &Path, network: &Network) -> serde_json::Value {
    let content = std::fs::read_to_string(network.ledger_path(dir)).expect("ledger file");
    serde_json::from_str(&content).expect("ledger json")
}
