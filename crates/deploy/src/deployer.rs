use std::collections::BTreeMap;

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, TxHash},
};

use crate::{
    artifacts::ContractFactory,
    chain::{ChainClient, Contract, Initializer},
    error::DeployError,
    helper::DeploymentHelper,
    plan::{CallStep, ContractStep, DeploymentPlan, reference},
};

/// A contract handled by a deployment run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployedContract {
    pub identity: String,
    pub contract: Contract,
    /// `false` when the contract was already in the ledger.
    pub fresh: bool,
}

/// Outcome of [`Deployer::deploy`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentSummary {
    pub contracts: Vec<DeployedContract>,
    /// Transactions sent by the plan's calls.
    pub transactions: Vec<TxHash>,
}

impl DeploymentSummary {
    pub fn address_of(&self, identity: &str) -> Option<Address> {
        self.contracts
            .iter()
            .find(|deployed| deployed.identity == identity)
            .map(|deployed| deployed.contract.address)
    }

    pub fn fresh_count(&self) -> usize {
        self.contracts.iter().filter(|deployed| deployed.fresh).count()
    }
}

/// Runs a [`DeploymentPlan`] through a [`DeploymentHelper`].
///
/// Steps run strictly in order. `@identity` arguments are replaced by the
/// address of the earlier step, whether it was deployed now or attached from
/// the ledger. Calls only run against contracts deployed during this run, so
/// running the same plan again sends nothing.
pub struct Deployer<C> {
    helper: DeploymentHelper<C>,
    plan: DeploymentPlan,
}

impl<C: ChainClient> Deployer<C> {
    pub fn new(helper: DeploymentHelper<C>, plan: DeploymentPlan) -> Self {
        Self { helper, plan }
    }

    pub fn helper(&self) -> &DeploymentHelper<C> {
        &self.helper
    }

    pub fn plan(&self) -> &DeploymentPlan {
        &self.plan
    }

    pub async fn deploy(&mut self) -> Result<DeploymentSummary, DeployError> {
        self.plan.validate()?;
        self.helper.initialize().await?;

        tracing::info!(
            contracts = self.plan.contracts.len(),
            calls = self.plan.calls.len(),
            "Starting deployment..."
        );

        let mut summary = DeploymentSummary::default();
        let mut addresses = BTreeMap::new();

        for step in self.plan.contracts.clone() {
            let deployed = self.deploy_step(&step, &addresses).await?;
            addresses.insert(step.identity.clone(), deployed.contract.address);
            summary.contracts.push(deployed);
        }

        for call in self.plan.calls.clone() {
            let target = reference(&call.target).unwrap_or(&call.target);
            let fresh = summary
                .contracts
                .iter()
                .any(|deployed| deployed.identity == target && deployed.fresh);

            if !fresh {
                tracing::info!(
                    target = %target,
                    function = %call.function,
                    "Target was already deployed, skipping call"
                );
                continue;
            }

            let hash = self.call_step(&call, &addresses).await?;
            summary.transactions.push(hash);
        }

        tracing::info!(
            deployed = summary.fresh_count(),
            attached = summary.contracts.len() - summary.fresh_count(),
            "✓ Deployment complete!"
        );
        for deployed in &summary.contracts {
            tracing::info!("{:<24} {}", deployed.identity, deployed.contract.address);
        }

        Ok(summary)
    }

    async fn deploy_step(
        &mut self,
        step: &ContractStep,
        addresses: &BTreeMap<String, Address>,
    ) -> Result<DeployedContract, DeployError> {
        let fresh = self.helper.lookup(&step.identity).await?.is_none();
        let factory = self
            .helper
            .chain()
            .contract_factory(step.contract_name())
            .await
            .map_err(|source| DeployError::Deployment {
                identity: step.identity.clone(),
                source,
            })?;

        let raw_args = resolve_args(&step.identity, &step.args, addresses)?;

        let contract = if step.upgradeable {
            let initializer = initializer(&factory, step, &raw_args)?;
            self.helper
                .deploy_upgradeable_contract(&factory, &step.identity, initializer)
                .await?
        } else {
            let args = factory
                .parse_constructor_args(&raw_args)
                .map_err(|source| DeployError::InvalidArguments {
                    identity: step.identity.clone(),
                    source,
                })?;
            self.helper
                .deploy_contract(&factory, &step.identity, args)
                .await?
        };

        Ok(DeployedContract {
            identity: step.identity.clone(),
            contract,
            fresh,
        })
    }

    async fn call_step(
        &self,
        call: &CallStep,
        addresses: &BTreeMap<String, Address>,
    ) -> Result<TxHash, DeployError> {
        let target = reference(&call.target).unwrap_or(&call.target);
        let step = format!("{}.{}", target, call.function);

        let address = addresses
            .get(target)
            .copied()
            .ok_or_else(|| DeployError::UnknownReference {
                step: step.clone(),
                reference: target.to_string(),
            })?;

        let invalid = |source| DeployError::InvalidArguments {
            identity: step.clone(),
            source,
        };

        let chain = self.helper.chain();
        let factory = chain
            .contract_factory(&self.contract_name_of(target))
            .await
            .map_err(invalid)?;

        let raw_args = resolve_args(&step, &call.args, addresses)?;
        let args = factory
            .parse_function_args(&call.function, &raw_args)
            .map_err(invalid)?;
        let data = factory.encode_call(&call.function, &args).map_err(invalid)?;

        tracing::info!(target = %address, function = %call.function, "Calling {}", step);

        let receipt = self
            .helper
            .send_and_wait_for_transaction(chain.send_transaction(address, data))
            .await?;

        Ok(receipt.transaction_hash)
    }

    fn contract_name_of(&self, identity: &str) -> String {
        self.plan
            .contracts
            .iter()
            .find(|step| step.identity == identity)
            .map(|step| step.contract_name().to_string())
            .unwrap_or_else(|| identity.to_string())
    }
}

/// Replace `@identity` arguments by the checksummed address of that identity.
fn resolve_args(
    step: &str,
    args: &[String],
    addresses: &BTreeMap<String, Address>,
) -> Result<Vec<String>, DeployError> {
    args.iter()
        .map(|arg| match reference(arg) {
            Some(name) => addresses
                .get(name)
                .map(|address| address.to_checksum(None))
                .ok_or_else(|| DeployError::UnknownReference {
                    step: step.to_string(),
                    reference: name.to_string(),
                }),
            None => Ok(arg.clone()),
        })
        .collect()
}

fn initializer(
    factory: &ContractFactory,
    step: &ContractStep,
    raw_args: &[String],
) -> Result<Option<Initializer>, DeployError> {
    let invalid = |source| DeployError::InvalidArguments {
        identity: step.identity.clone(),
        source,
    };

    match &step.initializer {
        Some(function) => {
            let args: Vec<DynSolValue> = factory
                .parse_function_args(function, raw_args)
                .map_err(invalid)?;
            Ok(Some(Initializer::new(function.clone(), args)))
        }
        None if raw_args.is_empty() => Ok(None),
        None => Err(invalid(anyhow::anyhow!(
            "upgradeable contracts take arguments through an initializer"
        ))),
    }
}
