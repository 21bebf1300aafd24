//! Declarative description of what a deployment run deploys.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::DeployError;

/// Prefix marking an argument as the address of an earlier identity.
pub const REFERENCE_PREFIX: char = '@';

/// Ordered contracts to deploy, followed by calls to make on them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentPlan {
    #[serde(default)]
    pub contracts: Vec<ContractStep>,
    #[serde(default)]
    pub calls: Vec<CallStep>,
}

impl Default for DeploymentPlan {
    /// A token, then a vault holding it.
    fn default() -> Self {
        Self {
            contracts: vec![
                ContractStep::new("CardToken"),
                ContractStep::new("Vault").with_args(["@CardToken"]),
            ],
            calls: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractStep {
    /// Ledger key of the deployment.
    pub identity: String,
    /// Artifact name, when it differs from the identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract: Option<String>,
    /// Constructor arguments, or initializer arguments for upgradeable steps.
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub upgradeable: bool,
    /// Function called through the proxy on deployment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initializer: Option<String>,
}

impl ContractStep {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            contract: None,
            args: Vec::new(),
            upgradeable: false,
            initializer: None,
        }
    }

    pub fn with_contract(mut self, contract: impl Into<String>) -> Self {
        self.contract = Some(contract.into());
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn upgradeable(mut self, initializer: Option<&str>) -> Self {
        self.upgradeable = true;
        self.initializer = initializer.map(str::to_string);
        self
    }

    pub fn contract_name(&self) -> &str {
        self.contract.as_deref().unwrap_or(&self.identity)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallStep {
    /// `@identity` of the contract to call.
    pub target: String,
    pub function: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Identity named by `value` when it is an `@identity` reference.
pub fn reference(value: &str) -> Option<&str> {
    value.strip_prefix(REFERENCE_PREFIX)
}

impl DeploymentPlan {
    /// Check identities are unique and every reference points at an earlier
    /// contract step. Runs before anything is deployed.
    pub fn validate(&self) -> Result<(), DeployError> {
        let mut known = BTreeSet::new();

        for step in &self.contracts {
            check_references(&step.identity, &step.args, &known)?;
            if !known.insert(step.identity.as_str()) {
                return Err(DeployError::DuplicateIdentity(step.identity.clone()));
            }
        }

        for call in &self.calls {
            let step = format!("call {}.{}", call.target, call.function);
            let target = reference(&call.target).unwrap_or(&call.target);
            if !known.contains(target) {
                return Err(DeployError::UnknownReference {
                    step,
                    reference: target.to_string(),
                });
            }
            check_references(&step, &call.args, &known)?;
        }

        Ok(())
    }
}

fn check_references(step: &str, args: &[String], known: &BTreeSet<&str>) -> Result<(), DeployError> {
    for arg in args {
        if let Some(name) = reference(arg) {
            if !known.contains(name) {
                return Err(DeployError::UnknownReference {
                    step: step.to_string(),
                    reference: name.to_string(),
                });
            }
        }
    }
    Ok(())
}
