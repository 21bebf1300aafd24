//! Plan execution through the deployer.

mod common;

use alloy_core::dyn_abi::DynSolValue;
use common::{MockChain, helper, random_address};
use ledgerline_deploy::{CallStep, ContractStep, DeployError, Deployer, DeploymentPlan};
use tempdir::TempDir;

#[tokio::test]
async fn test_default_plan_wires_token_into_vault() {
    let dir = TempDir::new("deployer-test").unwrap();
    let mut deployer = Deployer::new(
        helper(MockChain::local(), dir.path()),
        DeploymentPlan::default(),
    );

    let summary = deployer.deploy().await.unwrap();

    let token = summary.address_of("CardToken").unwrap();
    let deploys = deployer.helper().chain().deploys();
    assert_eq!(deploys.len(), 2);
    assert_eq!(deploys[0].contract, "CardToken");
    assert_eq!(deploys[1].contract, "Vault");
    assert_eq!(deploys[1].args, vec![DynSolValue::Address(token)]);
    assert_eq!(summary.fresh_count(), 2);
}

#[tokio::test]
async fn test_second_run_deploys_nothing() {
    let dir = TempDir::new("deployer-test").unwrap();

    let first = {
        let mut deployer = Deployer::new(
            helper(MockChain::local(), dir.path()),
            DeploymentPlan::default(),
        );
        deployer.deploy().await.unwrap()
    };

    let mut deployer = Deployer::new(
        helper(MockChain::local(), dir.path()),
        DeploymentPlan::default(),
    );
    let second = deployer.deploy().await.unwrap();

    assert_eq!(deployer.helper().chain().deploy_count(), 0);
    assert_eq!(second.fresh_count(), 0);
    assert_eq!(
        first.address_of("Vault"),
        second.address_of("Vault"),
        "attached addresses must match the recorded ones"
    );
}

#[tokio::test]
async fn test_resume_after_partial_run() {
    let dir = TempDir::new("deployer-test").unwrap();

    let token = {
        let mut deployer = Deployer::new(
            helper(MockChain::local(), dir.path()),
            DeploymentPlan {
                contracts: vec![ContractStep::new("CardToken")],
                calls: Vec::new(),
            },
        );
        deployer.deploy().await.unwrap().address_of("CardToken").unwrap()
    };

    let mut deployer = Deployer::new(
        helper(MockChain::local(), dir.path()),
        DeploymentPlan::default(),
    );
    let summary = deployer.deploy().await.unwrap();

    let deploys = deployer.helper().chain().deploys();
    assert_eq!(deploys.len(), 1);
    assert_eq!(deploys[0].contract, "Vault");
    assert_eq!(deploys[0].args, vec![DynSolValue::Address(token)]);
    assert_eq!(summary.address_of("CardToken"), Some(token));
}

#[tokio::test]
async fn test_unknown_reference_deploys_nothing() {
    let dir = TempDir::new("deployer-test").unwrap();
    let mut deployer = Deployer::new(
        helper(MockChain::local(), dir.path()),
        DeploymentPlan {
            contracts: vec![
                ContractStep::new("CardToken"),
                ContractStep::new("Vault").with_args(["@Token"]),
            ],
            calls: Vec::new(),
        },
    );

    let err = deployer.deploy().await.unwrap_err();

    assert!(matches!(
        err,
        DeployError::UnknownReference { ref reference, .. } if reference == "Token"
    ));
    assert_eq!(deployer.helper().chain().deploy_count(), 0);
}

#[tokio::test]
async fn test_failure_stops_the_sequence() {
    let dir = TempDir::new("deployer-test").unwrap();
    let mut deployer = Deployer::new(
        helper(MockChain::local(), dir.path()),
        DeploymentPlan {
            contracts: vec![
                ContractStep::new("CardToken"),
                ContractStep::new("Missing"),
                ContractStep::new("Vault").with_args(["@CardToken"]),
            ],
            calls: Vec::new(),
        },
    );

    let err = deployer.deploy().await.unwrap_err();

    assert!(matches!(err, DeployError::Deployment { ref identity, .. } if identity == "Missing"));
    let deploys = deployer.helper().chain().deploys();
    assert_eq!(deploys.len(), 1);
    assert_eq!(deploys[0].contract, "CardToken");
}

#[tokio::test]
async fn test_invalid_constructor_argument() {
    let dir = TempDir::new("deployer-test").unwrap();
    let mut deployer = Deployer::new(
        helper(MockChain::local(), dir.path()),
        DeploymentPlan {
            contracts: vec![ContractStep::new("Vault").with_args(["not an address"])],
            calls: Vec::new(),
        },
    );

    let err = deployer.deploy().await.unwrap_err();

    assert!(matches!(err, DeployError::InvalidArguments { .. }));
    assert_eq!(deployer.helper().chain().deploy_count(), 0);
}

#[tokio::test]
async fn test_upgradeable_step_with_initializer() {
    let dir = TempDir::new("deployer-test").unwrap();
    let owner = random_address();
    let mut deployer = Deployer::new(
        helper(MockChain::local(), dir.path()),
        DeploymentPlan {
            contracts: vec![
                ContractStep::new("Vault")
                    .with_contract("VaultUpgradeable")
                    .with_args([owner.to_string()])
                    .upgradeable(Some("initialize")),
            ],
            calls: Vec::new(),
        },
    );

    let summary = deployer.deploy().await.unwrap();

    let vault = &summary.contracts[0].contract;
    let admin = vault.proxy_admin.expect("proxy admin");
    let chain = deployer.helper().chain();
    assert_eq!(chain.admin_deployments(), vec![admin]);
    assert_eq!(chain.proxy_admins(), vec![admin]);
    // Only the implementation goes through a plain deployment.
    assert_eq!(chain.deploy_count(), 1);
    assert_eq!(chain.deploys()[0].contract, "VaultUpgradeable");
    assert!(summary.contracts[0].fresh);
}

#[tokio::test]
async fn test_upgradeable_arguments_need_an_initializer() {
    let dir = TempDir::new("deployer-test").unwrap();
    let mut deployer = Deployer::new(
        helper(MockChain::local(), dir.path()),
        DeploymentPlan {
            contracts: vec![
                ContractStep::new("Vault")
                    .with_contract("VaultUpgradeable")
                    .with_args([random_address().to_string()])
                    .upgradeable(None),
            ],
            calls: Vec::new(),
        },
    );

    let err = deployer.deploy().await.unwrap_err();
    assert!(matches!(err, DeployError::InvalidArguments { .. }));
}

#[tokio::test]
async fn test_calls_only_run_for_fresh_targets() {
    let dir = TempDir::new("deployer-test").unwrap();
    let plan = DeploymentPlan {
        contracts: vec![
            ContractStep::new("TokenA").with_contract("CardToken"),
            ContractStep::new("Vault").with_args(["@TokenA"]),
        ],
        calls: vec![CallStep {
            target: "@TokenA".to_string(),
            function: "transferOwnership".to_string(),
            args: vec!["@Vault".to_string()],
        }],
    };

    let first = {
        let mut deployer = Deployer::new(helper(MockChain::local(), dir.path()), plan.clone());
        let summary = deployer.deploy().await.unwrap();

        let sent = deployer.helper().chain().sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(Some(sent[0].0), summary.address_of("TokenA"));
        // transferOwnership(address) selector.
        assert_eq!(&sent[0].1[..4], &[0xf2, 0xfd, 0xe3, 0x8b]);
        summary
    };
    assert_eq!(first.transactions.len(), 1);

    let mut deployer = Deployer::new(helper(MockChain::local(), dir.path()), plan);
    let second = deployer.deploy().await.unwrap();

    assert!(second.transactions.is_empty());
    assert!(deployer.helper().chain().sent().is_empty());
}
