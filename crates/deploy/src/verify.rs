//! Source verification against an Etherscan-compatible explorer API.

use std::time::Duration;

use alloy_core::primitives::Address;
use anyhow::Context;
use backon::{ConstantBuilder, Retryable};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::artifacts::BuildInfo;

/// Timeout of a single explorer request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Delay between two verification status checks.
const STATUS_POLL_DELAY: Duration = Duration::from_secs(5);
/// Number of status checks before giving up.
const STATUS_POLL_ATTEMPTS: usize = 24;

/// Explorer endpoint and credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplorerConfig {
    /// API endpoint, e.g. `https://api-sepolia.etherscan.io/api`.
    pub api_url: Url,
    pub api_key: String,
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("no build info available for {0}, cannot verify")]
    MissingBuildInfo(String),
    #[error("verification still pending")]
    Pending,
    #[error("explorer rejected verification: {0}")]
    Rejected(String),
    #[error(transparent)]
    Request(#[from] anyhow::Error),
}

#[derive(Debug, Deserialize)]
struct ExplorerResponse {
    status: String,
    #[serde(default)]
    message: String,
    result: String,
}

/// Submits contract sources to an explorer and waits for the outcome.
#[derive(Debug, Clone)]
pub struct EtherscanVerifier {
    client: reqwest::Client,
    config: ExplorerConfig,
}

impl EtherscanVerifier {
    pub fn new(config: ExplorerConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, config })
    }

    /// Verify the contract at `address`.
    ///
    /// `constructor_args` is the ABI-encoded constructor input, without the
    /// creation code. An already verified contract counts as success.
    pub async fn verify(
        &self,
        contract_name: &str,
        address: Address,
        build_info: Option<&BuildInfo>,
        constructor_args: &[u8],
    ) -> Result<(), VerifyError> {
        let build_info =
            build_info.ok_or_else(|| VerifyError::MissingBuildInfo(contract_name.to_string()))?;

        let source_code =
            serde_json::to_string(&build_info.input).context("Failed to encode compiler input")?;
        let contract_name = format!("{}:{}", build_info.source_name, contract_name);
        let compiler_version = format!("v{}", build_info.solc_long_version);
        let address = address.to_checksum(None);
        let constructor_args = hex::encode(constructor_args);

        let form = [
            ("apikey", self.config.api_key.as_str()),
            ("module", "contract"),
            ("action", "verifysourcecode"),
            ("contractaddress", address.as_str()),
            ("sourceCode", source_code.as_str()),
            ("codeformat", "solidity-standard-json-input"),
            ("contractname", contract_name.as_str()),
            ("compilerversion", compiler_version.as_str()),
            // The misspelling is part of the Etherscan API.
            ("constructorArguements", constructor_args.as_str()),
        ];

        let response: ExplorerResponse = self
            .client
            .post(self.config.api_url.clone())
            .form(&form)
            .send()
            .await
            .context("Failed to send verification request")?
            .json()
            .await
            .context("Failed to parse verification response")?;

        if response.status != "1" {
            if is_already_verified(&response.result) {
                tracing::info!(address = %address, "Contract already verified");
                return Ok(());
            }
            return Err(VerifyError::Rejected(format!(
                "{}: {}",
                response.message, response.result
            )));
        }

        let guid = response.result;
        tracing::info!(address = %address, guid = %guid, "Verification submitted, waiting for result...");

        (|| self.check_status(&guid))
            .retry(
                ConstantBuilder::default()
                    .with_delay(STATUS_POLL_DELAY)
                    .with_max_times(STATUS_POLL_ATTEMPTS),
            )
            .when(|e| matches!(e, VerifyError::Pending))
            .await?;

        tracing::info!(address = %address, "Contract verified");
        Ok(())
    }

    async fn check_status(&self, guid: &str) -> Result<(), VerifyError> {
        let response: ExplorerResponse = self
            .client
            .get(self.config.api_url.clone())
            .query(&[
                ("apikey", self.config.api_key.as_str()),
                ("module", "contract"),
                ("action", "checkverifystatus"),
                ("guid", guid),
            ])
            .send()
            .await
            .context("Failed to send verification status request")?
            .json()
            .await
            .context("Failed to parse verification status response")?;

        classify_status(&response.status, &response.result)
    }
}

fn is_already_verified(result: &str) -> bool {
    result.to_lowercase().contains("already verified")
}

fn classify_status(status: &str, result: &str) -> Result<(), VerifyError> {
    if status == "1" || is_already_verified(result) {
        return Ok(());
    }

    if result.to_lowercase().contains("pending") {
        return Err(VerifyError::Pending);
    }

    Err(VerifyError::Rejected(result.to_string()))
}
