//! Compiled contract artifacts and the factories built from them.
//!
//! Both Foundry (`out/<File>.sol/<Name>.json`) and Hardhat
//! (`artifacts/<path>/<File>.sol/<Name>.json` plus a `.dbg.json` pointing at
//! the build info) layouts are understood. Foundry only writes build info to
//! `out/build-info` when `build_info = true` is set in `foundry.toml`.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::SystemTime,
};

use alloy_core::{
    dyn_abi::{DynSolValue, JsonAbiExt, Specifier},
    json_abi::{JsonAbi, Param},
    primitives::{Address, Bytes},
};
use anyhow::{Context, Result};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;

use crate::chain::Contract;

/// Directory holding the compiler build info, next to the artifacts.
const BUILD_INFO_DIR: &str = "build-info";

/// Directory names that never contain contract artifacts.
const SKIPPED_DIRS: [&str; 2] = [BUILD_INFO_DIR, "cache"];

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ArtifactBytecode {
    /// Hardhat stores the creation code as a plain hex string.
    Plain(Bytes),
    /// Foundry wraps it in an object with link references.
    Object { object: Bytes },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArtifactFile {
    abi: JsonAbi,
    bytecode: ArtifactBytecode,
    /// Set by Hardhat.
    #[serde(default)]
    source_name: Option<String>,
    /// Solidity metadata, inlined by Foundry.
    #[serde(default)]
    metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct SolcMetadata {
    compiler: MetadataCompiler,
    settings: MetadataSettings,
}

#[derive(Debug, Deserialize)]
struct MetadataCompiler {
    version: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetadataSettings {
    /// Source file -> contract name.
    #[serde(default)]
    compilation_target: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DebugFile {
    build_info: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildInfoFile {
    /// Missing from recent Foundry build info, where the artifact metadata
    /// names the compiler instead.
    #[serde(default)]
    solc_long_version: Option<String>,
    input: Value,
}

impl BuildInfoFile {
    fn compiles(&self, source_name: &str) -> bool {
        self.input["sources"].get(source_name).is_some()
    }
}

/// Compiler input and version needed to verify a contract on an explorer.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildInfo {
    /// Full compiler version, e.g. `0.8.13+commit.abaa5c0e`.
    pub solc_long_version: String,
    /// Source file the contract is declared in, e.g. `src/CardToken.sol`.
    pub source_name: String,
    /// The standard-json compiler input.
    pub input: Value,
}

/// A deployable contract: ABI, creation code and optional build info.
#[derive(Debug, Clone)]
pub struct ContractFactory {
    name: String,
    abi: JsonAbi,
    bytecode: Bytes,
    build_info: Option<BuildInfo>,
}

impl ContractFactory {
    pub fn new(name: impl Into<String>, abi: JsonAbi, bytecode: Bytes) -> Self {
        Self {
            name: name.into(),
            abi,
            bytecode,
            build_info: None,
        }
    }

    pub fn with_build_info(mut self, build_info: BuildInfo) -> Self {
        self.build_info = Some(build_info);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn abi(&self) -> &JsonAbi {
        &self.abi
    }

    pub fn bytecode(&self) -> &Bytes {
        &self.bytecode
    }

    pub fn build_info(&self) -> Option<&BuildInfo> {
        self.build_info.as_ref()
    }

    /// Bind a handle to an already deployed instance. No network access.
    pub fn attach(&self, address: Address) -> Contract {
        Contract::new(self.name.clone(), address)
    }

    /// ABI-encode the constructor arguments, without the creation code.
    pub fn encode_constructor_args(&self, args: &[DynSolValue]) -> Result<Vec<u8>> {
        match self.abi.constructor() {
            Some(constructor) => constructor.abi_encode_input(args).with_context(|| {
                format!("Invalid constructor arguments for {}", self.name)
            }),
            None if args.is_empty() => Ok(Vec::new()),
            None => anyhow::bail!(
                "{} has no constructor but {} arguments were given",
                self.name,
                args.len()
            ),
        }
    }

    /// Creation code followed by the encoded constructor arguments.
    pub fn deploy_data(&self, args: &[DynSolValue]) -> Result<Bytes> {
        let mut data = self.bytecode.to_vec();
        data.extend(self.encode_constructor_args(args)?);
        Ok(data.into())
    }

    /// Calldata for `function(args)`, picking the overload by arity.
    pub fn encode_call(&self, function: &str, args: &[DynSolValue]) -> Result<Bytes> {
        let function = self
            .abi
            .function(function)
            .and_then(|overloads| overloads.iter().find(|f| f.inputs.len() == args.len()))
            .with_context(|| {
                format!(
                    "{} has no function {} taking {} arguments",
                    self.name,
                    function,
                    args.len()
                )
            })?;

        let calldata = function
            .abi_encode_input(args)
            .with_context(|| format!("Invalid arguments for {}.{}", self.name, function.name))?;

        Ok(calldata.into())
    }

    /// Parse textual constructor arguments using the constructor's ABI types.
    pub fn parse_constructor_args(&self, raw: &[String]) -> Result<Vec<DynSolValue>> {
        let inputs = self
            .abi
            .constructor()
            .map(|constructor| constructor.inputs.as_slice())
            .unwrap_or_default();

        parse_args(&self.name, "constructor", inputs, raw)
    }

    /// Parse textual arguments for `function`, picking the overload by arity.
    pub fn parse_function_args(&self, function: &str, raw: &[String]) -> Result<Vec<DynSolValue>> {
        let inputs = self
            .abi
            .function(function)
            .and_then(|overloads| overloads.iter().find(|f| f.inputs.len() == raw.len()))
            .map(|f| f.inputs.as_slice())
            .with_context(|| {
                format!(
                    "{} has no function {} taking {} arguments",
                    self.name,
                    function,
                    raw.len()
                )
            })?;

        parse_args(&self.name, function, inputs, raw)
    }
}

fn parse_args(
    contract: &str,
    function: &str,
    inputs: &[Param],
    raw: &[String],
) -> Result<Vec<DynSolValue>> {
    if inputs.len() != raw.len() {
        anyhow::bail!(
            "{}.{} expects {} arguments, got {}",
            contract,
            function,
            inputs.len(),
            raw.len()
        );
    }

    inputs
        .iter()
        .zip(raw)
        .map(|(param, value)| {
            let ty = param
                .resolve()
                .with_context(|| format!("Unsupported ABI type {}", param.ty))?;
            ty.coerce_str(value).with_context(|| {
                format!(
                    "Invalid value '{}' for {} argument {} of {}.{}",
                    value, param.ty, param.name, contract, function
                )
            })
        })
        .collect()
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Looks up compiled artifacts by contract name.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load the factory for `name`.
    ///
    /// Fails when no artifact, or more than one artifact, is named `<name>.json`.
    pub fn load(&self, name: &str) -> Result<ContractFactory> {
        let file_name = format!("{}.json", name);
        let mut matches = Vec::new();
        Self::find_files(&self.root, &file_name, &mut matches)?;

        let path = match matches.as_slice() {
            [] => anyhow::bail!(
                "No artifact named {} under {}",
                file_name,
                self.root.display()
            ),
            [path] => path.clone(),
            _ => anyhow::bail!(
                "Ambiguous artifact name {}: {:?}",
                name,
                matches
                    .iter()
                    .map(|path| path.display().to_string())
                    .collect::<Vec<_>>()
            ),
        };

        self.load_file(name, &path)
    }

    /// Load a factory from a specific artifact file.
    pub fn load_file(&self, name: &str, path: &Path) -> Result<ContractFactory> {
        let artifact: ArtifactFile = read_json(path)?;

        let build_info = match self.load_build_info(path, &artifact) {
            Ok(build_info) => build_info,
            Err(e) => {
                tracing::debug!(error = %e, artifact = %path.display(), "No usable build info");
                None
            }
        };

        let bytecode = match artifact.bytecode {
            ArtifactBytecode::Plain(bytes) | ArtifactBytecode::Object { object: bytes } => bytes,
        };

        let mut factory = ContractFactory::new(name, artifact.abi, bytecode);
        if let Some(build_info) = build_info {
            factory = factory.with_build_info(build_info);
        }

        tracing::debug!(contract = %name, artifact = %path.display(), "Artifact loaded");
        Ok(factory)
    }

    /// Resolve the build info of an artifact, through the Hardhat `.dbg.json`
    /// next to it or else the Foundry `build-info` directory.
    fn load_build_info(&self, path: &Path, artifact: &ArtifactFile) -> Result<Option<BuildInfo>> {
        let metadata = artifact
            .metadata
            .clone()
            .and_then(|metadata| serde_json::from_value::<SolcMetadata>(metadata).ok());

        let source_name = artifact.source_name.clone().or_else(|| {
            metadata
                .as_ref()
                .and_then(|metadata| metadata.settings.compilation_target.keys().next().cloned())
        });
        let Some(source_name) = source_name else {
            return Ok(None);
        };

        let debug_path = path.with_extension("dbg.json");
        let build_info = if debug_path.exists() {
            let debug: DebugFile = read_json(&debug_path)?;
            let parent = debug_path
                .parent()
                .context("Artifact path must have a parent directory")?;
            Some(read_json::<BuildInfoFile>(&parent.join(debug.build_info))?)
        } else {
            self.find_build_info(&source_name)?
        };
        let Some(build_info) = build_info else {
            return Ok(None);
        };

        let solc_long_version = build_info
            .solc_long_version
            .or_else(|| metadata.map(|metadata| metadata.compiler.version))
            .context("Build info does not name the compiler version")?;

        Ok(Some(BuildInfo {
            solc_long_version,
            source_name,
            input: build_info.input,
        }))
    }

    /// The newest `build-info/*.json` under the root compiling `source_name`.
    fn find_build_info(&self, source_name: &str) -> Result<Option<BuildInfoFile>> {
        let dir = self.root.join(BUILD_INFO_DIR);
        if !dir.is_dir() {
            return Ok(None);
        }

        let entries = std::fs::read_dir(&dir)
            .with_context(|| format!("Failed to read build info directory {}", dir.display()))?;

        let mut newest: Option<(SystemTime, BuildInfoFile)> = None;
        for entry in entries {
            let path = entry.context("Failed to read directory entry")?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }

            let build_info: BuildInfoFile = read_json(&path)?;
            if !build_info.compiles(source_name) {
                continue;
            }

            let modified = std::fs::metadata(&path)
                .and_then(|metadata| metadata.modified())
                .with_context(|| format!("Failed to stat {}", path.display()))?;
            if newest.as_ref().is_none_or(|(time, _)| modified > *time) {
                newest = Some((modified, build_info));
            }
        }

        Ok(newest.map(|(_, build_info)| build_info))
    }

    fn find_files(dir: &Path, file_name: &str, found: &mut Vec<PathBuf>) -> Result<()> {
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read artifacts directory {}", dir.display()))?;

        for entry in entries {
            let entry = entry.context("Failed to read directory entry")?;
            let path = entry.path();

            if path.is_dir() {
                let skipped = path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| SKIPPED_DIRS.contains(&name));
                if !skipped {
                    Self::find_files(&path, file_name, found)?;
                }
            } else if path.file_name().and_then(|name| name.to_str()) == Some(file_name) {
                found.push(path);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    const VAULT_ABI: &str = r#"[
        {"type": "constructor", "inputs": [{"name": "token", "type": "address"}], "stateMutability": "nonpayable"},
        {"type": "function", "name": "setLimit", "inputs": [{"name": "limit", "type": "uint256"}], "outputs": [], "stateMutability": "nonpayable"}
    ]"#;

    fn vault_factory() -> ContractFactory {
        ContractFactory::new(
            "Vault",
            serde_json::from_str(VAULT_ABI).unwrap(),
            Bytes::from(vec![0x60, 0x80]),
        )
    }

    #[test]
    fn test_deploy_data_appends_constructor_args() {
        let factory = vault_factory();
        let token = Address::repeat_byte(0x11);

        let data = factory.deploy_data(&[DynSolValue::Address(token)]).unwrap();

        assert_eq!(data.len(), 2 + 32);
        assert_eq!(&data[..2], &[0x60, 0x80]);
        assert_eq!(&data[2 + 12..], token.as_slice());
    }

    #[test]
    fn test_constructor_arity_is_checked() {
        let factory = vault_factory();
        assert!(factory.deploy_data(&[]).is_err());

        let no_constructor = ContractFactory::new("CardToken", JsonAbi::new(), Bytes::new());
        assert!(no_constructor.deploy_data(&[]).is_ok());
        assert!(
            no_constructor
                .deploy_data(&[DynSolValue::Bool(true)])
                .is_err()
        );
    }

    #[test]
    fn test_parse_constructor_args() {
        let factory = vault_factory();
        let args = factory
            .parse_constructor_args(&["0x1111111111111111111111111111111111111111".to_string()])
            .unwrap();

        assert_eq!(args, vec![DynSolValue::Address(Address::repeat_byte(0x11))]);
        assert!(factory.parse_constructor_args(&["not-an-address".to_string()]).is_err());
        assert!(factory.parse_constructor_args(&[]).is_err());
    }

    #[test]
    fn test_encode_call() {
        let factory = vault_factory();
        let args = factory
            .parse_function_args("setLimit", &["42".to_string()])
            .unwrap();
        let calldata = factory.encode_call("setLimit", &args).unwrap();

        assert_eq!(calldata.len(), 4 + 32);
        assert_eq!(calldata[4 + 31], 42);
        assert!(factory.encode_call("missing", &[]).is_err());
    }

    #[test]
    fn test_load_foundry_artifact() {
        let temp_dir = TempDir::new("artifacts-test").expect("Failed to create temp dir");
        let dir = temp_dir.path().join("Vault.sol");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("Vault.json"),
            format!(
                r#"{{"abi": {}, "bytecode": {{"object": "0x6080", "linkReferences": {{}}}}}}"#,
                VAULT_ABI
            ),
        )
        .unwrap();

        let factory = ArtifactStore::new(temp_dir.path()).load("Vault").unwrap();
        assert_eq!(factory.name(), "Vault");
        assert_eq!(factory.bytecode().as_ref(), &[0x60, 0x80]);
        assert!(factory.abi().constructor().is_some());
        assert!(factory.build_info().is_none());
    }

    #[test]
    fn test_load_hardhat_artifact_with_build_info() {
        let temp_dir = TempDir::new("artifacts-test").expect("Failed to create temp dir");
        let dir = temp_dir.path().join("src/CardToken.sol");
        let build_info_dir = temp_dir.path().join("build-info");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::create_dir_all(&build_info_dir).unwrap();

        std::fs::write(
            dir.join("CardToken.json"),
            r#"{"_format": "hh-sol-artifact-1", "contractName": "CardToken", "sourceName": "src/CardToken.sol", "abi": [], "bytecode": "0x6080"}"#,
        )
        .unwrap();
        std::fs::write(
            dir.join("CardToken.dbg.json"),
            r#"{"_format": "hh-sol-dbg-1", "buildInfo": "../../build-info/abc.json"}"#,
        )
        .unwrap();
        std::fs::write(
            build_info_dir.join("abc.json"),
            r#"{"solcVersion": "0.8.13", "solcLongVersion": "0.8.13+commit.abaa5c0e", "input": {"language": "Solidity"}}"#,
        )
        .unwrap();

        let factory = ArtifactStore::new(temp_dir.path()).load("CardToken").unwrap();
        let build_info = factory.build_info().unwrap();
        assert_eq!(build_info.solc_long_version, "0.8.13+commit.abaa5c0e");
        assert_eq!(build_info.source_name, "src/CardToken.sol");
        assert_eq!(build_info.input["language"], "Solidity");
    }

    #[test]
    fn test_load_foundry_artifact_with_build_info() {
        let temp_dir = TempDir::new("artifacts-test").expect("Failed to create temp dir");
        let dir = temp_dir.path().join("Vault.sol");
        let build_info_dir = temp_dir.path().join("build-info");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::create_dir_all(&build_info_dir).unwrap();

        std::fs::write(
            dir.join("Vault.json"),
            format!(
                r#"{{
                    "abi": {},
                    "bytecode": {{"object": "0x6080", "linkReferences": {{}}}},
                    "metadata": {{
                        "compiler": {{"version": "0.8.24+commit.e11b9ed9"}},
                        "language": "Solidity",
                        "settings": {{"compilationTarget": {{"src/Vault.sol": "Vault"}}}}
                    }}
                }}"#,
                VAULT_ABI
            ),
        )
        .unwrap();
        std::fs::write(
            build_info_dir.join("other.json"),
            r#"{"id": "other", "input": {"language": "Solidity", "sources": {"src/CardToken.sol": {}}}}"#,
        )
        .unwrap();
        std::fs::write(
            build_info_dir.join("vault.json"),
            r#"{"id": "vault", "input": {"language": "Solidity", "sources": {"src/Vault.sol": {}}}}"#,
        )
        .unwrap();

        let factory = ArtifactStore::new(temp_dir.path()).load("Vault").unwrap();
        let build_info = factory.build_info().expect("build info");
        assert_eq!(build_info.source_name, "src/Vault.sol");
        assert_eq!(build_info.solc_long_version, "0.8.24+commit.e11b9ed9");
        assert!(build_info.input["sources"].get("src/Vault.sol").is_some());
    }

    #[test]
    fn test_missing_artifact() {
        let temp_dir = TempDir::new("artifacts-test").expect("Failed to create temp dir");
        assert!(ArtifactStore::new(temp_dir.path()).load("Nope").is_err());
    }
}
