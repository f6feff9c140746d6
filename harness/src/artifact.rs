// harness/src/artifact.rs
//! Compile artifact retrieval: ABI + creation bytecode per `(source path, contract name)`.

use crate::error::{HarnessError, Result};
use ethers::{
    abi::Abi,
    solc::{artifacts::CompactContractRef, CompilerOutput, Solc},
    types::Bytes,
    utils::hex,
};
use serde_json::Value;
use std::{
    fmt, fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use tracing::{debug, info, instrument};

/// Identifies a contract by the source file it lives in and its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactId {
    pub path: String,
    pub name: String,
}

impl ArtifactId {
    pub fn new(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self { path: path.into(), name: name.into() }
    }

    fn file_name(&self) -> &str {
        Path::new(&self.path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or(&self.path)
    }

    fn missing(&self, reason: impl ToString) -> HarnessError {
        HarnessError::lookup(&self.path, &self.name, reason)
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.path, self.name)
    }
}

#[derive(Debug, Clone)]
pub struct Artifact {
    pub abi: Abi,
    pub bytecode: Bytes,
}

/// The compiler service: resolves an artifact id to its compiled output.
pub trait ArtifactSource: Send + Sync {
    fn artifact(&self, id: &ArtifactId) -> Result<Artifact>;
}

// --- On-disk JSON artifacts ---

/// Reads JSON artifacts produced by Foundry, Hardhat or Remix.
#[derive(Debug, Clone)]
pub struct ArtifactDir {
    root: PathBuf,
}

impl ArtifactDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn candidates(&self, id: &ArtifactId) -> [PathBuf; 3] {
        let json = format!("{}.json", id.name);
        [
            self.root.join(id.file_name()).join(&json), // forge: out/Foo.sol/Foo.json
            self.root.join(&id.path).join(&json),       // hardhat: artifacts/contracts/Foo.sol/Foo.json
            self.root.join(&json),                      // remix: artifacts/Foo.json
        ]
    }
}

impl ArtifactSource for ArtifactDir {
    #[instrument(skip(self), fields(root = %self.root.display()), level = "debug")]
    fn artifact(&self, id: &ArtifactId) -> Result<Artifact> {
        let path = self
            .candidates(id)
            .into_iter()
            .find(|p| p.is_file())
            .ok_or_else(|| id.missing(format!("no artifact JSON under {}", self.root.display())))?;
        debug!(file = %path.display(), "Reading artifact");

        let raw = fs::read_to_string(&path).map_err(|e| id.missing(format!("{}: {e}", path.display())))?;
        let json: Value = serde_json::from_str(&raw).map_err(|e| id.missing(format!("{}: {e}", path.display())))?;
        parse_artifact_json(id, &json)
    }
}

/// Extracts ABI and creation bytecode from any of the common artifact layouts.
pub fn parse_artifact_json(id: &ArtifactId, json: &Value) -> Result<Artifact> {
    let abi_value = json.get("abi").ok_or_else(|| id.missing("artifact has no ABI"))?;
    let abi: Abi = serde_json::from_value(abi_value.clone()).map_err(|e| id.missing(format!("invalid ABI: {e}")))?;

    let object = [
        json.get("bytecode"),
        json.pointer("/bytecode/object"),
        json.pointer("/evm/bytecode/object"),
        json.pointer("/data/bytecode/object"),
    ]
    .into_iter()
    .flatten()
    .find_map(Value::as_str)
    .ok_or_else(|| id.missing("artifact has no bytecode"))?;

    let bytecode = decode_bytecode(object).map_err(|reason| id.missing(reason))?;
    Ok(Artifact { abi, bytecode })
}

fn decode_bytecode(object: &str) -> std::result::Result<Bytes, String> {
    let cleaned = object.trim().trim_start_matches("0x");
    if cleaned.is_empty() {
        return Err("bytecode is empty (abstract contract or interface?)".into());
    }
    if cleaned.contains("__") {
        return Err("bytecode has unlinked library placeholders".into());
    }
    hex::decode(cleaned)
        .map(Bytes::from)
        .map_err(|e| format!("bytecode is not valid hex: {e}"))
}

// --- In-process compilation ---

/// Compiles every source under `sources` with the local `solc`, once, and serves artifacts from the output.
pub struct SolcCompiler {
    solc: Solc,
    sources: PathBuf,
    output: Mutex<Option<Arc<CompilerOutput>>>,
}

impl SolcCompiler {
    pub fn new(sources: impl Into<PathBuf>) -> Self {
        Self::with_solc(Solc::default(), sources)
    }

    pub fn with_solc(solc: Solc, sources: impl Into<PathBuf>) -> Self {
        Self { solc, sources: sources.into(), output: Mutex::new(None) }
    }

    fn compile(&self, id: &ArtifactId) -> Result<Arc<CompilerOutput>> {
        let mut cached = self.output.lock().map_err(|_| id.missing("compiler cache poisoned"))?;
        if let Some(output) = cached.as_ref() {
            return Ok(output.clone());
        }

        info!(sources = %self.sources.display(), "Compiling contracts with solc...");
        let output = self
            .solc
            .compile_source(&self.sources)
            .map_err(|e| id.missing(format!("solc: {e}")))?;
        if output.has_error() {
            let messages = output
                .errors
                .iter()
                .filter(|e| e.severity.is_error())
                .map(|e| e.message.clone())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(id.missing(format!("compilation failed: {messages}")));
        }

        let output = Arc::new(output);
        *cached = Some(output.clone());
        Ok(output)
    }
}

impl ArtifactSource for SolcCompiler {
    fn artifact(&self, id: &ArtifactId) -> Result<Artifact> {
        let output = self.compile(id)?;

        // solc keys sources by the path it was handed; match on suffix as well.
        let contract = output.get(&id.path, &id.name).or_else(|| {
            output
                .contracts
                .iter()
                .filter(|(file, _)| Path::new(file.as_str()).ends_with(&id.path))
                .find_map(|(_, contracts)| contracts.get(&id.name))
                .map(CompactContractRef::from)
        });
        let contract = contract.ok_or_else(|| id.missing("contract not found in compiler output"))?;

        let abi = contract.abi.cloned().ok_or_else(|| id.missing("compiler output has no ABI"))?;
        let bytecode = contract
            .bin
            .and_then(|bin| bin.as_bytes())
            .cloned()
            .ok_or_else(|| id.missing("compiler output has no (linked) bytecode"))?;
        if bytecode.is_empty() {
            return Err(id.missing("bytecode is empty (abstract contract or interface?)"));
        }
        Ok(Artifact { abi, bytecode })
    }
}
