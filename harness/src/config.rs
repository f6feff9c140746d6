// harness/src/config.rs

use crate::artifact::ArtifactId;
use crate::error::{HarnessError, Result};
use dotenv::dotenv;
use ethers::types::U256;
use ethers::utils::parse_ether;
use std::{env, fmt, path::PathBuf, str::FromStr, time::Duration};
use tracing::{debug, info};

// Anvil dev accounts #0 and #1
pub const DEFAULT_SIGNER_KEYS: [&str; 2] = [
    "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
    "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d",
];

pub const DEFAULT_HTTP_RPC_URL: &str = "http://127.0.0.1:8545";

/// Where compile artifacts come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactSourceKind {
    /// JSON artifacts already on disk (Foundry `out/`, Hardhat or Remix `artifacts/`).
    Artifacts,
    /// Compile the source with the local `solc`.
    Solc,
}

impl FromStr for ArtifactSourceKind {
    type Err = HarnessError;
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "artifacts" | "artifact" | "dir" => Ok(ArtifactSourceKind::Artifacts),
            "solc" | "compile" => Ok(ArtifactSourceKind::Solc),
            other => Err(HarnessError::Config(format!("unknown ARTIFACT_SOURCE '{other}'"))),
        }
    }
}

/// Private keys, kept out of `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct SignerKeys(pub Vec<String>);

impl fmt::Debug for SignerKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SignerKeys(<{} redacted>)", self.0.len())
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    // Network & Keys
    pub http_rpc_url: String,
    pub ws_rpc_url: Option<String>,
    pub signer_keys: SignerKeys,

    // Artifacts
    pub artifact_source: ArtifactSourceKind,
    pub artifacts_dir: PathBuf,
    pub sources_dir: PathBuf,
    pub token_source_path: String,
    pub token_contract_name: String,
    pub payment_source_path: String,
    pub payment_contract_name: String,
    pub token_getter: Option<String>,

    // Payment & Formatting
    pub payment_value_wei: U256,
    pub token_decimals: u32,
    pub token_symbol: String,
    pub native_symbol: String,

    // Confirmation & Delivery
    pub confirmations: usize,
    pub confirmation_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub event_channel_capacity: usize,
}

impl Config {
    /// Builds a config from an arbitrary key lookup, applying defaults for absent keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        let get_or = |name: &str, default: &str| get(name).unwrap_or_else(|| default.to_string());
        let parse_num = |name: &str, default: u64| -> Result<u64> {
            match get(name) {
                Some(raw) => raw
                    .parse::<u64>()
                    .map_err(|e| HarnessError::Config(format!("{name}='{raw}': {e}"))),
                None => Ok(default),
            }
        };

        let signer_keys = match get("SIGNER_PRIVATE_KEYS") {
            Some(raw) => raw
                .split(',')
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect::<Vec<_>>(),
            None => DEFAULT_SIGNER_KEYS.iter().map(|k| k.to_string()).collect(),
        };
        if signer_keys.is_empty() {
            return Err(HarnessError::Config("SIGNER_PRIVATE_KEYS is set but lists no keys".into()));
        }

        let artifact_source = get_or("ARTIFACT_SOURCE", "artifacts").parse::<ArtifactSourceKind>()?;

        let amount = get_or("PAYMENT_AMOUNT_ETH", "0.05");
        let payment_value_wei = parse_ether(&amount)
            .map_err(|e| HarnessError::Config(format!("PAYMENT_AMOUNT_ETH='{amount}': {e}")))?;

        let token_decimals = parse_num("TOKEN_DECIMALS", 18)?;
        if token_decimals > 38 {
            return Err(HarnessError::Config(format!("TOKEN_DECIMALS={token_decimals} exceeds 38")));
        }

        let event_channel_capacity = parse_num("EVENT_CHANNEL_CAPACITY", 64)? as usize;
        if event_channel_capacity == 0 {
            return Err(HarnessError::Config("EVENT_CHANNEL_CAPACITY must be at least 1".into()));
        }

        // An explicitly empty TOKEN_GETTER disables the read-back check.
        let token_getter = match lookup("TOKEN_GETTER") {
            Some(raw) if raw.trim().is_empty() => None,
            Some(raw) => Some(raw.trim().to_string()),
            None => Some("usdcToken".to_string()),
        };

        Ok(Config {
            http_rpc_url: get_or("HTTP_RPC_URL", DEFAULT_HTTP_RPC_URL),
            ws_rpc_url: get("WS_RPC_URL"),
            signer_keys: SignerKeys(signer_keys),
            artifact_source,
            artifacts_dir: PathBuf::from(get_or("ARTIFACTS_DIR", "out")),
            sources_dir: PathBuf::from(get_or("SOURCES_DIR", "contracts")),
            token_source_path: get_or("TOKEN_SOURCE_PATH", "contracts/mocks/MockUSDC.sol"),
            token_contract_name: get_or("TOKEN_CONTRACT_NAME", "MockUSDC"),
            payment_source_path: get_or("PAYMENT_SOURCE_PATH", "contracts/PaymentContract.sol"),
            payment_contract_name: get_or("PAYMENT_CONTRACT_NAME", "PaymentContract"),
            token_getter,
            payment_value_wei,
            token_decimals: token_decimals as u32,
            token_symbol: get_or("TOKEN_SYMBOL", "USDC"),
            native_symbol: get_or("NATIVE_SYMBOL", "ETH"),
            confirmations: parse_num("CONFIRMATIONS", 1)?.max(1) as usize,
            confirmation_timeout_secs: parse_num("CONFIRMATION_TIMEOUT_SECS", 120)?,
            poll_interval_ms: parse_num("POLL_INTERVAL_MS", 500)?,
            event_channel_capacity,
        })
    }

    pub fn token_artifact(&self) -> ArtifactId {
        ArtifactId::new(&self.token_source_path, &self.token_contract_name)
    }

    pub fn payment_artifact(&self) -> ArtifactId {
        ArtifactId::new(&self.payment_source_path, &self.payment_contract_name)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

pub fn load_config() -> Result<Config> {
    info!("Loading configuration from environment...");
    if let Ok(path) = dotenv() {
        debug!(path = %path.display(), "Loaded .env file");
    }
    let config = Config::from_lookup(|name| env::var(name).ok())?;
    info!(
        rpc = %config.http_rpc_url,
        ws = config.ws_rpc_url.as_deref().unwrap_or("-"),
        signers = config.signer_keys.0.len(),
        source = ?config.artifact_source,
        "✅ Configuration loaded."
    );
    Ok(config)
}
