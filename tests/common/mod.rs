// tests/common/mod.rs
#![allow(dead_code)]

use async_trait::async_trait;
use ethers::{
    abi::{encode, Abi, AbiParser, Token},
    types::{Address, Bytes, Filter, Log, TransactionReceipt, ValueOrArray, H256, U256, U64},
    utils::get_contract_address,
};
use payment_harness::{
    event_handler::payment_event, Artifact, ArtifactId, ArtifactSource, Config, DeployedContract, HarnessError,
    Ledger, LogSubscription,
};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};
use tokio::sync::mpsc;

pub const TOKEN_PATH: &str = "contracts/mocks/MockUSDC.sol";
pub const PAYMENT_PATH: &str = "contracts/PaymentContract.sol";
pub const BLOCK_TIMESTAMP: u64 = 1_700_000_000;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn token_abi() -> Abi {
    AbiParser::default()
        .parse(&[
            "constructor()",
            "function balanceOf(address account) view returns (uint256)",
            "function decimals() view returns (uint8)",
        ])
        .unwrap()
}

pub fn payment_abi() -> Abi {
    AbiParser::default()
        .parse(&[
            "constructor(address _usdcToken)",
            "function usdcToken() view returns (address)",
            "function payWithNative() payable",
            "event PaymentReceived(address indexed user, uint256 amount, uint256 timestamp, bool isUSDC)",
        ])
        .unwrap()
}

pub fn test_config(overrides: &[(&str, &str)]) -> Config {
    let map: HashMap<String, String> = overrides.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    Config::from_lookup(|name| map.get(name).cloned()).unwrap()
}

/// Builds the log a `PaymentReceived` emission would produce, honouring the ABI's indexed flags.
pub fn payment_log(abi: &Abi, contract: Address, user: Address, amount: U256, is_token: bool, block: u64) -> Log {
    let event = payment_event(abi).unwrap();
    let fields = [
        Token::Address(user),
        Token::Uint(amount),
        Token::Uint(BLOCK_TIMESTAMP.into()),
        Token::Bool(is_token),
    ];
    let mut topics = vec![event.signature()];
    let mut data = Vec::new();
    for (param, token) in event.inputs.iter().zip(fields) {
        if param.indexed {
            topics.push(H256::from_slice(&encode(&[token])));
        } else {
            data.push(token);
        }
    }
    Log {
        address: contract,
        topics,
        data: Bytes::from(encode(&data)),
        block_number: Some(U64::from(block)),
        transaction_hash: Some(H256::from_low_u64_be(block)),
        ..Default::default()
    }
}

// --- Artifact source double ---

#[derive(Default)]
pub struct MemoryArtifacts {
    artifacts: HashMap<(String, String), Artifact>,
    lookups: AtomicUsize,
}

impl MemoryArtifacts {
    pub fn standard() -> Self {
        let mut source = Self::default();
        source.insert(TOKEN_PATH, "MockUSDC", token_abi());
        source.insert(PAYMENT_PATH, "PaymentContract", payment_abi());
        source
    }

    pub fn insert(&mut self, path: &str, name: &str, abi: Abi) {
        let artifact = Artifact { abi, bytecode: Bytes::from(vec![0x60, 0x80, 0x60, 0x40, 0x52]) };
        self.artifacts.insert((path.to_string(), name.to_string()), artifact);
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl ArtifactSource for MemoryArtifacts {
    fn artifact(&self, id: &ArtifactId) -> Result<Artifact, HarnessError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.artifacts
            .get(&(id.path.clone(), id.name.clone()))
            .cloned()
            .ok_or_else(|| HarnessError::lookup(&id.path, &id.name, "not compiled"))
    }
}

// --- Ledger double ---

#[derive(Default)]
struct FakeState {
    nonces: HashMap<Address, u64>,
    block: u64,
    broadcasts: usize,
    deployments: Vec<DeployedContract>,
    constructor_args: HashMap<Address, Vec<Token>>,
    subscribers: Vec<(Option<Address>, mpsc::Sender<Log>)>,
}

/// In-memory chain: CREATE-style addresses, instant confirmation, and
/// `PaymentReceived` emitted on every successful `payWithNative`.
pub struct FakeLedger {
    signers: Vec<Address>,
    state: Mutex<FakeState>,
    pub fail_deploy_of: Option<String>,
    pub revert_payments: bool,
    pub misreport_token: bool,
}

impl FakeLedger {
    pub fn with_signers(count: u8) -> Self {
        Self {
            signers: (1..=count).map(Address::repeat_byte).collect(),
            state: Mutex::new(FakeState::default()),
            fail_deploy_of: None,
            revert_payments: false,
            misreport_token: false,
        }
    }

    pub fn broadcasts(&self) -> usize {
        self.state.lock().unwrap().broadcasts
    }

    pub fn deployments(&self) -> Vec<DeployedContract> {
        self.state.lock().unwrap().deployments.clone()
    }

    pub fn constructor_args(&self, contract: Address) -> Option<Vec<Token>> {
        self.state.lock().unwrap().constructor_args.get(&contract).cloned()
    }

    /// Delivers `log` to every subscriber whose filter matches its address.
    pub fn inject(&self, log: Log) {
        let state = self.state.lock().unwrap();
        for (address, sender) in &state.subscribers {
            if address.map_or(true, |a| a == log.address) {
                let _ = sender.try_send(log.clone());
            }
        }
    }

    /// Ends every log feed, letting listeners drain and stop.
    pub fn close_feeds(&self) {
        self.state.lock().unwrap().subscribers.clear();
    }

    fn next_block(state: &mut FakeState) -> u64 {
        state.block += 1;
        state.block
    }
}

#[async_trait]
impl Ledger for FakeLedger {
    async fn signers(&self) -> Result<Vec<Address>, HarnessError> {
        Ok(self.signers.clone())
    }

    async fn deploy(
        &self,
        signer: Address,
        name: &str,
        artifact: &Artifact,
        args: Vec<Token>,
    ) -> Result<DeployedContract, HarnessError> {
        if !self.signers.contains(&signer) {
            return Err(HarnessError::UnknownSigner(signer));
        }
        let mut state = self.state.lock().unwrap();
        state.broadcasts += 1;
        let nonce = state.nonces.entry(signer).or_insert(0);
        let address = get_contract_address(signer, *nonce);
        *nonce += 1;

        if self.fail_deploy_of.as_deref() == Some(name) {
            return Err(HarnessError::deployment(name, "execution reverted"));
        }
        let expected_args = artifact.abi.constructor.as_ref().map_or(0, |c| c.inputs.len());
        if expected_args != args.len() {
            return Err(HarnessError::deployment(name, "constructor argument count mismatch"));
        }

        let block = Self::next_block(&mut state);
        let contract = DeployedContract {
            name: name.to_string(),
            address,
            deployer: signer,
            abi: artifact.abi.clone(),
            tx_hash: Some(H256::from_low_u64_be(block)),
            block_number: Some(U64::from(block)),
        };
        state.constructor_args.insert(address, args);
        state.deployments.push(contract.clone());
        Ok(contract)
    }

    async fn call_address(&self, contract: &DeployedContract, function: &str) -> Result<Address, HarnessError> {
        if self.misreport_token {
            return Ok(Address::repeat_byte(0xee));
        }
        let state = self.state.lock().unwrap();
        match state.constructor_args.get(&contract.address).and_then(|args| args.first()) {
            Some(Token::Address(stored)) => Ok(*stored),
            _ => Err(HarnessError::Provider(format!("{function}() reverted"))),
        }
    }

    async fn send_value(
        &self,
        signer: Address,
        contract: &DeployedContract,
        function: &str,
        value: U256,
    ) -> Result<TransactionReceipt, HarnessError> {
        let block = {
            let mut state = self.state.lock().unwrap();
            state.broadcasts += 1;
            if self.revert_payments {
                return Err(HarnessError::Transaction(format!("{function}() reverted")));
            }
            Self::next_block(&mut state)
        };
        self.inject(payment_log(&contract.abi, contract.address, signer, value, false, block));
        Ok(TransactionReceipt {
            transaction_hash: H256::from_low_u64_be(block),
            block_number: Some(U64::from(block)),
            status: Some(U64::from(1)),
            from: signer,
            to: Some(contract.address),
            ..Default::default()
        })
    }

    async fn subscribe_logs(&self, filter: Filter, capacity: usize) -> Result<LogSubscription, HarnessError> {
        let address = match filter.address {
            Some(ValueOrArray::Value(address)) => Some(address),
            _ => None,
        };
        let (sender, logs) = mpsc::channel(capacity);
        self.state.lock().unwrap().subscribers.push((address, sender));
        let feed = tokio::spawn(async {});
        Ok(LogSubscription { logs, feed })
    }
}
