// harness/src/ledger.rs
//! The chain as seen by the harness: ordered signers, confirmed deployments,
//! value transfers into contracts and a log feed.

use crate::artifact::Artifact;
use crate::error::{HarnessError, Result};
use async_trait::async_trait;
use ethers::{
    abi::{Abi, Token},
    types::{Address, Filter, Log, TransactionReceipt, TxHash, U256, U64},
};
use tokio::{sync::mpsc, task::JoinHandle};

/// A contract whose deployment transaction has been confirmed.
#[derive(Debug, Clone)]
pub struct DeployedContract {
    pub name: String,
    pub address: Address,
    pub deployer: Address,
    pub abi: Abi,
    pub tx_hash: Option<TxHash>,
    pub block_number: Option<U64>,
}

/// Logs matching a filter, delivered through a bounded channel by a background task.
#[derive(Debug)]
pub struct LogSubscription {
    pub logs: mpsc::Receiver<Log>,
    pub feed: JoinHandle<()>,
}

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Signer accounts in a stable order; index 0 is the deployer.
    async fn signers(&self) -> Result<Vec<Address>>;

    /// Deploys `artifact` from `signer` with ABI-encoded constructor `args` and waits for confirmation.
    async fn deploy(
        &self,
        signer: Address,
        name: &str,
        artifact: &Artifact,
        args: Vec<Token>,
    ) -> Result<DeployedContract>;

    /// Calls a zero-argument view function that returns an address.
    async fn call_address(&self, contract: &DeployedContract, function: &str) -> Result<Address>;

    /// Calls a zero-argument payable function with `value` attached and waits for confirmation.
    async fn send_value(
        &self,
        signer: Address,
        contract: &DeployedContract,
        function: &str,
        value: U256,
    ) -> Result<TransactionReceipt>;

    /// Starts delivering logs matching `filter` into a channel of `capacity`.
    async fn subscribe_logs(&self, filter: Filter, capacity: usize) -> Result<LogSubscription>;
}

/// Returns the signer at `index` or a `MissingSigner` error.
pub fn signer_at(signers: &[Address], index: usize) -> Result<Address> {
    signers
        .get(index)
        .copied()
        .ok_or(HarnessError::MissingSigner { index, available: signers.len() })
}
