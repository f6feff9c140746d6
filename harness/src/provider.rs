// harness/src/provider.rs

use crate::artifact::Artifact;
use crate::config::Config;
use crate::error::{HarnessError, Result};
use crate::ledger::{DeployedContract, Ledger, LogSubscription};
use async_trait::async_trait;
use ethers::{
    abi::Token,
    prelude::{Contract, ContractFactory, Http, LocalWallet, Middleware, Provider, SignerMiddleware, Ws},
    signers::Signer,
    types::{Address, Filter, Log, TransactionReceipt, U256, U64},
};
use futures_util::{pin_mut, Stream, StreamExt};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, oneshot},
    time::timeout,
};
use tracing::{debug, info, instrument, warn};

pub type HarnessClient = SignerMiddleware<Provider<Http>, LocalWallet>;

const WS_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const TX_SUCCESS_STATUS: U64 = U64([1]);

/// `Ledger` backed by a JSON-RPC node: HTTP for calls and transactions, optional WS for log delivery.
pub struct EthersLedger {
    provider: Provider<Http>,
    ws_provider: Option<Arc<Provider<Ws>>>,
    clients: Vec<Arc<HarnessClient>>,
    confirmations: usize,
    confirmation_timeout: Duration,
}

impl EthersLedger {
    #[instrument(skip_all, name = "connect")]
    pub async fn connect(config: &Config) -> Result<Self> {
        let provider = Provider::<Http>::try_from(config.http_rpc_url.as_str())
            .map_err(|e| HarnessError::Config(format!("HTTP_RPC_URL '{}': {e}", config.http_rpc_url)))?
            .interval(config.poll_interval());

        let chain_id = timeout(config.confirmation_timeout(), provider.get_chainid())
            .await
            .map_err(|_| HarnessError::Timeout {
                what: format!("eth_chainId from {}", config.http_rpc_url),
                secs: config.confirmation_timeout_secs,
            })?
            .map_err(|e| HarnessError::Provider(format!("eth_chainId: {e}")))?
            .as_u64();

        let clients = config
            .signer_keys
            .0
            .iter()
            .enumerate()
            .map(|(i, key)| {
                let wallet = key
                    .parse::<LocalWallet>()
                    .map_err(|e| HarnessError::Config(format!("signer #{i}: {e}")))?
                    .with_chain_id(chain_id);
                Ok(Arc::new(SignerMiddleware::new(provider.clone(), wallet)))
            })
            .collect::<Result<Vec<_>>>()?;

        let ws_provider = match &config.ws_rpc_url {
            Some(url) => {
                let ws = timeout(WS_CONNECT_TIMEOUT, Provider::<Ws>::connect(url.as_str()))
                    .await
                    .map_err(|_| HarnessError::Timeout {
                        what: format!("WS connection to {url}"),
                        secs: WS_CONNECT_TIMEOUT.as_secs(),
                    })?
                    .map_err(|e| HarnessError::Provider(format!("WS connection failed: {e}")))?;
                Some(Arc::new(ws.interval(config.poll_interval())))
            }
            None => None,
        };

        info!(
            chain_id,
            signers = clients.len(),
            events = if ws_provider.is_some() { "ws" } else { "http-poll" },
            "Connected to RPC"
        );

        Ok(Self {
            provider,
            ws_provider,
            clients,
            confirmations: config.confirmations,
            confirmation_timeout: config.confirmation_timeout(),
        })
    }

    fn client(&self, signer: Address) -> Result<Arc<HarnessClient>> {
        self.clients
            .iter()
            .find(|c| c.address() == signer)
            .cloned()
            .ok_or(HarnessError::UnknownSigner(signer))
    }

    fn timed_out(&self, what: impl Into<String>) -> HarnessError {
        HarnessError::Timeout { what: what.into(), secs: self.confirmation_timeout.as_secs() }
    }
}

#[async_trait]
impl Ledger for EthersLedger {
    async fn signers(&self) -> Result<Vec<Address>> {
        Ok(self.clients.iter().map(|c| c.address()).collect())
    }

    #[instrument(skip(self, artifact, args), level = "debug")]
    async fn deploy(
        &self,
        signer: Address,
        name: &str,
        artifact: &Artifact,
        args: Vec<Token>,
    ) -> Result<DeployedContract> {
        let client = self.client(signer)?;
        let factory = ContractFactory::new(artifact.abi.clone(), artifact.bytecode.clone(), client);
        let deployer = factory
            .deploy_tokens(args)
            .map_err(|e| HarnessError::deployment(name, format!("failed to construct deployment call: {e}")))?
            .confirmations(self.confirmations);

        debug!("Sending deployment transaction...");
        let (contract, receipt) = timeout(self.confirmation_timeout, deployer.send_with_receipt())
            .await
            .map_err(|_| self.timed_out(format!("{name} deployment")))?
            .map_err(|e| HarnessError::deployment(name, e))?;

        if receipt.status != Some(TX_SUCCESS_STATUS) {
            return Err(HarnessError::deployment(
                name,
                format!("transaction {:?} reverted (status {:?})", receipt.transaction_hash, receipt.status),
            ));
        }

        Ok(DeployedContract {
            name: name.to_string(),
            address: contract.address(),
            deployer: signer,
            abi: artifact.abi.clone(),
            tx_hash: Some(receipt.transaction_hash),
            block_number: receipt.block_number,
        })
    }

    async fn call_address(&self, contract: &DeployedContract, function: &str) -> Result<Address> {
        let instance = Contract::new(contract.address, contract.abi.clone(), Arc::new(self.provider.clone()));
        let call = instance
            .method::<_, Address>(function, ())
            .map_err(|e| HarnessError::Provider(format!("{}.{function}: {e}", contract.name)))?;
        timeout(self.confirmation_timeout, call.call())
            .await
            .map_err(|_| self.timed_out(format!("{}.{function}() call", contract.name)))?
            .map_err(|e| HarnessError::Provider(format!("{}.{function}() call failed: {e}", contract.name)))
    }

    #[instrument(skip(self, contract), fields(contract = %contract.name), level = "debug")]
    async fn send_value(
        &self,
        signer: Address,
        contract: &DeployedContract,
        function: &str,
        value: U256,
    ) -> Result<TransactionReceipt> {
        let client = self.client(signer)?;
        let instance = Contract::new(contract.address, contract.abi.clone(), client);
        let call = instance
            .method::<_, ()>(function, ())
            .map_err(|e| HarnessError::Transaction(format!("{}.{function}: {e}", contract.name)))?
            .value(value);

        let pending = timeout(self.confirmation_timeout, call.send())
            .await
            .map_err(|_| self.timed_out(format!("{}.{function}() submission", contract.name)))?
            .map_err(|e| HarnessError::Transaction(format!("{}.{function}() rejected: {e}", contract.name)))?;
        let tx_hash = pending.tx_hash();
        debug!(?tx_hash, "Transaction sent, waiting for receipt...");

        let receipt = timeout(self.confirmation_timeout, pending.confirmations(self.confirmations))
            .await
            .map_err(|_| self.timed_out(format!("receipt of {tx_hash:?}")))?
            .map_err(|e| HarnessError::Transaction(format!("waiting for {tx_hash:?}: {e}")))?
            .ok_or_else(|| HarnessError::Transaction(format!("transaction {tx_hash:?} was dropped")))?;

        if receipt.status != Some(TX_SUCCESS_STATUS) {
            return Err(HarnessError::reverted(tx_hash));
        }
        Ok(receipt)
    }

    async fn subscribe_logs(&self, filter: Filter, capacity: usize) -> Result<LogSubscription> {
        let (log_tx, logs) = mpsc::channel(capacity);
        let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();

        // Each feed task owns its provider so the stream can outlive this call.
        let feed = match &self.ws_provider {
            Some(ws) => {
                let ws = ws.clone();
                tokio::spawn(async move {
                    match ws.subscribe_logs(&filter).await {
                        Ok(stream) => {
                            let _ = ready_tx.send(Ok(()));
                            forward_logs(stream, log_tx).await;
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(HarnessError::Subscription(format!("eth_subscribe: {e}"))));
                        }
                    }
                })
            }
            None => {
                let provider = self.provider.clone();
                tokio::spawn(async move {
                    match provider.watch(&filter).await {
                        Ok(stream) => {
                            let _ = ready_tx.send(Ok(()));
                            forward_logs(stream, log_tx).await;
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(HarnessError::Subscription(format!("eth_newFilter: {e}"))));
                        }
                    }
                })
            }
        };

        ready_rx
            .await
            .map_err(|_| HarnessError::Subscription("log feed ended before it was ready".into()))??;
        Ok(LogSubscription { logs, feed })
    }
}

async fn forward_logs<S>(stream: S, log_tx: mpsc::Sender<Log>)
where
    S: Stream<Item = Log>,
{
    pin_mut!(stream);
    while let Some(log) = stream.next().await {
        if log_tx.send(log).await.is_err() {
            debug!("Listener gone, stopping log feed.");
            return;
        }
    }
    warn!("Log stream ended; no further events will be delivered.");
}
