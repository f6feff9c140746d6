// harness/src/event_handler.rs

use crate::error::{HarnessError, Result};
use crate::ledger::{DeployedContract, Ledger, LogSubscription};
use crate::utils::{AmountFormat, BlockTime, Currency};
use ethers::{
    abi::{Abi, Event, RawLog, Token},
    types::{Address, Filter, Log, TxHash, U256, U64},
};
use std::fmt;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, instrument, trace, warn};

pub const PAYMENT_EVENT: &str = "PaymentReceived";

/// One decoded `PaymentReceived(user, amount, timestamp, isUSDC)` occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentReceived {
    pub user: Address,
    pub amount: U256,
    pub timestamp: U256,
    pub currency: Currency,
    pub tx_hash: Option<TxHash>,
    pub block_number: Option<U64>,
}

impl PaymentReceived {
    /// Decodes the four positional fields using the event description from the contract's own ABI.
    pub fn from_log(event: &Event, log: &Log) -> Result<Self> {
        let raw = RawLog { topics: log.topics.clone(), data: log.data.to_vec() };
        let parsed = event.parse_log(raw).map_err(|e| HarnessError::Decode(e.to_string()))?;
        let fields: Vec<Token> = parsed.params.into_iter().map(|p| p.value).collect();

        match fields.as_slice() {
            [Token::Address(user), Token::Uint(amount), Token::Uint(timestamp), Token::Bool(is_token)] => Ok(Self {
                user: *user,
                amount: *amount,
                timestamp: *timestamp,
                currency: Currency::from_is_token(*is_token),
                tx_hash: log.transaction_hash,
                block_number: log.block_number,
            }),
            other => Err(HarnessError::Decode(format!("unexpected {PAYMENT_EVENT} fields: {other:?}"))),
        }
    }
}

/// A decoded payment with its amount already rendered for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentNotice {
    pub payment: PaymentReceived,
    pub amount: String,
}

impl PaymentNotice {
    pub fn new(payment: PaymentReceived, format: &AmountFormat) -> Result<Self> {
        let amount = format.format(payment.amount, payment.currency)?;
        Ok(Self { payment, amount })
    }
}

impl fmt::Display for PaymentNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "✅✅✅ Event Detected! ✅✅✅")?;
        writeln!(f, "   -> User: {:?}", self.payment.user)?;
        writeln!(f, "   -> Amount: {}", self.amount)?;
        writeln!(f, "   -> Timestamp: {}", BlockTime(self.payment.timestamp))?;
        writeln!(f, "   -> Backend: Triggering user activation logic...")?;
        write!(f, "------------------------------------")
    }
}

/// Default listener callback: prints the notice to the console.
pub fn print_notice(notice: PaymentNotice) {
    println!("\n{notice}");
}

pub fn payment_event(abi: &Abi) -> Result<&Event> {
    abi.event(PAYMENT_EVENT)
        .map_err(|e| HarnessError::Subscription(format!("contract ABI has no {PAYMENT_EVENT} event: {e}")))
}

/// A live listener. Dropping the handle leaves the listener running; `cancel` stops it.
#[derive(Debug)]
pub struct Subscription {
    pub contract: Address,
    // Cleared once joined; a finished JoinHandle must not be polled again.
    feed: Option<JoinHandle<()>>,
    listener: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn cancel(&self) {
        for task in [&self.feed, &self.listener].into_iter().flatten() {
            task.abort();
        }
        info!(contract = ?self.contract, "Payment listener cancelled.");
    }

    pub fn is_active(&self) -> bool {
        self.listener.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Waits until the log feed ends and every delivered log has been handled.
    ///
    /// Safe to call again, or to drop mid-wait inside `select!`: a handle is
    /// only released after it has completed.
    pub async fn join(&mut self) {
        if let Some(feed) = self.feed.as_mut() {
            report_exit("log feed", feed.await);
            self.feed = None;
        }
        if let Some(listener) = self.listener.as_mut() {
            report_exit("payment listener", listener.await);
            self.listener = None;
        }
    }
}

fn report_exit(task: &str, result: std::result::Result<(), JoinError>) {
    match result {
        Err(e) if e.is_cancelled() => debug!(task, "Task cancelled."),
        Err(e) => error!(task, error = %e, "Task failed"),
        Ok(()) => trace!(task, "Task finished."),
    }
}

/// Registers `handler` for every `PaymentReceived` emitted by `contract`.
///
/// Returns as soon as the log feed is registered; the handler then runs on a
/// separate task, fed through a bounded channel of `capacity` logs, until the
/// subscription is cancelled or the process exits.
#[instrument(skip_all, fields(contract = ?contract.address))]
pub async fn subscribe_payments<L, F>(
    ledger: &L,
    contract: &DeployedContract,
    format: AmountFormat,
    capacity: usize,
    mut handler: F,
) -> Result<Subscription>
where
    L: Ledger + ?Sized,
    F: FnMut(PaymentNotice) + Send + 'static,
{
    let event = payment_event(&contract.abi)?.clone();
    let filter = Filter::new().address(contract.address).topic0(event.signature());
    let LogSubscription { mut logs, feed } = ledger.subscribe_logs(filter, capacity).await?;

    let listener = tokio::spawn(async move {
        while let Some(log) = logs.recv().await {
            if log.removed == Some(true) {
                debug!(tx_hash = ?log.transaction_hash, "Ignoring log removed by reorg");
                continue;
            }
            match PaymentReceived::from_log(&event, &log).and_then(|p| PaymentNotice::new(p, &format)) {
                Ok(notice) => {
                    info!(
                        user = ?notice.payment.user,
                        amount = %notice.amount,
                        tx_hash = ?notice.payment.tx_hash,
                        block = ?notice.payment.block_number,
                        "{PAYMENT_EVENT} received"
                    );
                    handler(notice);
                }
                Err(e) => warn!(error = %e, tx_hash = ?log.transaction_hash, "Skipping undecodable {PAYMENT_EVENT} log"),
            }
        }
        debug!("Payment listener stopped.");
    });

    info!("Listening for {PAYMENT_EVENT}...");
    Ok(Subscription { contract: contract.address, feed: Some(feed), listener: Some(listener) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::{encode, AbiParser};
    use ethers::types::{Bytes, H256};

    fn payment_abi(user_indexed: bool) -> Abi {
        let event = if user_indexed {
            "event PaymentReceived(address indexed user, uint256 amount, uint256 timestamp, bool isUSDC)"
        } else {
            "event PaymentReceived(address user, uint256 amount, uint256 timestamp, bool isUSDC)"
        };
        AbiParser::default().parse(&[event, "function payWithNative() payable"]).unwrap()
    }

    fn log_for(abi: &Abi, user: Address, amount: u64, is_token: bool) -> Log {
        let event = payment_event(abi).unwrap();
        let indexed = event.inputs[0].indexed;
        let mut data_tokens = vec![Token::Uint(amount.into()), Token::Uint(1_700_000_000u64.into()), Token::Bool(is_token)];
        let mut topics = vec![event.signature()];
        if indexed {
            topics.push(H256::from(user));
        } else {
            data_tokens.insert(0, Token::Address(user));
        }
        Log {
            topics,
            data: Bytes::from(encode(&data_tokens)),
            transaction_hash: Some(H256::repeat_byte(7)),
            block_number: Some(U64::from(3)),
            ..Default::default()
        }
    }

    #[test]
    fn decodes_indexed_and_plain_layouts() {
        let user = Address::repeat_byte(0xab);
        for indexed in [true, false] {
            let abi = payment_abi(indexed);
            let log = log_for(&abi, user, 50_000_000_000_000_000, false);
            let payment = PaymentReceived::from_log(payment_event(&abi).unwrap(), &log).unwrap();
            assert_eq!(payment.user, user);
            assert_eq!(payment.amount, U256::from(50_000_000_000_000_000u64));
            assert_eq!(payment.timestamp, U256::from(1_700_000_000u64));
            assert_eq!(payment.currency, Currency::Native);
            assert_eq!(payment.block_number, Some(U64::from(3)));
        }
    }

    #[test]
    fn notice_matches_console_layout() {
        let abi = payment_abi(true);
        let log = log_for(&abi, Address::repeat_byte(1), 50_000_000_000_000_000, true);
        let payment = PaymentReceived::from_log(payment_event(&abi).unwrap(), &log).unwrap();
        let notice = PaymentNotice::new(payment, &AmountFormat::default()).unwrap();

        assert_eq!(notice.amount, "0.05 USDC");
        let rendered = notice.to_string();
        assert!(rendered.starts_with("✅✅✅ Event Detected! ✅✅✅\n"));
        assert!(rendered.contains("   -> Amount: 0.05 USDC\n"));
        assert!(rendered.contains("2023-11-14 22:13:20 UTC"));
        assert!(rendered.ends_with("------------------------------------"));
    }

    #[test]
    fn truncated_log_is_a_decode_error() {
        let abi = payment_abi(false);
        let mut log = log_for(&abi, Address::zero(), 1, false);
        log.data = Bytes::from(vec![0u8; 10]);
        let err = PaymentReceived::from_log(payment_event(&abi).unwrap(), &log).unwrap_err();
        assert!(matches!(err, HarnessError::Decode(_)));
    }

    #[test]
    fn abi_without_event_is_rejected() {
        let abi = AbiParser::default().parse(&["function payWithNative() payable"]).unwrap();
        assert!(matches!(payment_event(&abi), Err(HarnessError::Subscription(_))));
    }
}
