// harness/src/transaction.rs

use crate::config::Config;
use crate::error::{HarnessError, Result};
use crate::ledger::{signer_at, DeployedContract, Ledger};
use crate::utils::{format_units, NATIVE_DECIMALS};
use ethers::types::TransactionReceipt;
use tracing::{info, instrument};

pub const PAYER_INDEX: usize = 1;
pub const PAY_NATIVE_FUNCTION: &str = "payWithNative";

/// Pays the configured native amount into `payment` from the second signer and waits for the receipt.
#[instrument(skip_all, name = "simulate_payment", fields(contract = ?payment.address))]
pub async fn simulate_payment<L>(ledger: &L, payment: &DeployedContract, config: &Config) -> Result<TransactionReceipt>
where
    L: Ledger + ?Sized,
{
    let signers = ledger.signers().await?;
    let payer = signer_at(&signers, PAYER_INDEX)?;
    if payer == payment.deployer {
        return Err(HarnessError::Config(format!(
            "signer #{PAYER_INDEX} is the deployer {payer:?}; the payment must come from a distinct account"
        )));
    }

    let amount = format_units(config.payment_value_wei, NATIVE_DECIMALS)?;
    info!(payer = ?payer, "Simulating a user paying {amount} {}...", config.native_symbol);
    let receipt = ledger
        .send_value(payer, payment, PAY_NATIVE_FUNCTION, config.payment_value_wei)
        .await?;
    info!(
        tx_hash = ?receipt.transaction_hash,
        block = ?receipt.block_number,
        gas_used = ?receipt.gas_used,
        "Transaction confirmed! The listener should pick up the event."
    );
    Ok(receipt)
}
