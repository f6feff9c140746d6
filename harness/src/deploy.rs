// harness/src/deploy.rs

use crate::artifact::ArtifactSource;
use crate::config::Config;
use crate::error::{HarnessError, Result};
use crate::ledger::{signer_at, DeployedContract, Ledger};
use ethers::abi::Token;
use tracing::{debug, info, instrument};

pub const DEPLOYER_INDEX: usize = 0;

#[derive(Debug, Clone)]
pub struct Deployment {
    pub token: DeployedContract,
    pub payment: DeployedContract,
}

/// Deploys the token, then the payment contract bound to the token's address.
///
/// Both artifacts are resolved before anything is broadcast. A failure in the
/// second deployment leaves the token deployed.
#[instrument(skip_all, name = "deploy")]
pub async fn deploy_contracts<L>(ledger: &L, artifacts: &dyn ArtifactSource, config: &Config) -> Result<Deployment>
where
    L: Ledger + ?Sized,
{
    let token_id = config.token_artifact();
    let payment_id = config.payment_artifact();
    let token_artifact = artifacts.artifact(&token_id)?;
    let payment_artifact = artifacts.artifact(&payment_id)?;
    debug!(token = %token_id, payment = %payment_id, "Artifacts resolved");

    let signers = ledger.signers().await?;
    let deployer = signer_at(&signers, DEPLOYER_INDEX)?;

    info!("Deploying {} contract...", token_id.name);
    let token = ledger.deploy(deployer, &token_id.name, &token_artifact, Vec::new()).await?;
    info!(tx_hash = ?token.tx_hash, block = ?token.block_number, "{} deployed at: {:?}", token.name, token.address);

    info!("Deploying {}...", payment_id.name);
    let payment = ledger
        .deploy(deployer, &payment_id.name, &payment_artifact, vec![Token::Address(token.address)])
        .await?;
    info!(tx_hash = ?payment.tx_hash, block = ?payment.block_number, "{} deployed at: {:?}", payment.name, payment.address);

    if let Some(getter) = config.token_getter.as_deref() {
        verify_token_link(ledger, &payment, &token, getter).await?;
    }

    Ok(Deployment { token, payment })
}

/// Reads the token address back from the payment contract, when it exposes `getter`.
async fn verify_token_link<L>(
    ledger: &L,
    payment: &DeployedContract,
    token: &DeployedContract,
    getter: &str,
) -> Result<()>
where
    L: Ledger + ?Sized,
{
    let exposes_getter = payment
        .abi
        .function(getter)
        .map(|f| f.inputs.is_empty())
        .unwrap_or(false);
    if !exposes_getter {
        debug!(getter, "Payment contract has no zero-argument token getter; skipping link check");
        return Ok(());
    }

    let stored = ledger.call_address(payment, getter).await?;
    if stored != token.address {
        return Err(HarnessError::deployment(
            &payment.name,
            format!("{getter}() returned {stored:?}, expected {:?}", token.address),
        ));
    }
    debug!(getter, token = ?stored, "Token link verified");
    Ok(())
}
