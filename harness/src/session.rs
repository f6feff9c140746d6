// harness/src/session.rs

use crate::artifact::ArtifactSource;
use crate::config::Config;
use crate::deploy::{deploy_contracts, Deployment};
use crate::error::Result;
use crate::event_handler::{subscribe_payments, PaymentNotice, Subscription};
use crate::ledger::Ledger;
use crate::transaction::simulate_payment;
use crate::utils::AmountFormat;
use ethers::types::TransactionReceipt;
use tracing::info;

/// What a run produced, stage by stage. Filled in as stages complete, so a failed
/// run still exposes the listener if it was already registered.
#[derive(Debug, Default)]
pub struct Session {
    pub deployment: Option<Deployment>,
    pub subscription: Option<Subscription>,
    pub payment_receipt: Option<TransactionReceipt>,
}

impl Session {
    /// Deploy both contracts, subscribe to `PaymentReceived`, then send one native payment.
    pub async fn run<L, F>(
        &mut self,
        ledger: &L,
        artifacts: &dyn ArtifactSource,
        config: &Config,
        handler: F,
    ) -> Result<()>
    where
        L: Ledger + ?Sized,
        F: FnMut(PaymentNotice) + Send + 'static,
    {
        info!("Starting deployment and client interaction...");

        let deployment = deploy_contracts(ledger, artifacts, config).await?;
        let payment = deployment.payment.clone();
        self.deployment = Some(deployment);

        info!("Setting up event listener for PaymentReceived...");
        let subscription = subscribe_payments(
            ledger,
            &payment,
            AmountFormat::from(config),
            config.event_channel_capacity,
            handler,
        )
        .await?;
        self.subscription = Some(subscription);

        let receipt = simulate_payment(ledger, &payment, config).await?;
        self.payment_receipt = Some(receipt);

        info!("Sequence finished. The listener will remain active.");
        Ok(())
    }

    pub fn is_listening(&self) -> bool {
        self.subscription.as_ref().is_some_and(Subscription::is_active)
    }
}
