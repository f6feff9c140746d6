// harness/src/lib.rs
//! Deploys a mock stablecoin and a payment contract, listens for
//! `PaymentReceived`, and fires one native-currency payment at it.

pub mod artifact;
pub mod config;
pub mod deploy;
pub mod error;
pub mod event_handler;
pub mod ledger;
pub mod provider;
pub mod session;
pub mod transaction;
pub mod utils;

// Public types re-exported for the binary and integration tests
pub use artifact::{Artifact, ArtifactDir, ArtifactId, ArtifactSource, SolcCompiler};
pub use config::{load_config, ArtifactSourceKind, Config};
pub use deploy::{deploy_contracts, Deployment};
pub use error::HarnessError;
pub use event_handler::{print_notice, subscribe_payments, PaymentNotice, PaymentReceived, Subscription};
pub use ledger::{DeployedContract, Ledger, LogSubscription};
pub use provider::EthersLedger;
pub use session::Session;
pub use transaction::simulate_payment;
pub use utils::{AmountFormat, Currency};
