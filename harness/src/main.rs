// harness/src/main.rs

use eyre::{Result, WrapErr};
use payment_harness::{
    load_config, print_notice, ArtifactDir, ArtifactSource, ArtifactSourceKind, Config, EthersLedger, Session,
    SolcCompiler,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(false).init();
}

fn artifact_source(config: &Config) -> Box<dyn ArtifactSource> {
    match config.artifact_source {
        ArtifactSourceKind::Artifacts => Box::new(ArtifactDir::new(&config.artifacts_dir)),
        ArtifactSourceKind::Solc => Box::new(SolcCompiler::new(&config.sources_dir)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = load_config().wrap_err("Failed to load configuration")?;
    let ledger = EthersLedger::connect(&config)
        .await
        .wrap_err_with(|| format!("Failed to connect to {}", config.http_rpc_url))?;
    let artifacts = artifact_source(&config);

    let mut session = Session::default();
    if let Err(e) = session.run(&ledger, artifacts.as_ref(), &config, print_notice).await {
        error!("An error occurred: {e}");
    }

    let Some(mut subscription) = session.subscription else {
        return Ok(());
    };
    info!("Listener active on {:?}. Press Ctrl-C to exit.", subscription.contract);
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!(error = %e, "Failed to listen for Ctrl-C");
            }
        }
        _ = subscription.join() => {}
    }
    subscription.cancel();
    Ok(())
}
