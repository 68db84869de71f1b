use anyhow::{
    Context,
    Result,
};
use clap::Parser;
use contract_indexer::Config;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(config.log_level.into())
                .from_env_lossy(),
        )
        .init();

    let indexer = config.build().context("failed to build the indexer")?;
    let cancellation_token = CancellationToken::new();

    let mut run = Box::pin(indexer.run(cancellation_token.clone()));

    tokio::select! {
        result = &mut run => {
            result.context("indexer terminated unexpectedly")?;
        }
        result = shutdown_signal() => {
            result?;
            info!("shutdown signal received, initiating graceful shutdown");
            cancellation_token.cancel();
            run.await.context("indexer failed during shutdown")?;
        }
    }

    info!("indexer shutdown gracefully");
    Ok(())
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() -> Result<()> {
    use tokio::signal;

    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("failed to install SIGTERM handler")?;
        let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
            .context("failed to install SIGINT handler")?;

        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c()
            .await
            .context("failed to listen for ctrl-c")?;
        info!("received Ctrl+C");
    }

    Ok(())
}
