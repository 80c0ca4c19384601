use std::sync::Arc;

use anyhow::Context;
use media_relay::api::{ApiServer, AppState};
use media_relay::config::AppConfig;
use media_relay::logging::{LogFormat, init_logging};
use media_relay::pipeline::Orchestrator;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_logging(LogFormat::from_env_value(std::env::var("LOG_FORMAT").ok().as_deref()))?;

    let config = AppConfig::from_env_or_default();
    info!(
        uploads = %config.storage.upload_dir.display(),
        converted = %config.storage.converted_dir.display(),
        "Starting media-relay"
    );

    let orchestrator = Orchestrator::from_config(&config)
        .await
        .context("failed to prepare artifact directories")?;

    let server = ApiServer::new(config.server.clone(), AppState::new(Arc::new(orchestrator)));
    let cancel = server.cancel_token();
    tokio::spawn(async move {
        if let Err(e) = shutdown_signal(cancel).await {
            tracing::error!(error = %e, "Failed to listen for shutdown signals");
        }
    });

    server.run().await?;
    info!("media-relay stopped");
    Ok(())
}

/// Cancel `token` on Ctrl-C or, on unix, SIGTERM.
async fn shutdown_signal(token: CancellationToken) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!(signal = "SIGINT", "Signal received");
            }
            _ = sigterm.recv() => {
                info!(signal = "SIGTERM", "Signal received");
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!(signal = "ctrl-c", "Signal received");
    }

    token.cancel();
    Ok(())
}
