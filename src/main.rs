use std::process::ExitCode;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use userstore_agent::error::ErrorCode;
use userstore_agent::{AgentConfig, StaticUserStore, Supervisor};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match AgentConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, code = e.error_code(), "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let store = match StaticUserStore::from_file(&config.users_file) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(path = %config.users_file.display(), error = %e, code = e.error_code(), "user store load failed");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(users = store.user_count(), url = %config.url, "userstore agent starting");

    let agent = Supervisor::spawn(config, Arc::new(store));

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
    }

    match agent.shutdown().await {
        Ok(()) => {
            tracing::info!("userstore agent stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, code = e.error_code(), "userstore agent stopped abnormally");
            ExitCode::FAILURE
        }
    }
}
