//! The main function for the Reading Life server
use readinglife_server::config::ServerConfig;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[allow(clippy::print_stderr, reason = "Tracing might not be available if startup failed")]
#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("Failed to start Reading Life! Error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let dotenv_loaded = dotenvy::dotenv().is_ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init()
        .map_err(|error| anyhow::anyhow!("Unable to set global tracing subscriber: {error}"))?;
    tracing::info!(dotenv_loaded, "Starting Reading Life");

    let config = ServerConfig::from_env()?;
    readinglife_server::run(config).await
}
