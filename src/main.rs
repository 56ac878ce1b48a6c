use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use rcproxy::cli::Cli;
use rcproxy::tcp::RcpTcpServer;

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Cli::parse()
        .into_config()
        .context("invalid configuration")?;
    let listen = config.listen_addr();
    let server = RcpTcpServer::bind(config)
        .await
        .with_context(|| format!("unable to listen on {listen}"))?;
    info!("listening on {}", server.local_addr()?);

    server
        .run_until(async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                warn!(?error, "ctrl-c handler failed");
            }
        })
        .await?;

    Ok(())
}
