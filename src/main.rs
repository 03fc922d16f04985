use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use relay_server::cli::Cli;

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay_server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Cli::parse().into_config();

    // Manual runtime construction (rather than #[tokio::main]) so the
    // `threads` CLI argument actually sizes the worker pool.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.threads)
        .enable_all()
        .build()
        .context("failed to build the async runtime")?;

    runtime
        .block_on(relay_server::server::run(config.addr, config.ping_duration))
        .with_context(|| format!("relay server failed on {}", config.addr))
}
