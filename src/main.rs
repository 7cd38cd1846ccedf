use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use herdbook::weather::OpenMeteoClient;
use herdbook::{config, db, server};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Print an example config and exit
    #[arg(long)]
    print_example_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    if args.print_example_config {
        print!("{}", config::example());
        return Ok(());
    }

    let cfg = config::load(Some(&args.config))
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    cfg.ensure_dirs()?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    if !cfg.auth.enabled {
        warn!("auth.enabled is false: write routes accept guests");
    }

    let weather = Arc::new(OpenMeteoClient::from_config(&cfg.weather)?);
    let state = server::AppState::new(pool.clone(), &cfg, weather);
    let bind: SocketAddr = cfg
        .server
        .bind
        .parse()
        .context("server.bind must be a socket address")?;
    let (shutdown_tx, addr) = server::start_server(state, bind, &cfg.server.cors_origins).await?;
    info!(%addr, "herdbook started. Press Ctrl+C to stop.");

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    let _ = shutdown_tx.send(());
    pool.close().await;
    Ok(())
}
