use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use herdbook::{auth, config, db};

/// Create or reset a farmer login.
#[derive(Parser, Debug)]
struct Args {
    /// Path to YAML config
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Login name
    #[arg(long)]
    name: String,

    /// Password; read from HERDBOOK_PASSWORD when omitted
    #[arg(long)]
    password: Option<String>,

    /// Farm location shown on the profile
    #[arg(long)]
    location: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let password = match args.password.or_else(|| std::env::var("HERDBOOK_PASSWORD").ok()) {
        Some(p) if !p.is_empty() => p,
        _ => bail!("a password is required (--password or HERDBOOK_PASSWORD)"),
    };
    if args.name.trim().is_empty() {
        bail!("--name must be non-empty");
    }

    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;
    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let hash = auth::hash_password(&password)?;
    let id = db::upsert_farmer(&pool, args.name.trim(), args.location.as_deref(), &hash).await?;
    println!("Farmer {} saved with id {}", args.name.trim(), id);
    pool.close().await;
    Ok(())
}
