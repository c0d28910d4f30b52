use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

use ozziework_core::{config, db, sweep};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Detect overdue payslips and suspend employers with unpaid instructions"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Only report what would change without writing to the database
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/ozziework.db", cfg.app.data_dir));

    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let outcome = sweep::sweep_overdue(
        &pool,
        Utc::now().date_naive(),
        cfg.app.overdue_after_days,
        args.dry_run,
    )
    .await?;

    if outcome.payslips_marked.is_empty() {
        info!("no overdue payslips detected");
        return Ok(());
    }

    let mut summary = format!("identified {} overdue payslips", outcome.payslips_marked.len());
    if outcome.dry_run {
        summary.push_str(" (dry-run: no changes applied)");
    }
    info!("{summary}");

    if outcome.employers_suspended.is_empty() {
        info!("no new employer suspensions needed");
    } else {
        warn!(
            employers = ?outcome.employers_suspended,
            "suspended employers"
        );
    }

    Ok(())
}
