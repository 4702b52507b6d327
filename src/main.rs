/*****************************************************************************************
 *
 *  dualgate – public HTTP API + local admin socket over a shared SQLite store
 *
 *****************************************************************************************/

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use dualgate::cli::{Cli, Command, PublicArgs};
use dualgate::server::{self, Shutdown};
use dualgate::supervisor;

#[tokio::main]
async fn main() -> Result<()> {
    //
    // ────────────────────────────────────────────────────────
    //  Load configuration (defaults < file < env < flags)
    // ────────────────────────────────────────────────────────
    //
    let cli = Cli::parse();
    let mut cfg = cli.resolve_config()?;

    init_tracing(&cfg.log_level);
    info!("Loaded configuration: {:?}", cfg);

    //
    // ────────────────────────────────────────────────────────
    //  Shutdown on CTRL+C / SIGTERM
    // ────────────────────────────────────────────────────────
    //
    let (trigger, shutdown) = Shutdown::new();
    tokio::spawn(async move {
        server::wait_for_signal().await;
        let _ = trigger.send(true);
    });

    match cli.mode() {
        Command::Serve => {
            if cfg.workers > 1 {
                warn!(
                    "{} workers requested, but the admin socket cannot be shared; using 1",
                    cfg.workers
                );
                cfg.workers = 1;
            }
            let state = server::open_state(&cfg).await?;
            server::run_dual(&cfg, state, shutdown).await
        }
        Command::Public(PublicArgs { worker, .. }) => {
            if cfg.workers > 1 && !worker {
                info!("Starting {} public workers", cfg.workers);
                supervisor::run_workers(cfg.workers, shutdown).await
            } else {
                let state = server::open_state(&cfg).await?;
                server::run_public(&cfg, state, worker || cfg.workers > 1, shutdown).await
            }
        }
        Command::Admin => {
            let state = server::open_state(&cfg).await?;
            server::run_admin(&cfg, state, shutdown).await
        }
    }
}

/// `RUST_LOG` wins; otherwise use the configured level.
fn init_tracing(level: &str) {
    let level = match level.to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = fmt().with_env_filter(filter).try_init();
}
