//! Process wiring: which surface listens where, and how it stops.

use std::net::{SocketAddr, ToSocketAddrs};

use anyhow::{anyhow, Context, Result};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::app::{build_admin_app, build_public_app};
use crate::config::AppConfig;
use crate::state::{AppState, Store, StoreOptions};
use crate::transport::{self, AdminSocket};

/// Cloneable handle that resolves once shutdown has been requested.
#[derive(Clone)]
pub struct Shutdown(watch::Receiver<bool>);

impl Shutdown {
    pub fn new() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self(rx))
    }

    /// Also resolves if the sender is gone.
    pub async fn wait(mut self) {
        let _ = self.0.wait_for(|stop| *stop).await;
    }
}

/// Resolves on Ctrl-C or SIGTERM.
pub async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = ?err, "failed to install ctrl-c handler");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = ?err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => warn!("CTRL+C received, shutting down"),
        _ = terminate => warn!("SIGTERM received, shutting down"),
    }
}

/// Open the shared store described by `cfg`.
pub async fn open_state(cfg: &AppConfig) -> Result<AppState> {
    let store = Store::open(&cfg.database_path, StoreOptions::from(&cfg.store))
        .await
        .with_context(|| format!("failed to open store at {}", cfg.database_path))?;

    Ok(AppState::new(store, cfg.service_name.as_str()))
}

pub fn public_addr(cfg: &AppConfig) -> Result<SocketAddr> {
    (cfg.host.as_str(), cfg.port)
        .to_socket_addrs()
        .with_context(|| format!("invalid public address {}:{}", cfg.host, cfg.port))?
        .next()
        .ok_or_else(|| anyhow!("{}:{} did not resolve to an address", cfg.host, cfg.port))
}

/// Serve the public API until shutdown.
pub async fn run_public(
    cfg: &AppConfig,
    state: AppState,
    reuse_port: bool,
    shutdown: Shutdown,
) -> Result<()> {
    let addr = public_addr(cfg)?;
    let listener = transport::bind_public(addr, reuse_port)
        .with_context(|| format!("failed to bind public API on {addr}"))?;
    let app = build_public_app(state.clone(), cfg);

    info!(pid = std::process::id(), "Public API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.wait())
        .await
        .context("public server error")?;

    state.store.close().await;
    info!("Public API stopped");
    Ok(())
}

/// Serve the admin API on its socket until shutdown.
pub async fn run_admin(cfg: &AppConfig, state: AppState, shutdown: Shutdown) -> Result<()> {
    let socket = AdminSocket::bind(&cfg.admin_socket)
        .with_context(|| format!("failed to bind admin socket at {}", cfg.admin_socket))?;
    let app = build_admin_app(state.clone());

    info!("Admin API listening on {}", socket.path().display());

    socket
        .serve(app, shutdown.wait())
        .await
        .context("admin server error")?;

    state.store.close().await;
    info!("Admin API stopped");
    Ok(())
}

/// Both surfaces in one process. Both listeners are bound before either
/// starts serving, so a bind failure stops startup cleanly.
pub async fn run_dual(cfg: &AppConfig, state: AppState, shutdown: Shutdown) -> Result<()> {
    let addr = public_addr(cfg)?;
    let listener = transport::bind_public(addr, false)
        .with_context(|| format!("failed to bind public API on {addr}"))?;
    let socket = AdminSocket::bind(&cfg.admin_socket)
        .with_context(|| format!("failed to bind admin socket at {}", cfg.admin_socket))?;

    let public_app = build_public_app(state.clone(), cfg);
    let admin_app = build_admin_app(state.clone());

    info!("Public API listening on http://{}", addr);
    info!("Admin API listening on {}", socket.path().display());

    let public = async {
        axum::serve(listener, public_app)
            .with_graceful_shutdown(shutdown.clone().wait())
            .await
            .context("public server error")
    };
    let admin = async {
        socket
            .serve(admin_app, shutdown.clone().wait())
            .await
            .context("admin server error")
    };

    tokio::try_join!(public, admin)?;

    state.store.close().await;
    info!("Servers stopped");
    Ok(())
}
