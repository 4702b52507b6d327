use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};

use crate::config::AppConfig;
use crate::errors::ConfigError;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// JSON config file. Defaults to config.json beside the executable.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run the public API and the admin socket in one process (default).
    Serve,
    /// Run only the public API, optionally as several worker processes.
    Public(PublicArgs),
    /// Run only the admin API on the local socket.
    Admin,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct PublicArgs {
    /// Number of worker processes sharing the public port.
    #[arg(long)]
    pub workers: Option<usize>,

    /// Run as one worker spawned by a supervising process.
    #[arg(long, hide = true)]
    pub worker: bool,
}

/// Flags that take precedence over the config file and environment.
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    /// Address the public API binds to.
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Port of the public API.
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Path of the shared SQLite database.
    #[arg(long, global = true)]
    pub database: Option<String>,

    /// Path of the admin Unix socket.
    #[arg(long, global = true)]
    pub admin_socket: Option<String>,

    /// Log level used when RUST_LOG is not set.
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

impl Overrides {
    pub fn apply(&self, cfg: &mut AppConfig) {
        if let Some(host) = &self.host {
            cfg.host = host.clone();
        }
        if let Some(port) = self.port {
            cfg.port = port;
        }
        if let Some(path) = &self.database {
            cfg.database_path = path.clone();
        }
        if let Some(path) = &self.admin_socket {
            cfg.admin_socket = path.clone();
        }
        if let Some(level) = &self.log_level {
            cfg.log_level = level.clone();
        }
    }
}

impl Cli {
    pub fn mode(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }

    /// Defaults, then the config file, then environment, then flags.
    pub fn resolve_config(&self) -> Result<AppConfig, ConfigError> {
        let mut cfg = match self.config.clone().or_else(default_config_path) {
            Some(path) => AppConfig::load_from_file(&path)?,
            None => AppConfig::default(),
        };

        cfg.apply_env()?;
        self.overrides.apply(&mut cfg);
        if let Command::Public(PublicArgs {
            workers: Some(workers),
            ..
        }) = self.mode()
        {
            cfg.workers = workers;
        }

        cfg.validate()?;
        Ok(cfg)
    }
}

/// config.json next to the executable, or one directory up.
fn default_config_path() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let exe_dir = exe.parent()?;

    [exe_dir.join("config.json"), exe_dir.join("..").join("config.json")]
        .into_iter()
        .find(|candidate| Path::new(candidate).is_file())
}
