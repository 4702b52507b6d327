//! Multi-process public workers.
//!
//! The supervisor re-executes the current binary once per worker with the
//! same arguments plus `--worker`. Workers bind the public port with
//! `SO_REUSEPORT` and share state only through the database file.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::process::ExitStatus;
use std::time::Duration;

use anyhow::{Context, Result};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::process::Command;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, warn};

use crate::server::Shutdown;

/// How long workers get to finish in-flight requests before being killed.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

type WorkerExit = (usize, std::io::Result<ExitStatus>);

/// Arguments for a worker, given the supervisor's own arguments.
pub fn worker_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let mut args: Vec<OsString> = args.into_iter().filter(|arg| arg != "--worker").collect();
    args.push(OsString::from("--worker"));
    args
}

/// Spawn `workers` worker processes and wait until shutdown or until they
/// have all exited.
///
/// On shutdown every worker gets SIGTERM and up to [`SHUTDOWN_GRACE`] to
/// drain its connections. Workers still running after that are killed.
pub async fn run_workers(workers: usize, shutdown: Shutdown) -> Result<()> {
    let exe = std::env::current_exe().context("cannot locate current executable")?;
    let args = worker_args(std::env::args_os().skip(1));

    let mut running: JoinSet<WorkerExit> = JoinSet::new();
    let mut pids = BTreeMap::new();
    for index in 0..workers {
        let mut child = Command::new(&exe)
            .args(&args)
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn worker {index}"))?;

        info!(worker = index, pid = ?child.id(), "started worker");
        if let Some(pid) = child.id() {
            pids.insert(index, pid);
        }
        running.spawn(async move { (index, child.wait().await) });
    }

    let shutdown = shutdown.wait();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                stop_workers(&mut pids, &mut running).await;
                break;
            }
            joined = running.join_next() => match joined {
                None => {
                    warn!("all workers exited");
                    break;
                }
                Some(joined) => {
                    if let Some(index) = report_exit(joined) {
                        pids.remove(&index);
                    }
                }
            }
        }
    }

    Ok(())
}

async fn stop_workers(pids: &mut BTreeMap<usize, u32>, running: &mut JoinSet<WorkerExit>) {
    info!("stopping {} workers", running.len());
    for (&index, &pid) in pids.iter() {
        terminate(index, pid);
    }

    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while let Some(joined) = running.join_next().await {
            if let Some(index) = report_exit(joined) {
                pids.remove(&index);
            }
        }
    })
    .await;

    if drained.is_err() {
        warn!(
            "{} workers still running after {:?}, killing them",
            running.len(),
            SHUTDOWN_GRACE
        );
        running.shutdown().await;
    }
}

fn terminate(index: usize, pid: u32) {
    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(err) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
        warn!(worker = index, pid, error = ?err, "failed to signal worker");
    }
}

/// Log how a worker ended and return its index when known.
fn report_exit(joined: Result<WorkerExit, JoinError>) -> Option<usize> {
    match joined {
        Ok((index, Ok(status))) if status.success() => {
            info!(worker = index, "worker exited");
            Some(index)
        }
        Ok((index, Ok(status))) => {
            error!(worker = index, %status, "worker exited abnormally");
            Some(index)
        }
        Ok((index, Err(err))) => {
            error!(worker = index, error = ?err, "failed to wait for worker");
            Some(index)
        }
        Err(err) => {
            error!(error = ?err, "worker task failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_args_appends_flag_once() {
        let args = worker_args(
            ["public", "--workers", "4", "--worker"]
                .into_iter()
                .map(OsString::from),
        );
        assert_eq!(args, ["public", "--workers", "4", "--worker"]);
    }

    #[test]
    fn test_worker_args_keeps_order() {
        let args = worker_args(
            ["--port", "9000", "public", "--workers", "2"]
                .into_iter()
                .map(OsString::from),
        );
        assert_eq!(args.last().unwrap(), "--worker");
        assert_eq!(args[..5], ["--port", "9000", "public", "--workers", "2"]);
    }
}
