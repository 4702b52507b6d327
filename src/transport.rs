//! Listeners for the two surfaces.
//!
//! The public API goes on a TCP socket. The admin API goes on a Unix socket
//! whose path doubles as the access boundary: whoever can open the file can
//! administer the store.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use axum::extract::Request;
use axum::Router;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpSocket, UnixListener};
use tower::Service;
use tracing::{debug, info, warn};

/// Bind the public listener.
///
/// With `reuse_port` several worker processes can bind the same address and
/// the kernel spreads connections across them.
pub fn bind_public(addr: SocketAddr, reuse_port: bool) -> io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    if reuse_port {
        socket.set_reuseport(true)?;
    }
    socket.bind(addr)?;
    socket.listen(1024)
}

/// Admin listener that removes its socket file when dropped.
pub struct AdminSocket {
    listener: UnixListener,
    path: PathBuf,
}

impl AdminSocket {
    /// Bind the admin socket at `path`.
    ///
    /// A leftover file from a crashed instance is removed first. The socket
    /// is restricted to its owner.
    pub fn bind(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();

        remove_stale_socket(&path)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let listener = UnixListener::bind(&path)?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;

        Ok(Self { listener, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serve `app` over HTTP/1.1 until `shutdown` resolves.
    pub async fn serve<F>(self, app: Router, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("admin socket shutting down");
                    break;
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, _)) => spawn_connection(stream, app.clone()),
                        Err(err) => warn!(error = ?err, "failed to accept admin connection"),
                    }
                }
            }
        }

        Ok(())
    }
}

impl Drop for AdminSocket {
    fn drop(&mut self) {
        if let Err(err) = remove_stale_socket(&self.path) {
            warn!("Failed to remove admin socket {}: {err}", self.path.display());
        }
    }
}

fn spawn_connection(stream: tokio::net::UnixStream, app: Router) {
    tokio::spawn(async move {
        let io = TokioIo::new(stream);
        let service = hyper::service::service_fn(move |request: Request<Incoming>| {
            app.clone().call(request)
        });

        if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
            debug!("admin connection closed with error: {err}");
        }
    });
}

/// Delete a socket file if present. Missing files are fine.
pub fn remove_stale_socket(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!("removed stale socket {}", path.display());
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}
