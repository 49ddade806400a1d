//! HTTP listeners and the graceful serve lifecycle.
//!
//! # Lifecycle
//!
//! ```text
//! Starting ──► Serving ──► ShuttingDown ──► Stopped
//! ```
//!
//! - **Serving**: every [`Server`] runs its accept loop in its own task; the
//!   first fatal accept error from any of them starts the shutdown.
//! - **ShuttingDown**, entered on:
//!   - [`ShutdownSignal::Interrupt`] (SIGINT/SIGTERM) or cancellation of the
//!     root token with a non-zero grace: listeners close, in-flight requests
//!     get up to `grace` to finish. A second signal cuts the wait short.
//!   - [`ShutdownSignal::Quit`] (SIGQUIT), or a cancelled root token with zero
//!     grace: listeners close and open connections are dropped at once.
//! - **Stopped**: reached only after every server task has been joined.
//!
//! Forced stops also cancel the engine's root token, so handlers watching
//! [`Context::cancel_token`](crate::core::Context::cancel_token) see it.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use kumi::server::{self, Server};
//!
//! let engine = Arc::new(engine);
//! let server = Server::bind("0.0.0.0:8080".parse()?, Arc::clone(&engine)).await?;
//! server::serve(vec![server], CancellationToken::new(), Duration::from_secs(30)).await?;
//! ```

mod connection;
mod signal;

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::server::graceful::GracefulShutdown;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::Engine;

pub use signal::{listen as listen_signals, ShutdownSignal};

/// Fatal server failures returned by [`serve`].
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),
    #[error("server task failed: {0}")]
    Join(String),
    #[error("failed to install signal handlers: {0}")]
    Signal(#[source] io::Error),
}

/// A bound listener plus the engine answering its requests.
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    engine: Arc<Engine>,
}

impl Server {
    /// Bind `addr`. Port 0 picks a free port; see [`Server::local_addr`].
    pub async fn bind(addr: SocketAddr, engine: Arc<Engine>) -> Result<Self, ServeError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServeError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServeError::Bind { addr, source })?;
        Ok(Self {
            listener,
            local_addr,
            engine,
        })
    }

    /// Wrap an already bound listener.
    pub fn from_listener(listener: TcpListener, engine: Arc<Engine>) -> Result<Self, ServeError> {
        let local_addr = listener.local_addr().map_err(ServeError::Accept)?;
        Ok(Self {
            listener,
            local_addr,
            engine,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }
}

/// How the serve loop leaves the `Serving` state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stop {
    Drain,
    Immediate,
}

/// Serve until a process signal or cancellation of `root`.
///
/// Returns the first fatal error of any server, or `Ok(())` on a clean stop.
pub async fn serve(
    servers: Vec<Server>,
    root: CancellationToken,
    grace: Duration,
) -> Result<(), ServeError> {
    let signals = signal::listen().map_err(ServeError::Signal)?;
    serve_with_signals(servers, root, grace, signals).await
}

/// [`serve`] with the shutdown signals supplied by the caller.
pub async fn serve_with_signals(
    servers: Vec<Server>,
    root: CancellationToken,
    grace: Duration,
    mut signals: mpsc::UnboundedReceiver<ShutdownSignal>,
) -> Result<(), ServeError> {
    if servers.is_empty() {
        warn!("No servers configured");
        return Ok(());
    }

    let stop_accepting = CancellationToken::new();
    let force = CancellationToken::new();
    let (errors_tx, mut errors) = mpsc::channel(servers.len());
    let mut tasks = JoinSet::new();

    for server in servers {
        info!(addr = %server.local_addr, router = server.engine.router().name(), "Serving");
        tasks.spawn(run(
            server,
            stop_accepting.clone(),
            force.clone(),
            errors_tx.clone(),
        ));
    }
    drop(errors_tx);

    let mut first_error = None;
    let mut stop = tokio::select! {
        Some(err) = errors.recv() => {
            error!(error = %err, "Server failed");
            first_error = Some(err);
            Stop::Drain
        }
        received = signal::next(&mut signals) => {
            info!(signal = ?received, "Received shutdown signal");
            match received {
                ShutdownSignal::Interrupt => Stop::Drain,
                ShutdownSignal::Quit => Stop::Immediate,
            }
        }
        _ = root.cancelled() => Stop::Drain,
    };
    if grace.is_zero() {
        stop = Stop::Immediate;
    }

    info!(mode = ?stop, grace_ms = grace.as_millis() as u64, "ShuttingDown");
    stop_accepting.cancel();

    let watchdog = match stop {
        Stop::Immediate => {
            force.cancel();
            None
        }
        Stop::Drain => Some(tokio::spawn(bound_drain(grace, signals, force.clone()))),
    };

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            first_error.get_or_insert(ServeError::Join(e.to_string()));
        }
    }
    if let Some(watchdog) = watchdog {
        watchdog.abort();
    }
    while let Ok(err) = errors.try_recv() {
        first_error.get_or_insert(err);
    }

    info!(clean = first_error.is_none(), "Stopped");
    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Force the drain to end after `grace` or on the next signal.
async fn bound_drain(
    grace: Duration,
    mut signals: mpsc::UnboundedReceiver<ShutdownSignal>,
    force: CancellationToken,
) {
    tokio::select! {
        _ = tokio::time::sleep(grace) => {
            warn!(grace_ms = grace.as_millis() as u64, "Drain timeout reached, closing remaining connections");
        }
        received = signal::next(&mut signals) => {
            warn!(signal = ?received, "Second signal, forcing shutdown");
        }
    }
    force.cancel();
}

/// Accept loop for one server, then its share of the drain.
async fn run(
    server: Server,
    stop_accepting: CancellationToken,
    force: CancellationToken,
    errors: mpsc::Sender<ServeError>,
) {
    let Server {
        listener,
        local_addr,
        engine,
    } = server;

    let graceful = GracefulShutdown::new();
    let mut http = auto::Builder::new(TokioExecutor::new());
    http.http1().keep_alive(true);
    http.http2().max_concurrent_streams(250);

    loop {
        let (stream, remote_addr) = tokio::select! {
            result = listener.accept() => match result {
                Ok(accepted) => accepted,
                Err(e) if is_transient(&e) => {
                    debug!(addr = %local_addr, error = %e, "Transient accept error");
                    continue;
                }
                Err(e) if is_fd_exhaustion(&e) => {
                    warn!(addr = %local_addr, error = %e, "Out of file descriptors, backing off");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
                Err(e) => {
                    error!(addr = %local_addr, error = %e, "Accept failed");
                    let _ = errors.send(ServeError::Accept(e)).await;
                    break;
                }
            },
            _ = stop_accepting.cancelled() => break,
        };

        let _ = stream.set_nodelay(true);

        let conn_engine = Arc::clone(&engine);
        let service = service_fn(move |req| {
            connection::handle(Arc::clone(&conn_engine), remote_addr, req)
        });
        let conn = graceful.watch(
            http.serve_connection(TokioIo::new(stream), service)
                .into_owned(),
        );

        let force = force.clone();
        tokio::spawn(async move {
            tokio::select! {
                result = conn => {
                    if let Err(e) = result {
                        if !connection::is_peer_error(&*e) {
                            debug!(%remote_addr, error = %e, "Connection error");
                        }
                    }
                }
                _ = force.cancelled() => {
                    debug!(%remote_addr, "Connection dropped by forced shutdown");
                }
            }
        });
    }

    drop(listener);
    debug!(addr = %local_addr, "Stopped accepting");

    tokio::select! {
        _ = graceful.shutdown() => {
            debug!(addr = %local_addr, "Connections drained");
        }
        _ = force.cancelled() => {
            engine.root_token().cancel();
            debug!(addr = %local_addr, "Drain cut short");
        }
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    )
}

/// EMFILE / ENFILE.
fn is_fd_exhaustion(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(23) | Some(24))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;

    #[test]
    fn test_accept_error_classes() {
        assert!(is_transient(&io::Error::from(io::ErrorKind::ConnectionAborted)));
        assert!(!is_transient(&io::Error::from(io::ErrorKind::PermissionDenied)));
        assert!(is_fd_exhaustion(&io::Error::from_raw_os_error(24)));
        assert!(!is_fd_exhaustion(&io::Error::from_raw_os_error(13)));
    }

    #[tokio::test]
    async fn test_bind_conflict() {
        let engine = Arc::new(Engine::new(EngineConfig::default()));
        let first = Server::bind("127.0.0.1:0".parse().unwrap(), Arc::clone(&engine))
            .await
            .unwrap();

        let taken = first.local_addr();
        let err = Server::bind(taken, engine).await.err().unwrap();
        assert!(matches!(err, ServeError::Bind { addr, .. } if addr == taken));
    }

    #[tokio::test]
    async fn test_empty_server_list() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let result = serve_with_signals(
            Vec::new(),
            CancellationToken::new(),
            Duration::from_secs(1),
            rx,
        )
        .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_root_cancel_with_zero_grace_stops() {
        let engine = Arc::new(Engine::new(EngineConfig::default()));
        let server = Server::bind("127.0.0.1:0".parse().unwrap(), engine)
            .await
            .unwrap();

        let root = CancellationToken::new();
        root.cancel();
        let (_tx, rx) = mpsc::unbounded_channel();
        let result = tokio::time::timeout(
            Duration::from_secs(2),
            serve_with_signals(vec![server], root, Duration::ZERO, rx),
        )
        .await
        .expect("serve should return promptly");
        assert!(result.is_ok());
    }
}
