//! Server module — the local remote-state HTTP backend.
//!
//! This module provides:
//! - The protocol router and its handlers (`handlers`)
//! - `BackendServer`, a running server bound to `127.0.0.1`
//! - `backend_address` for the `TF_HTTP_*ADDRESS` variables

pub mod handlers;

use std::net::{Ipv4Addr, SocketAddr};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::errors::{BwStateError, Result};
use crate::store::Reference;

// Re-export the most commonly used items.
pub use handlers::{router, status_for, BackendState};

/// The address the remote-state client talks to for `reference`.
pub fn backend_address(port: u16, reference: &Reference) -> Result<String> {
    let item = match reference {
        Reference::ById(id) => format!("id:{}", urlencoding::encode(id)),
        Reference::ByName(name) => format!("name:{}", urlencoding::encode(name)),
        Reference::Empty => {
            return Err(BwStateError::ValidationError(
                "the state has to be configured with either item_id or item_name".into(),
            ))
        }
    };
    Ok(format!("http://127.0.0.1:{port}/?item={item}"))
}

/// A backend server running on the current tokio runtime.
pub struct BackendServer {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<std::io::Result<()>>,
}

impl BackendServer {
    /// Bind `127.0.0.1:<port>` and start serving.  Port `0` picks a free
    /// port, see `local_addr`.
    pub async fn start(port: u16, state: BackendState) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind((Ipv4Addr::LOCALHOST, port))
            .await
            .map_err(|e| {
                BwStateError::ServerError(format!("cannot listen on 127.0.0.1:{port}: {e}"))
            })?;
        let addr = listener.local_addr()?;
        info!(%addr, "backend listening");

        let (shutdown, stopped) = oneshot::channel::<()>();
        let app = router(state);
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = stopped.await;
                })
                .await
        });

        Ok(Self {
            addr,
            shutdown,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Stop accepting requests and wait for in-flight ones to finish.
    pub async fn stop(self) -> Result<()> {
        let _ = self.shutdown.send(());
        match self.task.await {
            Ok(Ok(())) => {
                info!(addr = %self.addr, "backend stopped");
                Ok(())
            }
            Ok(Err(e)) => Err(BwStateError::ServerError(e.to_string())),
            Err(e) => Err(BwStateError::ServerError(format!("server task failed: {e}"))),
        }
    }
}

/// Resolves on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
