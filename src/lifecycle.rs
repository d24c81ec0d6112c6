//! Server lifecycle management.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     ServerConfig → build pipeline → bind listener → spawn serve task
//!         → ServerHandle (live socket capability)
//!
//! Shutdown:
//!     handle.close() → broadcast shutdown → serve task drains → joined
//! ```
//!
//! # Design Decisions
//! - Bind failures reject startup; retry policy belongs to the caller
//! - The handle exclusively owns the serve task; close is idempotent and a
//!   second call settles immediately instead of hanging

use crate::config::ServerConfig;
use crate::pipeline::build_pipeline;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

/// Broadcast-based shutdown coordinator.
///
/// Every long-running task subscribes; triggering fans the signal out to all
/// of them.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Startup failure.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Shutdown failure.
#[derive(Debug, thiserror::Error)]
pub enum CloseError {
    #[error("server task failed during shutdown: {0}")]
    Serve(#[source] std::io::Error),

    #[error("server task panicked or was aborted: {0}")]
    Join(#[source] tokio::task::JoinError),
}

/// Entry point for the listen/close lifecycle.
pub struct Server;

impl Server {
    /// Bind the pipeline to the configured host/port and start serving.
    ///
    /// Resolves with a live [`ServerHandle`] once the socket is bound;
    /// rejects with the bind error otherwise (e.g. port already in use).
    pub async fn start(config: ServerConfig) -> Result<ServerHandle, StartError> {
        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr).await.map_err(|source| StartError::Bind {
            addr: addr.clone(),
            source,
        })?;
        let local_addr = listener.local_addr().map_err(|source| StartError::Bind {
            addr,
            source,
        })?;

        let router = build_pipeline(&config);
        let shutdown = Shutdown::new();
        let mut signal = shutdown.subscribe();
        let task = tokio::spawn(async move {
            axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move {
                let _ = signal.recv().await;
            })
            .await
        });

        tracing::info!(address = %local_addr, "listening");

        Ok(ServerHandle {
            local_addr,
            shutdown,
            task: Mutex::new(Some(task)),
        })
    }
}

/// Capability over the live listening socket.
///
/// Owns the serve task; dropping the handle without closing leaves the
/// server running until the task is dropped by the runtime.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: Shutdown,
    task: Mutex<Option<JoinHandle<std::io::Result<()>>>>,
}

impl ServerHandle {
    /// The address the server is actually bound to (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Release the listening socket.
    ///
    /// Idempotent: the first call triggers shutdown and awaits the serve
    /// task; any later call settles immediately with `Ok`.
    pub async fn close(&self) -> Result<(), CloseError> {
        self.shutdown.trigger();
        let task = self.task.lock().await.take();
        match task {
            Some(task) => match task.await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => Err(CloseError::Serve(err)),
                Err(err) => Err(CloseError::Join(err)),
            },
            None => Ok(()),
        }
    }
}
