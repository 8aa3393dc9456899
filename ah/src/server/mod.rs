//! Shared HTTP endpoint owned by the primary
//!
//! Serves the JSON API used by secondaries and the UI, the SSE stream of new
//! requests, and the UI assets.

mod error;
mod events;
mod handlers;
mod router;
mod ui;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broker::NotificationBroker;
use crate::manager::RequestManager;

pub use error::ApiError;
pub use events::NEW_REQUEST_EVENT;
pub use router::router;

/// How long shutdown waits for in-flight connections to finish
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// State shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub manager: RequestManager,
    pub broker: NotificationBroker,
    pub source_name: Arc<str>,
    pub keepalive: Duration,
}

impl AppState {
    pub fn new(manager: RequestManager, broker: NotificationBroker, source_name: &str, keepalive: Duration) -> Self {
        Self {
            manager,
            broker,
            source_name: Arc::from(source_name),
            keepalive,
        }
    }
}

/// A running server task
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: AppState,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ServerHandle {
    /// Serve on an already-bound listener
    pub fn spawn(listener: TcpListener, state: AppState, ui_dir: Option<&Path>) -> std::io::Result<Self> {
        let addr = listener.local_addr()?;
        debug!(%addr, ?ui_dir, "ServerHandle::spawn: called");

        let app = router(state.clone(), ui_dir);
        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();

        let task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { signal.cancelled().await })
                .await;
            match result {
                Ok(()) => info!(%addr, "Server stopped"),
                Err(e) => warn!(%addr, error = %e, "Server exited with error"),
            }
        });
        info!(%addr, "Server listening");

        Ok(Self {
            addr,
            shutdown,
            state,
            task: Mutex::new(Some(task)),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting connections, end event streams and release waiting callers
    pub async fn shutdown(&self) {
        debug!(addr = %self.addr, "ServerHandle::shutdown: called");
        self.state.broker.close();
        self.state.manager.abandon_all();
        self.shutdown.cancel();

        let task = self.task.lock().ok().and_then(|mut guard| guard.take());
        if let Some(task) = task
            && tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err()
        {
            warn!(addr = %self.addr, "ServerHandle::shutdown: grace period elapsed");
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
