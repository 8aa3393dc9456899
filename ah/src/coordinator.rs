//! Instance Coordinator - decides whether this process is the primary
//!
//! The first process to bind the well-known port becomes the primary: it
//! opens the request store, starts the shared HTTP endpoint and owns the
//! request manager and notification broker. Every later process finds the
//! port taken, confirms through the health probe that an askhuman primary
//! holds it, and becomes a secondary that forwards everything over HTTP.
//!
//! The decision is made once per coordinator and cached, failures included.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use requeststore::Store;
use tokio::net::TcpListener;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::broker::NotificationBroker;
use crate::config::Config;
use crate::error::ResolveError;
use crate::manager::RequestManager;
use crate::remote::{FixedInterval, RemoteClient, probe_health};
use crate::server::{AppState, ServerHandle};

/// Everything the primary owns for the rest of the process lifetime
pub struct Primary {
    pub manager: RequestManager,
    pub broker: NotificationBroker,
    server: ServerHandle,
}

impl Primary {
    /// Address the shared endpoint listens on
    pub fn addr(&self) -> SocketAddr {
        self.server.addr()
    }

    pub async fn shutdown(&self) {
        self.server.shutdown().await;
    }
}

/// Outcome of role resolution
#[derive(Clone)]
pub enum Role {
    Primary(Arc<Primary>),
    Secondary(Arc<RemoteClient>),
}

impl Role {
    pub fn is_primary(&self) -> bool {
        matches!(self, Self::Primary(_))
    }
}

impl fmt::Debug for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary(primary) => f.debug_tuple("Primary").field(&primary.addr()).finish(),
            Self::Secondary(remote) => f.debug_tuple("Secondary").field(&remote.base_url()).finish(),
        }
    }
}

/// Resolves and caches this process's role
pub struct InstanceCoordinator {
    config: Arc<Config>,
    source_name: String,
    role: OnceCell<Result<Role, ResolveError>>,
}

impl InstanceCoordinator {
    pub fn new(config: Arc<Config>, source_name: impl Into<String>) -> Self {
        let source_name = source_name.into();
        debug!(%source_name, port = config.server.port, "InstanceCoordinator::new: called");
        Self {
            config,
            source_name,
            role: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Resolve the role on first call; later and concurrent callers get the cached result
    pub async fn resolve_role(&self) -> Result<Role, ResolveError> {
        self.role.get_or_init(|| self.resolve()).await.clone()
    }

    /// Cached role, if already resolved
    pub fn role(&self) -> Option<Result<Role, ResolveError>> {
        self.role.get().cloned()
    }

    /// Shut down the primary's endpoint, if this process is the primary
    pub async fn shutdown(&self) {
        debug!("InstanceCoordinator::shutdown: called");
        if let Some(Ok(Role::Primary(primary))) = self.role.get() {
            primary.shutdown().await;
        }
    }

    async fn resolve(&self) -> Result<Role, ResolveError> {
        let addr = self
            .config
            .bind_addr()
            .map_err(|e| ResolveError::Startup(format!("{:#}", e)))?;
        debug!(%addr, "InstanceCoordinator::resolve: binding");

        match TcpListener::bind(addr).await {
            Ok(listener) => {
                let primary = self.start_primary(listener).await?;
                info!(addr = %primary.addr(), source_name = %self.source_name, "Resolved role: primary");
                Ok(Role::Primary(primary))
            }
            Err(bind_err) => {
                debug!(%addr, error = %bind_err, "InstanceCoordinator::resolve: bind failed, probing");
                let base_url = self.config.api_url();
                if probe_health(&base_url, self.config.server.probe_timeout()).await {
                    info!(%base_url, "Resolved role: secondary");
                    let policy = Arc::new(FixedInterval::from_config(&self.config.remote));
                    Ok(Role::Secondary(Arc::new(RemoteClient::new(base_url, policy))))
                } else {
                    warn!(port = self.config.server.port, error = %bind_err, "Port held by an unrelated process");
                    Err(ResolveError::PortInUse {
                        port: self.config.server.port,
                        reason: bind_err.to_string(),
                    })
                }
            }
        }
    }

    async fn start_primary(&self, listener: TcpListener) -> Result<Arc<Primary>, ResolveError> {
        let db_path = self.config.storage.db_path.clone();
        let store = tokio::task::spawn_blocking(move || Store::open(db_path))
            .await
            .map_err(|e| ResolveError::Startup(e.to_string()))?
            .map_err(|e| ResolveError::Startup(e.to_string()))?;
        let manager = RequestManager::new(Arc::new(store));
        let broker = NotificationBroker::new(self.config.broker.mailbox_capacity);
        let state = AppState::new(
            manager.clone(),
            broker.clone(),
            &self.source_name,
            self.config.server.sse_keepalive(),
        );
        let server = ServerHandle::spawn(listener, state, self.config.server.ui_dir.as_deref())
            .map_err(|e| ResolveError::Startup(e.to_string()))?;

        Ok(Arc::new(Primary {
            manager,
            broker,
            server,
        }))
    }
}
