//! Shared helpers for askhuman integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use askhuman::browser::BrowserLauncher;
use askhuman::{Asker, Config, InstanceCoordinator, Primary, Role};
use requeststore::{Request, RequestFilter, RequestStatus};
use tempfile::TempDir;

/// A port nothing is listening on (at the time of the call)
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().expect("local addr").port()
}

/// Config pointing at `port` with a temp database and fast polling
pub fn test_config(temp: &TempDir, port: u16) -> Arc<Config> {
    let mut config = Config::default();
    config.server.port = port;
    config.server.probe_timeout_ms = 500;
    config.storage.db_path = temp.path().join("app.db");
    config.remote.poll_interval_ms = 50;
    config.remote.poll_timeout_ms = 1_000;
    config.browser.open_on_first_ask = false;
    Arc::new(config)
}

pub fn coordinator(config: &Arc<Config>, source: &str) -> Arc<InstanceCoordinator> {
    Arc::new(InstanceCoordinator::new(config.clone(), source))
}

pub fn asker(coordinator: &Arc<InstanceCoordinator>) -> Arc<Asker> {
    Arc::new(Asker::new(coordinator.clone(), Arc::new(BrowserLauncher::new(false))))
}

/// Resolve and unwrap a primary role
pub async fn expect_primary(coordinator: &InstanceCoordinator) -> Arc<Primary> {
    match coordinator.resolve_role().await.expect("role resolution") {
        Role::Primary(primary) => primary,
        other => panic!("expected primary, got {:?}", other),
    }
}

/// Wait until the primary stores a pending request, and return the newest one
pub async fn wait_for_pending(primary: &Primary) -> Request {
    let filter = RequestFilter::default().status(RequestStatus::Pending);
    for _ in 0..200 {
        let pending = primary.manager.list(filter.clone()).await.expect("list");
        if let Some(request) = pending.into_iter().next() {
            return request;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("no pending request appeared");
}
