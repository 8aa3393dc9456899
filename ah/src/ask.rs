//! Asker - the "ask a human and wait" flow
//!
//! Resolves the process role, then either creates the request locally and
//! waits on its handle (primary) or creates it on the primary and polls
//! (secondary).

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::browser::BrowserLauncher;
use crate::coordinator::{InstanceCoordinator, Role};
use crate::error::AskError;
use crate::manager::{WaitOutcome, validate_ask};

pub struct Asker {
    coordinator: Arc<InstanceCoordinator>,
    browser: Arc<BrowserLauncher>,
}

impl Asker {
    pub fn new(coordinator: Arc<InstanceCoordinator>, browser: Arc<BrowserLauncher>) -> Self {
        Self { coordinator, browser }
    }

    pub fn coordinator(&self) -> &Arc<InstanceCoordinator> {
        &self.coordinator
    }

    /// Ask `question` under `app_name` and block until answered or cancelled
    pub async fn ask(&self, app_name: &str, question: &str, cancel: &CancellationToken) -> Result<String, AskError> {
        debug!(%app_name, "Asker::ask: called");
        validate_ask(app_name, question)?;

        let role = self.coordinator.resolve_role().await?;
        self.browser.open_once(&self.coordinator.config().base_url());

        let source_name = self.coordinator.source_name();
        match role {
            Role::Primary(primary) => {
                let (id, handle) = primary.manager.create_request(source_name, app_name, question).await?;
                primary.broker.publish(id, source_name, app_name, question);
                info!(id, %app_name, "Waiting for answer");

                match handle.wait(cancel).await {
                    WaitOutcome::Answered(text) => Ok(text),
                    WaitOutcome::Cancelled => Err(AskError::Cancelled),
                    WaitOutcome::Abandoned => Err(AskError::Abandoned),
                }
            }
            Role::Secondary(remote) => {
                let id = remote.create_request(source_name, app_name, question).await?;
                info!(id, %app_name, "Waiting for answer via primary");
                remote.poll_response(id, cancel).await
            }
        }
    }
}
