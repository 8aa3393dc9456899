//! RemoteClient - the primary's API as seen from a secondary

use std::sync::Arc;
use std::time::Duration;

use requeststore::{Request, RequestFilter, RequestId};
use reqwest_eventsource::EventSource;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::policy::PollPolicy;
use crate::error::AskError;
use crate::wire::{CreateRequestBody, CreatedBody, ErrorBody, HealthBody, PollBody, RespondBody, SourceBody};

/// HTTP client for a running primary
#[derive(Debug, Clone)]
pub struct RemoteClient {
    http: reqwest::Client,
    base_url: String,
    policy: Arc<dyn PollPolicy>,
}

impl RemoteClient {
    pub fn new(base_url: impl Into<String>, policy: Arc<dyn PollPolicy>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        debug!(%base_url, ?policy, "RemoteClient::new: called");
        Self {
            http: reqwest::Client::new(),
            base_url,
            policy,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Create a request on the primary; any failure is final for this call
    pub async fn create_request(&self, source_name: &str, app_name: &str, question: &str) -> Result<RequestId, AskError> {
        debug!(%source_name, %app_name, "RemoteClient::create_request: called");
        let body = CreateRequestBody {
            source_name: source_name.to_string(),
            app_name: app_name.to_string(),
            question: question.to_string(),
        };
        let response = self
            .http
            .post(self.url("/api/requests"))
            .timeout(self.policy.attempt_timeout())
            .json(&body)
            .send()
            .await?;
        let created: CreatedBody = ensure_success(response).await?.json().await?;
        info!(id = created.id, "Request created on primary");
        Ok(created.id)
    }

    /// Poll until the request is answered or `cancel` fires
    ///
    /// Transport errors, error statuses and malformed bodies are logged and
    /// polling continues. There is no attempt limit.
    pub async fn poll_response(&self, id: RequestId, cancel: &CancellationToken) -> Result<String, AskError> {
        debug!(id, "RemoteClient::poll_response: called");
        let mut attempt: u32 = 0;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AskError::Cancelled),
                _ = tokio::time::sleep(self.policy.delay(attempt)) => {}
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AskError::Cancelled),
                result = self.poll_once(id) => result,
            };
            attempt = attempt.saturating_add(1);

            match result {
                Ok(body) => match body.answer() {
                    Some(answer) => {
                        info!(id, attempt, "Answer received from primary");
                        return Ok(answer.to_string());
                    }
                    None => debug!(id, attempt, status = %body.status, "RemoteClient::poll_response: not answered yet"),
                },
                Err(e) => warn!(id, attempt, error = %e, "Poll attempt failed, retrying"),
            }
        }
    }

    /// One poll round-trip
    pub async fn poll_once(&self, id: RequestId) -> Result<PollBody, AskError> {
        let response = self
            .http
            .get(self.url(&format!("/api/requests/{}/poll", id)))
            .timeout(self.policy.attempt_timeout())
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }

    /// Submit an answer
    pub async fn respond(&self, id: RequestId, text: &str) -> Result<(), AskError> {
        debug!(id, "RemoteClient::respond: called");
        let response = self
            .http
            .post(self.url(&format!("/api/requests/{}/respond", id)))
            .timeout(self.policy.attempt_timeout())
            .json(&RespondBody {
                response: text.to_string(),
            })
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    pub async fn get(&self, id: RequestId) -> Result<Request, AskError> {
        debug!(id, "RemoteClient::get: called");
        let response = self
            .http
            .get(self.url(&format!("/api/requests/{}", id)))
            .timeout(self.policy.attempt_timeout())
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }

    pub async fn list(&self, filter: &RequestFilter) -> Result<Vec<Request>, AskError> {
        debug!(?filter, "RemoteClient::list: called");
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(source_name) = &filter.source_name {
            query.push(("source_name", source_name.clone()));
        }
        if let Some(app_name) = &filter.app_name {
            query.push(("app_name", app_name.clone()));
        }
        if let Some(status) = filter.status {
            query.push(("status", status.to_string()));
        }

        let response = self
            .http
            .get(self.url("/api/requests"))
            .query(&query)
            .timeout(self.policy.attempt_timeout())
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }

    /// Source name of the process that owns the primary
    pub async fn source(&self) -> Result<String, AskError> {
        let response = self
            .http
            .get(self.url("/api/source"))
            .timeout(self.policy.attempt_timeout())
            .send()
            .await?;
        let body: SourceBody = ensure_success(response).await?.json().await?;
        Ok(body.source_name)
    }

    /// Open the new-request event stream
    pub fn events(&self) -> Result<EventSource, AskError> {
        debug!("RemoteClient::events: called");
        EventSource::new(self.http.get(self.url("/api/events"))).map_err(|e| AskError::Internal(e.to_string()))
    }
}

/// Map a non-success status to `RemoteStatus`, using the `{"error"}` body when present
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, AskError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error)
        .unwrap_or(text);
    Err(AskError::RemoteStatus {
        status: status.as_u16(),
        message,
    })
}

/// True when an askhuman primary answers the health probe at `base_url`
pub async fn probe_health(base_url: &str, timeout: Duration) -> bool {
    let url = format!("{}/api/health", base_url.trim_end_matches('/'));
    debug!(%url, ?timeout, "probe_health: called");

    let client = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "probe_health: failed to build client");
            return false;
        }
    };

    let healthy = match client.get(&url).send().await {
        Ok(response) => response
            .json::<HealthBody>()
            .await
            .map(|body| body.is_askhuman())
            .unwrap_or(false),
        Err(e) => {
            debug!(error = %e, "probe_health: request failed");
            false
        }
    };
    debug!(healthy, "probe_health: done");
    healthy
}
