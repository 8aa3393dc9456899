//! RequestManager - create, answer and look up requests

use std::sync::Arc;

use chrono::Utc;
use requeststore::{NewRequest, Request, RequestFilter, RequestId, RequestStatus, Store};
use tokio::sync::oneshot;
use tracing::{debug, info};

use super::handle::{Correlations, WaitHandle};
use crate::error::AskError;

/// Owns the store and the correlation map for in-flight callers
#[derive(Clone)]
pub struct RequestManager {
    store: Arc<Store>,
    correlations: Arc<Correlations>,
}

impl RequestManager {
    pub fn new(store: Arc<Store>) -> Self {
        debug!("RequestManager::new: called");
        Self {
            store,
            correlations: Arc::new(Correlations::default()),
        }
    }

    /// Insert a `pending` record and register a wait handle for it
    ///
    /// Nothing is registered when the store write fails.
    pub async fn create_request(
        &self,
        source_name: &str,
        app_name: &str,
        question: &str,
    ) -> Result<(RequestId, WaitHandle), AskError> {
        debug!(%source_name, %app_name, "RequestManager::create_request: called");
        validate_ask(app_name, question)?;

        let store = self.store.clone();
        let new = NewRequest::new(source_name, app_name, question);
        let request = tokio::task::spawn_blocking(move || store.create(&new)).await??;
        info!(id = request.id, %source_name, %app_name, "Request created");

        let handle = self.register(request.id).await?;
        Ok((request.id, handle))
    }

    /// Correlate a stored request with a new wait handle
    ///
    /// An answer may land between the insert and the registration; the record
    /// is re-read afterwards and delivered here if `respond` found no caller.
    async fn register(&self, id: RequestId) -> Result<WaitHandle, AskError> {
        let (tx, rx) = oneshot::channel();
        let handle = WaitHandle::new(id, rx, Arc::downgrade(&self.correlations));
        if !self.correlations.insert(id, tx) {
            debug!(id, "RequestManager::register: manager shut down, caller abandoned");
            return Ok(handle);
        }

        let store = self.store.clone();
        let record = tokio::task::spawn_blocking(move || store.get(id)).await??;
        if let Some(record) = record
            && record.status == RequestStatus::Responded
            && let Some(tx) = self.correlations.take(id)
        {
            debug!(id, "RequestManager::register: answered before registration");
            if tx.send(record.response).is_err() {
                debug!(id, "RequestManager::register: caller already gone");
            }
        }
        Ok(handle)
    }

    /// Record the answer and wake the waiting caller, if still present
    ///
    /// The store's conditional update decides; a request is answered at most once.
    pub async fn respond(&self, id: RequestId, text: &str) -> Result<(), AskError> {
        debug!(id, "RequestManager::respond: called");
        if text.trim().is_empty() {
            return Err(AskError::Validation("response is required".to_string()));
        }

        let store = self.store.clone();
        let answer = text.to_string();
        let updated = tokio::task::spawn_blocking(move || store.respond_if_pending(id, &answer, Utc::now())).await??;
        if !updated {
            debug!(id, "RequestManager::respond: no pending record matched");
            return Err(AskError::NotPending(id));
        }
        info!(id, "Request responded");

        match self.correlations.take(id) {
            Some(tx) => {
                if tx.send(text.to_string()).is_err() {
                    debug!(id, "RequestManager::respond: caller already gone");
                }
            }
            None => debug!(id, "RequestManager::respond: no caller waiting"),
        }
        Ok(())
    }

    /// Fetch one request
    pub async fn get(&self, id: RequestId) -> Result<Request, AskError> {
        debug!(id, "RequestManager::get: called");
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.get(id))
            .await??
            .ok_or(AskError::NotFound(id))
    }

    /// List requests, newest first
    pub async fn list(&self, filter: RequestFilter) -> Result<Vec<Request>, AskError> {
        debug!(?filter, "RequestManager::list: called");
        let store = self.store.clone();
        Ok(tokio::task::spawn_blocking(move || store.list(&filter)).await??)
    }

    /// Number of callers currently registered for an answer
    pub fn pending_waiters(&self) -> usize {
        self.correlations.len()
    }

    /// Release every waiting caller with `Abandoned`
    pub fn abandon_all(&self) {
        let count = self.correlations.clear();
        if count > 0 {
            info!(count, "Abandoned waiting callers");
        }
    }
}

/// Both the context label and the question must be present
pub fn validate_ask(app_name: &str, question: &str) -> Result<(), AskError> {
    if app_name.trim().is_empty() {
        return Err(AskError::Validation("app_name is required".to_string()));
    }
    if question.trim().is_empty() {
        return Err(AskError::Validation("question is required".to_string()));
    }
    Ok(())
}
