//! McpServer - line-oriented JSON-RPC loop over stdin/stdout

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::messages::{
    CallParams, CancelledParams, RpcRequest, RpcResponse, TOOL_NAME, ToolResult, codes, initialize_result,
    tools_list_result,
};
use crate::ask::Asker;
use crate::error::{AskError, McpError};

/// Queue of responses waiting for the writer
const OUTBOX_CAPACITY: usize = 64;

/// JSON-RPC id -> (call number, cancellation token) of each running tool call
type InFlight = Arc<Mutex<HashMap<String, (u64, CancellationToken)>>>;

fn lock(in_flight: &InFlight) -> MutexGuard<'_, HashMap<String, (u64, CancellationToken)>> {
    in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Serves the `ask_human` tool; every call runs as its own task
pub struct McpServer {
    asker: Arc<Asker>,
    in_flight: InFlight,
    next_call: AtomicU64,
    shutdown: CancellationToken,
}

impl McpServer {
    pub fn new(asker: Arc<Asker>) -> Self {
        Self {
            asker,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            next_call: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that cancels every in-flight call when fired
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until `reader` reaches EOF, then cancel outstanding calls and stop the primary
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<(), McpError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        debug!("McpServer::serve: called");
        let (tx, rx) = mpsc::channel::<RpcResponse>(OUTBOX_CAPACITY);
        let writer_task = tokio::spawn(write_responses(writer, rx));

        let mut tasks = JoinSet::new();
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        let mut input_error = None;
        loop {
            buf.clear();
            let read = tokio::select! {
                read = reader.read_until(b'\n', &mut buf) => read,
                _ = self.shutdown.cancelled() => Ok(0),
            };
            match read {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "MCP input failed, shutting down");
                    input_error = Some(e);
                    break;
                }
            }

            match std::str::from_utf8(&buf) {
                Ok(line) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        self.handle_line(line, &tx, &mut tasks).await;
                    }
                }
                Err(e) => {
                    debug!(error = %e, "McpServer::serve: line is not UTF-8");
                    let message = format!("Parse error: {}", e);
                    send(&tx, RpcResponse::failure(Value::Null, codes::PARSE_ERROR, message)).await;
                }
            }
            while tasks.try_join_next().is_some() {}
        }

        info!(in_flight = tasks.len(), "MCP input closed, shutting down");
        self.shutdown.cancel();
        while tasks.join_next().await.is_some() {}
        self.asker.coordinator().shutdown().await;

        drop(tx);
        writer_task.await.map_err(|e| McpError::Writer(e.to_string()))??;
        match input_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    async fn handle_line(&self, line: &str, tx: &mpsc::Sender<RpcResponse>, tasks: &mut JoinSet<()>) {
        let request: RpcRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, "McpServer::handle_line: unparsable message");
                send(tx, RpcResponse::failure(Value::Null, codes::PARSE_ERROR, format!("Parse error: {}", e))).await;
                return;
            }
        };
        debug!(method = %request.method, id = ?request.id, "McpServer::handle_line: request");

        match request.method.as_str() {
            "initialize" => self.reply(tx, &request, initialize_result()).await,
            "notifications/initialized" => {}
            "ping" => self.reply(tx, &request, json!({})).await,
            "tools/list" => self.reply(tx, &request, tools_list_result()).await,
            "tools/call" => self.start_call(request, tx, tasks).await,
            "notifications/cancelled" => self.cancel_call(request.params),
            method => {
                if let Some(id) = request.id {
                    send(
                        tx,
                        RpcResponse::failure(id, codes::METHOD_NOT_FOUND, format!("Method not found: {}", method)),
                    )
                    .await;
                } else {
                    debug!(%method, "McpServer::handle_line: ignoring unknown notification");
                }
            }
        }
    }

    async fn reply(&self, tx: &mpsc::Sender<RpcResponse>, request: &RpcRequest, result: Value) {
        if let Some(id) = &request.id {
            send(tx, RpcResponse::success(id.clone(), result)).await;
        }
    }

    async fn start_call(&self, request: RpcRequest, tx: &mpsc::Sender<RpcResponse>, tasks: &mut JoinSet<()>) {
        let Some(id) = request.id else {
            warn!("tools/call without id, ignoring");
            return;
        };
        let params: CallParams = match serde_json::from_value(request.params) {
            Ok(params) => params,
            Err(e) => {
                send(tx, RpcResponse::failure(id, codes::INVALID_PARAMS, format!("Invalid params: {}", e))).await;
                return;
            }
        };
        if params.name != TOOL_NAME {
            send(tx, RpcResponse::failure(id, codes::INVALID_PARAMS, format!("Unknown tool: {}", params.name))).await;
            return;
        }

        let Some(question) = params.string_arg("question").map(str::to_string) else {
            send(tx, tool_response(id, ToolResult::error("question is required"))).await;
            return;
        };
        let Some(app_name) = params.string_arg("app_name").map(str::to_string) else {
            send(tx, tool_response(id, ToolResult::error("app_name is required"))).await;
            return;
        };

        let key = id.to_string();
        let token = self.shutdown.child_token();
        let call = self.next_call.fetch_add(1, Ordering::Relaxed);
        let registered = match lock(&self.in_flight).entry(key.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert((call, token.clone()));
                true
            }
        };
        if !registered {
            warn!(%key, "tools/call id already in flight, rejecting");
            let message = format!("Request id {} is already in flight", key);
            send(tx, RpcResponse::failure(id, codes::INVALID_REQUEST, message)).await;
            return;
        }
        debug!(%key, call, %app_name, "McpServer::start_call: spawning ask");

        let asker = self.asker.clone();
        let in_flight = self.in_flight.clone();
        let tx = tx.clone();
        tasks.spawn(async move {
            let result = asker.ask(&app_name, &question, &token).await;
            {
                let mut in_flight = lock(&in_flight);
                // A cancelled call's id may already belong to a newer call
                if in_flight.get(&key).is_some_and(|(owner, _)| *owner == call) {
                    in_flight.remove(&key);
                }
            }

            let response = match result {
                Ok(answer) => tool_response(id, ToolResult::text(answer)),
                Err(e) if e.is_cancelled() => {
                    debug!(%key, "ask cancelled, no response sent");
                    return;
                }
                Err(AskError::Validation(message)) => tool_response(id, ToolResult::error(message)),
                Err(e) => {
                    warn!(%key, error = %e, "ask failed");
                    RpcResponse::failure(id, codes::INTERNAL_ERROR, e.to_string())
                }
            };
            send(&tx, response).await;
        });
    }

    fn cancel_call(&self, params: Value) {
        let params: CancelledParams = match serde_json::from_value(params) {
            Ok(params) => params,
            Err(e) => {
                debug!(error = %e, "McpServer::cancel_call: malformed params");
                return;
            }
        };
        let key = params.request_id.to_string();
        match lock(&self.in_flight).remove(&key) {
            Some((_, token)) => {
                info!(%key, reason = ?params.reason, "Cancelling tool call");
                token.cancel();
            }
            None => debug!(%key, "McpServer::cancel_call: no such call in flight"),
        }
    }

    /// Number of tool calls still waiting for an answer
    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }
}

fn tool_response(id: Value, result: ToolResult) -> RpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => RpcResponse::success(id, value),
        Err(e) => RpcResponse::failure(id, codes::INTERNAL_ERROR, e.to_string()),
    }
}

async fn send(tx: &mpsc::Sender<RpcResponse>, response: RpcResponse) {
    if tx.send(response).await.is_err() {
        debug!("send: writer gone, dropping response");
    }
}

async fn write_responses<W>(mut writer: W, mut rx: mpsc::Receiver<RpcResponse>) -> Result<(), McpError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let mut line = serde_json::to_string(&response)?;
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        debug!(id = %response.id, "write_responses: sent");
    }
    Ok(())
}
