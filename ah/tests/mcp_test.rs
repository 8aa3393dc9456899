//! MCP stdio server tests over in-memory pipes

mod common;

use std::sync::Arc;
use std::time::Duration;

use askhuman::mcp::{McpServer, PROTOCOL_VERSION, TOOL_NAME, codes};
use serde_json::{Value, json};
use serial_test::serial;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};
use tokio::task::JoinHandle;

use common::{asker, coordinator, expect_primary, free_port, test_config, wait_for_pending};

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Harness
// =============================================================================

struct Session {
    input: DuplexStream,
    output: Lines<BufReader<DuplexStream>>,
    server: Arc<McpServer>,
    serving: JoinHandle<Result<(), askhuman::McpError>>,
    coordinator: Arc<askhuman::InstanceCoordinator>,
    _temp: TempDir,
}

impl Session {
    fn start() -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let config = test_config(&temp, free_port());
        let coordinator = coordinator(&config, "ide-x");
        let server = Arc::new(McpServer::new(asker(&coordinator)));

        let (input, server_in) = tokio::io::duplex(64 * 1024);
        let (server_out, output) = tokio::io::duplex(64 * 1024);
        let serving = {
            let server = server.clone();
            tokio::spawn(async move { server.serve(server_in, server_out).await })
        };

        Self {
            input,
            output: BufReader::new(output).lines(),
            server,
            serving,
            coordinator,
            _temp: temp,
        }
    }

    async fn send(&mut self, message: Value) {
        self.send_raw(&message.to_string()).await;
    }

    async fn send_raw(&mut self, line: &str) {
        self.send_bytes(line.as_bytes()).await;
    }

    async fn send_bytes(&mut self, line: &[u8]) {
        self.input.write_all(line).await.unwrap();
        self.input.write_all(b"\n").await.unwrap();
        self.input.flush().await.unwrap();
    }

    async fn recv(&mut self) -> Value {
        let line = tokio::time::timeout(TEST_TIMEOUT, self.output.next_line())
            .await
            .expect("timed out waiting for a response")
            .unwrap()
            .expect("output closed");
        serde_json::from_str(&line).unwrap()
    }

    /// Close stdin and wait for the server to stop
    async fn finish(self) {
        let _ = self.close().await;
    }

    /// Like `finish`, keeping the output side for inspection
    async fn close(self) -> Lines<BufReader<DuplexStream>> {
        drop(self.input);
        tokio::time::timeout(TEST_TIMEOUT, self.serving)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
        self.output
    }
}

fn call(id: i64, arguments: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {"name": TOOL_NAME, "arguments": arguments}
    })
}

// =============================================================================
// Protocol
// =============================================================================

#[tokio::test]
#[serial]
async fn test_initialize_and_list_tools() {
    let mut session = Session::start();

    session
        .send(json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}))
        .await;
    let init = session.recv().await;
    assert_eq!(init["id"], 1);
    assert_eq!(init["result"]["protocolVersion"], PROTOCOL_VERSION);
    assert_eq!(init["result"]["serverInfo"]["name"], "askhuman");

    session
        .send(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
        .await;
    session.send(json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"})).await;
    let tools = session.recv().await;
    assert_eq!(tools["id"], 2);
    let tool = &tools["result"]["tools"][0];
    assert_eq!(tool["name"], TOOL_NAME);
    let required = tool["inputSchema"]["required"].as_array().unwrap();
    assert!(required.contains(&json!("question")));
    assert!(required.contains(&json!("app_name")));

    session.send(json!({"jsonrpc": "2.0", "id": "p", "method": "ping"})).await;
    let pong = session.recv().await;
    assert_eq!(pong["id"], "p");
    assert_eq!(pong["result"], json!({}));

    session.finish().await;
}

#[tokio::test]
#[serial]
async fn test_unknown_method_and_parse_error() {
    let mut session = Session::start();

    session.send(json!({"jsonrpc": "2.0", "id": 5, "method": "resources/list"})).await;
    let reply = session.recv().await;
    assert_eq!(reply["id"], 5);
    assert_eq!(reply["error"]["code"], codes::METHOD_NOT_FOUND);

    session.send_raw("{not json").await;
    let reply = session.recv().await;
    assert_eq!(reply["id"], Value::Null);
    assert_eq!(reply["error"]["code"], codes::PARSE_ERROR);

    session.finish().await;
}

#[tokio::test]
#[serial]
async fn test_invalid_utf8_line_is_parse_error() {
    let mut session = Session::start();

    session.send_bytes(b"\xff\xfe garbage").await;
    let reply = session.recv().await;
    assert_eq!(reply["id"], Value::Null);
    assert_eq!(reply["error"]["code"], codes::PARSE_ERROR);

    // The loop keeps serving after a bad line
    session.send(json!({"jsonrpc": "2.0", "id": 2, "method": "ping"})).await;
    let pong = session.recv().await;
    assert_eq!(pong["id"], 2);
    assert_eq!(pong["result"], json!({}));

    session.finish().await;
}

#[tokio::test]
#[serial]
async fn test_call_with_missing_arguments_is_tool_error() {
    let mut session = Session::start();

    session.send(call(1, json!({"app_name": "app1"}))).await;
    let reply = session.recv().await;
    assert_eq!(reply["id"], 1);
    assert_eq!(reply["result"]["isError"], true);
    assert!(reply["result"]["content"][0]["text"].as_str().unwrap().contains("question"));

    session.send(call(2, json!({"question": "pick a color", "app_name": ""}))).await;
    let reply = session.recv().await;
    assert_eq!(reply["id"], 2);
    assert_eq!(reply["result"]["isError"], true);

    session.finish().await;
}

// =============================================================================
// Asking
// =============================================================================

#[tokio::test]
#[serial]
async fn test_tool_call_returns_human_answer() {
    let mut session = Session::start();

    session
        .send(call(7, json!({"question": "pick a color", "app_name": "app1"})))
        .await;

    let primary = expect_primary(&session.coordinator).await;
    let request = wait_for_pending(&primary).await;
    assert_eq!(request.source_name, "ide-x");
    assert_eq!(request.app_name, "app1");
    assert_eq!(session.server.in_flight(), 1);

    primary.manager.respond(request.id, "blue").await.unwrap();

    let reply = session.recv().await;
    assert_eq!(reply["id"], 7);
    assert_eq!(reply["result"]["content"][0]["type"], "text");
    assert_eq!(reply["result"]["content"][0]["text"], "blue");
    assert!(reply["result"].get("isError").is_none());
    assert_eq!(session.server.in_flight(), 0);

    session.finish().await;
}

#[tokio::test]
#[serial]
async fn test_concurrent_calls_answered_out_of_order() {
    let mut session = Session::start();

    session.send(call(1, json!({"question": "first?", "app_name": "app"}))).await;
    session.send(call(2, json!({"question": "second?", "app_name": "app"}))).await;

    let primary = expect_primary(&session.coordinator).await;
    let mut pending = Vec::new();
    for _ in 0..200 {
        pending = primary
            .manager
            .list(requeststore::RequestFilter::default().status(requeststore::RequestStatus::Pending))
            .await
            .unwrap();
        if pending.len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(pending.len(), 2);

    let second = pending.iter().find(|r| r.question == "second?").unwrap();
    primary.manager.respond(second.id, "two").await.unwrap();
    let reply = session.recv().await;
    assert_eq!(reply["id"], 2);
    assert_eq!(reply["result"]["content"][0]["text"], "two");

    let first = pending.iter().find(|r| r.question == "first?").unwrap();
    primary.manager.respond(first.id, "one").await.unwrap();
    let reply = session.recv().await;
    assert_eq!(reply["id"], 1);
    assert_eq!(reply["result"]["content"][0]["text"], "one");

    session.finish().await;
}

#[tokio::test]
#[serial]
async fn test_duplicate_id_in_flight_is_rejected() {
    let mut session = Session::start();

    session.send(call(1, json!({"question": "first?", "app_name": "app"}))).await;
    let primary = expect_primary(&session.coordinator).await;
    let request = wait_for_pending(&primary).await;

    session.send(call(1, json!({"question": "again?", "app_name": "app"}))).await;
    let reply = session.recv().await;
    assert_eq!(reply["id"], 1);
    assert_eq!(reply["error"]["code"], codes::INVALID_REQUEST);
    assert_eq!(session.server.in_flight(), 1);

    // The original call still owns the id and gets its answer
    primary.manager.respond(request.id, "one").await.unwrap();
    let reply = session.recv().await;
    assert_eq!(reply["id"], 1);
    assert_eq!(reply["result"]["content"][0]["text"], "one");
    assert_eq!(session.server.in_flight(), 0);

    let pending = primary
        .manager
        .list(requeststore::RequestFilter::default().status(requeststore::RequestStatus::Pending))
        .await
        .unwrap();
    assert!(pending.is_empty());

    session.finish().await;
}

#[tokio::test]
#[serial]
async fn test_cancelled_call_sends_no_response() {
    let mut session = Session::start();

    session.send(call(3, json!({"question": "q", "app_name": "app"}))).await;
    let primary = expect_primary(&session.coordinator).await;
    let request = wait_for_pending(&primary).await;

    session
        .send(json!({
            "jsonrpc": "2.0",
            "method": "notifications/cancelled",
            "params": {"requestId": 3, "reason": "user aborted"}
        }))
        .await;

    // The next line out is the ping reply, not a result for call 3
    session.send(json!({"jsonrpc": "2.0", "id": 4, "method": "ping"})).await;
    let reply = session.recv().await;
    assert_eq!(reply["id"], 4);

    // The request stays pending and can still be answered
    let stored = primary.manager.get(request.id).await.unwrap();
    assert!(stored.is_pending());
    for _ in 0..100 {
        if primary.manager.pending_waiters() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(primary.manager.pending_waiters(), 0);
    primary.manager.respond(request.id, "late").await.unwrap();

    session.finish().await;
}

#[tokio::test]
#[serial]
async fn test_eof_cancels_outstanding_calls() {
    let mut session = Session::start();

    session.send(call(9, json!({"question": "q", "app_name": "app"}))).await;
    let primary = expect_primary(&session.coordinator).await;
    wait_for_pending(&primary).await;

    let mut output = session.close().await;
    // No response for the abandoned call, just end of stream
    let next = tokio::time::timeout(TEST_TIMEOUT, output.next_line()).await.unwrap().unwrap();
    assert!(next.is_none());
}
