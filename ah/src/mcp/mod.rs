//! MCP tool server on stdio
//!
//! Exposes a single `ask_human` tool to an agent host. Each tool call runs the
//! ask flow concurrently and can be cancelled by the host.

mod messages;
mod server;

pub use messages::{PROTOCOL_VERSION, RpcRequest, RpcResponse, TOOL_NAME, ToolResult, codes};
pub use server::McpServer;
