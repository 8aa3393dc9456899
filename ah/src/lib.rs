//! AskHuman - ask a human, from any number of agent processes, through one web UI
//!
//! Several agent hosts on the same machine each run their own askhuman
//! process. The first to bind the well-known port becomes the primary and
//! serves the shared UI and API; the rest become secondaries and forward
//! their questions to it over HTTP.
//!
//! ```text
//!  agent host ──stdio──▶ McpServer ──▶ Asker ──▶ InstanceCoordinator
//!                                                  │
//!                         ┌────────────────────────┴──────────────┐
//!                         ▼ primary                               ▼ secondary
//!              RequestManager + NotificationBroker          RemoteClient
//!                  │                 │                            │ HTTP
//!              requeststore     SSE observers  ◀── axum server ◀──┘
//! ```

pub mod ask;
pub mod broker;
pub mod browser;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod manager;
pub mod mcp;
pub mod remote;
pub mod server;
pub mod wire;

pub use ask::Asker;
pub use broker::{NotificationBroker, Subscription};
pub use config::Config;
pub use coordinator::{InstanceCoordinator, Primary, Role};
pub use error::{AskError, McpError, ResolveError};
pub use manager::{RequestManager, WaitHandle, WaitOutcome};
pub use remote::{FixedInterval, PollPolicy, RemoteClient};
