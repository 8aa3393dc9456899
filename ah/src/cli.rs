//! CLI command definitions and subcommands

use std::net::{SocketAddr, TcpStream};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::debug;


/// AskHuman - ask a human from any agent, answer in one shared web UI
#[derive(Parser)]
#[command(
    name = "askhuman",
    about = "Ask a human a question from concurrent agent processes through one shared web UI",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Name of the agent integration asking (e.g. the IDE); also a filter for `list`
    #[arg(short, long, global = true)]
    pub source: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the MCP tool server on stdin/stdout (default when --source is given)
    Mcp,

    /// Ask one question and print the answer
    Ask {
        /// Application or project the question is about
        #[arg(short, long)]
        app: String,

        /// The question
        question: String,
    },

    /// List requests known to the running primary
    List {
        /// Filter by application name
        #[arg(short, long)]
        app: Option<String>,

        /// Filter by status (pending, responded)
        #[arg(long)]
        status: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Answer a pending request
    Respond {
        /// Request ID
        id: i64,

        /// Answer text
        answer: String,
    },

    /// Print new questions as they arrive
    Watch,

    /// Check whether a primary is running
    Status,
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("askhuman")
        .join("logs")
        .join("askhuman.log")
}

/// Lightweight check for help display: is anything listening on `port`
pub fn is_port_listening(port: u16) -> bool {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listening = TcpStream::connect_timeout(&addr, Duration::from_millis(200)).is_ok();
    debug!(port, listening, "is_port_listening: checked");
    listening
}

/// Generate the after_help text with primary status on `port` and log location
pub fn generate_after_help(port: u16) -> String {
    debug!(port, "generate_after_help: called");
    let mut help = String::new();

    help.push_str("Primary:\n");
    let (icon, status) = if is_port_listening(port) {
        ("\u{2705}", "port in use")
    } else {
        ("\u{274C}", "not running")
    };
    help.push_str(&format!("  {} {} (port {})\n", icon, status, port));

    help.push('\n');
    help.push_str(&format!("Logs are written to: {}\n", get_log_path().display()));
    help
}

/// Output format for list
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}
