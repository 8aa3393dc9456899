//! AskHuman - ask a human from concurrent agent processes
//!
//! CLI entry point: MCP stdio server, one-shot ask, and operator commands
//! against the running primary.

use std::fs;
use std::sync::Arc;

use clap::{CommandFactory, FromArgMatches};
use colored::Colorize;
use eyre::{Context, Result};
use futures::StreamExt;
use reqwest_eventsource::Event;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use askhuman::broker::NewRequestEvent;
use askhuman::browser::BrowserLauncher;
use askhuman::cli::{Cli, Command, OutputFormat, generate_after_help, get_log_path};
use askhuman::config::Config;
use askhuman::mcp::McpServer;
use askhuman::remote::{FixedInterval, RemoteClient, probe_health};
use askhuman::server::NEW_REQUEST_EVENT;
use askhuman::{AskError, Asker, InstanceCoordinator};
use requeststore::{Request, RequestFilter, RequestStatus};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    // Several processes share this file, so append rather than truncate
    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!(pid = std::process::id(), "Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cmd = Cli::command().after_help(generate_after_help(Config::load_port(None)));
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Arc::new(Config::load(cli.config.as_ref()).context("Failed to load configuration")?);
    info!(port = config.server.port, db = %config.storage.db_path.display(), "AskHuman loaded config");

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Some(Command::Mcp) => cmd_mcp(config, require_source(cli.source)?).await,
        Some(Command::Ask { app, question }) => cmd_ask(config, require_source(cli.source)?, &app, &question).await,
        Some(Command::List { app, status, format }) => cmd_list(&config, cli.source, app, status, format).await,
        Some(Command::Respond { id, answer }) => cmd_respond(&config, id, &answer).await,
        Some(Command::Watch) => cmd_watch(&config).await,
        Some(Command::Status) => cmd_status(&config).await,
        None => match cli.source {
            Some(source) => {
                debug!("main: no command but --source given, running MCP server");
                cmd_mcp(config, source).await
            }
            None => {
                Cli::command().after_help(generate_after_help(config.server.port)).print_help()?;
                Ok(())
            }
        },
    }
}

fn require_source(source: Option<String>) -> Result<String> {
    source
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| eyre::eyre!("--source <name> is required"))
}

fn build_asker(config: Arc<Config>, source: String) -> Arc<Asker> {
    let browser = Arc::new(BrowserLauncher::from_config(&config.browser));
    let coordinator = Arc::new(InstanceCoordinator::new(config, source));
    Arc::new(Asker::new(coordinator, browser))
}

fn remote_client(config: &Config) -> RemoteClient {
    RemoteClient::new(config.api_url(), Arc::new(FixedInterval::from_config(&config.remote)))
}

/// Fail with a readable message when no primary answers on the configured port
async fn require_primary(config: &Config) -> Result<RemoteClient> {
    let client = remote_client(config);
    if !probe_health(client.base_url(), config.server.probe_timeout()).await {
        eyre::bail!("No askhuman primary is running on port {}", config.server.port);
    }
    Ok(client)
}

/// Run the MCP tool server on stdin/stdout
async fn cmd_mcp(config: Arc<Config>, source: String) -> Result<()> {
    info!(%source, "Starting MCP server");
    let server = McpServer::new(build_asker(config, source));

    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            shutdown.cancel();
        }
    });

    server
        .serve(tokio::io::stdin(), tokio::io::stdout())
        .await
        .context("MCP server failed")?;
    info!("MCP server stopped");
    Ok(())
}

/// Ask one question and print the answer
async fn cmd_ask(config: Arc<Config>, source: String, app: &str, question: &str) -> Result<()> {
    debug!(%source, %app, "cmd_ask: called");
    let asker = build_asker(config, source);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    println!("{} {}", "Waiting for an answer to:".dimmed(), question.bold());
    let result = asker.ask(app, question, &cancel).await;
    asker.coordinator().shutdown().await;

    match result {
        Ok(answer) => {
            println!("{}", answer);
            Ok(())
        }
        Err(AskError::Cancelled) => {
            println!("{}", "Cancelled".yellow());
            Ok(())
        }
        Err(e) => Err(e).context("Failed to ask question"),
    }
}

/// List requests on the running primary
async fn cmd_list(
    config: &Config,
    source: Option<String>,
    app: Option<String>,
    status: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    debug!(?source, ?app, ?status, %format, "cmd_list: called");
    let mut filter = RequestFilter {
        source_name: source,
        app_name: app,
        status: None,
    };
    if let Some(status) = status {
        filter.status = Some(status.parse::<RequestStatus>().map_err(|e| eyre::eyre!(e))?);
    }

    let client = require_primary(config).await?;
    let requests = client.list(&filter).await.context("Failed to list requests")?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&requests)?),
        OutputFormat::Text => print_requests(&requests),
    }
    Ok(())
}

fn print_requests(requests: &[Request]) {
    if requests.is_empty() {
        println!("No requests");
        return;
    }
    for request in requests {
        let status = match request.status {
            RequestStatus::Pending => request.status.to_string().yellow(),
            RequestStatus::Responded => request.status.to_string().green(),
        };
        println!(
            "{} [{}] {}/{} {}",
            format!("#{}", request.id).bold(),
            status,
            request.source_name,
            request.app_name,
            request.created_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
        );
        println!("    Q: {}", request.question);
        if !request.is_pending() {
            println!("    A: {}", request.response);
        }
    }
}

/// Answer a request through the running primary
async fn cmd_respond(config: &Config, id: i64, answer: &str) -> Result<()> {
    debug!(id, "cmd_respond: called");
    let client = require_primary(config).await?;
    client
        .respond(id, answer)
        .await
        .context(format!("Failed to respond to request {}", id))?;
    println!("{} request #{}", "Answered".green(), id);
    Ok(())
}

/// Tail the new-request event stream
async fn cmd_watch(config: &Config) -> Result<()> {
    debug!("cmd_watch: called");
    let client = require_primary(config).await?;
    let mut events = client.events().context("Failed to open event stream")?;

    println!("Watching {} for new questions (Ctrl+C to stop)", client.base_url());
    loop {
        let event = tokio::select! {
            event = events.next() => event,
            _ = tokio::signal::ctrl_c() => None,
        };
        match event {
            Some(Ok(Event::Open)) => debug!("cmd_watch: stream open"),
            Some(Ok(Event::Message(msg))) if msg.event == NEW_REQUEST_EVENT => {
                match serde_json::from_str::<NewRequestEvent>(&msg.data) {
                    Ok(req) => println!(
                        "{} {}/{}: {}",
                        format!("#{}", req.id).bold(),
                        req.source_name,
                        req.app_name,
                        req.question
                    ),
                    Err(e) => warn!(error = %e, "cmd_watch: malformed event"),
                }
            }
            Some(Ok(Event::Message(msg))) => debug!(event = %msg.event, "cmd_watch: ignoring event"),
            Some(Err(e)) => {
                events.close();
                return Err(eyre::eyre!("Event stream failed: {}", e));
            }
            None => break,
        }
    }
    events.close();
    Ok(())
}

/// Report whether a primary owns the port
async fn cmd_status(config: &Config) -> Result<()> {
    debug!("cmd_status: called");
    let client = remote_client(config);
    if probe_health(client.base_url(), config.server.probe_timeout()).await {
        let source = client.source().await.unwrap_or_else(|_| "unknown".to_string());
        println!(
            "{} primary running at {} (source: {})",
            "\u{2705}".green(),
            config.base_url(),
            source
        );
    } else {
        println!("{} no primary running on port {}", "\u{274C}".red(), config.server.port);
    }
    println!("Database: {}", config.storage.db_path.display());
    println!("Logs: {}", get_log_path().display());
    Ok(())
}
