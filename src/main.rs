#![forbid(unsafe_code)]

//! `mcp-stdio` connects to configured MCP servers and exercises them.
//!
//! Spawns every server in the TOML configuration, performs the handshake
//! with each in parallel, then either lists their tools or invokes one tool
//! on one server. All sessions are closed before exit.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use mcp_stdio::{connect_servers, AppError, ClientConfig, Result, SessionRegistry};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "mcp-stdio", about = "MCP client over stdio", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print each server's identity and tool names.
    List,
    /// Invoke one tool and print its content.
    Call {
        /// Configured server name.
        #[arg(long)]
        server: String,
        /// Tool name.
        #[arg(long)]
        tool: String,
        /// Tool arguments as a JSON object.
        #[arg(long, default_value = "{}")]
        arguments: String,
    },
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let config = ClientConfig::load_from_path(&args.config)?;
    if config.servers.is_empty() {
        return Err(AppError::Config("no servers configured".into()));
    }
    info!(servers = config.servers.len(), "configuration loaded");

    let sessions = connect_servers(config.resolved_servers()).await?;
    let outcome = match args.command {
        Command::List => list(&sessions).await,
        Command::Call {
            server,
            tool,
            arguments,
        } => call(&sessions, &server, &tool, &arguments).await,
    };

    for session in sessions.values() {
        session.close();
    }
    outcome
}

async fn list(sessions: &SessionRegistry) -> Result<()> {
    let mut names: Vec<&String> = sessions.keys().collect();
    names.sort();

    for name in names {
        let Some(session) = sessions.get(name) else {
            continue;
        };
        let label = session
            .server_info()
            .and_then(|info| info.name)
            .unwrap_or_else(|| "unknown".to_owned());
        let tools = session.list_tools().await?;
        let tool_names: Vec<&str> = tools
            .iter()
            .filter_map(|tool| tool.get("name").and_then(Value::as_str))
            .collect();
        println!("{name} ({label}): {} tools", tools.len());
        for tool in tool_names {
            println!("  {tool}");
        }
    }
    Ok(())
}

async fn call(sessions: &SessionRegistry, server: &str, tool: &str, arguments: &str) -> Result<()> {
    let session = sessions
        .get(server)
        .ok_or_else(|| AppError::Config(format!("unknown server '{server}'")))?;
    let arguments: Value = serde_json::from_str(arguments)
        .map_err(|err| AppError::Config(format!("invalid --arguments JSON: {err}")))?;

    let content = session.call_tool(tool, arguments).await?;
    let rendered = serde_json::to_string_pretty(&content)
        .map_err(|err| AppError::Protocol(format!("failed to render content: {err}")))?;
    println!("{rendered}");
    Ok(())
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
