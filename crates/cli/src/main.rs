mod config;
mod echo;
mod error;
mod host;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand};
use journal::{Direction, LogEntry, MessageLog};
use runtime::{ConnectionEvent, ConnectionManager, Dispatcher, PanelState, catalog};
use serde_json::Value;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use config::Config;
use error::{Error, Result};
use host::ProcessRegistry;

const CONFIG_FILE: &str = "cmdrelay.toml";

#[derive(Parser)]
#[command(name = "cmdrelay")]
#[command(about = "Expose notebook commands as tools to a remote controller", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the peer and relay tool executions until interrupted
    Run {
        /// Execute this tool once the tools are registered
        #[arg(long)]
        exec: Option<String>,
        /// JSON parameters for --exec
        #[arg(long, default_value = "{}", requires = "exec")]
        params: String,
        /// Ask the peer to execute --exec instead of running it locally
        #[arg(long, requires = "exec")]
        remote: bool,
    },
    /// List the tools that would be registered
    Tools,
    /// Serve a WebSocket echo peer for local testing
    Echo {
        /// Port to listen on
        #[arg(short, long, default_value = "8888")]
        port: u16,
    },
}

struct Execution {
    tool_id: String,
    parameters: Value,
    remote: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run {
            exec,
            params,
            remote,
        }) => {
            let execution = exec
                .map(|tool_id| {
                    serde_json::from_str(&params)
                        .map(|parameters| Execution {
                            tool_id,
                            parameters,
                            remote,
                        })
                        .map_err(Error::InvalidParams)
                })
                .transpose()?;
            cmd_run(&cli.config, execution).await
        }
        None => cmd_run(&cli.config, None).await,
        Some(Commands::Tools) => cmd_tools(&cli.config),
        Some(Commands::Echo { port }) => cmd_echo(port).await,
    }
}

async fn cmd_run(config_path: &Path, mut execution: Option<Execution>) -> Result<()> {
    println!("cmdrelay v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(config_path)?;
    let connection_config = config.connection_config()?;
    let registry = Arc::new(ProcessRegistry::new(config.commands.clone()));
    let panel = Arc::new(PanelState::new(MessageLog::with_capacity(config.log.capacity)));

    let (connection, mut events) = ConnectionManager::new(connection_config);
    let dispatcher = Dispatcher::new(registry, connection.clone(), panel.clone());

    println!("Peer: {}", connection.url());
    println!("Commands: {}", config.commands.len());
    println!("Press Ctrl+C to stop.\n");

    connection.connect();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut outcome = Ok(());
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let opened = matches!(event, ConnectionEvent::Opened(_));
                let exhausted = event == ConnectionEvent::RetriesExhausted;
                dispatcher.handle_event(event).await;

                if opened {
                    if let Some(Execution { tool_id, parameters, remote }) = execution.take() {
                        if remote {
                            dispatcher.execute_remote(&tool_id, parameters);
                        } else {
                            dispatcher.spawn_local(&tool_id, parameters);
                        }
                    }
                }
                if exhausted {
                    outcome = Err(Error::RetriesExhausted {
                        url: connection.url().to_string(),
                    });
                    break;
                }
            }
            _ = &mut shutdown => break,
        }
    }

    connection.close();
    print_log(panel.log());
    outcome
}

fn cmd_tools(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let registry = ProcessRegistry::new(config.commands);
    let tools = catalog::build(&registry);

    if tools.is_empty() {
        println!("No commands configured.");
        return Ok(());
    }

    println!("{:<32}  {:<24}  {:<8}  CAPTION", "TOOL ID", "LABEL", "ENABLED");
    println!("{}", "-".repeat(80));

    for tool in tools {
        let enabled = if tool.is_enabled { "yes" } else { "no" };
        println!(
            "{:<32}  {:<24}  {:<8}  {}",
            tool.id, tool.label, enabled, tool.caption
        );
    }

    Ok(())
}

async fn cmd_echo(port: u16) -> Result<()> {
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    println!(
        "Echo peer at ws://{}/{}",
        listener.local_addr()?,
        protocol::ENDPOINT_PATH
    );
    echo::serve(listener).await?;
    Ok(())
}

fn print_log(log: &MessageLog) {
    let entries = log.entries();
    if entries.is_empty() {
        return;
    }

    println!("\nMessage log ({} entries):", entries.len());
    for entry in &entries {
        print_entry(entry);
    }
}

fn print_entry(entry: &LogEntry) {
    let time = Local
        .from_utc_datetime(&entry.timestamp.naive_utc())
        .format("%H:%M:%S");
    let arrow = match entry.direction {
        Direction::Sent => "->",
        Direction::Received => "<-",
    };

    // Truncate long payloads for display
    let data = entry.data.to_string();
    let data = match data.char_indices().nth(200) {
        Some((end, _)) => format!("{}...", &data[..end]),
        None => data,
    };
    println!("[{time}] {arrow} {}: {data}", entry.kind);
}

fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        Ok(Config::load(path)?)
    } else {
        Ok(Config::default())
    }
}
