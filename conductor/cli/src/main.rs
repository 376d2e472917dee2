//! Chat CLI - Interactive Terminal Surface for the Chat Conductor
//!
//! Reads prompts from stdin, streams replies to stdout, and logs to stderr.
//!
//! # Usage
//!
//! ```bash
//! # Interactive session against the configured endpoint
//! chat-cli
//!
//! # Custom endpoint and a transcript that survives restarts
//! chat-cli --endpoint http://localhost:8000/api/generate --session-file ./session.json
//!
//! # One-shot: send a single message and print the reply
//! chat-cli --message "Hello"
//!
//! # Verbose logging
//! RUST_LOG=debug chat-cli
//! ```
//!
//! Typing a new message while a reply is streaming interrupts that reply.
//! Ctrl-C stops the current reply, or exits when nothing is in flight.

mod commands;
mod render;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chat_conductor::{
    default_config_path, load_config_from_path, ChatConfig, ChatStatus, Conductor,
    ConductorConfig, ConductorMessage, ConfigSource, FileStore, HttpTransport, IdentityProvider,
    KeyValueStore, MemoryStore,
};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWrite, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info};

use commands::Command;
use render::Renderer;

/// Chat CLI - streaming conversation client
#[derive(Parser, Debug)]
#[command(name = "chat-cli")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "CHAT_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Chat generation endpoint (overrides config)
    #[arg(short = 'e', long, value_name = "URL")]
    endpoint: Option<String>,

    /// File holding the transcript and session id; in memory if omitted
    #[arg(short = 's', long, value_name = "FILE")]
    session_file: Option<PathBuf>,

    /// Directory for the durable client id (overrides config)
    #[arg(long, value_name = "DIR")]
    state_dir: Option<PathBuf>,

    /// Keep the client id in memory only
    #[arg(long)]
    ephemeral: bool,

    /// URL used to look up the network-origin id (overrides config)
    #[arg(long, value_name = "URL")]
    origin_lookup_url: Option<String>,

    /// Send one message, print the reply and exit
    #[arg(short = 'm', long, value_name = "TEXT")]
    message: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "CHAT_LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

/// Initialize logging with the specified level, writing to stderr
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("chat_cli={level},chat_conductor={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Load configuration and apply command-line overrides
fn resolve_config(args: &Args) -> Result<ChatConfig> {
    let path = args.config.clone().or_else(default_config_path);
    let mut config = load_config_from_path(path).context("Failed to load configuration")?;

    let mut overridden = false;
    if let Some(endpoint) = &args.endpoint {
        config.endpoint.clone_from(endpoint);
        overridden = true;
    }
    if let Some(dir) = &args.state_dir {
        config.state_dir = Some(dir.clone());
        overridden = true;
    }
    if let Some(url) = &args.origin_lookup_url {
        config.origin_lookup_url = Some(url.clone());
        overridden = true;
    }
    if args.ephemeral {
        config.state_dir = None;
        overridden = true;
    }
    if overridden {
        config.set_source(ConfigSource::Cli);
        config.validate().context("Invalid command-line override")?;
    }

    Ok(config)
}

/// Stores handed to the conductor, plus the file-backed ones to flush on exit
struct Stores {
    tab: Arc<dyn KeyValueStore>,
    durable: Arc<dyn KeyValueStore>,
    files: Vec<Arc<FileStore>>,
}

impl Stores {
    /// Wait for pending file writes before the runtime shuts down
    async fn sync(&self) {
        for store in &self.files {
            store.sync().await;
        }
    }
}

/// Open the tab-scoped and durable stores
fn open_stores(args: &Args, config: &ChatConfig) -> Result<Stores> {
    let mut files = Vec::new();
    let mut open_file = |path: &Path, what: &str| -> Result<Arc<dyn KeyValueStore>> {
        let store = Arc::new(
            FileStore::open(path)
                .with_context(|| format!("Failed to open {what} {}", path.display()))?,
        );
        files.push(Arc::clone(&store));
        Ok(store)
    };

    let tab: Arc<dyn KeyValueStore> = match &args.session_file {
        Some(path) => open_file(path, "session file")?,
        None => Arc::new(MemoryStore::new()),
    };
    let durable: Arc<dyn KeyValueStore> = match config.durable_store_path() {
        Some(path) => open_file(&path, "state file")?,
        None => Arc::new(MemoryStore::new()),
    };

    Ok(Stores {
        tab,
        durable,
        files,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let config = resolve_config(&args)?;
    info!(endpoint = %config.endpoint, source = %config.source(), "Configuration loaded");

    let stores = open_stores(&args, &config)?;
    let identity = Arc::new(IdentityProvider::from_config(
        &config,
        Arc::clone(&stores.tab),
        Arc::clone(&stores.durable),
    ));
    let transport =
        Arc::new(HttpTransport::from_config(&config).context("Failed to create HTTP client")?);

    if let Some(url) = config.origin_lookup_url.clone() {
        let identity = Arc::clone(&identity);
        let client = transport.client().clone();
        tokio::spawn(async move { identity.refresh_origin_id(&client, &url).await });
    }

    let (tx, updates) = mpsc::unbounded_channel();
    let conductor = Conductor::new(
        transport,
        identity,
        Arc::clone(&stores.tab),
        ConductorConfig::from(&config),
        tx,
    );
    let renderer = Renderer::new(tokio::io::stdout());

    let result = match args.message {
        Some(text) => one_shot(conductor, updates, renderer, &text).await,
        None => interactive(conductor, updates, renderer).await,
    };
    stores.sync().await;
    result
}

/// Send one message and wait for the reply
async fn one_shot<W: AsyncWrite + Unpin>(
    conductor: Conductor,
    mut updates: mpsc::UnboundedReceiver<ConductorMessage>,
    mut renderer: Renderer<W>,
    text: &str,
) -> Result<()> {
    let send = conductor.send_message(text);
    tokio::pin!(send);

    loop {
        tokio::select! {
            () = &mut send => break,
            Some(update) = updates.recv() => renderer.handle(&update).await?,
        }
    }
    while let Ok(update) = updates.try_recv() {
        renderer.handle(&update).await?;
    }

    if conductor.status() == ChatStatus::Error {
        let message = conductor.error().unwrap_or_default();
        anyhow::bail!("{message}");
    }
    Ok(())
}

/// Read commands until EOF or `/quit`
async fn interactive<W: AsyncWrite + Unpin>(
    conductor: Conductor,
    mut updates: mpsc::UnboundedReceiver<ConductorMessage>,
    mut renderer: Renderer<W>,
) -> Result<()> {
    let restored = conductor.messages();
    if !restored.is_empty() {
        renderer.history(&restored).await?;
    }
    renderer.note("Type a message, or /help for commands.").await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut requests = JoinSet::new();

    loop {
        tokio::select! {
            Some(update) = updates.recv() => renderer.handle(&update).await?,
            Some(_) = requests.join_next(), if !requests.is_empty() => {}
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                match commands::parse(&line) {
                    None => {}
                    Some(Err(word)) => {
                        renderer.note(&format!("Unknown command /{word}, try /help")).await?;
                    }
                    Some(Ok(Command::Quit)) => break,
                    Some(Ok(command)) => {
                        run_command(command, &conductor, &mut renderer, &mut requests).await?;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                if conductor.status().is_active() {
                    conductor.abort();
                } else {
                    break;
                }
            }
        }
    }

    debug!("Shutting down");
    conductor.abort();
    while requests.join_next().await.is_some() {}
    while let Ok(update) = updates.try_recv() {
        renderer.handle(&update).await?;
    }
    Ok(())
}

async fn run_command<W: AsyncWrite + Unpin>(
    command: Command,
    conductor: &Conductor,
    renderer: &mut Renderer<W>,
    requests: &mut JoinSet<()>,
) -> Result<()> {
    match command {
        Command::Send(text) => {
            let conductor = conductor.clone();
            requests.spawn(async move { conductor.send_message(&text).await });
        }
        Command::Retry => {
            let conductor = conductor.clone();
            requests.spawn(async move { conductor.retry().await });
        }
        Command::Abort => conductor.abort(),
        Command::Clear => conductor.clear_messages(),
        Command::New => {
            conductor.clear_session();
            renderer.note("Started a new session.").await?;
        }
        Command::History => renderer.history(&conductor.messages()).await?,
        Command::Status => {
            let identity = conductor.identity();
            let origin = identity.origin_id();
            let status = format!(
                "status:  {} ({})\nsession: {}\nclient:  {}\norigin:  {}",
                conductor.status(),
                conductor.status().description(),
                identity.session_id(),
                identity.client_id(),
                if origin.is_empty() { "unknown" } else { &origin },
            );
            renderer.note(&status).await?;
        }
        Command::Help => renderer.note(commands::HELP).await?,
        Command::Quit => {}
    }
    Ok(())
}
