//! Chatlink CLI - drives the transport layer from a terminal.
//!
//! This is the main binary entry point. See the `chatlink` library for the
//! core functionality.

use anyhow::{Context, Result};
use chatlink::notify::{ChannelNotifier, Notice};
use chatlink::operation::{Attachment, Operation, OperationKind};
use chatlink::chat::frame::ChatMessage;
use chatlink::{ChatSnapshot, Client, Config, Dispatched};
use mimalloc::MiMalloc;

/// Global allocator configured per M-MIMALLOC-APPS guideline.
/// mimalloc provides better multi-threaded performance than the system allocator.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;

// CLI
#[derive(Parser)]
#[command(name = "chatlink")]
#[command(version)]
#[command(about = "Request/response and persistent channel client with realtime chat")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Join the chat on the persistent channel; each stdin line is sent as a message
    Chat,
    /// Send one query or mutation and print the JSON response
    Request {
        /// Operation name
        name: String,
        /// Send as a mutation instead of a query
        #[arg(long)]
        mutation: bool,
        /// File containing the operation document
        #[arg(long)]
        document: Option<PathBuf>,
        /// Variables as a JSON object
        #[arg(long)]
        vars: Option<String>,
        /// Attach a file at a variable path (e.g. input.avatar=./a.png)
        #[arg(long = "attach", value_name = "PATH=FILE")]
        attachments: Vec<String>,
    },
    /// Show or set configuration values
    Config {
        key: Option<String>,
        value: Option<String>,
    },
}

/// Build the operation for `chatlink request`.
fn build_request(
    name: String,
    mutation: bool,
    document: Option<&Path>,
    vars: Option<&str>,
    attachments: &[String],
) -> Result<Operation> {
    let kind = if mutation {
        OperationKind::Mutation
    } else {
        OperationKind::Query
    };
    let mut op = Operation::new(name, kind);

    if let Some(path) = document {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read document {}", path.display()))?;
        op = op.document(text);
    }

    if let Some(vars) = vars {
        let value: serde_json::Value =
            serde_json::from_str(vars).context("--vars is not valid JSON")?;
        let serde_json::Value::Object(map) = value else {
            anyhow::bail!("--vars must be a JSON object");
        };
        op = op.variables(map);
    }

    for entry in attachments {
        let (variable_path, file) = entry
            .split_once('=')
            .with_context(|| format!("--attach expects PATH=FILE, got {entry}"))?;
        let file = Path::new(file);
        let bytes = std::fs::read(file)
            .with_context(|| format!("Failed to read attachment {}", file.display()))?;
        let file_name = file
            .file_name()
            .map_or_else(|| "upload".to_string(), |n| n.to_string_lossy().into_owned());
        op = op.attach(Attachment::new(variable_path, file_name, bytes));
    }

    Ok(op)
}

/// Print notices to stderr as they arrive.
fn spawn_notice_printer(mut notices: tokio::sync::mpsc::UnboundedReceiver<Notice>) {
    tokio::spawn(async move {
        while let Some(notice) = notices.recv().await {
            eprintln!("[{:?}] {}", notice.kind, notice.message);
        }
    });
}

fn client_with_printer(config: Config) -> Result<Client> {
    let (notifier, notices) = ChannelNotifier::new();
    spawn_notice_printer(notices);
    let client = Client::new(
        config,
        Arc::new(notifier),
        Arc::new(|| eprintln!("Session ended. Log in again to continue.")),
    )?;
    Ok(client)
}

async fn run_request(config: Config, op: Operation) -> Result<()> {
    let client = client_with_printer(config)?;
    match client.execute(op).await? {
        Dispatched::Response(response) => {
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Dispatched::Streaming(id) => println!("Stream started: {id}"),
    }
    Ok(())
}

/// Tracks how much of the chat feed has been printed.
#[derive(Debug, Default)]
struct FeedCursor {
    revision: Option<u64>,
    shown: usize,
}

impl FeedCursor {
    /// Messages not printed yet. A replaced feed is printed from the start.
    fn unseen<'a>(&mut self, snapshot: &'a ChatSnapshot) -> &'a [ChatMessage] {
        if self.revision != Some(snapshot.feed_revision) || snapshot.feed.len() < self.shown {
            self.revision = Some(snapshot.feed_revision);
            self.shown = 0;
        }
        let unseen = &snapshot.feed[self.shown..];
        self.shown = snapshot.feed.len();
        unseen
    }
}

async fn run_chat(config: Config) -> Result<()> {
    let client = client_with_printer(config)?;
    client.open_channel().await?;
    let chat = client.chat()?;

    let mut updates = chat.watch();
    tokio::spawn(async move {
        let mut shown_presence = None;
        let mut cursor = FeedCursor::default();
        while updates.changed().await.is_ok() {
            let snapshot = updates.borrow_and_update().clone();
            if shown_presence != Some(snapshot.presence) {
                println!("* {} online", snapshot.presence);
                shown_presence = Some(snapshot.presence);
            }
            for message in cursor.unseen(&snapshot) {
                let sender = message
                    .sender
                    .as_ref()
                    .and_then(|m| m.display_name().map(str::to_string).or_else(|| m.id()))
                    .unwrap_or_else(|| "?".to_string());
                println!("<{}> {}", sender, message.text);
            }
        }
    });

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if let Err(e) = chat.send(&line) {
            eprintln!("{e}");
        }
    }

    drop(chat);
    client.logout();
    Ok(())
}

fn init_logging() -> Result<()> {
    // CHATLINK_LOG_FILE, then CHATLINK_CONFIG_DIR/chatlink.log, then stderr
    let log_path = if let Ok(path) = std::env::var("CHATLINK_LOG_FILE") {
        Some(PathBuf::from(path))
    } else {
        std::env::var("CHATLINK_CONFIG_DIR")
            .ok()
            .map(|dir| PathBuf::from(dir).join("chatlink.log"))
    };

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.format_timestamp_secs();
    if let Some(path) = log_path {
        let log_file = std::fs::File::create(&path)
            .with_context(|| format!("Failed to create log file at {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(log_file)));
    }
    builder.init();
    Ok(())
}

fn main() -> Result<()> {
    init_logging()?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { key, value } => {
            let mut config = Config::load()?;
            match (key, value) {
                (None, None) => println!("{}", serde_json::to_string_pretty(&config)?),
                (Some(k), None) => match config.get(&k) {
                    Some(v) => println!("{v}"),
                    None => anyhow::bail!("Unknown config key: {k}"),
                },
                (Some(k), Some(v)) => {
                    config.set(&k, &v)?;
                    config.save()?;
                    println!("Set {k} = {v}");
                }
                (None, Some(_)) => anyhow::bail!("A value needs a key"),
            }
        }
        Commands::Request {
            name,
            mutation,
            document,
            vars,
            attachments,
        } => {
            let op = build_request(
                name,
                mutation,
                document.as_deref(),
                vars.as_deref(),
                &attachments,
            )?;
            let config = Config::load()?;
            tokio::runtime::Runtime::new()?.block_on(run_request(config, op))?;
        }
        Commands::Chat => {
            let config = Config::load()?;
            tokio::runtime::Runtime::new()?.block_on(run_chat(config))?;
        }
    }

    Ok(())
}
