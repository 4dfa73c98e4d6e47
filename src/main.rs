//! # Arena MCP CLI (`arena-mcp`)
//!
//! The `arena-mcp` binary serves the MCP bridge and offers a few ad-hoc
//! commands for poking at Are.na from a shell.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `arena-mcp serve stdio` | Serve MCP over stdio (for MCP client launchers) |
//! | `arena-mcp serve http` | Start the HTTP server (JSON API + `/mcp`) |
//! | `arena-mcp search "<query>"` | Search channels, blocks, and users |
//! | `arena-mcp get <channel>` | Resolve a channel reference and list its contents |
//! | `arena-mcp resolve <input>` | Show how a free-form reference resolves |
//!
//! All commands accept `--config` pointing to a TOML file; without it the
//! built-in defaults apply and the access token comes from
//! `ARENA_API_TOKEN`.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use arena_mcp::client::{ArenaClient, SearchParams};
use arena_mcp::config::{load_config, Config};
use arena_mcp::render;
use arena_mcp::resolver::resolve_channel;
use arena_mcp::server::{run_http_server, run_stdio_server};

/// Are.na MCP bridge — browse and edit the Are.na content graph from AI
/// tools or the command line.
#[derive(Parser)]
#[command(
    name = "arena-mcp",
    about = "An MCP bridge exposing the Are.na content graph to AI tools",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the MCP bridge.
    Serve {
        #[command(subcommand)]
        transport: Transport,
    },

    /// Search Are.na. Falls back to the legacy endpoint when the current
    /// search API rejects the token as permission-gated.
    Search {
        query: String,
        /// Restrict to entity types (Block, Channel, User, Group).
        /// Repeatable.
        #[arg(long = "type")]
        entity: Vec<String>,
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        per: Option<u32>,
    },

    /// Resolve a channel reference and print its contents.
    Get {
        /// Channel id, slug, owner/slug, URL, or title.
        channel: String,
        #[arg(long)]
        page: Option<u32>,
    },

    /// Show how a free-form channel reference resolves, without fetching
    /// contents.
    Resolve { input: String },
}

#[derive(Subcommand)]
enum Transport {
    /// MCP over stdio (what Cursor and Claude launch).
    Stdio,
    /// HTTP server: JSON tool API plus the `/mcp` streamable endpoint.
    Http,
}

fn load(cli_config: &Option<PathBuf>) -> Result<Config> {
    match cli_config {
        Some(path) => load_config(path),
        None => Ok(Config::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr: stdout carries the MCP protocol under `serve stdio`.
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("arena_mcp=info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = load(&cli.config)?;

    match cli.command {
        Commands::Serve { transport } => match transport {
            Transport::Stdio => run_stdio_server(&config).await,
            Transport::Http => run_http_server(&config).await,
        },
        Commands::Search {
            query,
            entity,
            page,
            per,
        } => {
            let client = ArenaClient::new(config.api.clone())?;
            let entities = entity
                .iter()
                .map(|name| match name.as_str() {
                    "Block" => Ok(arena_mcp::models::SearchEntityType::Block),
                    "Channel" => Ok(arena_mcp::models::SearchEntityType::Channel),
                    "User" => Ok(arena_mcp::models::SearchEntityType::User),
                    "Group" => Ok(arena_mcp::models::SearchEntityType::Group),
                    other => anyhow::bail!(
                        "unknown entity type \"{other}\" (expected Block, Channel, User, or Group)"
                    ),
                })
                .collect::<Result<Vec<_>>>()?;
            let result = client
                .search(&SearchParams {
                    query,
                    entities,
                    scope: None,
                    page,
                    per,
                })
                .await?;
            print!("{}", render::render_search(&result));
            Ok(())
        }
        Commands::Get { channel, page } => {
            let client = Arc::new(ArenaClient::new(config.api.clone())?);
            let resolved = resolve_channel(&client, &channel).await?;
            print!("{}", render::render_channel(&resolved.channel));
            let contents = client
                .get_channel_contents(&resolved.canonical, page, None)
                .await?;
            print!("\n{}", render::render_list(&contents));
            Ok(())
        }
        Commands::Resolve { input } => {
            let client = Arc::new(ArenaClient::new(config.api.clone())?);
            let resolved = resolve_channel(&client, &input).await?;
            print!("{}", render::render_resolved(&resolved));
            Ok(())
        }
    }
}
