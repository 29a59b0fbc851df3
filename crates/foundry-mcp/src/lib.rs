//! # Foundry MCP
//!
//! Model Context Protocol server that exposes a Foundry VTT world as tools.
//! It connects with [`foundry_client`] before serving, then answers
//! newline-delimited JSON-RPC on stdin/stdout.
//!
//! - [`cli`]: flags and environment
//! - [`logging`]: stderr diagnostics and the websocket frame log
//! - [`tools`]: the advertised tool catalogue
//! - [`dispatch`]: tool calls onto client operations
//! - [`server`]: the JSON-RPC loop

#![deny(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]

pub mod cli;
pub mod dispatch;
pub mod error;
pub mod jsonrpc;
pub mod logging;
pub mod server;
pub mod tools;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use foundry_client::FoundryClient;
use tracing::info;

pub use cli::Cli;
pub use dispatch::{ToolDispatcher, ToolResult};
pub use error::{ServerError, ServerResult};
pub use logging::{LoggingConfig, LoggingGuard};
pub use server::McpServer;

/// Parses the command line, connects, and serves stdio until input closes.
///
/// # Errors
///
/// Logging setup, the initial connection, or the stdio channel failed.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = cli.logging_config().init().context("failed to initialise logging")?;

    let client = FoundryClient::new(cli.client_config()).context("failed to build Foundry client")?;
    info!("Connecting to FoundryVTT...");
    client.connect().await.context("failed to connect to FoundryVTT")?;
    info!(
        "Connected to FoundryVTT at {}",
        client.hostname().unwrap_or_default()
    );

    let server = Arc::new(McpServer::new(ToolDispatcher::new(client.clone())).with_instructions(cli.load_instructions()));
    info!("FoundryVTT MCP server running on stdio");
    server.serve_stdio().await?;

    client.disconnect();
    Ok(())
}
