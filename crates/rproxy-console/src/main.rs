//! rproxy console: entry point.
//!
//! A command-line front end for the reverse-proxy management socket.  It
//! opens one connection, performs one operation (or watches the event
//! stream) and exits.
//!
//! # Usage
//!
//! ```text
//! rproxy-console [OPTIONS] <COMMAND>
//!
//! Commands:
//!   list                            Print the server list snapshot
//!   watch                           Print every broadcast until Ctrl+C
//!   add <NAME>                      Create a server
//!   rename <OLD> <NEW>              Rename a server
//!   remove <NAME>                   Remove a server
//!   start-redirect <SERVER> <ID>    (also stop-redirect, remove-redirect)
//!   start-command <SERVER> <ID>     (also stop-command, remove-command)
//!   ports <SERVER> <ID>             Ports a running command listens on
//!
//! Options:
//!   --url <URL>                 Management socket URL
//!   --username <USER>           HTTP Basic user
//!   --password <PASS>           HTTP Basic password
//!   --config <FILE>             TOML config file
//!   --connect-timeout <SECS>    Handshake timeout
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable          | Description                 |
//! |-------------------|-----------------------------|
//! | `RPROXY_URL`      | Management socket URL       |
//! | `RPROXY_USERNAME` | HTTP Basic user             |
//! | `RPROXY_PASSWORD` | HTTP Basic password         |
//! | `RUST_LOG`        | `tracing` filter            |
//!
//! Precedence, highest first: command-line flag, environment variable,
//! config file, built-in default.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use futures_util::stream::{self, StreamExt};
use rproxy_core::protocol::events;
use rproxy_core::BroadcastChannel;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rproxy_console::infrastructure::load_config;
use rproxy_console::{ConsoleConfig, RpcClient};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Command-line console for the rproxy management socket.
#[derive(Debug, Parser)]
#[command(name = "rproxy-console", about = "Manage a running rproxy over its management socket", version)]
struct Cli {
    /// WebSocket URL of the management endpoint.
    #[arg(long, env = "RPROXY_URL")]
    url: Option<String>,

    /// HTTP Basic user name.
    #[arg(long, env = "RPROXY_USERNAME")]
    username: Option<String>,

    /// HTTP Basic password.
    #[arg(long, env = "RPROXY_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// TOML config file.  Missing files are treated as empty.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seconds to wait for the WebSocket handshake.
    #[arg(long)]
    connect_timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the server list snapshot as JSON.
    List,
    /// Print every broadcast event until interrupted.
    Watch,
    /// Create a server.
    Add { name: String },
    /// Rename a server.
    Rename { old: String, new: String },
    /// Remove a server with nothing running.
    Remove { name: String },
    /// Start a redirect.
    StartRedirect { server: String, id: u64 },
    /// Stop a running redirect.
    StopRedirect { server: String, id: u64 },
    /// Delete a stopped redirect.
    RemoveRedirect { server: String, id: u64 },
    /// Start a command.
    StartCommand { server: String, id: u64 },
    /// Stop a running command.
    StopCommand { server: String, id: u64 },
    /// Delete a stopped command.
    RemoveCommand { server: String, id: u64 },
    /// Print the ports a running command listens on.
    Ports { server: String, id: u64 },
}

impl Cli {
    /// Layers the command-line flags over `base`.
    fn apply_overrides(&self, mut base: ConsoleConfig) -> ConsoleConfig {
        if let Some(url) = &self.url {
            base.url = url.clone();
        }
        if let Some(username) = &self.username {
            base.username = Some(username.clone());
        }
        if let Some(password) = &self.password {
            base.password = Some(password.clone());
        }
        if let Some(secs) = self.connect_timeout {
            base.connect_timeout = Duration::from_secs(secs);
        }
        base
    }

    /// Builds the effective [`ConsoleConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or parsed.
    fn console_config(&self) -> anyhow::Result<ConsoleConfig> {
        let base = match &self.config {
            Some(path) => load_config(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => ConsoleConfig::default(),
        };
        Ok(self.apply_overrides(base))
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.console_config()?;

    // `RUST_LOG` wins; otherwise the configured level applies.  Logs go to
    // stderr so stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    info!(url = %config.url, "rproxy console starting");
    run(cli.command, config).await
}

async fn run(command: Commands, config: ConsoleConfig) -> anyhow::Result<()> {
    match command {
        Commands::List => {
            // Register before the handshake: the snapshot is pushed as soon
            // as the socket opens.
            let client = RpcClient::spawn(config);
            let snapshot = client.once::<events::List>();
            let list = snapshot.await.context("no server list received")?;
            println!("{}", serde_json::to_string_pretty(&list)?);
            client.close().await;
        }
        Commands::Watch => watch(config).await?,
        command => {
            let client = RpcClient::open(config)
                .await
                .context("failed to connect to the management server")?;
            info!(connection = %client.connection_id(), "connected");
            call(&client, command).await?;
            client.close().await;
        }
    }
    Ok(())
}

/// Performs one request-style subcommand.
async fn call(client: &RpcClient, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Add { name } => match client.add(name.as_str()).await? {
            Some(id) => println!("added server {name} (id {id})"),
            None => println!("added server {name}"),
        },
        Commands::Rename { old, new } => {
            client.rename(old.as_str(), new.as_str()).await?;
            println!("renamed {old} to {new}");
        }
        Commands::Remove { name } => {
            client.remove(name.as_str()).await?;
            println!("removed server {name}");
        }
        Commands::StartRedirect { server, id } => client.start_redirect(server, id).await?,
        Commands::StopRedirect { server, id } => client.stop_redirect(server, id).await?,
        Commands::RemoveRedirect { server, id } => client.remove_redirect(server, id).await?,
        Commands::StartCommand { server, id } => client.start_command(server, id).await?,
        Commands::StopCommand { server, id } => client.stop_command(server, id).await?,
        Commands::RemoveCommand { server, id } => client.remove_command(server, id).await?,
        Commands::Ports { server, id } => {
            let ports = client.get_command_ports(server, id).await?;
            println!("{}", serde_json::to_string(&ports)?);
        }
        other @ (Commands::List | Commands::Watch) => {
            anyhow::bail!("{other:?} is not a single request")
        }
    }
    Ok(())
}

/// Prints every broadcast as `<channel> <payload>` until Ctrl+C or closure.
async fn watch(config: ConsoleConfig) -> anyhow::Result<()> {
    let client = RpcClient::spawn(config);

    let mut subscriptions = Vec::with_capacity(BroadcastChannel::ALL.len());
    for &channel in BroadcastChannel::ALL {
        let subscription = client
            .subscribe_raw(channel)
            .await
            .context("connection closed while subscribing")?;
        subscriptions.push(subscription.map(move |event| (channel, event)));
    }
    client
        .wait_open()
        .await
        .context("failed to connect to the management server")?;
    let mut events = stream::select_all(subscriptions);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("received Ctrl+C; closing");
                break;
            }
            event = events.next() => match event {
                Some((channel, Ok(payload))) => println!("{} {}", channel.name(), payload),
                Some((channel, Err(e))) => tracing::warn!(%channel, "bad event: {e}"),
                None => {
                    info!("connection closed by server");
                    break;
                }
            },
        }
    }

    client.close().await;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
