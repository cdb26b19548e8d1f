//! `kiro-bridge` - remote control bridge for the Kiro IDE
//!
//! This binary runs the WebSocket server the mobile app connects to, or
//! the inbox watcher that nudges Kiro about queued requests.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use console::Style;
use tokio::net::TcpListener;

use crate::cli::{Cli, Commands};
use crate::server::BridgeServer;
use kiro_bridge_core::automation::{Automation, ClipboardSnapshot, DesktopAutomation};
use kiro_bridge_core::config::{Config, ResponseMode};
use kiro_bridge_core::file_queue::FileChannel;
use kiro_bridge_core::response::{FileSource, MonitorSource, ResponseSource};
use kiro_bridge_core::watcher::InboxWatcher;
use kiro_bridge_core::Authenticator;

mod cli;
mod logging;
mod server;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config).context("Failed to load configuration")?;
    logging::init(&config.log_level).context("Failed to initialize logging")?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_server(config).await,
        Commands::Watcher => run_watcher(config).await,
    }
}

async fn run_server(config: Config) -> Result<()> {
    let auth = Authenticator::from_sources(config.auth_token())
        .context("Failed to load the auth token")?;

    let automation: Arc<dyn Automation> = Arc::new(DesktopAutomation::new());
    let response_source: Arc<dyn ResponseSource> = match config.response_mode {
        ResponseMode::Monitor => Arc::new(MonitorSource::new(ClipboardSnapshot::new())),
        ResponseMode::File => {
            let channel = FileChannel::new(&config.queue_dir);
            channel
                .ensure_dirs()
                .await
                .context("Failed to create queue directories")?;
            Arc::new(FileSource::new(channel))
        }
    };

    let server = Arc::new(BridgeServer::new(
        auth,
        automation,
        response_source,
        config.response_timeout(),
    ));

    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .context("Failed to bind server")?;

    let blue = Style::new().blue();
    println!(
        "{} listening on ws://{}:{}",
        blue.apply_to("kiro-bridge"),
        config.host,
        config.port
    );
    log::info!("bridge server started on {}:{}", config.host, config.port);

    tokio::select! {
        res = server.clone().serve(listener) => {
            res?;
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\nShutting down bridge...");
        }
    }

    Ok(())
}

async fn run_watcher(config: Config) -> Result<()> {
    let automation: Arc<dyn Automation> = Arc::new(DesktopAutomation::new());
    let inbox = config.queue_dir.join("inbox");

    let blue = Style::new().blue();
    println!(
        "{} watching {} (nudge: {:?})",
        blue.apply_to("kiro-bridge"),
        inbox.display(),
        config.nudge_text
    );

    let watcher = InboxWatcher::new(inbox, automation, config.nudge_text.clone());

    tokio::select! {
        res = watcher.run() => {
            res.context("Inbox watcher failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\nShutting down watcher...");
        }
    }

    Ok(())
}
