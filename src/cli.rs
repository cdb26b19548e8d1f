//! CLI argument parsing using clap 4.x derive macros

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Bridge between a mobile client and the Kiro IDE
///
/// Runs a WebSocket server the mobile app connects to, relays chat
/// messages into Kiro and ships Kiro's answers back.
#[derive(Parser, Debug)]
#[command(name = "kiro-bridge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// The command to execute; defaults to `serve`
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to the JSON configuration file
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the WebSocket bridge server
    Serve,

    /// Watch the inbox directory and nudge Kiro about new requests
    Watcher,
}
