//! CLI command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CLI arguments for concierge
#[derive(Parser, Debug)]
#[command(name = "concierge")]
#[command(author, version, about = "Chat assistant that answers with tools from external tool servers")]
#[command(long_about = r#"
Concierge answers chat messages with an LLM that can call capabilities
published by external tool servers.

Every message walks a fallback chain:
1. Augmented: the model reasons and calls tools from ready servers
2. Plain: a single completion without tools
3. Static: the configured fallback message

Configuration files are loaded from (in priority order):
1. CONCIERGE_* environment variables (CONCIERGE_AGENT__MAX_STEPS=4)
2. --config <path>                         Explicit config file
3. ./concierge.toml                        Project-level config
4. ~/.config/concierge/config.toml         Global config

Example:
  concierge "Find the on-call rota for this week"
  concierge --chat --caller U024BE7LH
  concierge status --wait 5
"#)]
pub struct Cli {
    /// Message to answer once (omit with --chat)
    pub message: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,

    /// Start interactive chat mode
    #[arg(short, long)]
    pub chat: bool,

    /// Identity of the message sender, checked against [permissions] admins
    #[arg(long, value_name = "ID", default_value = "local")]
    pub caller: String,

    /// Seconds to wait for tool servers before answering a one-shot message
    #[arg(long, value_name = "SECS", default_value_t = 5)]
    pub wait: u64,

    /// Print the turn summary and fallback tier after each answer
    #[arg(long)]
    pub summary: bool,

    /// Verbosity level (-v = info, -vv = debug, -vvv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Disable loading of configuration files
    #[arg(long)]
    pub no_config: bool,

    /// Show configuration file locations and exit
    #[arg(long)]
    pub show_config: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect to every configured server and report its state
    Status {
        /// Seconds to wait for handshakes before reporting
        #[arg(long, value_name = "SECS", default_value_t = 5)]
        wait: u64,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}
