//! CLI entrypoint for concierge
//!
//! This is the main binary that wires together all layers using
//! dependency injection.

mod app;
mod args;
mod chat;
mod output;
mod telemetry;

use anyhow::{Context, Result, bail};
use app::App;
use args::{Cli, Command};
use chat::ChatRepl;
use clap::Parser;
use concierge_domain::{CallerIdentity, ConversationContext};
use concierge_infrastructure::{ConfigLoader, FileConfig};
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.show_config {
        println!("Configuration sources (in priority order):");
        println!("  [ENV  ] {}*", concierge_infrastructure::config::ENV_PREFIX);
        for (label, path, found) in ConfigLoader::config_sources(cli.config.as_deref()) {
            let mark = if found { "FOUND" } else { "     " };
            println!("  [{}] {:<8} {}", mark, format!("{}:", label), path.display());
        }
        println!("  [     ] Default: built-in defaults");
        return Ok(());
    }

    // Load configuration before logging so [logging] log_dir can take effect
    let config: FileConfig = if cli.no_config {
        ConfigLoader::load_defaults()
    } else {
        ConfigLoader::load(cli.config.as_deref()).context("failed to load configuration")?
    };

    let _log_guard = telemetry::init(cli.verbose, config.logging.log_dir_path().as_deref());
    info!("Starting concierge");

    for warning in config.check()? {
        warn!(code = ?warning.code, "{}", warning.message);
    }

    // === Dependency Injection ===
    let app = App::start(&config)?;

    let result = run(&cli, &app).await;

    app.shutdown().await;
    info!("Stopped");
    result
}

async fn run(cli: &Cli, app: &App) -> Result<()> {
    let caller = CallerIdentity::new(cli.caller.clone());

    if let Some(Command::Status { wait, json }) = &cli.command {
        wait_for_servers(app, *wait).await;
        let rows = app.supervisor.status();
        if *json {
            println!("{}", serde_json::to_string_pretty(&rows)?);
        } else {
            print!("{}", output::format_status(&rows));
        }
        return Ok(());
    }

    // Chat mode
    if cli.chat {
        let mut repl = ChatRepl::new(app, caller).with_summary(cli.summary);
        repl.run().await?;
        return Ok(());
    }

    // Single message mode - message is required
    let message = match &cli.message {
        Some(m) => m.clone(),
        None => bail!("A message is required. Use --chat for interactive mode."),
    };

    wait_for_servers(app, cli.wait).await;
    let handler = app.handler.clone();
    let turn = async move {
        handler
            .handle(&ConversationContext::new(), &message, &caller)
            .await
    };

    tokio::select! {
        output = turn => {
            println!("{}", output.text);
            if cli.summary {
                println!("{}", output::format_summary(&output));
            }
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted");
        }
    }
    Ok(())
}

/// Give handshakes a head start; answering never depends on it.
async fn wait_for_servers(app: &App, secs: u64) {
    if secs == 0 {
        return;
    }
    if !app.supervisor.wait_ready(Duration::from_secs(secs)).await {
        info!(wait_secs = secs, "Not every tool server is ready; continuing");
    }
}
