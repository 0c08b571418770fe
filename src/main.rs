mod analysis;
mod app;
mod config;
mod conflicts;
mod context;
mod diff;
mod disclosure;
mod error;
mod graph;
mod graph_cmd;
mod line_index;
mod list_cmd;
mod navigation;
mod resolver;
mod service;
mod session;
mod settings;
mod settings_cmd;
mod ui;
mod view;

use std::fs::OpenOptions;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{Cli, Command};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const DEFAULT_LOG_FILTER: &str = "mergelens=info";

fn main() -> Result<()> {
    let cli = Cli::parse();
    let interactive = matches!(cli.command, None | Some(Command::Review(_)));
    init_tracing(interactive)?;

    let config = config::load_config(&cli.global)?;
    tracing::debug!(api = %config.analysis_api, mode = %config.view_mode, "configuration loaded");

    match cli.command {
        Some(Command::Review(review)) => app::run(&config, review.pulls),
        Some(Command::List(list)) => list_cmd::run(&config, list),
        Some(Command::Graph(graph)) => graph_cmd::run(&config, graph),
        Some(Command::Settings(settings)) => settings_cmd::run(&config, settings),
        None => app::run(&config, cli.pulls),
    }
}

/// The terminal belongs to the interactive view, so it logs to a file under the cache
/// directory; every other command logs to stderr.
fn init_tracing(interactive: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    if !interactive {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .context("install tracing subscriber")?;
        return Ok(());
    }

    let Some(dir) = dirs::cache_dir().map(|d| d.join("mergelens")) else {
        return Ok(());
    };
    std::fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    let path = dir.join("mergelens.log");
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open log file {}", path.display()))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .try_init()
        .context("install tracing subscriber")?;
    Ok(())
}
