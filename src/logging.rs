//! Tracing setup.
//!
//! The TUI owns the terminal, so interactive runs log to a file; headless runs
//! log to stderr.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_DIRECTIVE: &str = "clip_prompt=info";

pub enum LogTarget<'a> {
    Stderr,
    File(&'a Path),
}

pub fn default_log_file() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("clip-prompt")
        .join("clip-prompt.log")
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

pub fn init(target: LogTarget<'_>) -> Result<()> {
    match target {
        LogTarget::Stderr => tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(env_filter())
            .try_init()
            .context("install stderr logger")?,
        LogTarget::File(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create log directory {}", parent.display()))?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("open log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                .with(env_filter())
                .try_init()
                .context("install file logger")?
        }
    }
    tracing::info!("clip-prompt v{} starting", env!("CARGO_PKG_VERSION"));
    Ok(())
}
