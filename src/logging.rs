//! Subscriber setup. The terminal UI owns the screen, so it logs to a file;
//! plain mode logs to stderr.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::EnvFilter;

pub enum LogTarget<'a> {
    Stderr,
    File(&'a Path),
}

/// `PROMPTRUN_LOG` wins over `level`, which is the CLI flag or the config's
/// `LOG_LEVEL`.
pub fn init(level: &str, target: LogTarget<'_>) -> Result<()> {
    let filter = EnvFilter::try_from_env("PROMPTRUN_LOG")
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid log filter: {level}"))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = match target {
        LogTarget::Stderr => builder.with_writer(std::io::stderr).try_init(),
        LogTarget::File(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).try_init()
        }
    };
    result.map_err(|e| anyhow!("failed to install log subscriber: {e}"))
}
