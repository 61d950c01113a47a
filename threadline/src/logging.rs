//! File logging for the engine and the CLI.
//!
//! Every engine log line carries one of the targets below, so a whole area
//! can be muted with a simplelog ignore filter without touching levels.
//! Nothing is written to the terminal; the CLI owns stdout.

use log::LevelFilter;
use simplelog::{ConfigBuilder, WriteLogger};
use std::fs::{File, OpenOptions};
use std::path::PathBuf;

pub const PAGINATION: &str = "pagination";
pub const MUTATIONS: &str = "mutations";
pub const API_CALLS: &str = "api_calls";
pub const RETRIES: &str = "retries";

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// None turns logging off
    pub log_file: Option<PathBuf>,
    pub truncate: bool,
    pub level: LevelFilter,
    pub muted: Vec<&'static str>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_file: Some(PathBuf::from("threadline.log")),
            truncate: true,
            level: LevelFilter::Info,
            muted: Vec::new(),
        }
    }
}

impl LogConfig {
    /// Warnings and errors, retries only
    pub fn minimal() -> Self {
        Self {
            level: LevelFilter::Warn,
            muted: vec![PAGINATION, MUTATIONS, API_CALLS],
            ..Self::default()
        }
    }

    pub fn verbose() -> Self {
        Self {
            level: LevelFilter::Trace,
            ..Self::default()
        }
    }
}

pub fn init_logging(config: &LogConfig) -> anyhow::Result<()> {
    let Some(path) = &config.log_file else {
        let _ = WriteLogger::init(LevelFilter::Off, simplelog::Config::default(), std::io::sink());
        return Ok(());
    };

    if config.truncate {
        File::create(path)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    let mut builder = ConfigBuilder::new();
    builder.set_time_format_rfc3339();
    let builder = match builder.set_time_offset_to_local() {
        Ok(builder) | Err(builder) => builder,
    };
    for target in &config.muted {
        builder.add_filter_ignore_str(target);
    }

    WriteLogger::init(config.level, builder.build(), file)?;

    log::info!("Logging initialized: file={}, level={:?}", path.display(), config.level);
    log::debug!("Muted targets: {:?}", config.muted);
    Ok(())
}
