//! Logging Setup
//!
//! Installs the global `tracing` subscriber. Output goes to stderr, or to
//! `<prefix>.log` when a file prefix is configured. An oversized log file
//! is rotated aside once at startup.

use crate::error::{Error, Result};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};

/// Size above which the log file is rotated at startup
pub const ROTATE_BYTES: u64 = 5 * 1024 * 1024;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum level (trace, debug, info, warn, error)
    pub level: String,
    /// Emit JSON lines instead of text
    pub json: bool,
    /// Write to `<prefix>.log` instead of stderr
    pub file_prefix: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file_prefix: None,
        }
    }
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn directive(spec: &str) -> Result<tracing_subscriber::filter::Directive> {
    spec.parse()
        .map_err(|e| Error::Configuration(format!("Invalid log directive {}: {}", spec, e)))
}

/// Open `<prefix>.log` for appending, first renaming it to
/// `<prefix>-<timestamp>.log` when it is larger than `max_bytes`
pub fn open_log_file(prefix: &Path, max_bytes: u64) -> Result<File> {
    let path = with_suffix(prefix, ".log");
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    match std::fs::metadata(&path) {
        Ok(meta) if meta.len() > max_bytes => {
            let stamp = chrono::Local::now().format("-%Y-%m-%d-%H:%M:%S");
            std::fs::rename(&path, with_suffix(prefix, &format!("{}.log", stamp)))?;
        }
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    Ok(OpenOptions::new().create(true).append(true).open(&path)?)
}

fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name = prefix.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Install the global subscriber
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive(parse_level(&config.level).into())
        .add_directive(directive("hyper=warn")?)
        .add_directive(directive("kube=info")?)
        .add_directive(directive("reqwest=info")?);

    let (writer, ansi) = match &config.file_prefix {
        Some(prefix) => {
            let file = open_log_file(prefix, ROTATE_BYTES)?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    let layer: Box<dyn Layer<Registry> + Send + Sync> = if config.json {
        fmt::layer().json().with_writer(writer).boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_ansi(ansi)
            .with_writer(writer)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()
        .map_err(|e| Error::Internal(format!("Failed to install log subscriber: {}", e)))
}
