//! Logging initialization
//!
//! All diagnostics go to stderr; stdout is the protocol channel. When a
//! frame directory is configured, raw websocket traffic (the
//! [`FRAME_LOG_TARGET`] target) is also written to a per-session file in it.
//!
//! | Output | Guard required |
//! |--------|----------------|
//! | stderr only | No |
//! | stderr + frame file | **Yes**, the file writer is non-blocking |

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use foundry_client::FRAME_LOG_TARGET;
use tracing::{Level, Subscriber, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

/// Logging settings assembled from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    pub level: String,
    /// Emit JSON lines instead of human readable text
    pub structured: bool,
    /// Directory receiving the websocket frame log
    pub frames_directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            structured: false,
            frames_directory: None,
        }
    }
}

/// Flushes the frame log on drop
///
/// Hold it until the program exits, or buffered frames may be lost.
#[derive(Debug)]
pub struct LoggingGuard {
    _frame_guard: WorkerGuard,
    frame_log: PathBuf,
}

impl LoggingGuard {
    /// Path of this session's frame log.
    pub fn frame_log(&self) -> &Path {
        &self.frame_log
    }
}

impl LoggingConfig {
    /// Initialize the global subscriber
    ///
    /// Returns a guard only when a frame log was opened.
    ///
    /// # Errors
    ///
    /// The frame directory cannot be created, or a global subscriber is
    /// already set.
    pub fn init(&self) -> io::Result<Option<LoggingGuard>> {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));
        let stderr = self.stderr_layer().with_filter(filter);

        let Some(dir) = &self.frames_directory else {
            tracing_subscriber::registry()
                .with(stderr)
                .try_init()
                .map_err(|e| io::Error::other(e.to_string()))?;
            return Ok(None);
        };

        let file_name = frame_log_file_name(Utc::now(), std::process::id());
        let (frames, guard) = frame_layer(dir, &file_name)?;
        tracing_subscriber::registry()
            .with(stderr)
            .with(frames)
            .try_init()
            .map_err(|e| io::Error::other(e.to_string()))?;

        let frame_log = dir.join(file_name);
        info!("Logging websocket frames to {}", frame_log.display());
        Ok(Some(LoggingGuard {
            _frame_guard: guard,
            frame_log,
        }))
    }

    fn stderr_layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        if self.structured {
            fmt::layer().json().with_writer(io::stderr).boxed()
        } else {
            fmt::layer().with_writer(io::stderr).boxed()
        }
    }
}

/// `ws_session_<utc timestamp>_<pid>.log`
pub fn frame_log_file_name(started: DateTime<Utc>, pid: u32) -> String {
    format!("ws_session_{}_{pid}.log", started.format("%Y-%m-%dT%H-%M-%S-%3fZ"))
}

/// A layer writing only [`FRAME_LOG_TARGET`] events to `dir/file_name`.
///
/// # Errors
///
/// `dir` cannot be created.
pub fn frame_layer<S>(dir: &Path, file_name: &str) -> io::Result<(impl Layer<S> + Send + Sync, WorkerGuard)>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    std::fs::create_dir_all(dir)?;
    let appender = tracing_appender::rolling::never(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false)
        .with_filter(Targets::new().with_target(FRAME_LOG_TARGET, Level::TRACE));
    Ok((layer, guard))
}
