//! Logging context
//!
//! Components log through named [`Logger`]s handed to them at construction
//! time rather than looking up process-wide handles. Each logger has its own
//! adjustable level on top of the global `tracing` subscriber filter, so a
//! debug flag can raise one component without touching the others.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// A named logger with its own level
#[derive(Clone)]
pub struct Logger {
    name: &'static str,
    level: Arc<RwLock<Level>>,
}

impl Logger {
    pub fn new(name: &'static str, level: Level) -> Self {
        Self {
            name,
            level: Arc::new(RwLock::new(level)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn level(&self) -> Level {
        *self.level.read()
    }

    /// Change the level for this logger and every clone of it
    pub fn set_level(&self, level: Level) {
        *self.level.write() = level;
    }

    /// Whether an event at `level` passes this logger's threshold
    pub fn enabled(&self, level: Level) -> bool {
        // tracing orders levels by verbosity: TRACE > DEBUG > ... > ERROR
        level <= self.level()
    }

    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        if !self.enabled(level) {
            return;
        }
        let logger = self.name;
        match level {
            Level::ERROR => tracing::error!(logger, "{}", args),
            Level::WARN => tracing::warn!(logger, "{}", args),
            Level::INFO => tracing::info!(logger, "{}", args),
            Level::DEBUG => tracing::debug!(logger, "{}", args),
            _ => tracing::trace!(logger, "{}", args),
        }
    }

    pub fn error(&self, args: fmt::Arguments<'_>) {
        self.log(Level::ERROR, args)
    }

    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.log(Level::WARN, args)
    }

    pub fn info(&self, args: fmt::Arguments<'_>) {
        self.log(Level::INFO, args)
    }

    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(Level::DEBUG, args)
    }

    /// A sink writing every line to this logger at a fixed level
    pub fn sink(&self, level: Level) -> LogSink {
        LogSink {
            logger: self.clone(),
            level,
        }
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.name)
            .field("level", &self.level())
            .finish()
    }
}

/// A logger bound to one level, for handing to code that only emits lines
#[derive(Clone, Debug)]
pub struct LogSink {
    logger: Logger,
    level: Level,
}

impl LogSink {
    pub fn level(&self) -> Level {
        self.level
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn line(&self, args: fmt::Arguments<'_>) {
        self.logger.log(self.level, args)
    }

    /// Forward every line read from `reader` until EOF
    pub async fn forward<R>(self, reader: R)
    where
        R: AsyncRead + Unpin,
    {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => self.line(format_args!("{}", line)),
                Ok(None) => break,
                Err(e) => {
                    self.logger
                        .warn(format_args!("log forwarding stopped: {}", e));
                    break;
                }
            }
        }
    }
}

/// The loggers used by one mount
#[derive(Clone, Debug)]
pub struct LogContext {
    /// Orchestration
    pub main: Logger,
    /// FUSE bridge
    pub fuse: Logger,
    /// Object-storage client
    pub s3: Logger,
    /// Cache subprocess output
    pub catfs: Logger,
}

impl LogContext {
    pub fn new() -> Self {
        Self {
            main: Logger::new("main", Level::INFO),
            fuse: Logger::new("fuse", Level::INFO),
            s3: Logger::new("s3", Level::INFO),
            catfs: Logger::new("catfs", Level::INFO),
        }
    }
}

impl Default for LogContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` overrides the configured level.
pub fn init_tracing(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    // A subscriber may already be installed by the embedding program
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
