//! Logging initialization for munin nodes.
//!
//! ```rust,no_run
//! use munin_node::LoggingConfig;
//!
//! // Stderr only, no guard needed
//! LoggingConfig::default().init()?;
//! # Ok::<(), std::io::Error>(())
//! ```
//!
//! File output goes through a non-blocking writer. The returned
//! [`LoggingGuard`] flushes it on drop and must live as long as the process
//! logs; dropping it early loses buffered lines.
//!
//! `RUST_LOG` overrides the configured level.

use std::io;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{LogOutput, LogRotation, LoggingConfig};

/// Flushes file logs on drop
#[derive(Debug)]
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
    _stderr_guard: Option<WorkerGuard>,
}

impl LoggingConfig {
    /// Installs the global tracing subscriber.
    ///
    /// Returns `Some(LoggingGuard)` for file output (must be held), `None`
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - File output is configured without a directory, or the directory cannot be created
    /// - A global subscriber is already installed
    pub fn init(&self) -> io::Result<Option<LoggingGuard>> {
        let (writer, guard) = match self.output {
            LogOutput::None => return Ok(None),
            LogOutput::Stderr => (BoxMakeWriter::new(io::stderr), None),
            LogOutput::FileOnly | LogOutput::Both => {
                let dir = self.directory.as_deref().ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "File logging requires logging.directory",
                    )
                })?;
                let (writer, guard) = self.file_writer(dir)?;
                (writer, Some(guard))
            }
        };

        self.install(writer)?;
        Ok(guard)
    }

    /// `RUST_LOG` when set, the configured level otherwise.
    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level))
    }

    fn install(&self, writer: BoxMakeWriter) -> io::Result<()> {
        // Escape codes only make sense on a terminal
        let ansi = self.output == LogOutput::Stderr;
        let registry = tracing_subscriber::registry().with(self.filter());

        let result = if self.structured {
            registry
                .with(fmt::layer().json().with_writer(writer))
                .try_init()
        } else {
            registry
                .with(fmt::layer().with_ansi(ansi).with_writer(writer))
                .try_init()
        };
        result.map_err(|e| io::Error::other(e.to_string()))
    }

    fn file_appender(&self, dir: &Path) -> RollingFileAppender {
        let prefix = &self.file_prefix;
        match self.rotation {
            LogRotation::Minute => tracing_appender::rolling::minutely(dir, prefix),
            LogRotation::Hourly => tracing_appender::rolling::hourly(dir, prefix),
            LogRotation::Daily => tracing_appender::rolling::daily(dir, prefix),
            LogRotation::Never => tracing_appender::rolling::never(dir, prefix),
        }
    }

    /// Non-blocking file writer, teed to stderr for [`LogOutput::Both`].
    fn file_writer(&self, dir: &Path) -> io::Result<(BoxMakeWriter, LoggingGuard)> {
        std::fs::create_dir_all(dir)?;

        let (file, file_guard) = tracing_appender::non_blocking(self.file_appender(dir));
        if self.output == LogOutput::Both {
            let (stderr, stderr_guard) = tracing_appender::non_blocking(io::stderr());
            Ok((
                BoxMakeWriter::new(file.and(stderr)),
                LoggingGuard {
                    _file_guard: file_guard,
                    _stderr_guard: Some(stderr_guard),
                },
            ))
        } else {
            Ok((
                BoxMakeWriter::new(file),
                LoggingGuard {
                    _file_guard: file_guard,
                    _stderr_guard: None,
                },
            ))
        }
    }
}
