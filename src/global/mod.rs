//! Process-wide default wiring.
//!
//! # Responsibilities
//! - Hold the default logger used when a context carries none
//! - Build the default writer and logger from [`Config`]
//! - Install the default logger as the `log` facade handler and the global
//!   `tracing` subscriber
//!
//! # Data Flow
//! ```text
//! init(config)
//!     → build: DiodeWriter(stdout) → Logger
//!     → LogBridge::install / TracingBridge::install
//!     → set_global_level(config level or CTXLOG_LEVEL)
//!     → set_default_logger
//!     → GlobalHandles (owned by the application)
//! ```
//!
//! # Design Decisions
//! - `init` is explicit and succeeds once; a failed `init` closes its
//!   writer and publishes nothing, so it can be retried
//! - Facade installs cannot be undone; one that succeeded is kept and not
//!   repeated on retry. Bridges resolve the default slot per record, so
//!   until `init` succeeds they write to the stdout fallback
//! - The default slot is an `ArcSwap`, so tests may replace and reset it
//! - Before `init` the default logger writes synchronously to stdout

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

use arc_swap::ArcSwap;
use thiserror::Error;
use tracing::subscriber::SetGlobalDefaultError;

use crate::bridge::{LogBridge, TracingBridge};
use crate::config::{validate_config, Config, ConfigError};
use crate::level::{level_from_env, set_global_level, Level};
use crate::logger::{new_logger, Logger, LoggerOptions};
use crate::writer::DiodeWriter;

static DEFAULT_LOGGER: LazyLock<ArcSwap<Logger>> =
    LazyLock::new(|| ArcSwap::from_pointee(fallback_logger()));

static INITIALIZED: AtomicBool = AtomicBool::new(false);
static LOG_FACADE_INSTALLED: AtomicBool = AtomicBool::new(false);
static TRACING_INSTALLED: AtomicBool = AtomicBool::new(false);

fn fallback_logger() -> Logger {
    new_logger(io::stdout, LoggerOptions::new().with_level(level_from_env()))
}

/// The current process default logger.
pub fn default_logger() -> Logger {
    Logger::clone(&DEFAULT_LOGGER.load())
}

/// Replace the process default logger.
pub fn set_default_logger(logger: Logger) {
    DEFAULT_LOGGER.store(Arc::new(logger));
}

/// Restore the synchronous stdout default used before `init`.
pub fn reset_default_logger() {
    set_default_logger(fallback_logger());
}

/// Errors from [`init`].
#[derive(Debug, Error)]
pub enum InitError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to spawn writer threads: {0}")]
    Writer(#[from] io::Error),

    #[error("failed to install log facade handler: {0}")]
    LogFacade(#[from] log::SetLoggerError),

    #[error("failed to install tracing subscriber: {0}")]
    Tracing(#[from] SetGlobalDefaultError),

    #[error("logging already initialized")]
    AlreadyInitialized,
}

/// Default writer and logger built from a [`Config`].
///
/// Dropping the last handle flushes the writer.
#[derive(Debug, Clone)]
pub struct GlobalHandles {
    pub logger: Logger,
    pub writer: DiodeWriter,
}

impl GlobalHandles {
    /// Flush buffered entries and report any remaining drops.
    pub fn shutdown(&self) {
        self.writer.close();
    }
}

/// Build the default writer and logger around `sink` without touching
/// any process-wide state.
pub fn build<W>(config: &Config, sink: W) -> Result<GlobalHandles, InitError>
where
    W: io::Write + Send + 'static,
{
    validate_config(config).map_err(ConfigError::Validation)?;
    let writer = DiodeWriter::new(sink, &config.diode)?;
    let logger = new_logger(
        writer.clone(),
        LoggerOptions::new()
            .with_config(config.logger.clone())
            .with_level(config.resolved_level()),
    );
    Ok(GlobalHandles { logger, writer })
}

/// Set up process-wide logging. Succeeds once; later calls fail with
/// [`InitError::AlreadyInitialized`]. A failed call changes neither the
/// global level nor the default logger.
pub fn init(config: Config) -> Result<GlobalHandles, InitError> {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return Err(InitError::AlreadyInitialized);
    }
    match try_init(&config) {
        Ok(handles) => Ok(handles),
        Err(e) => {
            INITIALIZED.store(false, Ordering::SeqCst);
            Err(e)
        }
    }
}

fn try_init(config: &Config) -> Result<GlobalHandles, InitError> {
    let level = config.resolved_level();
    let handles = build(config, io::stdout())?;
    if let Err(e) = install_facades(config, level) {
        handles.shutdown();
        return Err(e);
    }

    set_global_level(level);
    set_default_logger(handles.logger.clone());
    tracing::debug!(target: "ctxlog", %level, buffer_size = config.diode.buffer_size, "logging initialized");
    Ok(handles)
}

fn install_facades(config: &Config, level: Level) -> Result<(), InitError> {
    if config.install_log_facade {
        if LOG_FACADE_INSTALLED.load(Ordering::SeqCst) {
            log::set_max_level(level.to_level_filter());
        } else {
            LogBridge::new().install(level)?;
            LOG_FACADE_INSTALLED.store(true, Ordering::SeqCst);
        }
    }
    if config.install_tracing && !TRACING_INSTALLED.load(Ordering::SeqCst) {
        TracingBridge::new().install()?;
        TRACING_INSTALLED.store(true, Ordering::SeqCst);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::CaptureSink;

    #[test]
    fn test_build_wires_logger_to_writer() {
        let sink = CaptureSink::new();
        let config = Config {
            level: Some(Level::Info),
            ..Config::default()
        };
        let handles = build(&config, sink.clone()).unwrap();

        handles.logger.debug().msg("filtered");
        handles.logger.info().field("k", "v").msg("through the diode");
        handles.shutdown();

        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["message"], "through the diode");
        assert_eq!(handles.logger.level(), Level::Info);
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let mut config = Config::default();
        config.diode.buffer_size = 0;
        let err = build(&config, io::sink()).unwrap_err();
        assert!(matches!(err, InitError::Config(ConfigError::Validation(_))));
    }
}
