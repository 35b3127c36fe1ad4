//! Forwards the crate's log records to a host-provided sink.
//!
//! Library code logs through `tracing`, which emits `log` records when no
//! `tracing` subscriber is installed. Hosts that embed the vault and have their
//! own logging (an extension background page, a mobile shell) implement
//! [`Logger`] and install it once with [`set_logger`].
//!
//! ```rust
//! use std::sync::Arc;
//! use keeper_core::logger::{set_logger, LogLevel, Logger};
//!
//! struct Stderr;
//!
//! impl Logger for Stderr {
//!     fn log(&self, level: LogLevel, message: String) {
//!         eprintln!("[{level}] {message}");
//!     }
//! }
//!
//! let _ = set_logger(Arc::new(Stderr));
//! ```

use std::sync::{Arc, OnceLock};

use strum::Display;
use thiserror::Error;

/// Receives every record forwarded by the vault.
pub trait Logger: Sync + Send {
    /// Records `message` at `level`.
    fn log(&self, level: LogLevel, message: String);
}

/// Severity of a forwarded record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum LogLevel {
    /// Very detailed tracing.
    Trace,
    /// Debugging information.
    Debug,
    /// Progress of normal operations.
    Info,
    /// Unexpected but recoverable situations.
    Warn,
    /// Failed operations.
    Error,
}

impl From<log::Level> for LogLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => Self::Error,
            log::Level::Warn => Self::Warn,
            log::Level::Info => Self::Info,
            log::Level::Debug => Self::Debug,
            log::Level::Trace => Self::Trace,
        }
    }
}

/// Failure to install a [`Logger`].
#[derive(Debug, Error)]
pub enum LoggerError {
    /// [`set_logger`] was already called.
    #[error("a keeper logger is already installed")]
    AlreadySet,
    /// Another `log` implementation owns the global slot.
    #[error("failed to install log bridge: {0}")]
    Install(#[from] log::SetLoggerError),
}

static SINK: OnceLock<Arc<dyn Logger>> = OnceLock::new();

struct ForeignLogger;

impl ForeignLogger {
    /// Debug and trace records from dependencies are dropped; everything from this crate passes.
    fn accepts(level: log::Level, module_path: Option<&str>) -> bool {
        let verbose = matches!(level, log::Level::Debug | log::Level::Trace);
        !verbose || module_path.is_some_and(|path| path.starts_with("keeper"))
    }
}

impl log::Log for ForeignLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        if !Self::accepts(record.level(), record.module_path()) {
            return;
        }
        if let Some(sink) = SINK.get() {
            sink.log(record.level().into(), record.args().to_string());
        }
    }

    fn flush(&self) {}
}

/// Installs `logger` as the destination of every record. Call once per process.
///
/// # Errors
///
/// - [`LoggerError::AlreadySet`] on a second call.
/// - [`LoggerError::Install`] if another `log` implementation is installed.
pub fn set_logger(logger: Arc<dyn Logger>) -> Result<(), LoggerError> {
    SINK.set(logger).map_err(|_| LoggerError::AlreadySet)?;

    static BRIDGE: ForeignLogger = ForeignLogger;
    log::set_logger(&BRIDGE)?;
    log::set_max_level(log::LevelFilter::Trace);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependency_noise_is_filtered() {
        assert!(ForeignLogger::accepts(log::Level::Debug, Some("keeper_core::lock")));
        assert!(ForeignLogger::accepts(log::Level::Warn, Some("hyper::client")));
        assert!(!ForeignLogger::accepts(log::Level::Trace, Some("tokio::sync")));
        assert!(!ForeignLogger::accepts(log::Level::Debug, None));
    }

    #[derive(Default)]
    struct Recorder(std::sync::Mutex<Vec<(LogLevel, String)>>);

    impl Logger for Recorder {
        fn log(&self, level: LogLevel, message: String) {
            self.0.lock().expect("recorder lock").push((level, message));
        }
    }

    struct Silent;

    impl log::Log for Silent {
        fn enabled(&self, _metadata: &log::Metadata) -> bool {
            false
        }
        fn log(&self, _record: &log::Record) {}
        fn flush(&self) {}
    }

    // The only test in this binary that touches the global `log` slot.
    #[test]
    fn test_install_once_and_forward() {
        let recorder = Arc::new(Recorder::default());
        set_logger(recorder.clone()).expect("first install");
        assert!(matches!(
            set_logger(Arc::new(Recorder::default())),
            Err(LoggerError::AlreadySet)
        ));

        log::warn!("sealed blob rewritten");
        assert!(recorder
            .0
            .lock()
            .expect("recorder lock")
            .iter()
            .any(|(level, message)| *level == LogLevel::Warn && message == "sealed blob rewritten"));

        static SILENT: Silent = Silent;
        let err = LoggerError::from(log::set_logger(&SILENT).expect_err("slot taken"));
        assert!(err.to_string().starts_with("failed to install log bridge"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_level_mapping() {
        assert_eq!(LogLevel::from(log::Level::Warn), LogLevel::Warn);
        assert_eq!(LogLevel::Error.to_string(), "error");
    }
}
