//! A minimal stderr logger, plus macros for logging and discarding errors.

use log::{Level, LevelFilter, Metadata, Record, SetLoggerError};

/// Evaluates a `Result`, logging the error at `warn` level and continuing with `()`.
#[macro_export]
macro_rules! with_warn {
    ($expr: expr) => (with_warn!("{}", $expr));
    ($fmt: tt, $expr: expr) => (match $expr {
        Ok(v) => v,
        Err(e) => ::log::warn!($fmt, e),
    });
}

#[macro_export]
macro_rules! catching {
    ($expr: expr) => (catching!("{:?}", $expr));
    ($fmt: tt, $expr: expr) => (match $expr {
        Ok(v) => v,
        Err(e) => ::log::debug!($fmt, e),
    });
}

const MAX_LOG_LEVEL: LevelFilter = LevelFilter::Debug;

static LOGGER: SimpleLogger = SimpleLogger;

pub struct SimpleLogger;

impl SimpleLogger {
    /// Installs the logger. Fails if another logger is already installed.
    pub fn init() -> Result<(), SetLoggerError> {
        log::set_logger(&LOGGER)?;
        log::set_max_level(MAX_LOG_LEVEL);
        Ok(())
    }
}

impl log::Log for SimpleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Debug
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] [{}] {}", record.target(), record.level(), record.args());
        }
    }

    fn flush(&self) {}
}
