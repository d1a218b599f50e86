use std::fs::File;
use std::io::Write;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::{Error, Result};

pub const LEVEL_ENV: &str = "SHADOWSTATION_LOG_LEVEL";
pub const PATH_ENV: &str = "SHADOWSTATION_LOG_PATH";

/// Log verbosity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    #[default]
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl FromStr for LogLevel {
    type Err = ();
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(()),
        }
    }
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Stderr logger with an optional append-only file sink, backing the `log`
/// macros.
pub struct Logger {
    level: LogLevel,
    file: Option<Mutex<File>>,
}

impl Logger {
    /// The level variable overrides `level`; an explicit `file_path` wins over
    /// the path variable.
    pub fn new(level: LogLevel, file_path: Option<String>) -> Self {
        let (level, path) = resolve_settings(
            level,
            file_path,
            std::env::var(LEVEL_ENV).ok(),
            std::env::var(PATH_ENV).ok(),
        );
        Self::with_sink(level, path)
    }

    fn with_sink(level: LogLevel, path: Option<String>) -> Self {
        let file = path.and_then(|p| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(p)
                .ok()
                .map(Mutex::new)
        });
        Self { level, file }
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    fn format_line(record: &log::Record<'_>) -> String {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        format!(
            "[{ts:.3}] [{:?}] {}: {}",
            record.level(),
            record.target(),
            record.args()
        )
    }
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        metadata.level() <= log::LevelFilter::from(self.level)
    }

    fn log(&self, record: &log::Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = Self::format_line(record);
        eprintln!("{line}");
        if let Some(file) = self.file.as_ref() {
            let mut file = file.lock().unwrap_or_else(PoisonError::into_inner);
            let _ = writeln!(file, "{line}");
        }
    }

    fn flush(&self) {
        if let Some(file) = self.file.as_ref() {
            let _ = file.lock().unwrap_or_else(PoisonError::into_inner).flush();
        }
    }
}

fn resolve_settings(
    level: LogLevel,
    file_path: Option<String>,
    env_level: Option<String>,
    env_path: Option<String>,
) -> (LogLevel, Option<String>) {
    let env_level = env_level.and_then(|s| LogLevel::from_str(&s).ok());
    (env_level.unwrap_or(level), file_path.or(env_path))
}

/// Install the process-wide logger. Returns the effective level.
pub fn install(level: LogLevel, file_path: Option<String>) -> Result<LogLevel> {
    let logger = Logger::new(level, file_path);
    let effective = logger.level();
    log::set_boxed_logger(Box::new(logger))
        .map_err(|e| Error::InvalidArgs(format!("logger already installed: {e}")))?;
    log::set_max_level(effective.into());
    Ok(effective)
}
