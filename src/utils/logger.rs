use chrono::{DateTime, Utc};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Debug,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Append-only file logger writing to `<data dir>/logs/latest.log`.
///
/// Write failures are ignored; the session keeps running without
/// diagnostics.
#[derive(Clone)]
pub struct Logger {
    file_handle: Arc<Mutex<Option<std::fs::File>>>,
}

impl Logger {
    pub fn new(base_dir: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let logs_dir = base_dir.join("logs");
        fs::create_dir_all(&logs_dir)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(logs_dir.join("latest.log"))?;

        Ok(Self {
            file_handle: Arc::new(Mutex::new(Some(file))),
        })
    }

    /// A logger that swallows everything, for when the log file cannot open
    pub fn disabled() -> Self {
        Self {
            file_handle: Arc::new(Mutex::new(None)),
        }
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        let timestamp: DateTime<Utc> = Utc::now();
        let line = format!(
            "[{}] [{}] {}\n",
            timestamp.format("%Y-%m-%d %H:%M:%S%.3f UTC"),
            level,
            message
        );

        if let Ok(mut guard) = self.file_handle.lock() {
            if let Some(ref mut file) = *guard {
                let _ = file.write_all(line.as_bytes());
                let _ = file.flush();
            }
        }
    }
}

static GLOBAL_LOGGER: OnceLock<Logger> = OnceLock::new();

pub fn init_global_logger(base_dir: &Path) {
    let logger = Logger::new(base_dir).unwrap_or_else(|e| {
        eprintln!("Failed to initialize logger: {}", e);
        Logger::disabled()
    });
    let _ = GLOBAL_LOGGER.set(logger);
}

pub fn log(level: LogLevel, message: &str) {
    if let Some(logger) = GLOBAL_LOGGER.get() {
        logger.log(level, message);
    }
}

pub fn info(message: &str) {
    log(LogLevel::Info, message);
}

pub fn debug(message: &str) {
    log(LogLevel::Debug, message);
}

pub fn warn(message: &str) {
    log(LogLevel::Warn, message);
}

pub fn error(message: &str) {
    log(LogLevel::Error, message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logger_writes_lines() {
        let dir = tempfile::tempdir().unwrap();
        let logger = Logger::new(dir.path()).unwrap();
        logger.log(LogLevel::Warn, "save failed");
        logger.log(LogLevel::Info, "loaded 3 conversations");

        let content = std::fs::read_to_string(dir.path().join("logs/latest.log")).unwrap();
        assert!(content.contains("[WARN] save failed"));
        assert!(content.contains("[INFO] loaded 3 conversations"));
    }

    #[test]
    fn test_disabled_logger_is_silent() {
        // Must not panic or create files
        let logger = Logger::disabled();
        logger.log(LogLevel::Error, "dropped");
    }
}
