use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        };
        f.write_str(label)
    }
}

impl From<log::Level> for LogLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Trace => LogLevel::Trace,
            log::Level::Debug => LogLevel::Debug,
            log::Level::Info => LogLevel::Info,
            log::Level::Warn => LogLevel::Warn,
            log::Level::Error => LogLevel::Error,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
}

impl LogRecord {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

pub trait LogSink: Send + Sync {
    fn log(&self, record: LogRecord);
}

pub type SharedLogSink = Arc<dyn LogSink>;

#[derive(Default)]
pub struct NullLogSink;

impl LogSink for NullLogSink {
    fn log(&self, _record: LogRecord) {}
}

/// Collects records in memory; used by tests to assert on pipeline output.
#[derive(Default)]
pub struct VecLogSink {
    records: Mutex<Vec<LogRecord>>,
}

impl VecLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, record: LogRecord) {
        if let Ok(mut guard) = self.records.lock() {
            guard.push(record);
        }
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .map(|guard| guard.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
        self.records()
            .iter()
            .any(|record| record.level == level && record.message.contains(needle))
    }
}

impl LogSink for VecLogSink {
    fn log(&self, record: LogRecord) {
        self.push(record);
    }
}

/// Prints records at or above `min_level` to stdout.
#[derive(Clone)]
pub struct StdoutLogSink {
    min_level: LogLevel,
}

impl Default for StdoutLogSink {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
        }
    }
}

impl StdoutLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_level(min_level: LogLevel) -> Self {
        Self { min_level }
    }
}

impl LogSink for StdoutLogSink {
    fn log(&self, record: LogRecord) {
        if record.level >= self.min_level {
            println!("[{}] {}", record.level, record.message);
        }
    }
}

/// Appends every record to a log file, one `[LEVEL] message` entry per record.
pub struct FileLogSink {
    file: Mutex<File>,
}

impl FileLogSink {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl LogSink for FileLogSink {
    fn log(&self, record: LogRecord) {
        if let Ok(mut file) = self.file.lock() {
            let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
            // A failed log write must never take the pipeline down.
            let _ = writeln!(file, "{timestamp} [{}] {}", record.level, record.message);
        }
    }
}

/// Broadcasts each record to every inner sink.
#[derive(Default)]
pub struct FanoutLogSink {
    sinks: Vec<SharedLogSink>,
}

impl FanoutLogSink {
    pub fn new(sinks: Vec<SharedLogSink>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: SharedLogSink) {
        self.sinks.push(sink);
    }
}

impl LogSink for FanoutLogSink {
    fn log(&self, record: LogRecord) {
        for sink in &self.sinks {
            sink.log(record.clone());
        }
    }
}

/// Bridges the `log` facade into a [`LogSink`], so crates that log through
/// `log::warn!` and friends end up in the same stream as the pipeline.
pub struct SinkLogger {
    sink: SharedLogSink,
    max_level: log::LevelFilter,
}

impl SinkLogger {
    pub fn new(sink: SharedLogSink, max_level: log::LevelFilter) -> Self {
        Self { sink, max_level }
    }

    /// Installs the bridge as the global logger. Fails if a logger is already set.
    /// The logger lives for the rest of the process.
    pub fn install(
        sink: SharedLogSink,
        max_level: log::LevelFilter,
    ) -> Result<(), log::SetLoggerError> {
        log::set_logger(Box::leak(Box::new(Self::new(sink, max_level))))?;
        log::set_max_level(max_level);
        Ok(())
    }
}

impl log::Log for SinkLogger {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &log::Record<'_>) {
        if self.enabled(record.metadata()) {
            self.sink.log(LogRecord::new(
                record.level().into(),
                format!("{}: {}", record.target(), record.args()),
            ));
        }
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Log;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn fanout_delivers_to_every_sink() {
        let first = Arc::new(VecLogSink::new());
        let second = Arc::new(VecLogSink::new());
        let fanout = FanoutLogSink::new(vec![first.clone(), second.clone()]);

        fanout.log(LogRecord::new(LogLevel::Warn, "chapter too short"));

        assert_eq!(first.records().len(), 1);
        assert!(second.contains(LogLevel::Warn, "too short"));
    }

    #[test]
    fn file_sink_appends_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("novel_generation.log");

        let sink = FileLogSink::open(&path).unwrap();
        sink.log(LogRecord::new(LogLevel::Info, "first"));
        sink.log(LogRecord::new(LogLevel::Error, "second"));
        drop(sink);

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("[INFO] first"));
        assert!(written.contains("[ERROR] second"));
    }

    #[test]
    fn sink_logger_forwards_enabled_records() {
        let sink = Arc::new(VecLogSink::new());
        let logger = SinkLogger::new(sink.clone(), log::LevelFilter::Warn);

        logger.log(
            &log::Record::builder()
                .level(log::Level::Warn)
                .target("novelist_adapters::retry")
                .args(format_args!("attempt 1/3 failed"))
                .build(),
        );
        logger.log(
            &log::Record::builder()
                .level(log::Level::Debug)
                .target("novelist_adapters::retry")
                .args(format_args!("dropped"))
                .build(),
        );

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, LogLevel::Warn);
        assert!(records[0].message.contains("attempt 1/3 failed"));
    }

    #[test]
    fn installed_logger_receives_facade_records_once() {
        let sink = Arc::new(VecLogSink::new());
        SinkLogger::install(sink.clone(), log::LevelFilter::Info).unwrap();

        log::warn!(target: "novelist_adapters::retry", "attempt 2/3 failed: timeout");
        assert!(sink.contains(LogLevel::Warn, "attempt 2/3 failed: timeout"));

        let second = Arc::new(VecLogSink::new());
        assert!(SinkLogger::install(second, log::LevelFilter::Debug).is_err());
    }
}
