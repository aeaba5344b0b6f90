//! Structured logging for the peer throughput tester
//!
//! This module provides:
//! - Structured log entries with levels, fields and correlation IDs
//! - Console, JSON and compact output formats
//! - Session-wide context shared by every logger of a run
//! - Specialized loggers for measurement results, transport events and errors
//!
//! Log output always goes to stderr so that reports and JSON summaries on
//! stdout stay machine-readable.

use crate::error::{AppError, Result};
use crate::models::{Config, TestResult, ThroughputSummary};
use crate::stats::DelayStatistics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Log level enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    /// Per-packet and per-tick detail
    Trace = 0,
    Debug = 1,
    /// Test lifecycle
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl LogLevel {
    /// Get log level name as string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        }
    }

    /// Get ANSI color code for console output
    pub fn color_code(&self) -> &'static str {
        match self {
            LogLevel::Trace => "\x1b[37m",
            LogLevel::Debug => "\x1b[36m",
            LogLevel::Info => "\x1b[32m",
            LogLevel::Warn => "\x1b[33m",
            LogLevel::Error => "\x1b[31m",
            LogLevel::Fatal => "\x1b[35m",
        }
    }

    pub fn reset_code() -> &'static str {
        "\x1b[0m"
    }
}

impl std::str::FromStr for LogLevel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "TRACE" => Ok(LogLevel::Trace),
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            "FATAL" => Ok(LogLevel::Fatal),
            _ => Err(AppError::parse(format!("Invalid log level: {}", s))),
        }
    }
}

/// Log entry structure for structured logging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    /// Logger name/component
    pub logger: String,
    /// Correlation ID tying together the entries of one test run
    pub correlation_id: Option<String>,
    pub fields: HashMap<String, serde_json::Value>,
    pub location: Option<LogLocation>,
}

/// Source code location information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLocation {
    pub file: String,
    pub line: u32,
    pub module: Option<String>,
}

/// Logger with console, JSON and compact output
#[derive(Clone)]
pub struct Logger {
    min_level: LogLevel,
    use_color: bool,
    include_location: bool,
    format: LogFormat,
    name: String,
    context: Arc<RwLock<LogContext>>,
}

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogFormat {
    /// Human-readable console format
    Console,
    /// One JSON object per line
    Json,
    /// Compact single-line format
    Compact,
}

/// Shared logging context for correlation and session tracking
#[derive(Debug, Default)]
struct LogContext {
    session_id: Option<String>,
    current_correlation_id: Option<String>,
    context_fields: HashMap<String, serde_json::Value>,
}

/// Logs finished test results
pub struct MeasurementLogger {
    logger: Logger,
}

/// Logs session lifecycle and telemetry polling
pub struct TransportLogger {
    logger: Logger,
}

/// Error event logger with enhanced context
pub struct ErrorEventLogger {
    logger: Logger,
}

impl Logger {
    /// Create a new logger
    pub fn new(name: String) -> Self {
        Self {
            min_level: LogLevel::Info,
            use_color: true,
            include_location: false,
            format: LogFormat::Console,
            name,
            context: Arc::new(RwLock::new(LogContext::default())),
        }
    }

    /// Create a logger whose level and format follow the configuration
    pub fn with_config(name: String, config: &Config) -> Self {
        let min_level = if config.debug {
            LogLevel::Debug
        } else if config.verbose {
            LogLevel::Info
        } else {
            LogLevel::Warn
        };

        Self {
            min_level,
            use_color: config.enable_color,
            include_location: config.debug,
            format: if config.debug {
                LogFormat::Json
            } else if config.verbose {
                LogFormat::Compact
            } else {
                LogFormat::Console
            },
            name,
            context: Arc::new(RwLock::new(LogContext::default())),
        }
    }

    /// A logger that drops everything below `Fatal`
    pub fn quiet(name: &str) -> Self {
        let mut logger = Self::new(name.to_string());
        logger.set_level(LogLevel::Fatal);
        logger
    }

    /// Same output settings and shared context under another name
    pub fn named(&self, name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..self.clone()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_level(&mut self, level: LogLevel) {
        self.min_level = level;
    }

    pub fn set_format(&mut self, format: LogFormat) {
        self.format = format;
    }

    pub fn set_color(&mut self, use_color: bool) {
        self.use_color = use_color;
    }

    /// Set session correlation ID
    pub async fn set_session_id(&self, session_id: String) {
        let mut context = self.context.write().await;
        context.session_id = Some(session_id);
    }

    /// Add context field for all subsequent log entries
    pub async fn add_context_field<T: Serialize>(&self, key: String, value: T) {
        if let Ok(json_value) = serde_json::to_value(value) {
            let mut context = self.context.write().await;
            context.context_fields.insert(key, json_value);
        }
    }

    /// Start a correlated operation
    pub async fn start_operation(&self, operation_name: &str) -> String {
        let correlation_id = Uuid::new_v4().to_string();
        {
            let mut context = self.context.write().await;
            context.current_correlation_id = Some(correlation_id.clone());
        }

        self.info(&format!("Started {}", operation_name))
            .correlation_id(&correlation_id)
            .field("operation", operation_name)
            .field("operation_type", "start")
            .log()
            .await;

        correlation_id
    }

    /// End a correlated operation
    pub async fn end_operation(&self, correlation_id: &str, operation_name: &str, success: bool) {
        self.info(&format!("Finished {} (success: {})", operation_name, success))
            .correlation_id(correlation_id)
            .field("operation", operation_name)
            .field("operation_type", "end")
            .field("success", success)
            .log()
            .await;

        let mut context = self.context.write().await;
        if context.current_correlation_id.as_deref() == Some(correlation_id) {
            context.current_correlation_id = None;
        }
    }

    /// Create a log entry builder
    pub fn log(&self, level: LogLevel, message: &str) -> LogEntryBuilder {
        LogEntryBuilder::new(self, level, message.to_string())
    }

    pub fn trace(&self, message: &str) -> LogEntryBuilder {
        self.log(LogLevel::Trace, message)
    }

    pub fn debug(&self, message: &str) -> LogEntryBuilder {
        self.log(LogLevel::Debug, message)
    }

    pub fn info(&self, message: &str) -> LogEntryBuilder {
        self.log(LogLevel::Info, message)
    }

    pub fn warn(&self, message: &str) -> LogEntryBuilder {
        self.log(LogLevel::Warn, message)
    }

    pub fn error(&self, message: &str) -> LogEntryBuilder {
        self.log(LogLevel::Error, message)
    }

    pub fn fatal(&self, message: &str) -> LogEntryBuilder {
        self.log(LogLevel::Fatal, message)
    }

    /// Check if a log level would be output
    pub fn would_log(&self, level: LogLevel) -> bool {
        level >= self.min_level
    }

    async fn write_entry(&self, mut entry: LogEntry) {
        if entry.level < self.min_level {
            return;
        }

        self.apply_context(&mut entry).await;
        let output = self.format_entry(&entry);
        let _ = writeln!(io::stderr(), "{}", output);
    }

    /// Stamp session, correlation and context fields onto an entry
    async fn apply_context(&self, entry: &mut LogEntry) {
        let context = self.context.read().await;
        if let Some(session_id) = &context.session_id {
            entry.fields.insert("session_id".to_string(), serde_json::Value::String(session_id.clone()));
        }
        if entry.correlation_id.is_none() {
            entry.correlation_id = context.current_correlation_id.clone();
        }
        for (key, value) in &context.context_fields {
            entry.fields.insert(key.clone(), value.clone());
        }
    }

    fn format_entry(&self, entry: &LogEntry) -> String {
        match self.format {
            LogFormat::Console => self.format_console(entry),
            LogFormat::Json => self.format_json(entry),
            LogFormat::Compact => self.format_compact(entry),
        }
    }

    fn format_console(&self, entry: &LogEntry) -> String {
        let timestamp = entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f");
        let level_str = entry.level.as_str();

        let formatted_level = if self.use_color {
            format!("{}{:>5}{}", entry.level.color_code(), level_str, LogLevel::reset_code())
        } else {
            format!("{:>5}", level_str)
        };

        let mut output = format!("{} {} [{}] {}", timestamp, formatted_level, entry.logger, entry.message);

        if let Some(correlation_id) = &entry.correlation_id {
            let short: String = correlation_id.chars().take(8).collect();
            output.push_str(&format!(" [{}]", short));
        }

        if !entry.fields.is_empty() {
            let mut fields: Vec<String> = entry.fields.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            fields.sort();
            output.push_str(&format!(" {{{}}}", fields.join(", ")));
        }

        if self.include_location {
            if let Some(location) = &entry.location {
                output.push_str(&format!(" @ {}:{}", location.file, location.line));
            }
        }

        output
    }

    fn format_json(&self, entry: &LogEntry) -> String {
        match serde_json::to_string(entry) {
            Ok(json) => json,
            Err(_) => format!("{{\"error\": \"Failed to serialize log entry\", \"message\": {:?}}}", entry.message),
        }
    }

    fn format_compact(&self, entry: &LogEntry) -> String {
        let timestamp = entry.timestamp.format("%H:%M:%S");
        format!(
            "{} {} {}: {}",
            timestamp,
            entry.level.as_str().chars().next().unwrap_or('?'),
            entry.logger,
            entry.message
        )
    }
}

/// Builder pattern for creating log entries
pub struct LogEntryBuilder<'a> {
    logger: &'a Logger,
    entry: LogEntry,
}

impl<'a> LogEntryBuilder<'a> {
    fn new(logger: &'a Logger, level: LogLevel, message: String) -> Self {
        Self {
            logger,
            entry: LogEntry {
                timestamp: Utc::now(),
                level,
                message,
                logger: logger.name.clone(),
                correlation_id: None,
                fields: HashMap::new(),
                location: None,
            },
        }
    }

    pub fn correlation_id(mut self, id: &str) -> Self {
        self.entry.correlation_id = Some(id.to_string());
        self
    }

    /// Add a structured field
    pub fn field<T: Serialize>(mut self, key: &str, value: T) -> Self {
        if let Ok(json_value) = serde_json::to_value(value) {
            self.entry.fields.insert(key.to_string(), json_value);
        }
        self
    }

    pub fn location(mut self, file: &str, line: u32, module: Option<&str>) -> Self {
        self.entry.location = Some(LogLocation {
            file: file.to_string(),
            line,
            module: module.map(String::from),
        });
        self
    }

    /// Add data channel throughput figures
    pub fn throughput(self, summary: &ThroughputSummary) -> Self {
        self.field("sent_bytes", summary.sent_bytes)
            .field("received_bytes", summary.received_bytes)
            .field("total_kilobits", summary.total_kilobits)
            .field("elapsed_seconds", summary.elapsed_seconds)
            .field("average_kbps", summary.average_kbps())
    }

    /// Add one-way delay figures
    pub fn delays(self, stats: &DelayStatistics) -> Self {
        self.field("avg_delay_ms", stats.avg_ms)
            .field("min_delay_ms", stats.min_ms)
            .field("max_delay_ms", stats.max_ms)
    }

    /// Add error information
    pub fn error_info(self, error: &AppError) -> Self {
        self.field("error_category", error.category())
            .field("error_recoverable", error.is_recoverable())
            .field("error_exit_code", error.exit_code())
    }

    /// Finalize and write the log entry
    pub async fn log(self) {
        self.logger.write_entry(self.entry).await;
    }
}

impl MeasurementLogger {
    pub fn new(config: &Config) -> Self {
        Self {
            logger: Logger::with_config("MEAS".to_string(), config),
        }
    }

    /// Log a finished test case with its headline figures
    pub async fn log_test_result(&self, result: &TestResult) {
        let level = if result.passed() { LogLevel::Info } else { LogLevel::Warn };
        let message = format!(
            "Test {}/{} finished with {} in {}ms",
            result.suite, result.name, result.status, result.duration_ms
        );

        let mut builder = self.logger.log(level, &message)
            .field("suite", &result.suite)
            .field("test", &result.name)
            .field("status", result.status)
            .field("duration_ms", result.duration_ms)
            .field("error_count", result.errors.len());

        if let Some(summary) = &result.summary {
            builder = builder.field("summary", summary);
        }

        builder.log().await;
    }

    /// Log the aggregate outcome of a whole run
    pub async fn log_run_summary(&self, total: usize, passed: usize, duration: std::time::Duration) {
        self.logger.info(&format!("Run finished: {}/{} tests passed in {:.1}s", passed, total, duration.as_secs_f64()))
            .field("total_tests", total)
            .field("passed_tests", passed)
            .field("duration_seconds", duration.as_secs_f64())
            .log()
            .await;
    }
}

impl TransportLogger {
    pub fn new(config: &Config) -> Self {
        Self {
            logger: Logger::with_config("LINK".to_string(), config),
        }
    }

    /// Log a session lifecycle step such as create, establish or close
    pub async fn log_session_event(&self, test: &str, event: &str, error: Option<&AppError>) {
        match error {
            None => {
                self.logger.debug(&format!("{}: session {}", test, event))
                    .field("test", test)
                    .field("event", event)
                    .field("success", true)
                    .log()
                    .await;
            }
            Some(err) => {
                self.logger.warn(&format!("{}: session {} failed: {}", test, event, err))
                    .field("test", test)
                    .field("event", event)
                    .field("success", false)
                    .error_info(err)
                    .log()
                    .await;
            }
        }
    }
}

impl ErrorEventLogger {
    pub fn new(config: &Config) -> Self {
        Self {
            logger: Logger::with_config("ERR".to_string(), config),
        }
    }

    /// Log an application error with full context
    pub async fn log_error(&self, error: &AppError, context: Option<&str>, correlation_id: Option<&str>) {
        let message = match context {
            Some(ctx) => format!("{}: {}", ctx, error),
            None => error.to_string(),
        };

        let mut builder = self.logger.error(&message).error_info(error);

        if let Some(id) = correlation_id {
            builder = builder.correlation_id(id);
        }
        if let Some(ctx) = context {
            builder = builder.field("context", ctx);
        }

        builder.log().await;
    }
}

/// Creates loggers that share one session id
pub struct LoggerFactory {
    config: Config,
    session_id: String,
}

impl LoggerFactory {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            session_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create a logger with a specific name
    pub async fn create_logger(&self, name: &str) -> Logger {
        let logger = Logger::with_config(name.to_string(), &self.config);
        logger.set_session_id(self.session_id.clone()).await;
        logger
    }

    pub fn create_measurement_logger(&self) -> MeasurementLogger {
        MeasurementLogger::new(&self.config)
    }

    pub fn create_transport_logger(&self) -> TransportLogger {
        TransportLogger::new(&self.config)
    }

    pub fn create_error_logger(&self) -> ErrorEventLogger {
        ErrorEventLogger::new(&self.config)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

/// Convenience macros for logging with location information
#[macro_export]
macro_rules! log_debug {
    ($logger:expr, $($arg:tt)*) => {
        $logger.debug(&format!($($arg)*))
            .location(file!(), line!(), Some(module_path!()))
            .log()
            .await
    };
}

#[macro_export]
macro_rules! log_info {
    ($logger:expr, $($arg:tt)*) => {
        $logger.info(&format!($($arg)*))
            .location(file!(), line!(), Some(module_path!()))
            .log()
            .await
    };
}

#[macro_export]
macro_rules! log_warn {
    ($logger:expr, $($arg:tt)*) => {
        $logger.warn(&format!($($arg)*))
            .location(file!(), line!(), Some(module_path!()))
            .log()
            .await
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MeasurementSummary;
    use crate::types::TestStatus;
    use std::str::FromStr;

    fn sample_entry() -> LogEntry {
        LogEntry {
            timestamp: Utc::now(),
            level: LogLevel::Info,
            message: "Transmitting at 8192 kbps.".to_string(),
            logger: "THROUGHPUT".to_string(),
            correlation_id: Some("0123456789abcdef".to_string()),
            fields: {
                let mut map = HashMap::new();
                map.insert("sent_bytes".to_string(), serde_json::json!(10_240));
                map
            },
            location: None,
        }
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(LogLevel::from_str("DEBUG").unwrap(), LogLevel::Debug);
        assert_eq!(LogLevel::from_str("info").unwrap(), LogLevel::Info);
        assert_eq!(LogLevel::from_str("warning").unwrap(), LogLevel::Warn);
        assert!(LogLevel::from_str("loud").is_err());
    }

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Trace < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Fatal);
    }

    #[test]
    fn test_logger_level_follows_config() {
        let config = Config {
            debug: true,
            enable_color: false,
            ..Default::default()
        };
        let logger = Logger::with_config("TEST".to_string(), &config);
        assert_eq!(logger.min_level, LogLevel::Debug);
        assert_eq!(logger.format, LogFormat::Json);
        assert!(!logger.use_color);
        assert!(logger.include_location);

        let verbose = Config { verbose: true, ..Default::default() };
        let verbose = Logger::with_config("TEST".to_string(), &verbose);
        assert_eq!(verbose.min_level, LogLevel::Info);
        assert_eq!(verbose.format, LogFormat::Compact);

        let quiet = Logger::with_config("TEST".to_string(), &Config::default());
        assert_eq!(quiet.format, LogFormat::Console);
        assert!(!quiet.would_log(LogLevel::Info));
        assert!(quiet.would_log(LogLevel::Warn));
    }

    #[tokio::test]
    async fn test_named_logger_shares_context() {
        let logger = Logger::new("HARNESS".to_string());
        logger.set_session_id("run-1".to_string()).await;

        let child = logger.named("LATENCY");
        assert_eq!(child.name(), "LATENCY");
        let context = child.context.read().await;
        assert_eq!(context.session_id.as_deref(), Some("run-1"));
    }

    #[tokio::test]
    async fn test_context_fields_stamped_on_entries() {
        let logger = Logger::new("HARNESS".to_string());
        logger.set_session_id("run-1".to_string()).await;
        logger.add_context_field("test".to_string(), "video-bandwidth").await;

        let mut entry = sample_entry();
        logger.named("BANDWIDTH").apply_context(&mut entry).await;

        assert_eq!(entry.fields["test"], "video-bandwidth");
        assert_eq!(entry.fields["session_id"], "run-1");
        assert_eq!(entry.correlation_id.as_deref(), Some("0123456789abcdef"));
    }

    #[tokio::test]
    async fn test_operation_correlation() {
        let logger = Logger::quiet("TEST");
        let correlation_id = logger.start_operation("data-throughput").await;
        assert_eq!(
            logger.context.read().await.current_correlation_id.as_deref(),
            Some(correlation_id.as_str())
        );

        logger.end_operation(&correlation_id, "data-throughput", true).await;
        assert!(logger.context.read().await.current_correlation_id.is_none());
    }

    #[test]
    fn test_log_formats() {
        let entry = sample_entry();
        let mut logger = Logger::new("TEST".to_string());
        logger.set_color(false);

        let console = logger.format_console(&entry);
        assert!(console.contains("INFO"));
        assert!(console.contains("[THROUGHPUT] Transmitting at 8192 kbps."));
        assert!(console.contains("[01234567]"));
        assert!(console.contains("sent_bytes=10240"));

        let json = logger.format_json(&entry);
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["fields"]["sent_bytes"], 10_240);

        let compact = logger.format_compact(&entry);
        assert!(compact.contains(" I THROUGHPUT: "));
    }

    #[tokio::test]
    async fn test_builder_helpers() {
        let logger = Logger::quiet("TEST");
        let summary = ThroughputSummary {
            sent_bytes: 1024,
            received_bytes: 1024,
            total_kilobits: 8.192,
            elapsed_seconds: 1.0,
            bitrate_samples_kbps: vec![],
        };
        let stats = DelayStatistics { avg_ms: 20.0, min_ms: 10.0, max_ms: 30.0 };
        let error = AppError::telemetry("poll failed");

        let builder = logger.info("done").throughput(&summary).delays(&stats).error_info(&error);
        assert_eq!(builder.entry.fields["average_kbps"], 8.192);
        assert_eq!(builder.entry.fields["max_delay_ms"], 30.0);
        assert_eq!(builder.entry.fields["error_category"], "TELEMETRY");
        builder.log().await;
    }

    #[tokio::test]
    async fn test_specialized_loggers() {
        let factory = LoggerFactory::new(Config::default());
        assert!(!factory.session_id().is_empty());

        let measurement = factory.create_measurement_logger();
        assert_eq!(measurement.logger.name, "MEAS");
        measurement
            .log_test_result(&TestResult {
                suite: "throughput".to_string(),
                name: "data-throughput".to_string(),
                status: TestStatus::Passed,
                summary: Some(MeasurementSummary::Throughput(ThroughputSummary {
                    sent_bytes: 0,
                    received_bytes: 0,
                    total_kilobits: 0.0,
                    elapsed_seconds: 0.0,
                    bitrate_samples_kbps: vec![],
                })),
                errors: vec![],
                duration_ms: 5,
            })
            .await;

        let transport = factory.create_transport_logger();
        assert_eq!(transport.logger.name, "LINK");
        transport.log_session_event("video-bandwidth", "establish", None).await;

        let errors = factory.create_error_logger();
        assert_eq!(errors.logger.name, "ERR");

        let logger = factory.create_logger("HARNESS").await;
        assert_eq!(
            logger.context.read().await.session_id.as_deref(),
            Some(factory.session_id())
        );
    }

    #[test]
    fn test_log_entry_serialization() {
        let entry = sample_entry();
        let json = serde_json::to_string(&entry).unwrap();
        let deserialized: LogEntry = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.level, LogLevel::Info);
        assert_eq!(deserialized.logger, "THROUGHPUT");
    }
}
