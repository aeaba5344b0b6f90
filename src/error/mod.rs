//! Error handling for the peer throughput tester

use thiserror::Error;

/// Custom error types for the peer throughput tester
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Session could not be created or established
    #[error("Setup error: {0}")]
    Setup(String),

    /// Data channel or session operation failed after setup
    #[error("Transport error: {0}")]
    Transport(String),

    /// A telemetry snapshot could not be fetched or decoded
    #[error("Telemetry error: {0}")]
    Telemetry(String),

    /// The transport exposes a telemetry format we do not understand
    #[error("Unsupported telemetry: {0}")]
    UnsupportedTelemetry(String),

    /// Measurement produced an unusable result
    #[error("Measurement error: {0}")]
    Measurement(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(String),

    /// Parsing errors (payloads, JSON, numbers)
    #[error("Parsing error: {0}")]
    Parse(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new setup error
    pub fn setup<S: Into<String>>(message: S) -> Self {
        Self::Setup(message.into())
    }

    /// Create a new transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport(message.into())
    }

    /// Create a new telemetry error
    pub fn telemetry<S: Into<String>>(message: S) -> Self {
        Self::Telemetry(message.into())
    }

    /// Create a new unsupported telemetry error
    pub fn unsupported_telemetry<S: Into<String>>(message: S) -> Self {
        Self::UnsupportedTelemetry(message.into())
    }

    /// Create a new measurement error
    pub fn measurement<S: Into<String>>(message: S) -> Self {
        Self::Measurement(message.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io(message.into())
    }

    /// Create a new parsing error
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Get error category for logging and reporting
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG",
            Self::Setup(_) => "SETUP",
            Self::Transport(_) => "TRANSPORT",
            Self::Telemetry(_) => "TELEMETRY",
            Self::UnsupportedTelemetry(_) => "UNSUPPORTED",
            Self::Measurement(_) => "MEASUREMENT",
            Self::Validation(_) => "VALIDATION",
            Self::Io(_) => "IO",
            Self::Parse(_) => "PARSE",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Check if the error only affects a single tick of a measurement loop
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Telemetry(_) | Self::UnsupportedTelemetry(_) | Self::Transport(_) | Self::Parse(_) => true,
            Self::Config(_) | Self::Setup(_) | Self::Validation(_) => false,
            Self::Measurement(_) | Self::Io(_) | Self::Internal(_) => false,
        }
    }

    /// Get user-friendly error message with suggestions
    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::Config(msg) => {
                format!("Configuration problem: {}\n\nSuggestion: Check your .env file or command line arguments.", msg)
            }
            Self::Setup(msg) => {
                format!("Could not set up the peer session: {}\n\nSuggestion: Check relay availability and media device access.", msg)
            }
            Self::Transport(msg) => {
                format!("Transport failure: {}\n\nSuggestion: The session may have been torn down early. Try running the test again.", msg)
            }
            Self::Telemetry(msg) => {
                format!("Telemetry fetch failed: {}\n\nSuggestion: A single failed poll is tolerated; repeated failures indicate a broken session.", msg)
            }
            Self::UnsupportedTelemetry(msg) => {
                format!("Unsupported telemetry format: {}\n\nSuggestion: Only the legacy and standard telemetry dialects are supported.", msg)
            }
            Self::Measurement(msg) => {
                format!("Measurement was not usable: {}\n\nSuggestion: Keep the test in the foreground and make sure the camera delivers frames.", msg)
            }
            Self::Validation(msg) => {
                format!("Invalid input: {}\n\nSuggestion: Check durations, intervals and ratios in your configuration.", msg)
            }
            Self::Io(msg) => {
                format!("File operation failed: {}\n\nSuggestion: Check file permissions and disk space.", msg)
            }
            Self::Parse(msg) => {
                format!("Failed to parse data: {}\n\nSuggestion: Check the format of your input data or configuration files.", msg)
            }
            Self::Internal(msg) => {
                format!("Internal error: {}\n\nThis is likely a bug. Please report this issue with the error details.", msg)
            }
        }
    }

    /// Get exit code for this error type
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Validation(_) | Self::Parse(_) => 1,
            Self::Setup(_) | Self::Transport(_) => 2,
            Self::Telemetry(_) | Self::UnsupportedTelemetry(_) => 3,
            Self::Io(_) => 5,
            Self::Measurement(_) => 6,
            Self::Internal(_) => 99,
        }
    }

    /// Format error for console display with color coding
    pub fn format_for_console(&self, use_color: bool) -> String {
        let category = self.category();
        let message = self.to_string();

        if use_color {
            use colored::Colorize;
            match self {
                Self::Config(_) | Self::Validation(_) | Self::Parse(_) => {
                    format!("[{}] {}", category.red().bold(), message.red())
                }
                Self::Setup(_) | Self::Transport(_) => {
                    format!("[{}] {}", category.yellow().bold(), message.yellow())
                }
                Self::Telemetry(_) | Self::UnsupportedTelemetry(_) => {
                    format!("[{}] {}", category.blue().bold(), message.blue())
                }
                Self::Measurement(_) | Self::Io(_) => {
                    format!("[{}] {}", category.cyan().bold(), message.cyan())
                }
                Self::Internal(_) => {
                    format!("[{}] {}", category.bright_red().bold(), message.bright_red())
                }
            }
        } else {
            format!("[{}] {}", category, message)
        }
    }
}

// Standard library error conversions
impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::io(error.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::parse(format!("JSON parse error: {}", error))
    }
}

impl From<chrono::ParseError> for AppError {
    fn from(error: chrono::ParseError) -> Self {
        Self::parse(format!("Timestamp parse error: {}", error))
    }
}

impl From<dotenv::Error> for AppError {
    fn from(error: dotenv::Error) -> Self {
        Self::config(format!("Environment file error: {}", error))
    }
}

impl From<std::num::ParseIntError> for AppError {
    fn from(error: std::num::ParseIntError) -> Self {
        Self::parse(format!("Integer parse error: {}", error))
    }
}

impl From<std::num::ParseFloatError> for AppError {
    fn from(error: std::num::ParseFloatError) -> Self {
        Self::parse(format!("Float parse error: {}", error))
    }
}

impl From<std::str::ParseBoolError> for AppError {
    fn from(error: std::str::ParseBoolError) -> Self {
        Self::parse(format!("Boolean parse error: {}", error))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::internal(error.to_string())
    }
}

/// Custom Result type for the application
pub type Result<T> = std::result::Result<T, AppError>;

/// Error context trait for adding context to errors
pub trait ErrorContext<T> {
    /// Add context to an error
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;

    /// Add static context to an error
    fn context(self, message: &'static str) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<AppError>,
{
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let original_error = e.into();
            let context = f();
            AppError::internal(format!("{}: {}", context, original_error))
        })
    }

    fn context(self, message: &'static str) -> Result<T> {
        self.with_context(|| message.to_string())
    }
}
