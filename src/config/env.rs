//! Environment variable handling and .env file management

use crate::error::{AppError, Result};
use crate::transport::TelemetryFormat;
use std::path::Path;

/// Environment variable configuration manager
pub struct EnvManager;

impl EnvManager {
    /// Load .env file if it exists
    pub fn load_env_file(debug: bool) -> Result<()> {
        Self::load_env_file_from(Path::new(".env"), debug)
    }

    /// Load a specific env file if it exists; already-set variables win
    pub fn load_env_file_from(path: &Path, debug: bool) -> Result<()> {
        if path.exists() {
            dotenv::from_path(path)
                .map_err(|e| AppError::config(format!("Failed to load {}: {}", path.display(), e)))?;

            if debug {
                eprintln!("Loaded configuration from {}", path.display());
            }
        } else if debug {
            eprintln!("No {} file found, using defaults and CLI arguments", path.display());
        }

        Ok(())
    }

    /// Create example .env file content
    pub fn create_example_env_content() -> String {
        r#"# Peer Throughput Tester Configuration
#
# Values here act as defaults and are overridden by command-line arguments.

# Data channel saturation test length in seconds
# THROUGHPUT_DURATION_SECONDS=5

# Telemetry polling test length in seconds and poll period in milliseconds
# BANDWIDTH_DURATION_SECONDS=40
# BANDWIDTH_POLL_MS=100

# Video bitrate ceiling applied to the session
# MAX_VIDEO_BITRATE_KBPS=2000

# Delay probe length in seconds and send period in milliseconds
# LATENCY_DURATION_SECONDS=300
# LATENCY_INTERVAL_MS=100

# Fraction of expected delay samples that must arrive (0-1]
# MIN_SAMPLE_RATIO=0.8

# Jitter margin added to the minimum delay before the stability check
# JITTER_MARGIN_MS=100

# Simulated link used by the loopback transport
# LINK_BANDWIDTH_KBPS=20000
# LINK_LATENCY_MS=20

# Telemetry dialect reported by the session (legacy or standard)
# TELEMETRY_DIALECT=legacy

# Enable colored output (true/false)
# ENABLE_COLOR=true

# Quick smoke run:
# THROUGHPUT_DURATION_SECONDS=1
# BANDWIDTH_DURATION_SECONDS=4
# LATENCY_DURATION_SECONDS=10
"#
        .to_string()
    }

    /// Save example .env file to disk
    pub fn save_example_env_file(path: &Path) -> Result<()> {
        std::fs::write(path, Self::create_example_env_content())
            .map_err(|e| AppError::config(format!("Failed to write example .env file: {}", e)))
    }

    /// Validate environment variable format before parsing
    pub fn validate_env_var(key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match key {
            "THROUGHPUT_DURATION_SECONDS" | "BANDWIDTH_DURATION_SECONDS" | "LATENCY_DURATION_SECONDS" => {
                let seconds = parse::<f64>(key, value)?;
                if !(seconds > 0.0 && seconds <= 3600.0) {
                    return Err(AppError::config(format!("{} must be between 0 and 3600, got: {}", key, seconds)));
                }
            }
            "BANDWIDTH_POLL_MS" | "LATENCY_INTERVAL_MS" => {
                let ms = parse::<u64>(key, value)?;
                if ms == 0 || ms > 60_000 {
                    return Err(AppError::config(format!("{} must be between 1 and 60000, got: {}", key, ms)));
                }
            }
            "MAX_VIDEO_BITRATE_KBPS" => {
                if parse::<u32>(key, value)? == 0 {
                    return Err(AppError::config("MAX_VIDEO_BITRATE_KBPS must be greater than 0"));
                }
            }
            "MIN_SAMPLE_RATIO" => {
                let ratio = parse::<f64>(key, value)?;
                if !(ratio > 0.0 && ratio <= 1.0) {
                    return Err(AppError::config(format!("MIN_SAMPLE_RATIO must be in (0, 1], got: {}", ratio)));
                }
            }
            "JITTER_MARGIN_MS" => {
                if parse::<f64>(key, value)? < 0.0 {
                    return Err(AppError::config("JITTER_MARGIN_MS cannot be negative"));
                }
            }
            "LINK_BANDWIDTH_KBPS" => {
                if parse::<u64>(key, value)? == 0 {
                    return Err(AppError::config("LINK_BANDWIDTH_KBPS must be greater than 0"));
                }
            }
            "LINK_LATENCY_MS" => {
                parse::<u64>(key, value)?;
            }
            "TELEMETRY_DIALECT" => {
                if !TelemetryFormat::detect(value).is_supported() {
                    return Err(AppError::config(format!(
                        "TELEMETRY_DIALECT must be 'legacy' or 'standard', got: '{}'",
                        value
                    )));
                }
            }
            "ENABLE_COLOR" => {
                parse::<bool>(key, value)?;
            }
            _ => {
                // Unknown environment variable, ignore
            }
        }

        Ok(())
    }

    /// Get list of all supported environment variables with descriptions
    pub fn get_supported_env_vars() -> Vec<(&'static str, &'static str, &'static str)> {
        vec![
            ("THROUGHPUT_DURATION_SECONDS", "Data throughput test length", "5"),
            ("BANDWIDTH_DURATION_SECONDS", "Video bandwidth test length", "40"),
            ("BANDWIDTH_POLL_MS", "Telemetry poll period", "100"),
            ("MAX_VIDEO_BITRATE_KBPS", "Video bitrate ceiling", "2000"),
            ("LATENCY_DURATION_SECONDS", "Network latency test length", "300"),
            ("LATENCY_INTERVAL_MS", "Delay probe send period", "100"),
            ("MIN_SAMPLE_RATIO", "Fraction of probes that must arrive", "0.8"),
            ("JITTER_MARGIN_MS", "Margin used by the stability check", "100"),
            ("LINK_BANDWIDTH_KBPS", "Simulated link bandwidth", "20000"),
            ("LINK_LATENCY_MS", "Simulated one-way link delay", "20"),
            ("TELEMETRY_DIALECT", "Telemetry dialect (legacy, standard)", "legacy"),
            ("ENABLE_COLOR", "Enable colored output", "true"),
        ]
    }

    /// Display environment variable help
    pub fn display_env_help() -> String {
        let mut help = String::new();
        help.push_str("Supported Environment Variables:\n\n");

        for (var, description, example) in Self::get_supported_env_vars() {
            help.push_str(&format!("  {:<28} {}\n", var, description));
            help.push_str(&format!("  {:<28} Example: {}\n\n", "", example));
        }

        help.push_str("Configuration Priority (highest to lowest):\n");
        help.push_str("  1. Command-line arguments\n");
        help.push_str("  2. Environment variables\n");
        help.push_str("  3. .env file values\n");
        help.push_str("  4. Default values\n");

        help
    }

    /// Validate all currently set environment variables
    pub fn validate_current_env() -> Vec<String> {
        Self::get_supported_env_vars()
            .into_iter()
            .filter_map(|(name, _, _)| {
                let value = std::env::var(name).ok()?;
                Self::validate_env_var(name, &value).err().map(|e| format!("Warning: {}", e))
            })
            .collect()
    }

    /// Validate the contents of an env file without loading it
    pub fn check_env_file(path: &Path) -> Result<Option<Vec<String>>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::config(format!("Failed to read {}: {}", path.display(), e)))?;

        let warnings = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let (key, value) = line.split_once('=')?;
                Self::validate_env_var(key.trim(), value)
                    .err()
                    .map(|e| format!("Line '{}': {}", line, e))
            })
            .collect();

        Ok(Some(warnings))
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_example_content_lists_every_variable() {
        let content = EnvManager::create_example_env_content();
        for (name, _, _) in EnvManager::get_supported_env_vars() {
            assert!(content.contains(&format!("{}=", name)), "missing {}", name);
        }
    }

    #[test]
    fn test_save_example_file() {
        let temp_file = NamedTempFile::new().unwrap();
        EnvManager::save_example_env_file(temp_file.path()).unwrap();

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert!(content.contains("Peer Throughput Tester Configuration"));
    }

    #[test]
    fn test_validate_env_var() {
        assert!(EnvManager::validate_env_var("THROUGHPUT_DURATION_SECONDS", "2.5").is_ok());
        assert!(EnvManager::validate_env_var("BANDWIDTH_POLL_MS", "100").is_ok());
        assert!(EnvManager::validate_env_var("MAX_VIDEO_BITRATE_KBPS", "2000").is_ok());
        assert!(EnvManager::validate_env_var("MIN_SAMPLE_RATIO", "0.8").is_ok());
        assert!(EnvManager::validate_env_var("JITTER_MARGIN_MS", "0").is_ok());
        assert!(EnvManager::validate_env_var("LINK_LATENCY_MS", " 40 ").is_ok());
        assert!(EnvManager::validate_env_var("TELEMETRY_DIALECT", "Standard").is_ok());
        assert!(EnvManager::validate_env_var("ENABLE_COLOR", "false").is_ok());
        assert!(EnvManager::validate_env_var("SOMETHING_ELSE", "whatever").is_ok());

        assert!(EnvManager::validate_env_var("LATENCY_DURATION_SECONDS", "0").is_err());
        assert!(EnvManager::validate_env_var("LATENCY_INTERVAL_MS", "0").is_err());
        assert!(EnvManager::validate_env_var("MAX_VIDEO_BITRATE_KBPS", "-1").is_err());
        assert!(EnvManager::validate_env_var("MIN_SAMPLE_RATIO", "1.2").is_err());
        assert!(EnvManager::validate_env_var("JITTER_MARGIN_MS", "-5").is_err());
        assert!(EnvManager::validate_env_var("LINK_BANDWIDTH_KBPS", "0").is_err());
        assert!(EnvManager::validate_env_var("TELEMETRY_DIALECT", "webkit").is_err());
        assert!(EnvManager::validate_env_var("ENABLE_COLOR", "maybe").is_err());
    }

    #[test]
    fn test_check_env_file_reports_bad_lines() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# comment").unwrap();
        writeln!(file, "LINK_LATENCY_MS=40").unwrap();
        writeln!(file, "MIN_SAMPLE_RATIO=2").unwrap();
        writeln!(file).unwrap();

        let warnings = EnvManager::check_env_file(file.path()).unwrap().unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("Line 'MIN_SAMPLE_RATIO=2'"));
    }

    #[test]
    fn test_check_missing_env_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(EnvManager::check_env_file(&dir.path().join(".env")).unwrap().is_none());
    }

    #[test]
    fn test_display_env_help() {
        let help = EnvManager::display_env_help();
        assert!(help.contains("Supported Environment Variables:"));
        assert!(help.contains("TELEMETRY_DIALECT"));
        assert!(help.contains("Configuration Priority"));
    }
}
