//! Command-line interface

use clap::{ArgAction, Parser};

/// Peer Throughput Tester - measures data throughput, bandwidth-estimate
/// ramp-up and one-way delay over a peer transport session
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "ptt")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Test to run by name (can be used multiple times)
    #[arg(short = 't', long = "test", value_name = "NAME", action = ArgAction::Append)]
    pub tests: Vec<String>,

    /// List registered tests and exit
    #[arg(long)]
    pub list: bool,

    /// Include explicit (long-running) tests when no --test is given
    #[arg(long)]
    pub all: bool,

    /// Multiply every test duration by this factor
    #[arg(long, value_name = "FACTOR", value_parser = parse_scale)]
    pub duration_scale: Option<f64>,

    /// Data throughput test duration in seconds
    #[arg(long, value_name = "SECONDS", value_parser = parse_seconds)]
    pub throughput_seconds: Option<f64>,

    /// Video bandwidth test duration in seconds
    #[arg(long, value_name = "SECONDS", value_parser = parse_seconds)]
    pub bandwidth_seconds: Option<f64>,

    /// Network latency test duration in seconds
    #[arg(long, value_name = "SECONDS", value_parser = parse_seconds)]
    pub latency_seconds: Option<f64>,

    /// Bandwidth of the simulated link
    #[arg(long, value_name = "KBPS")]
    pub link_bandwidth_kbps: Option<u64>,

    /// One-way delay of the simulated link
    #[arg(long, value_name = "MS")]
    pub link_latency_ms: Option<u64>,

    /// Telemetry dialect the simulated session reports (legacy, standard)
    #[arg(long, value_name = "DIALECT")]
    pub telemetry_dialect: Option<String>,

    /// Print the final results as JSON
    #[arg(long)]
    pub json: bool,

    /// Force colored output
    #[arg(long)]
    pub color: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Enable verbose output
    #[arg(long)]
    pub verbose: bool,

    /// Enable debug output
    #[arg(long)]
    pub debug: bool,

    /// Print an example .env file and exit
    #[arg(long)]
    pub generate_env: bool,
}

impl Cli {
    /// Validate CLI arguments for conflicts and requirements
    pub fn validate(&self) -> Result<(), String> {
        if self.color && self.no_color {
            return Err("Cannot specify both --color and --no-color".to_string());
        }

        if self.all && !self.tests.is_empty() {
            return Err("--all selects every test; it cannot be combined with --test".to_string());
        }

        if let Some(dialect) = &self.telemetry_dialect {
            if dialect.trim().is_empty() {
                return Err("--telemetry-dialect cannot be empty".to_string());
            }
        }

        Ok(())
    }

    /// Check if colors should be enabled
    pub fn use_colors(&self) -> bool {
        if self.color {
            true
        } else if self.no_color || self.json {
            false
        } else {
            supports_color()
        }
    }

    /// Get configuration summary for display
    pub fn get_config_summary(&self) -> String {
        let mut summary = String::new();

        summary.push_str("Configuration Summary:\n");
        if self.tests.is_empty() {
            let scope = if self.all { "all" } else { "default" };
            summary.push_str(&format!("  Tests: {}\n", scope));
        } else {
            summary.push_str(&format!("  Tests: {}\n", self.tests.join(", ")));
        }
        if let Some(scale) = self.duration_scale {
            summary.push_str(&format!("  Duration scale: {}\n", scale));
        }
        if let Some(dialect) = &self.telemetry_dialect {
            summary.push_str(&format!("  Telemetry dialect: {}\n", dialect));
        }
        summary.push_str(&format!("  Colored output: {}\n", self.use_colors()));
        summary.push_str(&format!("  JSON output: {}\n", self.json));
        summary.push_str(&format!("  Verbose mode: {}\n", self.verbose));
        summary.push_str(&format!("  Debug mode: {}\n", self.debug));

        summary
    }
}

/// Parse a positive, finite number of seconds
fn parse_seconds(s: &str) -> Result<f64, String> {
    let seconds: f64 = s.parse().map_err(|_| format!("Invalid duration: {}", s))?;
    if !seconds.is_finite() || seconds <= 0.0 {
        Err("Duration must be greater than 0".to_string())
    } else if seconds > 3600.0 {
        Err("Duration cannot exceed 3600 seconds".to_string())
    } else {
        Ok(seconds)
    }
}

fn parse_scale(s: &str) -> Result<f64, String> {
    let factor: f64 = s.parse().map_err(|_| format!("Invalid scale factor: {}", s))?;
    if !factor.is_finite() || factor <= 0.0 {
        Err("Scale factor must be greater than 0".to_string())
    } else {
        Ok(factor)
    }
}

/// Check if the terminal supports color output
fn supports_color() -> bool {
    if let Ok(term) = std::env::var("TERM") {
        if term == "dumb" {
            return false;
        }
    }

    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }

    if std::env::var("FORCE_COLOR").is_ok() {
        return true;
    }

    #[cfg(unix)]
    {
        true
    }
    #[cfg(not(unix))]
    {
        false
    }
}
