//! Configuration parsing from CLI arguments and environment variables

use crate::{
    cli::Cli,
    config::env::EnvManager,
    error::{AppError, Result},
    models::{config::seconds_to_ms, Config},
};

/// Configuration parser that combines CLI arguments with environment variables
pub struct ConfigParser {
    cli: Cli,
}

impl ConfigParser {
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Parse and build the complete configuration
    pub fn parse(&self) -> Result<Config> {
        self.cli.validate().map_err(AppError::config)?;

        let mut config = Config::default();

        EnvManager::load_env_file(self.cli.debug)?;
        config.merge_from_env()?;

        self.apply_cli_overrides(&mut config);

        config.validate()?;
        Ok(config)
    }

    /// Apply CLI argument overrides to configuration
    pub fn apply_cli_overrides(&self, config: &mut Config) {
        let cli = &self.cli;

        // Scale first so explicit per-test durations are taken literally
        if let Some(factor) = cli.duration_scale {
            config.scale_durations(factor);
        }
        if let Some(seconds) = cli.throughput_seconds {
            config.throughput.duration_ms = seconds_to_ms(seconds);
        }
        if let Some(seconds) = cli.bandwidth_seconds {
            config.bandwidth.duration_ms = seconds_to_ms(seconds);
        }
        if let Some(seconds) = cli.latency_seconds {
            config.latency.duration_ms = seconds_to_ms(seconds);
        }

        if let Some(kbps) = cli.link_bandwidth_kbps {
            config.link.bandwidth_kbps = kbps;
        }
        if let Some(ms) = cli.link_latency_ms {
            config.link.latency_ms = ms;
        }
        if let Some(dialect) = &cli.telemetry_dialect {
            config.link.telemetry_dialect = dialect.trim().to_string();
        }

        if cli.color {
            config.enable_color = true;
        } else if cli.no_color || cli.json {
            config.enable_color = false;
        }

        config.verbose = cli.verbose;
        config.debug = cli.debug;
        config.json = cli.json;

        if config.debug {
            eprintln!("Applied CLI overrides to configuration");
            eprintln!("{}", display_config_summary(config));
        }
    }
}

/// Convenience function to load complete configuration from CLI arguments
pub fn load_config(cli: Cli) -> Result<Config> {
    ConfigParser::new(cli).parse()
}

/// Display configuration summary for debug purposes
pub fn display_config_summary(config: &Config) -> String {
    let mut summary = Vec::new();

    summary.push(format!("Throughput: {}ms, {} byte packets", config.throughput.duration_ms, config.throughput.payload_bytes));
    summary.push(format!(
        "Bandwidth: {}ms, poll every {}ms, ceiling {} kbps",
        config.bandwidth.duration_ms, config.bandwidth.poll_interval_ms, config.bandwidth.max_video_bitrate_kbps
    ));
    summary.push(format!(
        "Latency: {}ms, probe every {}ms, min ratio {}",
        config.latency.duration_ms, config.latency.send_interval_ms, config.latency.min_sample_ratio
    ));
    summary.push(format!(
        "Link: {} kbps, {}ms one-way, {} telemetry",
        config.link.bandwidth_kbps, config.link.latency_ms, config.link.telemetry_dialect
    ));
    summary.push(format!("Color Output: {}", config.enable_color));
    summary.push(format!("JSON Output: {}", config.json));
    summary.push(format!("Verbose: {}", config.verbose));
    summary.push(format!("Debug: {}", config.debug));

    summary.join("\n")
}
