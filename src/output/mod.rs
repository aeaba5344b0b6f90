//! Output formatting and display system
//!
//! Final results are rendered as a plain or colored table, or as JSON for
//! scripts. While a test runs, a [`ConsoleReporter`] prints its reports live.

mod colored;
mod formatter;
mod reporter;

pub use self::colored::{status_symbol, ColorScheme, ColoredFormatter};
pub use formatter::{headline, render_results, FormattingOptions, OutputFormatter, PlainFormatter, RowData};
pub use reporter::ConsoleReporter;

use crate::{
    error::Result,
    executor::{ExecutionResults, ReporterFactory},
    harness::{RecordingReporter, TestCase, TestReporter},
    models::Config,
};

/// Output formatting factory for creating appropriate formatters
pub struct OutputFormatterFactory;

impl OutputFormatterFactory {
    /// Create a formatter based on color support and preferences
    pub fn create_formatter(enable_color: bool, verbose: bool) -> Box<dyn OutputFormatter> {
        let options = FormattingOptions {
            enable_color,
            verbose_mode: verbose,
            table_borders: true,
            max_width: 120,
        };

        if enable_color {
            Box::new(ColoredFormatter::new(options))
        } else {
            Box::new(PlainFormatter::new(options))
        }
    }

    /// Create a plain text formatter for scripts/logs
    pub fn create_plain_formatter() -> Box<dyn OutputFormatter> {
        Self::create_formatter(false, true)
    }

    /// Reporters for live output; JSON mode keeps stdout clean for the document
    pub fn create_reporters(config: &Config) -> ReporterFactory {
        if config.json {
            return Box::new(|_: &TestCase| Box::new(RecordingReporter::new()) as Box<dyn TestReporter>);
        }
        let enable_color = config.enable_color;
        let show_progress = config.verbose || config.debug;
        Box::new(move |case: &TestCase| {
            Box::new(ConsoleReporter::stdout(case.name, enable_color, show_progress)) as Box<dyn TestReporter>
        })
    }
}

/// Main output coordinator that handles all result display
pub struct OutputCoordinator {
    formatter: Box<dyn OutputFormatter>,
    json: bool,
    verbose: bool,
}

impl OutputCoordinator {
    pub fn new(formatter: Box<dyn OutputFormatter>) -> Self {
        Self {
            formatter,
            json: false,
            verbose: false,
        }
    }

    /// Coordinator matching the output switches in `config`
    pub fn from_config(config: &Config) -> Self {
        Self {
            formatter: OutputFormatterFactory::create_formatter(config.enable_color, config.verbose),
            json: config.json,
            verbose: config.verbose,
        }
    }

    /// Display complete execution results
    pub fn display_results(&self, results: &ExecutionResults) -> Result<String> {
        if self.json {
            return Ok(serde_json::to_string_pretty(results)?);
        }
        render_results(self.formatter.as_ref(), results, self.verbose)
    }

    /// One-line verdict printed after the results
    pub fn display_verdict(&self, results: &ExecutionResults) -> Result<String> {
        let summary = &results.execution_summary;
        if results.has_failures() {
            self.formatter.format_error(&format!(
                "{} of {} tests did not pass",
                summary.failed_tests + summary.fatal_tests,
                summary.total_tests
            ))
        } else {
            self.formatter.format_success(&format!("All {} tests passed", summary.total_tests))
        }
    }

    pub fn display_error(&self, message: &str) -> Result<String> {
        self.formatter.format_error(message)
    }

    pub fn display_warning(&self, message: &str) -> Result<String> {
        self.formatter.format_warning(message)
    }
}
