//! Colored formatter implementation with terminal color support

use crate::{
    error::Result,
    executor::ExecutionSummary,
    models::TestResult,
    types::TestStatus,
};
use super::formatter::{headline, result_row, FormattingOptions, OutputFormatter, PlainFormatter, RowData};
use colored::*;
use std::fmt::Write as _;

/// Color scheme configuration
#[derive(Debug, Clone)]
pub struct ColorScheme {
    pub header: Color,
    pub success: Color,
    pub warning: Color,
    pub error: Color,
    pub info: Color,
    pub muted: Color,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self {
            header: Color::Blue,
            success: Color::Green,
            warning: Color::Yellow,
            error: Color::Red,
            info: Color::Cyan,
            muted: Color::BrightBlack,
        }
    }
}

impl ColorScheme {
    pub fn status_color(&self, status: TestStatus) -> Color {
        match status {
            TestStatus::Passed => self.success,
            TestStatus::Failed => self.warning,
            TestStatus::Fatal => self.error,
        }
    }
}

/// Status symbol shown next to a test name
pub fn status_symbol(status: TestStatus) -> &'static str {
    match status {
        TestStatus::Passed => "✓",
        TestStatus::Failed => "✗",
        TestStatus::Fatal => "‼",
    }
}

/// Colored formatter implementation
pub struct ColoredFormatter {
    plain_formatter: PlainFormatter,
    options: FormattingOptions,
    color_scheme: ColorScheme,
}

impl ColoredFormatter {
    pub fn new(options: FormattingOptions) -> Self {
        Self::with_color_scheme(options, ColorScheme::default())
    }

    pub fn with_color_scheme(options: FormattingOptions, color_scheme: ColorScheme) -> Self {
        let plain_formatter = PlainFormatter::new(options.clone());
        Self {
            plain_formatter,
            options,
            color_scheme,
        }
    }

    /// Apply color to text if colors are enabled
    fn colorize(&self, text: &str, color: Color) -> ColoredString {
        if self.options.enable_color {
            text.color(color)
        } else {
            text.normal()
        }
    }
}

impl OutputFormatter for ColoredFormatter {
    fn format_header(&self, title: &str) -> Result<String> {
        let rule = "═".repeat(title.chars().count() + 4);
        Ok(format!(
            "{}\n  {}\n{}",
            self.colorize(&rule, self.color_scheme.header),
            self.colorize(title, self.color_scheme.header).bold(),
            self.colorize(&rule, self.color_scheme.header)
        ))
    }

    fn format_execution_summary(&self, summary: &ExecutionSummary) -> Result<String> {
        let mut output = String::new();
        let _ = writeln!(output, "{} {}", "Tests run:".bold(), summary.total_tests);
        let _ = writeln!(
            output,
            "{} {}",
            "Passed:   ".bold(),
            self.colorize(&summary.passed_tests.to_string(), self.color_scheme.success)
        );
        if summary.failed_tests > 0 {
            let _ = writeln!(
                output,
                "{} {}",
                "Failed:   ".bold(),
                self.colorize(&summary.failed_tests.to_string(), self.color_scheme.warning)
            );
        }
        if summary.fatal_tests > 0 {
            let _ = writeln!(
                output,
                "{} {}",
                "Fatal:    ".bold(),
                self.colorize(&summary.fatal_tests.to_string(), self.color_scheme.error)
            );
        }
        let _ = write!(
            output,
            "{} {}",
            "Duration: ".bold(),
            self.colorize(
                &format!("{:.1}s", summary.total_duration.as_secs_f64()),
                self.color_scheme.muted
            )
        );
        Ok(output)
    }

    fn format_results_table(&self, results: &[TestResult]) -> Result<String> {
        if results.is_empty() {
            return Ok(self.colorize("No tests were run.", self.color_scheme.muted).to_string());
        }

        let rows: Vec<RowData> = results.iter().map(result_row).collect();
        let table = self.plain_formatter.create_table(&rows);

        // Color the status cells after layout so padding stays aligned
        let mut output = String::new();
        let mut lines = table.lines();
        if let Some(header) = lines.next() {
            let _ = writeln!(output, "{}", header.bold());
        }
        let mut results_iter = results.iter();
        for line in lines {
            if line.starts_with('-') {
                let _ = writeln!(output, "{}", self.colorize(line, self.color_scheme.muted));
                continue;
            }
            let line = match results_iter.next() {
                Some(result) => {
                    let label = result.status.to_string();
                    let colored = self.colorize(&label, self.color_scheme.status_color(result.status));
                    line.replacen(&label, &colored.to_string(), 1)
                }
                None => line.to_string(),
            };
            let _ = writeln!(output, "{}", line);
        }
        Ok(output)
    }

    fn format_test_result(&self, result: &TestResult) -> Result<String> {
        let color = self.color_scheme.status_color(result.status);
        let mut output = String::new();
        let _ = writeln!(
            output,
            "{} {}/{}",
            self.colorize(status_symbol(result.status), color),
            self.colorize(&result.suite, self.color_scheme.muted),
            result.name.bold()
        );
        if let Some(summary) = &result.summary {
            let _ = writeln!(output, "    {}", self.colorize(&headline(summary), self.color_scheme.info));
        }
        for error in &result.errors {
            let _ = writeln!(output, "    {}", self.colorize(error, self.color_scheme.error));
        }
        Ok(output)
    }

    fn format_error(&self, error: &str) -> Result<String> {
        Ok(format!("{} {}", self.colorize("✗", self.color_scheme.error), self.colorize(error, self.color_scheme.error)))
    }

    fn format_warning(&self, warning: &str) -> Result<String> {
        Ok(format!("{} {}", self.colorize("!", self.color_scheme.warning), self.colorize(warning, self.color_scheme.warning)))
    }

    fn format_success(&self, message: &str) -> Result<String> {
        Ok(format!("{} {}", self.colorize("✓", self.color_scheme.success), message))
    }
}
