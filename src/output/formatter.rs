//! Core formatting trait and the plain text implementation

use crate::{
    error::Result,
    executor::{ExecutionResults, ExecutionSummary},
    models::{MeasurementSummary, TestResult},
    stats::RampUpTime,
};
use std::fmt::Write as _;

/// Main trait for output formatting
pub trait OutputFormatter {
    fn format_header(&self, title: &str) -> Result<String>;

    fn format_execution_summary(&self, summary: &ExecutionSummary) -> Result<String>;

    /// One row per test case
    fn format_results_table(&self, results: &[TestResult]) -> Result<String>;

    /// Detailed block for a single test case
    fn format_test_result(&self, result: &TestResult) -> Result<String>;

    fn format_error(&self, error: &str) -> Result<String>;

    fn format_warning(&self, warning: &str) -> Result<String>;

    fn format_success(&self, message: &str) -> Result<String>;
}

/// Configuration options for formatting
#[derive(Debug, Clone)]
pub struct FormattingOptions {
    pub enable_color: bool,
    /// Show per-test detail blocks after the table
    pub verbose_mode: bool,
    pub table_borders: bool,
    pub max_width: usize,
}

impl Default for FormattingOptions {
    fn default() -> Self {
        Self {
            enable_color: true,
            verbose_mode: false,
            table_borders: true,
            max_width: 120,
        }
    }
}

/// Row data for table formatting
pub type RowData = Vec<String>;

pub(crate) const TABLE_HEADERS: [&str; 4] = ["Test", "Status", "Duration", "Result"];

/// One-line description of a measurement's headline figures
pub fn headline(summary: &MeasurementSummary) -> String {
    match summary {
        MeasurementSummary::Throughput(t) => match t.average_kbps() {
            Some(kbps) => format!("{:.0} kbps avg, {} kbit in {:.1}s", kbps, t.total_kilobits, t.elapsed_seconds),
            None => format!("{} kbit transmitted", t.total_kilobits),
        },
        MeasurementSummary::Bandwidth(b) => {
            let mut parts = Vec::new();
            if let Some(avg) = b.bandwidth_avg_bps {
                parts.push(format!("bwe {:.0} kbps avg", avg / 1000.0));
            }
            match b.ramp_up {
                Some(ramp_up @ RampUpTime::Reached(_)) => parts.push(format!("ramp-up {} ms", ramp_up)),
                Some(RampUpTime::Infinite) => parts.push("never ramped up".to_string()),
                None => {}
            }
            if let Some(rate) = b.framerate_mean {
                parts.push(format!("{:.1} fps", rate));
            }
            match b.rtt_avg_ms {
                Some(rtt) => parts.push(format!("rtt {:.0} ms avg", rtt)),
                None => parts.push("no rtt samples".to_string()),
            }
            parts.join(", ")
        }
        MeasurementSummary::Latency(l) => match &l.delay {
            Some(delay) => format!(
                "{}/{:.0} samples, delay {:.1}/{:.0}/{:.0} ms avg/min/max",
                l.sample_count, l.expected_samples, delay.avg_ms, delay.min_ms, delay.max_ms
            ),
            None => format!("0/{:.0} samples", l.expected_samples),
        },
    }
}

pub(crate) fn result_row(result: &TestResult) -> RowData {
    vec![
        result.name.clone(),
        result.status.to_string(),
        format!("{:.1}s", result.duration_ms as f64 / 1000.0),
        result
            .summary
            .as_ref()
            .map(headline)
            .or_else(|| result.errors.first().cloned())
            .unwrap_or_default(),
    ]
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(max.saturating_sub(3)).collect();
        cut.push_str("...");
        cut
    }
}

/// Plain text formatter implementation
pub struct PlainFormatter {
    options: FormattingOptions,
}

impl PlainFormatter {
    pub fn new(options: FormattingOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &FormattingOptions {
        &self.options
    }

    /// Lay out rows in padded columns
    pub(crate) fn create_table(&self, rows: &[RowData]) -> String {
        let mut widths: Vec<usize> = TABLE_HEADERS.iter().map(|h| h.len()).collect();
        let budget = self.options.max_width.saturating_sub(40).max(20);
        let rows: Vec<RowData> = rows
            .iter()
            .map(|row| row.iter().map(|cell| truncate(cell, budget)).collect())
            .collect();
        for row in &rows {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }

        let separator = if self.options.table_borders { " | " } else { "  " };
        let render = |cells: Vec<String>| -> String {
            cells
                .iter()
                .enumerate()
                .map(|(i, c)| format!("{:<width$}", c, width = widths[i]))
                .collect::<Vec<_>>()
                .join(separator)
                .trim_end()
                .to_string()
        };

        let mut output = String::new();
        let header = render(TABLE_HEADERS.iter().map(|h| h.to_string()).collect());
        let _ = writeln!(output, "{}", header);
        if self.options.table_borders {
            let _ = writeln!(output, "{}", "-".repeat(header.chars().count()));
        }
        for row in rows {
            let _ = writeln!(output, "{}", render(row));
        }
        output
    }
}

impl OutputFormatter for PlainFormatter {
    fn format_header(&self, title: &str) -> Result<String> {
        Ok(format!("{}\n{}", title, "=".repeat(title.chars().count())))
    }

    fn format_execution_summary(&self, summary: &ExecutionSummary) -> Result<String> {
        let mut output = String::new();
        let _ = writeln!(output, "Tests run:    {}", summary.total_tests);
        let _ = writeln!(output, "Passed:       {}", summary.passed_tests);
        let _ = writeln!(output, "Failed:       {}", summary.failed_tests);
        let _ = writeln!(output, "Fatal:        {}", summary.fatal_tests);
        let _ = write!(output, "Duration:     {:.1}s", summary.total_duration.as_secs_f64());
        Ok(output)
    }

    fn format_results_table(&self, results: &[TestResult]) -> Result<String> {
        if results.is_empty() {
            return Ok("No tests were run.".to_string());
        }
        let rows: Vec<RowData> = results.iter().map(result_row).collect();
        Ok(self.create_table(&rows))
    }

    fn format_test_result(&self, result: &TestResult) -> Result<String> {
        let mut output = String::new();
        let _ = writeln!(output, "{}/{}: {}", result.suite, result.name, result.status);
        if let Some(summary) = &result.summary {
            let _ = writeln!(output, "  {}", headline(summary));
        }
        for error in &result.errors {
            let _ = writeln!(output, "  error: {}", error);
        }
        Ok(output)
    }

    fn format_error(&self, error: &str) -> Result<String> {
        Ok(format!("ERROR: {}", error))
    }

    fn format_warning(&self, warning: &str) -> Result<String> {
        Ok(format!("WARNING: {}", warning))
    }

    fn format_success(&self, message: &str) -> Result<String> {
        Ok(format!("OK: {}", message))
    }
}

/// Render complete results with any formatter
pub fn render_results(formatter: &dyn OutputFormatter, results: &ExecutionResults, verbose: bool) -> Result<String> {
    let mut output = String::new();
    output.push_str(&formatter.format_header("Peer Transport Test Results")?);
    output.push_str("\n\n");
    output.push_str(&formatter.format_execution_summary(&results.execution_summary)?);
    output.push_str("\n\n");
    output.push_str(&formatter.format_results_table(&results.test_results)?);

    if verbose {
        for result in &results.test_results {
            output.push('\n');
            output.push_str(&formatter.format_test_result(result)?);
        }
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LatencySummary, ThroughputSummary};
    use crate::stats::DelayStatistics;
    use crate::types::TestStatus;
    use std::time::Duration;

    fn throughput_result() -> TestResult {
        TestResult {
            suite: "throughput".to_string(),
            name: "data-throughput".to_string(),
            status: TestStatus::Passed,
            summary: Some(MeasurementSummary::Throughput(ThroughputSummary {
                sent_bytes: 1_024_000,
                received_bytes: 1_024_000,
                total_kilobits: 8192.0,
                elapsed_seconds: 1.0,
                bitrate_samples_kbps: vec![8192.0],
            })),
            errors: vec![],
            duration_ms: 1_050,
        }
    }

    #[test]
    fn test_headlines() {
        let result = throughput_result();
        assert_eq!(headline(result.summary.as_ref().unwrap()), "8192 kbps avg, 8192 kbit in 1.0s");

        let latency = MeasurementSummary::Latency(LatencySummary {
            sample_count: 45,
            expected_samples: 50.0,
            delay: Some(DelayStatistics { avg_ms: 20.5, min_ms: 10.0, max_ms: 40.0 }),
            enough_samples: true,
            stable: Some(true),
        });
        assert_eq!(headline(&latency), "45/50 samples, delay 20.5/10/40 ms avg/min/max");
    }

    #[test]
    fn test_results_table() {
        let formatter = PlainFormatter::new(FormattingOptions { enable_color: false, ..Default::default() });
        let mut failed = throughput_result();
        failed.name = "video-bandwidth".to_string();
        failed.status = TestStatus::Fatal;
        failed.summary = None;
        failed.errors = vec!["Failed to create session: Setup error: relay configuration unavailable".to_string()];

        let table = formatter.format_results_table(&[throughput_result(), failed]).unwrap();
        let lines: Vec<&str> = table.lines().collect();
        assert!(lines[0].starts_with("Test"));
        assert!(lines[1].starts_with("---"));
        assert!(lines[2].contains("PASSED"));
        assert!(lines[3].contains("FATAL"));
        assert!(lines[3].contains("relay configuration unavailable"));
    }

    #[test]
    fn test_render_results() {
        let formatter = PlainFormatter::new(FormattingOptions::default());
        let results = ExecutionResults::new(vec![throughput_result()], Duration::from_secs(2));
        let output = render_results(&formatter, &results, true).unwrap();

        assert!(output.starts_with("Peer Transport Test Results"));
        assert!(output.contains("Passed:       1"));
        assert!(output.contains("throughput/data-throughput: PASSED"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a much longer cell", 10), "a much ...");
    }
}
