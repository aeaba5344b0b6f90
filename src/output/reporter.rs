//! Live console reporting while a test case runs

use crate::harness::TestReporter;
use colored::*;
use std::io::{self, Write};

/// Prints each report of one test case as it happens
pub struct ConsoleReporter<W: Write + Send = io::Stdout> {
    test_name: String,
    enable_color: bool,
    show_progress: bool,
    /// Last 10% step that was printed
    progress_step: Option<u32>,
    out: W,
}

impl ConsoleReporter<io::Stdout> {
    pub fn stdout(test_name: &str, enable_color: bool, show_progress: bool) -> Self {
        Self::with_writer(test_name, enable_color, show_progress, io::stdout())
    }
}

impl<W: Write + Send> ConsoleReporter<W> {
    pub fn with_writer(test_name: &str, enable_color: bool, show_progress: bool, out: W) -> Self {
        Self {
            test_name: test_name.to_string(),
            enable_color,
            show_progress,
            progress_step: None,
            out,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, symbol: &str, color: Color, message: &str) {
        let prefix = format!("[{}]", self.test_name);
        let text = if self.enable_color {
            format!("{} {} {}", prefix.bright_black(), symbol.color(color), message)
        } else {
            format!("{} {} {}", prefix, symbol, message)
        };
        // Console output is best effort; a closed pipe must not abort a run
        let _ = writeln!(self.out, "{}", text);
    }
}

impl<W: Write + Send> TestReporter for ConsoleReporter<W> {
    fn set_progress(&mut self, percent: f64) {
        if !self.show_progress {
            return;
        }
        let step = (percent.clamp(0.0, 100.0) / 10.0).floor() as u32;
        if self.progress_step.map_or(true, |last| step > last) {
            self.progress_step = Some(step);
            self.line("…", Color::BrightBlack, &format!("{}%", step * 10));
        }
    }

    fn report_info(&mut self, message: &str) {
        self.line("i", Color::Cyan, message);
    }

    fn report_success(&mut self, message: &str) {
        self.line("✓", Color::Green, message);
    }

    fn report_error(&mut self, message: &str) {
        self.line("✗", Color::Red, message);
    }

    fn report_fatal(&mut self, message: &str) {
        self.line("‼", Color::Red, message);
    }

    fn done(&mut self) {
        let _ = self.out.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(reporter: ConsoleReporter<Vec<u8>>) -> String {
        String::from_utf8(reporter.into_inner()).unwrap()
    }

    #[test]
    fn test_plain_lines() {
        let mut reporter = ConsoleReporter::with_writer("data-throughput", false, false, Vec::new());
        reporter.report_info("Transmitting at 8192 kbps.");
        reporter.report_error("Failed to send data.");
        reporter.done();

        assert_eq!(
            output(reporter),
            "[data-throughput] i Transmitting at 8192 kbps.\n[data-throughput] ✗ Failed to send data.\n"
        );
    }

    #[test]
    fn test_progress_printed_per_ten_percent() {
        let mut reporter = ConsoleReporter::with_writer("network-latency", false, true, Vec::new());
        for percent in [0.0, 3.0, 9.9, 10.0, 15.0, 42.0, 100.0, 100.0] {
            reporter.set_progress(percent);
        }

        let text = output(reporter);
        let steps: Vec<&str> = text.lines().map(|l| l.rsplit(' ').next().unwrap()).collect();
        assert_eq!(steps, vec!["0%", "10%", "40%", "100%"]);
    }

    #[test]
    fn test_progress_hidden_by_default() {
        let mut reporter = ConsoleReporter::with_writer("video-bandwidth", false, false, Vec::new());
        reporter.set_progress(50.0);
        assert!(output(reporter).is_empty());
    }
}
