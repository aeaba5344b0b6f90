//! Test harness surface shared by all measurement components
//!
//! A component reports progress and findings through a [`TestReporter`] and
//! calls [`TestReporter::done`] exactly once when it has finished, whatever
//! the outcome. Latency runs may additionally stream datapoints to a
//! [`ChartSink`].

pub mod registry;
pub mod scheduler;

pub use registry::{TestCase, TestKind, TestRegistry};
pub use scheduler::{run_scheduled, FixedDelaySchedule, ScheduledTask, Tick};

use crate::types::TestStatus;

/// Receives (x, y) datapoints for a live line chart
pub trait ChartSink: Send {
    fn add_datapoint(&mut self, x: f64, y: f64);
}

/// Reporting surface exposed to a running test case
pub trait TestReporter: Send {
    /// Completion percentage in `0..=100`
    fn set_progress(&mut self, percent: f64);

    fn report_info(&mut self, message: &str);

    fn report_success(&mut self, message: &str);

    fn report_error(&mut self, message: &str);

    /// The test could not start at all
    fn report_fatal(&mut self, message: &str);

    /// The test has finished; called exactly once per run
    fn done(&mut self);

    /// Chart attached to this test, if the harness provides one
    fn chart(&mut self) -> Option<&mut dyn ChartSink> {
        None
    }
}

/// One call made on a [`RecordingReporter`]
#[derive(Debug, Clone, PartialEq)]
pub enum ReportEvent {
    Progress(f64),
    Info(String),
    Success(String),
    Error(String),
    Fatal(String),
    Done,
}

/// Reporter that keeps every call, optionally forwarding to another reporter.
///
/// The executor wraps the console reporter in one of these to derive the
/// final [`TestStatus`]; tests use it directly to assert on what a component
/// reported.
#[derive(Default)]
pub struct RecordingReporter {
    events: Vec<ReportEvent>,
    datapoints: Vec<(f64, f64)>,
    chart_enabled: bool,
    forward: Option<Box<dyn TestReporter>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record calls and pass each one on to `inner`
    pub fn forwarding(inner: Box<dyn TestReporter>) -> Self {
        Self {
            forward: Some(inner),
            ..Self::default()
        }
    }

    /// Provide a chart that records datapoints
    pub fn with_chart(mut self) -> Self {
        self.chart_enabled = true;
        self
    }

    pub fn events(&self) -> &[ReportEvent] {
        &self.events
    }

    pub fn datapoints(&self) -> &[(f64, f64)] {
        &self.datapoints
    }

    pub fn infos(&self) -> Vec<&str> {
        self.messages(|e| match e {
            ReportEvent::Info(m) => Some(m),
            _ => None,
        })
    }

    pub fn successes(&self) -> Vec<&str> {
        self.messages(|e| match e {
            ReportEvent::Success(m) => Some(m),
            _ => None,
        })
    }

    pub fn errors(&self) -> Vec<&str> {
        self.messages(|e| match e {
            ReportEvent::Error(m) => Some(m),
            _ => None,
        })
    }

    pub fn fatals(&self) -> Vec<&str> {
        self.messages(|e| match e {
            ReportEvent::Fatal(m) => Some(m),
            _ => None,
        })
    }

    /// Error and fatal messages in report order
    pub fn failure_messages(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ReportEvent::Error(m) | ReportEvent::Fatal(m) => Some(m.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn done_count(&self) -> usize {
        self.events.iter().filter(|e| matches!(e, ReportEvent::Done)).count()
    }

    pub fn last_progress(&self) -> Option<f64> {
        self.events.iter().rev().find_map(|e| match e {
            ReportEvent::Progress(p) => Some(*p),
            _ => None,
        })
    }

    /// Outcome implied by what was reported
    pub fn status(&self) -> TestStatus {
        if !self.fatals().is_empty() {
            TestStatus::Fatal
        } else if !self.errors().is_empty() {
            TestStatus::Failed
        } else {
            TestStatus::Passed
        }
    }

    fn messages<'a, F>(&'a self, pick: F) -> Vec<&'a str>
    where
        F: Fn(&'a ReportEvent) -> Option<&'a String>,
    {
        self.events.iter().filter_map(pick).map(String::as_str).collect()
    }

    fn record(&mut self, event: ReportEvent) {
        self.events.push(event);
    }
}

impl ChartSink for Vec<(f64, f64)> {
    fn add_datapoint(&mut self, x: f64, y: f64) {
        self.push((x, y));
    }
}

impl TestReporter for RecordingReporter {
    fn set_progress(&mut self, percent: f64) {
        self.record(ReportEvent::Progress(percent));
        if let Some(inner) = self.forward.as_mut() {
            inner.set_progress(percent);
        }
    }

    fn report_info(&mut self, message: &str) {
        self.record(ReportEvent::Info(message.to_string()));
        if let Some(inner) = self.forward.as_mut() {
            inner.report_info(message);
        }
    }

    fn report_success(&mut self, message: &str) {
        self.record(ReportEvent::Success(message.to_string()));
        if let Some(inner) = self.forward.as_mut() {
            inner.report_success(message);
        }
    }

    fn report_error(&mut self, message: &str) {
        self.record(ReportEvent::Error(message.to_string()));
        if let Some(inner) = self.forward.as_mut() {
            inner.report_error(message);
        }
    }

    fn report_fatal(&mut self, message: &str) {
        self.record(ReportEvent::Fatal(message.to_string()));
        if let Some(inner) = self.forward.as_mut() {
            inner.report_fatal(message);
        }
    }

    fn done(&mut self) {
        self.record(ReportEvent::Done);
        if let Some(inner) = self.forward.as_mut() {
            inner.done();
        }
    }

    fn chart(&mut self) -> Option<&mut dyn ChartSink> {
        if self.chart_enabled {
            Some(&mut self.datapoints)
        } else {
            None
        }
    }
}
