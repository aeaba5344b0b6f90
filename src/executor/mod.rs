//! Test execution engine
//!
//! Runs the selected test cases one after another against a session factory.
//! Each case gets a fresh session and its own reporter; the executor records
//! every report to derive the case's final status.

use crate::{
    error::Result,
    harness::{RecordingReporter, TestCase, TestKind, TestReporter},
    logging::{Logger, MeasurementLogger, TransportLogger},
    measurement::{BandwidthSampler, LatencyProbe, Measurement, ThroughputPacer},
    models::{Config, TestResult},
    transport::{Session, SessionConfig, SessionFactory},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Builds the reporter a test case reports through
pub type ReporterFactory = Box<dyn Fn(&TestCase) -> Box<dyn TestReporter> + Send + Sync>;

/// Summary of test execution results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub total_duration: Duration,
    pub total_tests: u32,
    pub passed_tests: u32,
    /// Ran to completion but reported errors
    pub failed_tests: u32,
    /// Never got a session up
    pub fatal_tests: u32,
    /// Percentage of passed tests
    pub success_rate: f64,
}

/// Complete execution results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResults {
    pub execution_summary: ExecutionSummary,
    pub test_results: Vec<TestResult>,
}

impl ExecutionResults {
    pub fn new(test_results: Vec<TestResult>, total_duration: Duration) -> Self {
        let total_tests = test_results.len() as u32;
        let passed_tests = test_results.iter().filter(|r| r.passed()).count() as u32;
        let fatal_tests = test_results
            .iter()
            .filter(|r| r.status == crate::types::TestStatus::Fatal)
            .count() as u32;
        let failed_tests = total_tests - passed_tests - fatal_tests;
        let success_rate = if total_tests > 0 {
            passed_tests as f64 * 100.0 / total_tests as f64
        } else {
            0.0
        };

        Self {
            execution_summary: ExecutionSummary {
                total_duration,
                total_tests,
                passed_tests,
                failed_tests,
                fatal_tests,
                success_rate,
            },
            test_results,
        }
    }

    /// Check if any test failed or could not start
    pub fn has_failures(&self) -> bool {
        self.execution_summary.failed_tests > 0 || self.execution_summary.fatal_tests > 0
    }

    pub fn has_fatal(&self) -> bool {
        self.execution_summary.fatal_tests > 0
    }
}

/// High-level test executor interface
#[async_trait]
pub trait TestExecutor {
    /// Run the given test cases in order
    async fn execute_tests(&self, cases: &[TestCase]) -> Result<ExecutionResults>;
}

/// Build the measurement component behind a registered test case
pub fn measurement_for(case: &TestCase, config: &Config, logger: &Logger) -> Box<dyn Measurement> {
    match case.kind {
        TestKind::DataThroughput => Box::new(ThroughputPacer::new(
            config.throughput.clone(),
            logger.named("THROUGHPUT"),
        )),
        TestKind::VideoBandwidth => Box::new(BandwidthSampler::new(
            config.bandwidth.clone(),
            logger.named("BANDWIDTH"),
        )),
        TestKind::NetworkLatency(filter) => Box::new(LatencyProbe::new(
            config.latency.clone(),
            filter,
            logger.named("LATENCY"),
        )),
    }
}

/// Session factory that logs every session it hands to a test case
struct LoggedSessionFactory<'a> {
    inner: &'a dyn SessionFactory,
    logger: &'a TransportLogger,
    test: &'a str,
}

#[async_trait]
impl SessionFactory for LoggedSessionFactory<'_> {
    async fn create(&self, config: SessionConfig) -> Result<Box<dyn Session>> {
        let result = self.inner.create(config).await;
        self.logger
            .log_session_event(self.test, "create", result.as_ref().err())
            .await;
        result
    }
}

/// Runs test cases one at a time, each on its own session
pub struct SequentialExecutor {
    config: Config,
    factory: Arc<dyn SessionFactory>,
    reporters: ReporterFactory,
    logger: Logger,
    measurement_logger: MeasurementLogger,
    transport_logger: TransportLogger,
}

impl SequentialExecutor {
    pub fn new(config: Config, factory: Arc<dyn SessionFactory>, logger: Logger) -> Self {
        let measurement_logger = MeasurementLogger::new(&config);
        let transport_logger = TransportLogger::new(&config);
        Self {
            config,
            factory,
            reporters: Box::new(|_| Box::new(RecordingReporter::new())),
            logger,
            measurement_logger,
            transport_logger,
        }
    }

    /// Route each test case's reports through reporters built by `reporters`
    pub fn with_reporters(mut self, reporters: ReporterFactory) -> Self {
        self.reporters = reporters;
        self
    }

    async fn execute_case(&self, case: &TestCase) -> TestResult {
        self.logger.add_context_field("test".to_string(), case.name).await;
        let correlation_id = self.logger.start_operation(case.name).await;
        let measurement = measurement_for(case, &self.config, &self.logger);
        let mut reporter = RecordingReporter::forwarding((self.reporters)(case));

        let factory = LoggedSessionFactory {
            inner: self.factory.as_ref(),
            logger: &self.transport_logger,
            test: case.name,
        };

        let started = Instant::now();
        let summary = measurement.run(&factory, &mut reporter).await;
        let duration = started.elapsed();

        if reporter.done_count() != 1 {
            self.logger.warn(&format!("{} reported done {} times", case.name, reporter.done_count()))
                .correlation_id(&correlation_id)
                .log()
                .await;
        }

        let result = TestResult {
            suite: case.suite.to_string(),
            name: case.name.to_string(),
            status: reporter.status(),
            summary,
            errors: reporter.failure_messages(),
            duration_ms: duration.as_millis() as u64,
        };

        self.measurement_logger.log_test_result(&result).await;
        self.logger.end_operation(&correlation_id, case.name, result.passed()).await;
        result
    }
}

#[async_trait]
impl TestExecutor for SequentialExecutor {
    async fn execute_tests(&self, cases: &[TestCase]) -> Result<ExecutionResults> {
        let started = Instant::now();
        let mut results = Vec::with_capacity(cases.len());
        crate::log_info!(self.logger, "Executing {} test case(s)", cases.len());

        for case in cases {
            results.push(self.execute_case(case).await);
        }

        let results = ExecutionResults::new(results, started.elapsed());
        self.measurement_logger
            .log_run_summary(
                results.execution_summary.total_tests as usize,
                results.execution_summary.passed_tests as usize,
                results.execution_summary.total_duration,
            )
            .await;
        Ok(results)
    }
}
