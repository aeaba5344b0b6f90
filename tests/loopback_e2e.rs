//! End-to-end runs of the test suite over the loopback transport
//!
//! All tests run on tokio's paused clock, so simulated minutes finish in
//! milliseconds of wall time.

use peer_throughput_tester::{
    executor::{ExecutionResults, SequentialExecutor, TestExecutor},
    harness::{TestCase, TestRegistry, TestReporter},
    logging::Logger,
    models::{Config, LinkConfig, MeasurementSummary},
    transport::LoopbackSessionFactory,
    types::TestStatus,
};
use std::sync::{Arc, Mutex};

/// Reporter writing "<test>: <kind>: <message>" lines into a shared log
struct SharedLog {
    test: String,
    lines: Arc<Mutex<Vec<String>>>,
}

impl SharedLog {
    fn push(&self, kind: &str, message: &str) {
        self.lines.lock().unwrap().push(format!("{}: {}: {}", self.test, kind, message));
    }
}

impl TestReporter for SharedLog {
    fn set_progress(&mut self, _percent: f64) {}

    fn report_info(&mut self, message: &str) {
        self.push("info", message);
    }

    fn report_success(&mut self, message: &str) {
        self.push("success", message);
    }

    fn report_error(&mut self, message: &str) {
        self.push("error", message);
    }

    fn report_fatal(&mut self, message: &str) {
        self.push("fatal", message);
    }

    fn done(&mut self) {
        self.push("done", "");
    }
}

fn short_config(link: LinkConfig) -> Config {
    let mut config = Config::default();
    config.throughput.duration_ms = 2_000;
    config.bandwidth.duration_ms = 4_000;
    config.latency.duration_ms = 5_000;
    config.link = link;
    config
}

async fn run(config: Config, names: &[&str], all: bool) -> (ExecutionResults, Vec<String>) {
    let registry = TestRegistry::with_defaults();
    let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
    let cases: Vec<TestCase> = registry.select(&names, all).unwrap().into_iter().cloned().collect();

    let lines = Arc::new(Mutex::new(Vec::new()));
    let shared = lines.clone();
    let executor = SequentialExecutor::new(
        config.clone(),
        Arc::new(LoopbackSessionFactory::new(config.link.clone())),
        Logger::quiet("E2E"),
    )
    .with_reporters(Box::new(move |case: &TestCase| {
        Box::new(SharedLog {
            test: case.name.to_string(),
            lines: shared.clone(),
        }) as Box<dyn TestReporter>
    }));

    let results = executor.execute_tests(&cases).await.unwrap();
    let lines = lines.lock().unwrap().clone();
    (results, lines)
}

#[tokio::test(start_paused = true)]
async fn test_default_suite_passes_on_clean_link() {
    let (results, lines) = run(short_config(LinkConfig::default()), &[], false).await;

    assert_eq!(results.execution_summary.total_tests, 2);
    assert!(!results.has_failures(), "{:#?}", lines);

    let names: Vec<&str> = results.test_results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["data-throughput", "video-bandwidth"]);

    match &results.test_results[0].summary {
        Some(MeasurementSummary::Throughput(t)) => {
            assert!(t.sent_bytes > 0);
            assert_eq!(t.received_bytes, t.sent_bytes);
        }
        other => panic!("unexpected summary {:?}", other),
    }

    match &results.test_results[1].summary {
        Some(MeasurementSummary::Bandwidth(b)) => {
            assert!(b.camera_ok);
            assert_eq!(b.telemetry_format, "legacy");
            assert!(b.ramp_up.map_or(false, |r| !r.is_infinite()), "{:?}", b.ramp_up);
            assert_eq!(b.rtt_avg_ms, Some(40.0));
        }
        other => panic!("unexpected summary {:?}", other),
    }

    // each test reported done exactly once
    for name in names {
        let done = lines.iter().filter(|l| l.starts_with(&format!("{}: done", name))).count();
        assert_eq!(done, 1, "{}", name);
    }
}

#[tokio::test(start_paused = true)]
async fn test_throughput_bounded_by_link_bandwidth() {
    let link = LinkConfig {
        bandwidth_kbps: 1_000,
        ..LinkConfig::default()
    };
    let (results, lines) = run(short_config(link), &["data-throughput"], false).await;

    assert_eq!(results.test_results[0].status, TestStatus::Passed, "{:#?}", lines);
    let Some(MeasurementSummary::Throughput(summary)) = &results.test_results[0].summary else {
        panic!("missing throughput summary");
    };
    let kbps = summary.average_kbps().unwrap();
    assert!(kbps <= 1_010.0, "{} kbps exceeds the link", kbps);
    assert!(kbps >= 500.0, "{} kbps is far below the link", kbps);
    assert!(lines.iter().any(|l| l.contains("Transmitting at")));
}

#[tokio::test(start_paused = true)]
async fn test_explicit_latency_tests_run_with_all() {
    let (results, lines) = run(short_config(LinkConfig::default()), &[], true).await;

    assert_eq!(results.execution_summary.total_tests, 4);
    assert_eq!(results.execution_summary.passed_tests, 4, "{:#?}", lines);

    for result in &results.test_results[2..] {
        let Some(MeasurementSummary::Latency(latency)) = &result.summary else {
            panic!("missing latency summary for {}", result.name);
        };
        assert!(latency.enough_samples);
        assert_eq!(latency.stable, Some(true));
        let delay = latency.delay.unwrap();
        assert!(delay.min_ms >= 20.0, "{:?}", delay);
    }
}

#[tokio::test(start_paused = true)]
async fn test_lossy_link_fails_only_latency() {
    let link = LinkConfig {
        drop_every: 2,
        ..LinkConfig::default()
    };
    let (results, lines) = run(short_config(link), &["data-throughput", "network-latency"], false).await;

    assert_eq!(results.test_results[0].status, TestStatus::Passed, "{:#?}", lines);
    assert_eq!(results.test_results[1].status, TestStatus::Failed);
    assert!(results.test_results[1]
        .errors
        .iter()
        .any(|e| e.starts_with("Not enough samples gathered.")));
}

#[tokio::test(start_paused = true)]
async fn test_camera_failure_reported() {
    let link = LinkConfig {
        frame_width: 0,
        frame_height: 0,
        ..LinkConfig::default()
    };
    let (results, _) = run(short_config(link), &["video-bandwidth"], false).await;

    let result = &results.test_results[0];
    assert_eq!(result.status, TestStatus::Failed);
    assert_eq!(
        result.errors,
        vec!["Camera failure: 0x0. Cannot test bandwidth without a working camera.".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_unavailable_relay_is_fatal_for_every_test() {
    let config = short_config(LinkConfig::default());
    let registry = TestRegistry::with_defaults();
    let cases: Vec<TestCase> = registry.cases().to_vec();
    let executor = SequentialExecutor::new(
        config.clone(),
        Arc::new(LoopbackSessionFactory::new(config.link.clone()).with_failing_setup()),
        Logger::quiet("E2E"),
    );

    let results = executor.execute_tests(&cases).await.unwrap();

    assert_eq!(results.execution_summary.fatal_tests, 4);
    for result in &results.test_results {
        assert_eq!(
            result.errors,
            vec!["Failed to create session: Setup error: relay configuration unavailable".to_string()]
        );
    }
}
