//! Measurement components
//!
//! Each component owns one session for the duration of a run, drives its own
//! timer loop and reports through a [`TestReporter`]. A run always ends with
//! exactly one call to [`TestReporter::done`], including runs whose setup
//! failed.

pub mod bandwidth;
pub mod latency;
pub mod throughput;

pub use bandwidth::{BandwidthAccumulator, BandwidthSampler};
pub use latency::{evaluate_delays, DelaySample, LatencyProbe, WallClock};
pub use throughput::{ThroughputPacer, ThroughputState};

use crate::error::AppError;
use crate::harness::TestReporter;
use crate::logging::Logger;
use crate::models::MeasurementSummary;
use crate::transport::{Session, SessionFactory};
use async_trait::async_trait;

/// A runnable measurement
#[async_trait]
pub trait Measurement: Send + Sync {
    /// Registry name of the test case this measurement backs
    fn name(&self) -> &str;

    /// Run to completion; `None` when setup failed before anything was measured
    async fn run(
        &self,
        factory: &dyn SessionFactory,
        reporter: &mut dyn TestReporter,
    ) -> Option<MeasurementSummary>;
}

/// Report a setup failure as fatal and finish the run.
///
/// The session, if one was already created, is closed before `done`.
pub(crate) async fn abort_setup(
    logger: &Logger,
    reporter: &mut dyn TestReporter,
    step: &str,
    error: AppError,
    session: Option<&mut Box<dyn Session>>,
) {
    logger.error(&format!("Setup failed while trying to {}", step))
        .field("step", step)
        .field("error", error.to_string())
        .error_info(&error)
        .log()
        .await;

    if let Some(session) = session {
        if let Err(close_err) = session.close().await {
            logger.warn(&format!("Failed to close session after setup failure: {}", close_err))
                .error_info(&close_err)
                .log()
                .await;
        }
    }

    reporter.report_fatal(&format!("Failed to {}: {}", step, error));
    reporter.done();
}

/// Close a session at the end of a run, logging rather than reporting failures
pub(crate) async fn close_session(logger: &Logger, session: &mut Box<dyn Session>) {
    if let Err(err) = session.close().await {
        crate::log_warn!(logger, "Failed to close session: {}", err);
    }
}

/// Format an optional figure, printing "unavailable" when absent
pub(crate) fn figure(value: Option<f64>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "unavailable".to_string(),
    }
}
