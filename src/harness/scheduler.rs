//! Fixed-delay timer loops
//!
//! Each tick of a periodic loop decides whether to run again. The next firing
//! is scheduled relative to the moment the tick finished, never relative to
//! when it was due, so slow ticks stretch the period instead of piling up.

use super::TestReporter;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};

/// Outcome of one timer tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Fire again after this delay
    Reschedule(Duration),
    /// Stop the loop
    Terminal,
}

/// A single pending deadline, re-armed after every tick
#[derive(Debug, Default)]
pub struct FixedDelaySchedule {
    deadline: Option<Instant>,
}

impl FixedDelaySchedule {
    /// A schedule with nothing pending
    pub fn idle() -> Self {
        Self::default()
    }

    /// A schedule that fires once `delay` has passed
    pub fn start_after(delay: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + delay),
        }
    }

    pub fn is_active(&self) -> bool {
        self.deadline.is_some()
    }

    /// Arm the schedule according to the outcome of a tick
    pub fn apply(&mut self, tick: Tick) {
        self.deadline = match tick {
            Tick::Reschedule(delay) => Some(Instant::now() + delay),
            Tick::Terminal => None,
        };
    }

    /// Cancel whatever is pending
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// Wait for the pending deadline.
    ///
    /// Never resolves on an idle schedule, which makes it safe to use as one
    /// branch of `tokio::select!`. Cancel safe: dropping the future keeps the
    /// deadline armed.
    pub async fn wait(&mut self) {
        match self.deadline {
            Some(deadline) => {
                sleep_until(deadline).await;
                self.deadline = None;
            }
            None => std::future::pending::<()>().await,
        }
    }
}

/// A periodic task driven by [`run_scheduled`]
#[async_trait]
pub trait ScheduledTask: Send {
    async fn tick(&mut self, reporter: &mut dyn TestReporter) -> Tick;
}

/// Drive `task` until it returns [`Tick::Terminal`]
pub async fn run_scheduled<T>(task: &mut T, reporter: &mut dyn TestReporter, first_delay: Duration)
where
    T: ScheduledTask + ?Sized,
{
    let mut schedule = FixedDelaySchedule::start_after(first_delay);
    while schedule.is_active() {
        schedule.wait().await;
        let tick = task.tick(reporter).await;
        schedule.apply(tick);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::RecordingReporter;

    struct Countdown {
        remaining: u32,
        fired_at: Vec<Instant>,
    }

    #[async_trait]
    impl ScheduledTask for Countdown {
        async fn tick(&mut self, reporter: &mut dyn TestReporter) -> Tick {
            self.fired_at.push(Instant::now());
            self.remaining -= 1;
            reporter.report_info("tick");
            if self.remaining == 0 {
                Tick::Terminal
            } else {
                // simulated slow tick
                tokio::time::sleep(Duration::from_millis(5)).await;
                Tick::Reschedule(Duration::from_millis(10))
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_terminal() {
        let mut task = Countdown { remaining: 3, fired_at: Vec::new() };
        let mut reporter = RecordingReporter::new();
        let start = Instant::now();

        run_scheduled(&mut task, &mut reporter, Duration::from_millis(10)).await;

        assert_eq!(reporter.infos().len(), 3);
        let offsets: Vec<u128> = task.fired_at.iter().map(|t| (*t - start).as_millis()).collect();
        // fixed delay: each period is 5ms of work plus a 10ms wait
        assert_eq!(offsets, vec![10, 25, 40]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_schedule_never_fires() {
        let mut schedule = FixedDelaySchedule::idle();
        let fired = tokio::time::timeout(Duration::from_secs(60), schedule.wait()).await;
        assert!(fired.is_err());
    }

    #[test]
    fn test_idle_wait_stays_pending() {
        let mut schedule = FixedDelaySchedule::idle();
        let mut wait = tokio_test::task::spawn(schedule.wait());
        tokio_test::assert_pending!(wait.poll());
        tokio_test::assert_pending!(wait.poll());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_is_cancel_safe() {
        let mut schedule = FixedDelaySchedule::start_after(Duration::from_millis(100));
        let interrupted = tokio::time::timeout(Duration::from_millis(50), schedule.wait()).await;
        assert!(interrupted.is_err());
        assert!(schedule.is_active());

        schedule.wait().await;
        assert!(!schedule.is_active());
    }

    #[test]
    fn test_apply_terminal_clears() {
        let mut schedule = FixedDelaySchedule::idle();
        assert!(!schedule.is_active());
        schedule.apply(Tick::Terminal);
        assert!(!schedule.is_active());
    }
}
