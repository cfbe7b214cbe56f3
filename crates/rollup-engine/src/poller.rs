//! Job status polling with backoff
//!
//! The interval starts at `poll.initial_interval_ms` and doubles up to
//! `poll.max_interval_ms`. Polling stops at the first terminal status or
//! after `poll.max_attempts` reads. The sleep function is injectable so
//! callers (and tests) can do work between reads instead of blocking.

use std::time::Duration;

use rollup_core::config::PollConfig;
use rollup_core::{log_op_end, log_op_error, log_op_start};
use rollup_store::errors::Result;

use crate::commands::jobs::JobStatusReport;

/// Last status observed and how many reads it took
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    pub report: JobStatusReport,
    pub attempts: u32,
    /// The attempt cap was reached before a terminal status
    pub timed_out: bool,
}

pub struct JobPoller<S: FnMut(Duration) = fn(Duration)> {
    config: PollConfig,
    sleep: S,
}

impl JobPoller {
    /// Poller that blocks the current thread between reads
    pub fn new(config: PollConfig) -> Self {
        Self {
            config,
            sleep: std::thread::sleep,
        }
    }
}

impl<S: FnMut(Duration)> JobPoller<S> {
    pub fn with_sleep<T: FnMut(Duration)>(self, sleep: T) -> JobPoller<T> {
        JobPoller {
            config: self.config,
            sleep,
        }
    }

    /// Wait before read `attempt + 1`, for `attempt` starting at 1
    pub fn interval(&self, attempt: u32) -> Duration {
        let max = self.config.max_interval_ms.max(1);
        let mut ms = self.config.initial_interval_ms.clamp(1, max);
        for _ in 1..attempt {
            ms = ms.saturating_mul(2).min(max);
            if ms == max {
                break;
            }
        }
        Duration::from_millis(ms)
    }

    /// Read status through `read` until terminal or out of attempts
    ///
    /// # Errors
    ///
    /// The first error `read` returns; polling stops there.
    pub fn poll<F>(&mut self, mut read: F) -> Result<PollOutcome>
    where
        F: FnMut() -> Result<JobStatusReport>,
    {
        log_op_start!("poll_job_status", max_attempts = self.config.max_attempts);
        let start = std::time::Instant::now();

        let result = (|| -> Result<PollOutcome> {
            let cap = self.config.max_attempts.max(1);
            let mut attempts = 0;
            loop {
                attempts += 1;
                let report = read()?;
                if report.is_terminal() || attempts >= cap {
                    let timed_out = !report.is_terminal();
                    if timed_out {
                        tracing::warn!(
                            handle = %report.handle,
                            status = %report.status_text,
                            attempts,
                            "job still running after the last poll attempt"
                        );
                    }
                    return Ok(PollOutcome {
                        report,
                        attempts,
                        timed_out,
                    });
                }
                let wait = self.interval(attempts);
                tracing::trace!(attempts, wait_ms = wait.as_millis() as u64, "job not terminal, waiting");
                (self.sleep)(wait);
            }
        })();

        let elapsed = start.elapsed().as_millis() as u64;
        match &result {
            Ok(outcome) => log_op_end!(
                "poll_job_status",
                duration_ms = elapsed,
                attempts = outcome.attempts,
                timed_out = outcome.timed_out
            ),
            Err(e) => {
                let e_clone = e.clone();
                log_op_error!("poll_job_status", e_clone, duration_ms = elapsed);
            }
        }
        result
    }
}

impl<S: FnMut(Duration)> std::fmt::Debug for JobPoller<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobPoller").field("config", &self.config).finish()
    }
}
