//! Completion monitor for detached transfer jobs.
//!
//! Only liveness is observed here. Exit statuses are collected afterwards
//! from the job handles.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{MigrateError, Result};
use crate::remote::{LivenessProbe, OsLivenessProbe};
use crate::transfer::TrackedJob;

/// Interval between liveness polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Polls tracked PIDs until none is alive.
pub struct CompletionMonitor<P = OsLivenessProbe> {
    probe: P,
    interval: Duration,
    show_progress: bool,
}

impl CompletionMonitor<OsLivenessProbe> {
    pub fn new() -> Self {
        Self::with_probe(OsLivenessProbe)
    }
}

impl Default for CompletionMonitor<OsLivenessProbe> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: LivenessProbe> CompletionMonitor<P> {
    pub fn with_probe(probe: P) -> Self {
        Self {
            probe,
            interval: DEFAULT_POLL_INTERVAL,
            show_progress: true,
        }
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Render the running counter as a terminal spinner.
    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Wait until every job in `jobs` has exited.
    ///
    /// There is no timeout. Returns the number of wait intervals that
    /// elapsed, or `Cancelled` if `cancel` fires first; jobs still running
    /// at that point are left alone.
    pub async fn wait_for_all(&self, jobs: &[TrackedJob], cancel: &CancellationToken) -> Result<u64> {
        let mut remaining: Vec<TrackedJob> = jobs.to_vec();
        if remaining.is_empty() {
            return Ok(0);
        }

        info!("Waiting for {} background job(s) to finish", remaining.len());
        let spinner = self.spinner();
        let mut polls = 0u64;

        loop {
            remaining.retain(|job| {
                let alive = self.probe.is_alive(job.pid);
                if !alive {
                    info!("{} (pid {}) has exited", job.kind, job.pid);
                }
                alive
            });

            if remaining.is_empty() {
                spinner.finish_and_clear();
                return Ok(polls);
            }

            polls += 1;
            spinner.set_message(format!("Still checking transfer... {}", polls));
            spinner.tick();

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    spinner.finish_and_clear();
                    for job in &remaining {
                        warn!("{} is still running in the background (pid {})", job.kind, job.pid);
                    }
                    return Err(MigrateError::Cancelled);
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    fn spinner(&self) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::JobKind;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Reports each PID alive for a fixed number of queries.
    struct CountdownProbe {
        remaining: Mutex<HashMap<u32, u64>>,
        queries: Mutex<Vec<u32>>,
    }

    impl CountdownProbe {
        fn new(alive_for: &[(u32, u64)]) -> Self {
            Self {
                remaining: Mutex::new(alive_for.iter().copied().collect()),
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    impl LivenessProbe for CountdownProbe {
        fn is_alive(&self, pid: u32) -> bool {
            self.queries.lock().unwrap().push(pid);
            let mut remaining = self.remaining.lock().unwrap();
            match remaining.get_mut(&pid) {
                Some(n) if *n > 0 => {
                    *n -= 1;
                    true
                }
                _ => false,
            }
        }
    }

    fn jobs() -> Vec<TrackedJob> {
        vec![
            TrackedJob {
                kind: JobKind::FileTransfer,
                pid: 100,
            },
            TrackedJob {
                kind: JobKind::DatabaseTransfer,
                pid: 200,
            },
        ]
    }

    fn monitor(probe: CountdownProbe) -> CompletionMonitor<CountdownProbe> {
        CompletionMonitor::with_probe(probe)
            .interval(Duration::from_millis(1))
            .show_progress(false)
    }

    #[tokio::test]
    async fn test_returns_after_longest_job() {
        let monitor = monitor(CountdownProbe::new(&[(100, 2), (200, 5)]));
        let polls = monitor
            .wait_for_all(&jobs(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(polls, 5);

        let queries = monitor.probe.queries.lock().unwrap();
        assert_eq!(queries.iter().filter(|p| **p == 100).count(), 3);
        assert_eq!(queries.iter().filter(|p| **p == 200).count(), 6);
    }

    #[tokio::test]
    async fn test_order_of_completion_does_not_matter() {
        let monitor = monitor(CountdownProbe::new(&[(100, 4), (200, 1)]));
        let polls = monitor
            .wait_for_all(&jobs(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(polls, 4);
    }

    #[tokio::test]
    async fn test_no_jobs_returns_immediately() {
        let monitor = monitor(CountdownProbe::new(&[]));
        let polls = monitor
            .wait_for_all(&[], &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(polls, 0);
        assert!(monitor.probe.queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_stops_waiting() {
        let monitor = monitor(CountdownProbe::new(&[(100, u64::MAX), (200, u64::MAX)]));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = monitor.wait_for_all(&jobs(), &cancel).await.unwrap_err();
        assert!(matches!(err, MigrateError::Cancelled));
    }

    #[tokio::test]
    async fn test_real_process_is_observed_until_exit() {
        let mut child = tokio::process::Command::new("sleep").arg("0.2").spawn().unwrap();
        let job = TrackedJob {
            kind: JobKind::FileTransfer,
            pid: child.id().unwrap(),
        };
        let reaper = tokio::spawn(async move { child.wait().await });

        let polls = CompletionMonitor::new()
            .interval(Duration::from_millis(20))
            .show_progress(false)
            .wait_for_all(&[job], &CancellationToken::new())
            .await
            .unwrap();
        assert!(polls >= 1);
        reaper.await.unwrap().unwrap();
    }
}
