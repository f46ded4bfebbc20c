//! Retry queue for failed time-series writes
//!
//! Writes that fail on first attempt are parked here as [`WriteJob`]s and
//! replayed by the scheduler. The queue is shared between the sampling
//! thread (producer) and the scheduler thread (consumer).
//!
//! ## Ordering
//!
//! A drain replays jobs oldest first and stops at the first failure, putting
//! the failed job back at the head. A sink that stays down therefore blocks
//! the whole backlog instead of letting newer jobs overtake older ones.

use crate::event::Point;
use crate::sink::{SinkError, TelemetrySink};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Pending delivery to one target
#[derive(Debug, Clone, PartialEq)]
pub struct WriteJob {
    pub target: String,
    pub points: Vec<Point>,
    pub enqueued_at: DateTime<Utc>,
}

/// Result of one drain pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Jobs delivered and discarded
    pub delivered: usize,
    /// Jobs still queued after the pass
    pub remaining: usize,
    /// Target of the job that stopped the pass, if any
    pub stalled_on: Option<String>,
}

/// Outcome of a first delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    Queued,
}

/// FIFO of failed writes, safe to share between threads
#[derive(Debug)]
pub struct RetryQueue {
    jobs: Mutex<VecDeque<WriteJob>>,
    warn_backlog: usize,
}

impl Default for RetryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryQueue {
    pub fn new() -> Self {
        Self::with_backlog_warning(usize::MAX)
    }

    /// Queue that logs a warning whenever its length reaches `warn_backlog`
    pub fn with_backlog_warning(warn_backlog: usize) -> Self {
        Self {
            jobs: Mutex::new(VecDeque::new()),
            warn_backlog,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<WriteJob>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a job; never fails
    pub fn enqueue(&self, target: impl Into<String>, points: Vec<Point>) {
        let job = WriteJob {
            target: target.into(),
            points,
            enqueued_at: Utc::now(),
        };
        let len = {
            let mut jobs = self.lock();
            jobs.push_back(job);
            jobs.len()
        };
        if len >= self.warn_backlog {
            tracing::warn!(backlog = len, "Retry backlog is growing");
        } else {
            tracing::debug!(backlog = len, "Write queued for retry");
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of the queued jobs, oldest first
    pub fn snapshot(&self) -> Vec<WriteJob> {
        self.lock().iter().cloned().collect()
    }

    /// Replay queued jobs until the queue is empty or a delivery fails
    ///
    /// The lock is not held while the sink is called, so producers can keep
    /// appending during a slow pass.
    pub fn drain(&self, sink: &dyn TelemetrySink) -> DrainReport {
        let mut report = DrainReport::default();

        loop {
            let Some(job) = self.lock().pop_front() else {
                break;
            };

            match sink.write(&job.target, &job.points) {
                Ok(()) => {
                    report.delivered += 1;
                    tracing::info!(
                        target_bucket = %job.target,
                        points = job.points.len(),
                        "Retried write succeeded"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        target_bucket = %job.target,
                        error = %e,
                        "Retried write failed, stopping this drain cycle"
                    );
                    report.stalled_on = Some(job.target.clone());
                    self.lock().push_front(job);
                    break;
                }
            }
        }

        report.remaining = self.len();
        report
    }
}

/// Write points, parking them in the queue when the sink fails
pub fn write_or_enqueue(
    sink: &dyn TelemetrySink,
    queue: &RetryQueue,
    target: &str,
    points: Vec<Point>,
) -> Result<Delivery, SinkError> {
    match sink.write(target, &points) {
        Ok(()) => Ok(Delivery::Delivered),
        Err(e) => {
            tracing::error!(
                target_bucket = %target,
                error = %e,
                "Failed to write to time-series store, adding to retry queue"
            );
            queue.enqueue(target, points);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    /// Records successful targets, fails the n-th call (1-based) and after
    struct Scripted {
        fail_from: Option<usize>,
        calls: Mutex<usize>,
        written: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(fail_from: Option<usize>) -> Self {
            Self {
                fail_from,
                calls: Mutex::new(0),
                written: Mutex::new(Vec::new()),
            }
        }
    }

    impl TelemetrySink for Scripted {
        fn write(&self, target: &str, _points: &[Point]) -> Result<(), SinkError> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if self.fail_from.is_some_and(|n| *calls >= n) {
                return Err(SinkError::Unavailable("scripted"));
            }
            self.written.lock().unwrap().push(target.to_string());
            Ok(())
        }
    }

    fn point() -> Point {
        Point::new("m", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()).field("v", 1.0)
    }

    fn filled(n: usize) -> RetryQueue {
        let queue = RetryQueue::new();
        for i in 1..=n {
            queue.enqueue(format!("job{}", i), vec![point()]);
        }
        queue
    }

    #[test]
    fn test_drain_all_in_fifo_order() {
        let queue = filled(4);
        let sink = Scripted::new(None);
        let report = queue.drain(&sink);

        assert_eq!(report.delivered, 4);
        assert_eq!(report.remaining, 0);
        assert_eq!(report.stalled_on, None);
        assert_eq!(*sink.written.lock().unwrap(), ["job1", "job2", "job3", "job4"]);
    }

    #[test]
    fn test_drain_stops_at_first_failure() {
        let queue = filled(5);
        let sink = Scripted::new(Some(2));
        let report = queue.drain(&sink);

        assert_eq!(report.delivered, 1);
        assert_eq!(report.stalled_on.as_deref(), Some("job2"));
        let targets: Vec<_> = queue.snapshot().into_iter().map(|j| j.target).collect();
        assert_eq!(targets, ["job2", "job3", "job4", "job5"]);
        // Only two attempts: no spinning through the backlog
        assert_eq!(*sink.calls.lock().unwrap(), 2);
    }

    #[test]
    fn test_failed_job_is_unchanged() {
        let queue = filled(1);
        let before = queue.snapshot();
        queue.drain(&Scripted::new(Some(1)));
        assert_eq!(queue.snapshot(), before);
    }

    #[test]
    fn test_drain_empty_queue() {
        let report = RetryQueue::new().drain(&Scripted::new(None));
        assert_eq!(report, DrainReport::default());
    }

    #[test]
    fn test_write_or_enqueue() {
        let queue = RetryQueue::new();
        let ok = write_or_enqueue(&Scripted::new(None), &queue, "main", vec![point()]);
        assert_eq!(ok.unwrap(), Delivery::Delivered);
        assert!(queue.is_empty());

        let failed = write_or_enqueue(&Scripted::new(Some(1)), &queue, "main", vec![point()]);
        assert!(failed.is_err());
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.snapshot()[0].target, "main");
    }

    #[test]
    fn test_concurrent_producers() {
        let queue = Arc::new(RetryQueue::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        queue.enqueue(format!("t{}-{}", t, i), vec![point()]);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(queue.len(), 200);

        // Per-producer order survives interleaving
        let jobs = queue.snapshot();
        let t0: Vec<_> = jobs.iter().filter(|j| j.target.starts_with("t0-")).collect();
        for (i, job) in t0.iter().enumerate() {
            assert_eq!(job.target, format!("t0-{}", i));
        }
    }
}
