//! Low-frequency periodic task runner
//!
//! The scheduler wakes once per tick and runs every task whose interval has
//! elapsed. Tasks run sequentially on the scheduler thread; an error in one
//! task is logged and never stops the others or the scheduler itself.

use crossbeam_channel::{select, tick, Receiver};
use std::time::{Duration, Instant};

/// A job run by the [`Scheduler`] at a fixed interval
pub trait PeriodicTask: Send {
    fn name(&self) -> &str;
    fn run(&mut self) -> anyhow::Result<()>;
}

/// Closure-backed task
pub struct FnTask<F> {
    name: String,
    func: F,
}

impl<F> FnTask<F>
where
    F: FnMut() -> anyhow::Result<()> + Send,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> PeriodicTask for FnTask<F>
where
    F: FnMut() -> anyhow::Result<()> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self) -> anyhow::Result<()> {
        (self.func)()
    }
}

struct Entry {
    task: Box<dyn PeriodicTask>,
    interval: Duration,
    next_due: Instant,
    runs: u64,
}

/// Tick-driven runner for [`PeriodicTask`]s
pub struct Scheduler {
    tick: Duration,
    entries: Vec<Entry>,
}

impl Scheduler {
    pub fn new(tick: Duration) -> Self {
        Self {
            tick,
            entries: Vec::new(),
        }
    }

    /// Register a task whose first run is one `interval` from now
    pub fn register(&mut self, task: Box<dyn PeriodicTask>, interval: Duration) {
        self.register_at(task, interval, Instant::now() + interval);
    }

    /// Register a task that runs on the next tick, then every `interval`
    pub fn register_immediate(&mut self, task: Box<dyn PeriodicTask>, interval: Duration) {
        self.register_at(task, interval, Instant::now());
    }

    fn register_at(&mut self, task: Box<dyn PeriodicTask>, interval: Duration, next_due: Instant) {
        tracing::info!(
            task = task.name(),
            interval_secs = interval.as_secs_f64(),
            "Scheduled task"
        );
        self.entries.push(Entry {
            task,
            interval,
            next_due,
            runs: 0,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn tick(&self) -> Duration {
        self.tick
    }

    /// How many times the named task has run
    pub fn runs(&self, name: &str) -> Option<u64> {
        self.entries
            .iter()
            .find(|e| e.task.name() == name)
            .map(|e| e.runs)
    }

    /// Run every task due at `now`; returns how many ran
    ///
    /// A task that falls behind runs once and is rescheduled from `now`,
    /// missed runs are not replayed.
    pub fn run_pending(&mut self, now: Instant) -> usize {
        let mut ran = 0;
        for entry in self.entries.iter_mut().filter(|e| e.next_due <= now) {
            entry.next_due = now + entry.interval;
            entry.runs += 1;
            ran += 1;
            if let Err(e) = entry.task.run() {
                tracing::error!(task = entry.task.name(), error = %e, "Scheduled task failed");
            }
        }
        ran
    }

    /// Tick until `shutdown` receives a message or is disconnected
    pub fn run(&mut self, shutdown: &Receiver<()>) {
        let ticker = tick(self.tick);
        tracing::info!(tasks = self.entries.len(), "Scheduler started");

        loop {
            select! {
                recv(ticker) -> _ => {
                    self.run_pending(Instant::now());
                }
                recv(shutdown) -> _ => break,
            }
        }

        tracing::info!("Scheduler stopped");
    }
}
