//! Peak-hold window aggregation
//!
//! The aggregator holds the loudest level seen in the current window along
//! with the weather captured when that level was recorded. The window is
//! closed cooperatively: the sampling loop calls [`WindowAggregator::poll`]
//! once per iteration and receives a [`ClosedWindow`] when the configured
//! duration has elapsed.

use crate::enrichment::{fetch_or_default, Conditions, EnrichmentProvider};
use crate::PEAK_FLOOR_DB;
use std::time::{Duration, Instant};

/// State of the open window
#[derive(Debug, Clone)]
pub struct Window {
    pub started_at: Instant,
    /// Running maximum, never decreases within the window
    pub peak_db: f64,
    /// Conditions captured when `peak_db` was last raised
    pub snapshot: Conditions,
}

impl Window {
    fn open(now: Instant) -> Self {
        Self {
            started_at: now,
            peak_db: PEAK_FLOOR_DB,
            snapshot: Conditions::default(),
        }
    }
}

/// What remains of a window after it closed
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedWindow {
    pub peak_db: f64,
    pub conditions: Conditions,
    /// Actual elapsed time, at least the configured duration
    pub duration: Duration,
}

/// Peak-hold aggregator over fixed time windows
pub struct WindowAggregator {
    duration: Duration,
    window: Window,
    enrichment: Box<dyn EnrichmentProvider>,
    enrichment_calls: u64,
}

impl WindowAggregator {
    /// Create an aggregator whose first window opens at `now`
    pub fn new(duration: Duration, enrichment: Box<dyn EnrichmentProvider>, now: Instant) -> Self {
        Self {
            duration,
            window: Window::open(now),
            enrichment,
            enrichment_calls: 0,
        }
    }

    /// Feed one sample; returns true when it raised the peak
    ///
    /// A new peak triggers a synchronous enrichment lookup whose result
    /// replaces the window's snapshot. Failed lookups store empty conditions.
    pub fn observe(&mut self, level_db: f64) -> bool {
        // NaN readings are dropped
        if level_db <= self.window.peak_db || level_db.is_nan() {
            return false;
        }

        self.window.peak_db = level_db;
        self.enrichment_calls += 1;
        self.window.snapshot = fetch_or_default(self.enrichment.as_mut());
        true
    }

    /// Close the window if its duration has elapsed at `now`
    ///
    /// The next window starts at `now` with the peak reset to the floor.
    pub fn poll(&mut self, now: Instant) -> Option<ClosedWindow> {
        let elapsed = now.saturating_duration_since(self.window.started_at);
        if elapsed < self.duration {
            return None;
        }

        let finished = std::mem::replace(&mut self.window, Window::open(now));
        Some(ClosedWindow {
            peak_db: finished.peak_db,
            conditions: finished.snapshot,
            duration: elapsed,
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn peak_db(&self) -> f64 {
        self.window.peak_db
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Number of enrichment lookups since creation
    pub fn enrichment_calls(&self) -> u64 {
        self.enrichment_calls
    }
}
