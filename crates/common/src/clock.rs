//! Frame timing utilities for display-refresh driven loops.
//!
//! A compositor draws once per display refresh. This module provides:
//! - A monotonic clock anchored when a frame loop starts
//! - A pacer that turns a refresh rate into an interval
//! - Rolling frame-rate measurement for diagnostics

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Monotonic clock anchored to the moment a frame loop started.
#[derive(Debug, Clone)]
pub struct FrameClock {
    epoch: Instant,

    /// Wall-clock time at epoch (RFC 3339).
    epoch_wall: String,
}

impl FrameClock {
    /// Create a new clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Nanoseconds elapsed since the clock started.
    pub fn elapsed_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    /// Seconds elapsed since the clock started.
    pub fn elapsed_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Wall-clock time at start.
    pub fn epoch_wall(&self) -> &str {
        &self.epoch_wall
    }
}

/// Refresh interval for a target rate.
#[derive(Debug)]
pub struct FramePacer {
    target_interval_ns: u64,
}

impl FramePacer {
    /// Create a pacer targeting the given Hz rate. A rate of zero is treated as 1 Hz.
    pub fn new(target_hz: u32) -> Self {
        Self {
            target_interval_ns: 1_000_000_000 / target_hz.max(1) as u64,
        }
    }

    /// Target interval between refreshes.
    pub fn interval(&self) -> Duration {
        Duration::from_nanos(self.target_interval_ns)
    }
}

/// Rolling measurement of the achieved frame rate.
#[derive(Debug)]
pub struct FrameRateMeter {
    window: usize,
    stamps_ns: VecDeque<u64>,
}

impl FrameRateMeter {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(2),
            stamps_ns: VecDeque::new(),
        }
    }

    /// Record a drawn frame at `now_ns`.
    pub fn record(&mut self, now_ns: u64) {
        if self.stamps_ns.len() == self.window {
            self.stamps_ns.pop_front();
        }
        self.stamps_ns.push_back(now_ns);
    }

    /// Frames per second over the current window, `None` until two frames exist.
    pub fn fps(&self) -> Option<f64> {
        let first = *self.stamps_ns.front()?;
        let last = *self.stamps_ns.back()?;
        if self.stamps_ns.len() < 2 || last <= first {
            return None;
        }
        let span_secs = (last - first) as f64 / 1_000_000_000.0;
        Some((self.stamps_ns.len() - 1) as f64 / span_secs)
    }
}
