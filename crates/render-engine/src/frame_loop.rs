//! Display-refresh driven draw loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use director_common::clock::{FrameClock, FramePacer, FrameRateMeter};
use director_common::config::CompositorDefaults;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};

use crate::compositor::{FrameStats, WeakCompositor};

/// Source of display refresh callbacks.
#[async_trait::async_trait]
pub trait RefreshSignal: Send {
    /// Wait for the next refresh. `false` means no more refreshes will come.
    async fn next_refresh(&mut self) -> bool;
}

/// Timer-based refresh at a fixed rate, for hosts without a vsync signal.
pub struct IntervalSignal {
    interval: Interval,
}

impl IntervalSignal {
    pub fn new(rate_hz: u32) -> Self {
        let mut interval = tokio::time::interval(FramePacer::new(rate_hz).interval());
        // A slow frame delays the next one instead of bursting to catch up.
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }

    pub fn from_config(defaults: &CompositorDefaults) -> Self {
        Self::new(defaults.refresh_rate_hz)
    }
}

#[async_trait::async_trait]
impl RefreshSignal for IntervalSignal {
    async fn next_refresh(&mut self) -> bool {
        self.interval.tick().await;
        true
    }
}

/// Refreshes pushed by the host through a [`RefreshTrigger`].
pub struct ChannelSignal {
    rx: mpsc::Receiver<()>,
}

/// Sending half of a [`ChannelSignal`].
#[derive(Clone)]
pub struct RefreshTrigger {
    tx: mpsc::Sender<()>,
}

impl ChannelSignal {
    pub fn pair() -> (RefreshTrigger, ChannelSignal) {
        // One pending refresh is enough; extra ticks while drawing are dropped.
        let (tx, rx) = mpsc::channel(1);
        (RefreshTrigger { tx }, ChannelSignal { rx })
    }
}

impl RefreshTrigger {
    /// Request a refresh. Returns `false` once the loop is gone.
    pub fn refresh(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => true,
            Err(mpsc::error::TrySendError::Closed(())) => false,
        }
    }

    /// Request a refresh, waiting for room in the queue.
    pub async fn refresh_and_wait(&self) -> bool {
        self.tx.send(()).await.is_ok()
    }
}

#[async_trait::async_trait]
impl RefreshSignal for ChannelSignal {
    async fn next_refresh(&mut self) -> bool {
        self.rx.recv().await.is_some()
    }
}

/// Counters kept by a running loop.
#[derive(Debug, Clone, Default)]
pub struct LoopStats {
    pub frames: u64,
    pub last_frame: FrameStats,
    pub fps: Option<f64>,
}

/// A spawned task that draws one frame per refresh.
///
/// Holds the compositor weakly: dropping the last compositor handle ends
/// the loop. Stopping or dropping the loop cancels the task.
pub struct FrameLoop {
    stop: Arc<AtomicBool>,
    stats: Arc<Mutex<LoopStats>>,
    task: JoinHandle<()>,
}

impl FrameLoop {
    pub fn spawn(compositor: WeakCompositor, mut signal: Box<dyn RefreshSignal>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(Mutex::new(LoopStats::default()));

        let task = {
            let stop = Arc::clone(&stop);
            let stats = Arc::clone(&stats);
            tokio::spawn(async move {
                let clock = FrameClock::start();
                let mut meter = FrameRateMeter::new(120);
                tracing::debug!(started_at = clock.epoch_wall(), "Frame loop started");

                while !stop.load(Ordering::SeqCst) {
                    if !signal.next_refresh().await {
                        tracing::debug!("Refresh signal closed");
                        break;
                    }
                    if stop.load(Ordering::SeqCst) {
                        break;
                    }
                    let Some(compositor) = compositor.upgrade() else {
                        break;
                    };
                    let frame = compositor.render_frame();
                    drop(compositor);

                    meter.record(clock.elapsed_ns());
                    let mut stats = stats.lock();
                    stats.frames += 1;
                    stats.last_frame = frame;
                    stats.fps = meter.fps();
                }
                tracing::debug!(
                    frames = stats.lock().frames,
                    elapsed_secs = clock.elapsed_secs(),
                    "Frame loop ended"
                );
            })
        };

        Self { stop, stats, task }
    }

    /// Stop drawing. No frame starts after this returns.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn stats(&self) -> LoopStats {
        self.stats.lock().clone()
    }
}

impl Drop for FrameLoop {
    fn drop(&mut self) {
        self.stop();
    }
}
