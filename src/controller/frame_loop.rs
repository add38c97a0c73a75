//! Frame loop - cancellable repeating task with statum lifecycle
//!
//! Drives one frame per `poll_interval` on the current thread's [`LocalSet`]. Frames
//! run listener callbacks inline, so nothing here has to be `Send`.
//!
//! # State Machine
//!
//! ```text
//! Idle ──► Running ──► Stopped
//!   (start)      (stop)
//! ```
//!
//! Dropping a `FrameLoop<Running>` cancels the task as well; a loop never outlives
//! its handle.
//!
//! [`LocalSet`]: tokio::task::LocalSet

use crate::controller::poller::PollStats;
use chrono::Local;
use statum::{machine, state};
use std::rc::Rc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info};

/// Runs one frame at the given time and reports the running totals
pub type FrameFn = Rc<dyn Fn(Instant) -> PollStats>;

#[state]
#[derive(Debug, Clone)]
pub enum LoopState {
    Idle,
    Running,
    Stopped,
}

#[machine]
pub struct FrameLoop<S: LoopState> {
    period: Duration,
    frame: FrameFn,
    token: CancellationToken,
    task: Option<JoinHandle<PollStats>>,

    // Cancels the token when a running handle is dropped without stop()
    guard: Option<DropGuard>,

    last_stats: PollStats,
}

impl<S: LoopState> FrameLoop<S> {
    /// Token observed by the spawned task; cancelling it ends the loop
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Totals reported by the most recent frame (updated on stop)
    pub fn last_stats(&self) -> PollStats {
        self.last_stats
    }
}

impl FrameLoop<Idle> {
    pub fn create(period: Duration, frame: FrameFn) -> Self {
        debug!("Creating frame loop with {}ms period", period.as_millis());
        Self::new(
            period,
            frame,
            CancellationToken::new(),
            None,
            None,
            PollStats::default(),
        )
    }

    /// Spawns the loop on the current `LocalSet`
    ///
    /// Panics like `tokio::task::spawn_local` when called outside a `LocalSet`.
    pub fn start(self) -> FrameLoop<Running> {
        info!("Starting frame loop ({}ms)", self.period.as_millis());

        let task = tokio::task::spawn_local(run_frame_loop(
            self.period,
            self.frame.clone(),
            self.token.clone(),
        ));
        let guard = self.token.clone().drop_guard();

        let mut running: FrameLoop<Running> = self.transition();
        running.task = Some(task);
        running.guard = Some(guard);
        running
    }

    /// Moves to `Running` with the token already cancelled and no task spawned
    ///
    /// Safe outside a `LocalSet`; `stop()` returns immediately with empty stats.
    pub fn into_cancelled(self) -> FrameLoop<Running> {
        debug!("Frame loop will not tick");
        self.token.cancel();
        self.transition()
    }
}

impl FrameLoop<Running> {
    /// Requests cancellation without waiting for the task
    ///
    /// No frame starts after this returns.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancels the loop and waits for the task to finish
    pub async fn stop(mut self) -> FrameLoop<Stopped> {
        info!("Stopping frame loop");
        self.token.cancel();
        drop(self.guard.take());

        if let Some(task) = self.task.take() {
            match task.await {
                Ok(stats) => {
                    self.last_stats = stats;
                    info!(
                        "Frame loop stopped after {} frames ({} dispatched, {} failed)",
                        stats.frames, stats.dispatched, stats.failures
                    );
                }
                Err(e) => {
                    error!("Frame loop task failed: {}", e);
                }
            }
        }

        self.transition()
    }
}

impl FrameLoop<Stopped> {}

async fn run_frame_loop(period: Duration, frame: FrameFn, token: CancellationToken) -> PollStats {
    info!("Entering frame loop");

    let mut timer = tokio::time::interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut totals = PollStats::default();
    let mut logged = PollStats::default();
    let mut last_stats_time = Local::now();
    let stats_interval = chrono::Duration::seconds(30);

    loop {
        tokio::select! {
            biased;

            _ = token.cancelled() => {
                debug!("Frame loop cancelled");
                break;
            }

            _ = timer.tick() => {
                totals = frame(tokio::time::Instant::now().into_std());
            }
        }

        let now = Local::now();
        if now - last_stats_time > stats_interval {
            let elapsed_seconds = (now - last_stats_time).num_seconds().max(1);
            let frames = totals.frames.saturating_sub(logged.frames);
            let dispatched = totals.dispatched.saturating_sub(logged.dispatched);
            let failures = totals.failures.saturating_sub(logged.failures);
            info!(
                "Frame loop stats: {} frames, {} dispatched, {} failed in {} seconds",
                frames, dispatched, failures, elapsed_seconds
            );
            info!(
                "Average: {:.2} frames/sec, {:.2} events/sec",
                frames as f64 / elapsed_seconds as f64,
                dispatched as f64 / elapsed_seconds as f64
            );

            logged = totals;
            last_stats_time = now;
        }
    }

    info!("Frame loop finished");
    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tokio::task::LocalSet;

    fn counting_frame() -> (FrameFn, Rc<Cell<u64>>) {
        let frames = Rc::new(Cell::new(0u64));
        let seen = frames.clone();
        let frame: FrameFn = Rc::new(move |_| {
            seen.set(seen.get() + 1);
            PollStats {
                frames: seen.get(),
                ..Default::default()
            }
        });
        (frame, frames)
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn runs_until_stopped() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let (frame, frames) = counting_frame();
                let running = FrameLoop::<Idle>::create(Duration::from_millis(16), frame).start();

                // First tick is immediate, then one per period
                tokio::time::sleep(Duration::from_millis(100)).await;
                let before_stop = frames.get();
                assert!(before_stop >= 6, "only {} frames", before_stop);

                let stopped = running.stop().await;
                assert_eq!(stopped.last_stats().frames, before_stop);

                tokio::time::sleep(Duration::from_millis(100)).await;
                assert_eq!(frames.get(), before_stop);
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn cancel_prevents_further_frames() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let (frame, frames) = counting_frame();
                let running = FrameLoop::<Idle>::create(Duration::from_millis(10), frame).start();
                tokio::time::sleep(Duration::from_millis(35)).await;

                running.cancel();
                let at_cancel = frames.get();
                tokio::time::sleep(Duration::from_millis(100)).await;
                assert_eq!(frames.get(), at_cancel);
                assert!(running.is_cancelled());
            })
            .await;
    }

    #[test]
    fn cancelled_loop_needs_no_local_set() {
        let (frame, frames) = counting_frame();
        let running = FrameLoop::<Idle>::create(Duration::from_millis(10), frame).into_cancelled();
        assert!(running.is_cancelled());
        assert_eq!(frames.get(), 0);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn stopping_a_cancelled_loop_reports_no_frames() {
        let (frame, frames) = counting_frame();
        let running = FrameLoop::<Idle>::create(Duration::from_millis(10), frame).into_cancelled();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let stopped = running.stop().await;
        assert_eq!(stopped.last_stats(), PollStats::default());
        assert_eq!(frames.get(), 0);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn dropping_running_handle_cancels() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let (frame, frames) = counting_frame();
                let running = FrameLoop::<Idle>::create(Duration::from_millis(10), frame).start();
                let token = running.token();
                tokio::time::sleep(Duration::from_millis(25)).await;

                drop(running);
                assert!(token.is_cancelled());
                let at_drop = frames.get();
                tokio::time::sleep(Duration::from_millis(100)).await;
                assert_eq!(frames.get(), at_drop);
            })
            .await;
    }
}
