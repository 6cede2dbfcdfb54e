//! Render scheduler: decides when the once-per-second timer runs.
//!
//! The timer runs only while the face is visible and interactive. Every
//! re-evaluation cancels the pending wake-up first, so at most one is ever
//! outstanding. Each armed wake-up carries a generation number; a tick whose
//! generation is not the armed one is stale and ignored.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use crate::clock::Clock;
use crate::timer::{TimerHost, tick_delay};

pub fn timer_should_run(visible: bool, ambient: bool) -> bool {
    visible && !ambient
}

pub struct RenderScheduler {
    visible: bool,
    generation: u64,
    armed: Option<u64>,
    timer: Box<dyn TimerHost>,
    clock: Arc<dyn Clock>,
}

impl RenderScheduler {
    pub fn new(timer: Box<dyn TimerHost>, clock: Arc<dyn Clock>) -> Self {
        Self {
            visible: false,
            generation: 0,
            armed: None,
            timer,
            clock,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// Generation of the outstanding wake-up, if one is armed.
    pub fn armed(&self) -> Option<u64> {
        self.armed
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Cancel any pending wake-up, then arm a fresh one if the timer should
    /// run.
    pub fn update_timer(&mut self, ambient: bool) {
        self.timer.cancel();
        self.armed = None;
        if timer_should_run(self.visible, ambient) {
            self.arm();
        }
    }

    /// Handle a wake-up. Returns `true` when the tick is current and a frame
    /// is due.
    pub fn on_tick(&mut self, generation: u64, ambient: bool) -> bool {
        if self.armed != Some(generation) {
            trace!(target: "scheduler", generation, armed = ?self.armed, "stale tick ignored");
            return false;
        }
        self.armed = None;
        if timer_should_run(self.visible, ambient) {
            self.arm();
        }
        true
    }

    /// Cancel the timer for good; every later tick is stale.
    pub fn shutdown(&mut self) {
        self.timer.cancel();
        self.armed = None;
        self.visible = false;
    }

    fn arm(&mut self) {
        self.generation += 1;
        let delay = tick_delay(self.clock.now_millis());
        self.armed = Some(self.generation);
        debug!(target: "scheduler", generation = self.generation, delay_ms = delay, "timer armed");
        self.timer
            .schedule(Duration::from_millis(delay.unsigned_abs()), self.generation);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::timer::{RecordingTimerHost, TimerCall};

    fn scheduler(now: i64) -> (RenderScheduler, RecordingTimerHost, Arc<ManualClock>) {
        let timer = RecordingTimerHost::new();
        let clock = Arc::new(ManualClock::new(now));
        let sched = RenderScheduler::new(Box::new(timer.clone()), clock.clone());
        (sched, timer, clock)
    }

    #[test]
    fn timer_runs_only_when_visible_and_interactive() {
        assert!(timer_should_run(true, false));
        assert!(!timer_should_run(true, true));
        assert!(!timer_should_run(false, false));
        assert!(!timer_should_run(false, true));
    }

    #[test]
    fn becoming_visible_arms_one_aligned_wake_up() {
        let (mut sched, timer, _) = scheduler(10_250);
        sched.set_visible(true);
        sched.update_timer(false);
        assert_eq!(
            timer.calls(),
            vec![
                TimerCall::Cancel,
                TimerCall::Schedule {
                    delay: Duration::from_millis(750),
                    generation: 1
                }
            ]
        );
        assert_eq!(sched.armed(), Some(1));
    }

    #[test]
    fn repeated_evaluation_keeps_a_single_outstanding_wake_up() {
        let (mut sched, timer, _) = scheduler(0);
        sched.set_visible(true);
        for _ in 0..5 {
            sched.update_timer(false);
        }
        // Each schedule is preceded by a cancel of the previous one.
        let calls = timer.calls();
        for pair in calls.chunks(2) {
            assert_eq!(pair[0], TimerCall::Cancel);
            assert!(matches!(pair[1], TimerCall::Schedule { .. }));
        }
        assert_eq!(sched.armed(), Some(5));
        assert_eq!(timer.pending(), Some(5));
    }

    #[test]
    fn ambient_or_hidden_cancels_without_rearming() {
        let (mut sched, timer, _) = scheduler(0);
        sched.set_visible(true);
        sched.update_timer(false);
        timer.clear();

        sched.update_timer(true);
        assert_eq!(timer.calls(), vec![TimerCall::Cancel]);
        assert_eq!(sched.armed(), None);

        sched.update_timer(false);
        sched.set_visible(false);
        timer.clear();
        sched.update_timer(false);
        assert_eq!(timer.calls(), vec![TimerCall::Cancel]);
        assert_eq!(timer.pending(), None);
    }

    #[test]
    fn current_tick_rearms_and_stale_tick_is_ignored() {
        let (mut sched, timer, clock) = scheduler(0);
        sched.set_visible(true);
        sched.update_timer(false);
        let first = sched.armed().expect("armed");

        clock.set(1_004);
        assert!(sched.on_tick(first, false));
        let second = sched.armed().expect("re-armed");
        assert_ne!(first, second);
        assert_eq!(
            timer.calls().last(),
            Some(&TimerCall::Schedule {
                delay: Duration::from_millis(996),
                generation: second
            })
        );

        assert!(!sched.on_tick(first, false));
        assert_eq!(sched.armed(), Some(second));
    }

    #[test]
    fn ticks_after_cancel_or_shutdown_are_stale() {
        let (mut sched, timer, _) = scheduler(0);
        sched.set_visible(true);
        sched.update_timer(false);
        let armed = sched.armed().expect("armed");
        sched.update_timer(true);
        assert!(!sched.on_tick(armed, true));

        sched.update_timer(false);
        let armed = sched.armed().expect("armed");
        sched.shutdown();
        assert!(!sched.on_tick(armed, false));
        assert_eq!(timer.calls().last(), Some(&TimerCall::Cancel));
    }
}
