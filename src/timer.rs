//! Wake-ups for the once-per-second interactive redraw.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::engine::EngineMessage;
use crate::mailbox::Mailbox;

pub const INTERACTIVE_UPDATE_RATE_MS: i64 = 1000;

/// Delay until the next whole second, in `(0, 1000]` ms.
pub fn tick_delay(now_millis: i64) -> i64 {
    INTERACTIVE_UPDATE_RATE_MS - now_millis.rem_euclid(INTERACTIVE_UPDATE_RATE_MS)
}

/// Schedules at most one pending wake-up.
pub trait TimerHost: Send {
    /// Replace any pending wake-up with one that fires after `delay` carrying
    /// `generation`.
    fn schedule(&mut self, delay: Duration, generation: u64);
    fn cancel(&mut self);
}

/// Sleeps on a tokio task, then posts `EngineMessage::Tick`.
pub struct TokioTimerHost {
    runtime: Handle,
    mailbox: Arc<dyn Mailbox>,
    pending: Option<JoinHandle<()>>,
}

impl TokioTimerHost {
    pub fn new(runtime: Handle, mailbox: Arc<dyn Mailbox>) -> Self {
        Self {
            runtime,
            mailbox,
            pending: None,
        }
    }
}

impl TimerHost for TokioTimerHost {
    fn schedule(&mut self, delay: Duration, generation: u64) {
        self.cancel();
        let mailbox = Arc::clone(&self.mailbox);
        self.pending = Some(self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if !mailbox.post(EngineMessage::Tick { generation }) {
                debug!(target: "scheduler", generation, "tick dropped, engine gone");
            }
        }));
    }

    fn cancel(&mut self) {
        if let Some(task) = self.pending.take() {
            task.abort();
        }
    }
}

impl Drop for TokioTimerHost {
    fn drop(&mut self) {
        self.cancel();
    }
}

// ---------------------------------------------------------------------------
// RecordingTimerHost
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerCall {
    Schedule { delay: Duration, generation: u64 },
    Cancel,
}

/// Timer host that never fires; it only records calls. Clones share the log,
/// so a test can keep one and hand the other to the engine.
#[derive(Debug, Clone, Default)]
pub struct RecordingTimerHost {
    calls: Arc<Mutex<Vec<TimerCall>>>,
}

impl RecordingTimerHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<TimerCall> {
        self.log().clone()
    }

    pub fn clear(&self) {
        self.log().clear();
    }

    pub fn schedule_count(&self) -> usize {
        self.log()
            .iter()
            .filter(|c| matches!(c, TimerCall::Schedule { .. }))
            .count()
    }

    /// Generation of the wake-up still pending, if any.
    pub fn pending(&self) -> Option<u64> {
        match self.log().last() {
            Some(TimerCall::Schedule { generation, .. }) => Some(*generation),
            _ => None,
        }
    }

    fn log(&self) -> MutexGuard<'_, Vec<TimerCall>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TimerHost for RecordingTimerHost {
    fn schedule(&mut self, delay: Duration, generation: u64) {
        self.log().push(TimerCall::Schedule { delay, generation });
    }

    fn cancel(&mut self) {
        self.log().push(TimerCall::Cancel);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn delay_lands_on_whole_seconds() {
        for now in [0_i64, 1, 499, 999, 1_000, 1_001, 1_792_152_000_123, -1, -999] {
            let delay = tick_delay(now);
            assert!((1..=1000).contains(&delay), "now={now} delay={delay}");
            assert_eq!((now + delay).rem_euclid(1000), 0, "now={now}");
        }
        assert_eq!(tick_delay(0), 1000);
        assert_eq!(tick_delay(1_250), 750);
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_tick_posts_its_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel::<EngineMessage>();
        let mut host = TokioTimerHost::new(Handle::current(), Arc::new(tx));
        host.schedule(Duration::from_millis(750), 7);
        tokio::time::sleep(Duration::from_millis(800)).await;
        match rx.try_recv() {
            Ok(EngineMessage::Tick { generation }) => assert_eq!(generation, 7),
            other => panic!("expected tick, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_and_replaced_ticks_never_fire() {
        let (tx, mut rx) = mpsc::unbounded_channel::<EngineMessage>();
        let mut host = TokioTimerHost::new(Handle::current(), Arc::new(tx));
        host.schedule(Duration::from_millis(100), 1);
        host.schedule(Duration::from_millis(100), 2);
        tokio::time::sleep(Duration::from_millis(200)).await;
        host.cancel();
        host.schedule(Duration::from_millis(100), 3);
        host.cancel();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let mut seen = Vec::new();
        while let Ok(EngineMessage::Tick { generation }) = rx.try_recv() {
            seen.push(generation);
        }
        assert_eq!(seen, vec![2]);
    }
}
