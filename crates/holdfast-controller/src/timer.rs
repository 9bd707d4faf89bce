//! One-shot timers that report back through the orchestrator's queue.
//!
//! A firing timer never touches orchestrator state itself; it only sends a
//! [`TimerFired`] message. Each arm bumps the timer's generation, so a
//! message from an earlier arming (or one that raced a cancel) is
//! recognised as stale and ignored.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Which timer fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Caps how long the actuators may stay energized in one cycle.
    Safety,

    /// Re-arms the prop after it has been unlocked for a while.
    AutoRestart,
}

/// Message sent when a timer elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub kind: TimerKind,
    pub generation: u64,
}

/// Cancellable, re-armable one-shot timer.
///
/// # Examples
///
/// ```
/// use holdfast_controller::timer::{OneShotTimer, TimerKind};
/// use std::time::Duration;
/// use tokio::sync::mpsc;
///
/// # #[tokio::main(flavor = "current_thread", start_paused = true)] async fn main() {
/// let (tx, mut rx) = mpsc::unbounded_channel();
/// let mut timer = OneShotTimer::new(TimerKind::Safety, tx);
///
/// timer.cancel(); // not armed: no-op
/// timer.arm(Duration::from_secs(5));
///
/// let fired = rx.recv().await.unwrap();
/// assert!(timer.take_if_current(&fired));
/// assert!(!timer.is_armed());
/// # }
/// ```
#[derive(Debug)]
pub struct OneShotTimer {
    kind: TimerKind,
    events: mpsc::UnboundedSender<TimerFired>,
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl OneShotTimer {
    pub fn new(kind: TimerKind, events: mpsc::UnboundedSender<TimerFired>) -> Self {
        Self {
            kind,
            events,
            generation: 0,
            task: None,
        }
    }

    pub fn kind(&self) -> TimerKind {
        self.kind
    }

    pub fn is_armed(&self) -> bool {
        self.task.is_some()
    }

    /// Start (or restart) the countdown.
    pub fn arm(&mut self, after: Duration) {
        self.cancel();
        self.generation += 1;

        let fired = TimerFired {
            kind: self.kind,
            generation: self.generation,
        };
        let events = self.events.clone();
        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            // Receiver gone means the orchestrator is gone.
            let _ = events.send(fired);
        }));

        debug!(timer = ?self.kind, after_ms = after.as_millis() as u64, "Timer armed");
    }

    /// Stop the countdown. Does nothing if the timer is not armed.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            self.generation += 1;
            debug!(timer = ?self.kind, "Timer cancelled");
        }
    }

    /// Accept `fired` if it belongs to the current arming, disarming the timer.
    ///
    /// Returns `false` for messages from another timer, an earlier arming or
    /// an arming that was cancelled.
    pub fn take_if_current(&mut self, fired: &TimerFired) -> bool {
        let current =
            fired.kind == self.kind && fired.generation == self.generation && self.is_armed();
        if current {
            self.task = None;
        }
        current
    }
}

impl Drop for OneShotTimer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timer(kind: TimerKind) -> (OneShotTimer, mpsc::UnboundedReceiver<TimerFired>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (OneShotTimer::new(kind, tx), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        let (mut timer, mut rx) = timer(TimerKind::Safety);
        let start = tokio::time::Instant::now();
        timer.arm(Duration::from_secs(7200));

        let fired = rx.recv().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(7200));
        assert_eq!(fired.kind, TimerKind::Safety);
        assert!(timer.take_if_current(&fired));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_idempotent() {
        let (mut timer, mut rx) = timer(TimerKind::AutoRestart);
        timer.cancel();
        timer.arm(Duration::from_secs(1));
        timer.cancel();
        timer.cancel();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(rx.try_recv().is_err());
        assert!(!timer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_generation_rejected() {
        let (mut timer, mut rx) = timer(TimerKind::Safety);
        timer.arm(Duration::from_secs(1));

        // Fires, but is re-armed before the message is consumed.
        tokio::time::sleep(Duration::from_secs(2)).await;
        timer.arm(Duration::from_secs(10));

        let stale = rx.recv().await.unwrap();
        assert!(!timer.take_if_current(&stale));
        assert!(timer.is_armed());

        let fresh = rx.recv().await.unwrap();
        assert!(timer.take_if_current(&fresh));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fired_then_cancelled_is_stale() {
        let (mut timer, mut rx) = timer(TimerKind::Safety);
        timer.arm(Duration::from_secs(1));
        tokio::time::sleep(Duration::from_secs(2)).await;
        timer.cancel();

        let fired = rx.recv().await.unwrap();
        assert!(!timer.take_if_current(&fired));
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_kind_rejected() {
        let (mut safety, _rx) = timer(TimerKind::Safety);
        safety.arm(Duration::from_secs(1));
        let foreign = TimerFired {
            kind: TimerKind::AutoRestart,
            generation: 1,
        };
        assert!(!safety.take_if_current(&foreign));
    }
}
