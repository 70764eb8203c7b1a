//! Operator control state shared between the tick loop and its callers.
//!
//! All control fields are atomics so a paused or stopped flag can be set
//! from any task without waiting for the tick in progress. The loop only
//! observes them between ticks: a tick that has started always runs to
//! completion.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

/// Lifecycle state of a [`TickScheduler`](crate::TickScheduler).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerStatus {
    /// Created or reset, loop not started.
    Idle,
    /// Loop active.
    Running,
    /// Loop suspended between ticks.
    Paused,
    /// Stopped by the operator or an end condition.
    Stopped,
    /// An integrity error was detected. No further ticks are accepted.
    Halted,
}

/// Why the tick loop returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationEndReason {
    /// Reached the configured `max_ticks` limit.
    MaxTicksReached,
    /// An operator issued a stop command.
    OperatorStop,
    /// All agents are dead.
    Extinction,
    /// An integrity error halted the stream.
    Halted,
}

/// Shared control flags.
#[derive(Debug, Default)]
pub struct OperatorState {
    running: AtomicBool,
    paused: AtomicBool,
    stop_requested: AtomicBool,
    halted: AtomicBool,
    /// Wakes the loop on resume, stop, or interval change.
    wake: Notify,
}

impl OperatorState {
    /// Fresh, idle state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Derived lifecycle status. Halted wins over everything else.
    pub fn status(&self) -> SchedulerStatus {
        if self.halted.load(Ordering::Acquire) {
            SchedulerStatus::Halted
        } else if self.stop_requested.load(Ordering::Acquire) {
            SchedulerStatus::Stopped
        } else if self.paused.load(Ordering::Acquire) {
            SchedulerStatus::Paused
        } else if self.running.load(Ordering::Acquire) {
            SchedulerStatus::Running
        } else {
            SchedulerStatus::Idle
        }
    }

    // -----------------------------------------------------------------------
    // Pause / Resume
    // -----------------------------------------------------------------------

    /// Whether ticks are suspended.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Suspend ticking after the current tick.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    /// Resume ticking and wake the loop.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
        self.wake.notify_waiters();
    }

    /// Wait until not paused, or until a stop is requested.
    pub async fn wait_if_paused(&self) {
        while self.is_paused() && !self.is_stop_requested() {
            let woken = self.wake.notified();
            if !self.is_paused() || self.is_stop_requested() {
                break;
            }
            woken.await;
        }
    }

    // -----------------------------------------------------------------------
    // Stop
    // -----------------------------------------------------------------------

    /// Request a clean stop after the current tick.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.wake.notify_waiters();
    }

    /// Whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Whether an integrity error has stopped the simulation.
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// Refuse further ticks.
    pub(crate) fn halt(&self) {
        self.halted.store(true, Ordering::Release);
        self.wake.notify_waiters();
    }

    /// Mark the loop as active or not.
    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    /// Withdraw a stop so the loop can run again.
    pub(crate) fn clear_stop(&self) {
        self.stop_requested.store(false, Ordering::Release);
    }

    /// Back to idle: clears pause, stop, and halt.
    pub(crate) fn clear(&self) {
        self.running.store(false, Ordering::Release);
        self.paused.store(false, Ordering::Release);
        self.stop_requested.store(false, Ordering::Release);
        self.halted.store(false, Ordering::Release);
    }

    /// Wake a sleeping loop so it re-reads the tick interval.
    pub(crate) fn nudge(&self) {
        self.wake.notify_waiters();
    }

    /// Sleep for `duration` or until woken.
    pub(crate) async fn sleep(&self, duration: std::time::Duration) {
        let woken = self.wake.notified();
        tokio::select! {
            () = tokio::time::sleep(duration) => {}
            () = woken => {}
        }
    }
}
