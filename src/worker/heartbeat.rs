//! Heartbeat timer: periodic liveness ticks with an explicit stop.
//!
//! The emitter task owns the underlying `tokio::time::Interval`. Ticks travel
//! over a capacity-1 channel to a [`Heartbeats`] receiver. Both the emitter and
//! the receiver race every step against the stop token with a biased select,
//! so once stop is issued no further tick is handed out.

use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::LifecycleError;

/// A single heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// 1-based sequence number.
    pub seq: u64,
    /// Wall-clock time the tick fired.
    pub at: DateTime<Local>,
}

enum TimerState {
    Idle,
    Running {
        stop: CancellationToken,
        handle: JoinHandle<()>,
    },
    Stopped,
}

/// Periodic tick source. Single use: once stopped it cannot be restarted.
pub struct HeartbeatTimer {
    interval: Duration,
    state: TimerState,
}

impl HeartbeatTimer {
    pub fn new(interval: Duration) -> Result<Self, LifecycleError> {
        if interval.is_zero() {
            return Err(LifecycleError::TimerStart {
                reason: "heartbeat interval must be non-zero".to_string(),
            });
        }
        Ok(Self {
            interval,
            state: TimerState::Idle,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, TimerState::Running { .. })
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self.state, TimerState::Stopped)
    }

    /// Begin emitting ticks. The first tick arrives one interval from now.
    pub fn start(&mut self) -> Result<Heartbeats, LifecycleError> {
        match self.state {
            TimerState::Idle => {}
            TimerState::Running { .. } => {
                return Err(LifecycleError::TimerStart {
                    reason: "timer already running".to_string(),
                });
            }
            TimerState::Stopped => {
                return Err(LifecycleError::TimerStart {
                    reason: "timer was stopped; create a new one".to_string(),
                });
            }
        }

        let stop = CancellationToken::new();
        let (tx, rx) = mpsc::channel(1);
        let handle = tokio::spawn(emit(self.interval, tx, stop.clone()));

        self.state = TimerState::Running {
            stop: stop.clone(),
            handle,
        };
        Ok(Heartbeats { rx, stop })
    }

    /// Stop emitting and wait for the emitter to release its timer.
    ///
    /// Returns `true` if this call performed the stop; later calls are no-ops.
    pub async fn stop(&mut self) -> bool {
        match std::mem::replace(&mut self.state, TimerState::Stopped) {
            TimerState::Running { stop, handle } => {
                stop.cancel();
                // The emitter exits at its next select; a join error only
                // means it panicked, and it is gone either way.
                let _ = handle.await;
                true
            }
            TimerState::Idle | TimerState::Stopped => false,
        }
    }
}

impl Drop for HeartbeatTimer {
    fn drop(&mut self) {
        if let TimerState::Running { stop, handle } = &self.state {
            stop.cancel();
            handle.abort();
        }
    }
}

async fn emit(period: Duration, tx: mpsc::Sender<Tick>, stop: CancellationToken) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut seq = 0;

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => return,
            _ = ticker.tick() => {}
        }

        seq += 1;
        let tick = Tick {
            seq,
            at: Local::now(),
        };

        tokio::select! {
            biased;
            _ = stop.cancelled() => return,
            sent = tx.send(tick) => {
                if sent.is_err() {
                    return;
                }
            }
        }
    }
}

/// Receiving end of a running [`HeartbeatTimer`].
pub struct Heartbeats {
    rx: mpsc::Receiver<Tick>,
    stop: CancellationToken,
}

impl Heartbeats {
    /// Next tick, or `None` once the timer has been stopped.
    ///
    /// Stop takes priority over a tick that is already buffered.
    pub async fn next(&mut self) -> Option<Tick> {
        tokio::select! {
            biased;
            _ = self.stop.cancelled() => None,
            tick = self.rx.recv() => tick,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }
}
