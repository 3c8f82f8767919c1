//! Worker lifecycle: startup, steady state and graceful shutdown.
//!
//! `run` walks `Created -> Running -> ShuttingDown -> Terminated` exactly once:
//! - start the heartbeat timer and a forwarder that logs each tick
//! - watch for a termination signal on its own task
//! - optionally drain a [`TaskScheduler`] under a child cancellation token
//! - on the first signal: log it, stop the timer, cancel the context, then
//!   wait for the activities until one shared `shutdown_timeout` deadline

use std::time::Duration;

use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::error::LifecycleError;
use crate::logger::{LogLevel, Logger};
use crate::tasks::{TaskEnv, TaskReport, TaskScheduler};
use crate::worker::heartbeat::{HeartbeatTimer, Heartbeats};
use crate::worker::signal::{ShutdownSignal, SignalWatcher};
use crate::worker::state::{LifecycleState, StateTracker, StateTransition};

/// How long aborted scheduler tasks get to unwind once the deadline passes.
const ABORT_COLLECT_TIMEOUT: Duration = Duration::from_millis(100);

/// Summary handed back once the lifecycle terminates.
#[derive(Debug, Clone)]
pub struct ShutdownReport {
    pub signal: ShutdownSignal,
    /// Heartbeats forwarded to the logger.
    pub heartbeats: u64,
    /// One report per scheduled task, if a scheduler was attached.
    pub tasks: Vec<TaskReport>,
    /// Activities aborted after missing the shutdown deadline.
    pub forced: Vec<String>,
}

/// Owns the heartbeat, the cancellable context and the shutdown path.
pub struct WorkerLifecycle {
    settings: Settings,
    logger: Logger,
    state: StateTracker,
    timer: Option<HeartbeatTimer>,
    cancel: Option<CancellationToken>,
    work: Option<(TaskScheduler, TaskEnv)>,
}

impl WorkerLifecycle {
    pub fn new(settings: Settings, logger: Logger) -> Self {
        Self {
            settings,
            logger,
            state: StateTracker::new(),
            timer: None,
            cancel: None,
            work: None,
        }
    }

    /// Drain `scheduler` while running; its tasks observe shutdown through
    /// a child of the lifecycle's cancellation token.
    pub fn with_scheduler(mut self, scheduler: TaskScheduler, env: TaskEnv) -> Self {
        self.work = Some((scheduler, env));
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn state(&self) -> LifecycleState {
        self.state.state()
    }

    pub fn transitions(&self) -> &[StateTransition] {
        self.state.transitions()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    /// Register OS signal handlers and run until the first termination request.
    pub async fn run(&mut self) -> Result<ShutdownReport, LifecycleError> {
        self.ensure_created()?;
        let watcher = SignalWatcher::register()?;
        self.run_with(watcher).await
    }

    /// Run until `watcher` resolves.
    pub async fn run_with(
        &mut self,
        watcher: SignalWatcher,
    ) -> Result<ShutdownReport, LifecycleError> {
        self.ensure_created()?;

        // Created -> Running
        let mut timer = HeartbeatTimer::new(self.settings.heartbeat_interval())?;
        let beats = timer.start()?;
        let cancel = CancellationToken::new();
        let abort = CancellationToken::new();
        self.timer = Some(timer);
        self.cancel = Some(cancel.clone());
        // If this future is dropped mid-run, everything it spawned still stops.
        let _cancel_on_drop = cancel.clone().drop_guard();
        let _abort_on_drop = abort.clone().drop_guard();
        self.transition(LifecycleState::Running);

        self.logger.note(
            LogLevel::Info,
            "worker started",
            &[
                ("heartbeat_secs", &self.settings.heartbeat_interval_secs),
                ("retries", &self.settings.max_retries),
                ("processes", &self.settings.max_processes),
            ],
        );

        let forwarder = tokio::spawn(forward_heartbeats(
            beats,
            self.logger.clone(),
            cancel.clone(),
        ));
        let watching = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    signal = watcher.wait() => Some(signal),
                }
            })
        };
        let work = self.work.take().map(|(mut scheduler, env)| {
            let token = cancel.child_token();
            let deadline = abort.clone().cancelled_owned();
            tokio::spawn(async move { scheduler.run_until(env, token, deadline).await })
        });

        let signal = match watching.await {
            Ok(Some(signal)) => signal,
            Ok(None) => ShutdownSignal::Terminate,
            Err(e) => {
                self.logger.note(
                    LogLevel::Critical,
                    "signal watcher failed, shutting down",
                    &[("error", &e)],
                );
                ShutdownSignal::Terminate
            }
        };

        // Running -> ShuttingDown
        self.transition(LifecycleState::ShuttingDown);
        self.logger
            .note(LogLevel::Info, "received signal", &[("signal", &signal)]);

        if let Some(timer) = self.timer.as_mut() {
            timer.stop().await;
        }
        self.logger.note(LogLevel::Debug, "heartbeat stopped", &[]);

        cancel.cancel();
        self.logger.note(LogLevel::Debug, "context cancelled", &[]);

        // One deadline shared by every activity.
        let deadline = Instant::now() + self.settings.shutdown_timeout();
        let mut forced = Vec::new();
        let heartbeats = self
            .join_by(deadline, "heartbeat forwarder", forwarder, &mut forced)
            .await
            .unwrap_or(0);
        let tasks = match work {
            Some(handle) => {
                self.join_scheduler(deadline, handle, &abort, &mut forced)
                    .await
            }
            None => Vec::new(),
        };

        // ShuttingDown -> Terminated
        self.transition(LifecycleState::Terminated);
        self.logger.note(
            LogLevel::Info,
            "worker terminated",
            &[("heartbeats", &heartbeats), ("tasks", &tasks.len())],
        );

        Ok(ShutdownReport {
            signal,
            heartbeats,
            tasks,
            forced,
        })
    }

    fn ensure_created(&self) -> Result<(), LifecycleError> {
        match self.state.state() {
            LifecycleState::Created => Ok(()),
            state => Err(LifecycleError::AlreadyRun {
                state: state.to_string(),
            }),
        }
    }

    fn transition(&mut self, to: LifecycleState) {
        // The run sequence only ever moves forward one step at a time.
        if let Err(reason) = self.state.transition_to(to) {
            self.logger
                .note(LogLevel::Critical, "invalid lifecycle transition", &[("reason", &reason)]);
        }
    }

    /// Wait for `handle` until `deadline`, aborting it if the deadline passes.
    async fn join_by<T>(
        &self,
        deadline: Instant,
        activity: &str,
        mut handle: JoinHandle<T>,
        forced: &mut Vec<String>,
    ) -> Option<T> {
        match tokio::time::timeout_at(deadline, &mut handle).await {
            Ok(joined) => self.joined(activity, joined),
            Err(_) => {
                handle.abort();
                self.record_forced(activity, forced);
                None
            }
        }
    }

    /// Wait for the scheduler until `deadline`. Past it, the scheduler aborts
    /// its in-flight tasks and still reports them, as cancelled.
    async fn join_scheduler(
        &self,
        deadline: Instant,
        mut handle: JoinHandle<Vec<TaskReport>>,
        abort: &CancellationToken,
        forced: &mut Vec<String>,
    ) -> Vec<TaskReport> {
        const ACTIVITY: &str = "task scheduler";

        let joined = match tokio::time::timeout_at(deadline, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                abort.cancel();
                self.record_forced(ACTIVITY, forced);
                match tokio::time::timeout(ABORT_COLLECT_TIMEOUT, &mut handle).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        handle.abort();
                        self.logger.note(
                            LogLevel::Error,
                            "task scheduler did not release its tasks",
                            &[("timeout_ms", &ABORT_COLLECT_TIMEOUT.as_millis())],
                        );
                        return Vec::new();
                    }
                }
            }
        };
        self.joined(ACTIVITY, joined).unwrap_or_default()
    }

    fn joined<T>(&self, activity: &str, joined: Result<T, JoinError>) -> Option<T> {
        match joined {
            Ok(value) => Some(value),
            Err(e) => {
                self.logger.note(
                    LogLevel::Error,
                    "activity ended abnormally",
                    &[("activity", &activity), ("error", &e)],
                );
                None
            }
        }
    }

    fn record_forced(&self, activity: &str, forced: &mut Vec<String>) {
        let err = LifecycleError::ShutdownTimeout {
            activity: activity.to_string(),
            timeout: self.settings.shutdown_timeout(),
        };
        self.logger
            .note(LogLevel::Warn, "activity aborted", &[("error", &err)]);
        forced.push(activity.to_string());
    }
}

async fn forward_heartbeats(
    mut beats: Heartbeats,
    logger: Logger,
    cancel: CancellationToken,
) -> u64 {
    let mut forwarded = 0;
    loop {
        let tick = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            tick = beats.next() => tick,
        };
        let Some(tick) = tick else { break };
        forwarded += 1;
        logger.note(
            LogLevel::Info,
            "heartbeat",
            &[
                ("seq", &tick.seq),
                ("at", &tick.at.format("%Y-%m-%d %H:%M:%S")),
            ],
        );
    }
    forwarded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::{BufferSink, SharedSink};
    use crate::worker::signal::ShutdownHandle;

    fn lifecycle(level: LogLevel) -> (WorkerLifecycle, BufferSink) {
        let buf = BufferSink::new();
        let logger = Logger::new(SharedSink::new(buf.clone()), level);
        let settings = Settings {
            heartbeat_interval_secs: 1,
            ..Default::default()
        };
        (WorkerLifecycle::new(settings, logger), buf)
    }

    async fn signal_after(handle: ShutdownHandle, after: Duration) {
        tokio::time::sleep(after).await;
        assert!(handle.request(ShutdownSignal::Terminate));
    }

    #[tokio::test(start_paused = true)]
    async fn runs_until_signal() {
        let (mut worker, buf) = lifecycle(LogLevel::Info);
        let (watcher, handle) = SignalWatcher::manual();
        assert_eq!(worker.state(), LifecycleState::Created);

        let (report, ()) = tokio::join!(
            worker.run_with(watcher),
            signal_after(handle, Duration::from_millis(3500))
        );
        let report = report.unwrap();

        assert_eq!(report.signal, ShutdownSignal::Terminate);
        assert_eq!(report.heartbeats, 3);
        assert!(report.forced.is_empty());
        assert_eq!(worker.state(), LifecycleState::Terminated);
        assert!(worker.is_cancelled());

        let out = buf.contents();
        assert_eq!(out.matches("heartbeat seq:").count(), 3);
        assert!(out.contains("received signal signal: terminated"));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_steps_are_ordered() {
        let (mut worker, buf) = lifecycle(LogLevel::Debug);
        let (watcher, handle) = SignalWatcher::manual();

        let (report, ()) = tokio::join!(
            worker.run_with(watcher),
            signal_after(handle, Duration::from_millis(1500))
        );
        report.unwrap();

        let lines = buf.lines();
        let position = |needle: &str| {
            lines
                .iter()
                .position(|l| l.contains(needle))
                .unwrap_or_else(|| panic!("missing '{needle}' in {lines:#?}"))
        };
        let received = position("received signal");
        let stopped = position("heartbeat stopped");
        let cancelled = position("context cancelled");
        let terminated = position("worker terminated");
        assert!(received < stopped && stopped < cancelled && cancelled < terminated);

        // Nothing from the heartbeat after it was stopped.
        assert!(!lines[stopped..].iter().any(|l| l.contains("heartbeat seq:")));
    }

    #[tokio::test(start_paused = true)]
    async fn cannot_run_twice() {
        let (mut worker, _buf) = lifecycle(LogLevel::Info);
        let (watcher, handle) = SignalWatcher::manual();
        handle.request(ShutdownSignal::Interrupt);
        let report = worker.run_with(watcher).await.unwrap();
        assert_eq!(report.signal, ShutdownSignal::Interrupt);
        assert_eq!(report.heartbeats, 0);

        let (watcher, _handle) = SignalWatcher::manual();
        let err = worker.run_with(watcher).await.unwrap_err();
        assert!(matches!(err, LifecycleError::AlreadyRun { state } if state == "terminated"));

        let states: Vec<_> = worker.transitions().iter().map(|t| t.to).collect();
        assert_eq!(
            states,
            vec![
                LifecycleState::Running,
                LifecycleState::ShuttingDown,
                LifecycleState::Terminated
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_run_stops_what_it_started() {
        let (mut worker, buf) = lifecycle(LogLevel::Info);
        let (watcher, handle) = SignalWatcher::manual();

        let run = tokio::time::timeout(Duration::from_millis(1500), worker.run_with(watcher));
        assert!(run.await.is_err(), "run should still be waiting for a signal");

        assert!(worker.is_cancelled());
        // Let the spawned watcher and forwarder observe cancellation.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!handle.request(ShutdownSignal::Terminate), "watcher still running");

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(buf.contents().matches("heartbeat seq:").count(), 1);
    }

    #[tokio::test]
    async fn zero_interval_fails_startup() {
        let logger = Logger::new(SharedSink::new(BufferSink::new()), LogLevel::Info);
        let settings = Settings {
            heartbeat_interval_secs: 0,
            ..Default::default()
        };
        let mut worker = WorkerLifecycle::new(settings, logger);
        let (watcher, _handle) = SignalWatcher::manual();

        let err = worker.run_with(watcher).await.unwrap_err();
        assert!(matches!(err, LifecycleError::TimerStart { .. }));
        assert_eq!(worker.state(), LifecycleState::Created);
    }
}
