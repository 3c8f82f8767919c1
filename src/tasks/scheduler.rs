//! Task scheduler: ordered queue, bounded concurrency, retries.
//!
//! Dispatch order is priority first, then enqueue order. A semaphore with
//! `max_processes` permits gates how many tasks run at once; a task only
//! leaves the queue once it holds a permit. Every task that entered the queue
//! comes back as exactly one [`TaskReport`]. That includes tasks that never
//! ran because shutdown began, and tasks that panicked or were aborted.

use std::cmp;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::{self, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::Settings;
use crate::error::TaskError;
use crate::logger::{LogLevel, Logger};
use crate::tasks::task::{Task, TaskEnv, TaskInput, TaskOutput};

/// Declared urgency. Tasks enqueued without one are `Normal`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

/// Delay between a failed attempt and the next one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Backoff {
    #[default]
    None,
    Fixed(Duration),
    /// `base * 2^(retry - 1)`, capped at `max`.
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    /// Delay before retry number `retry` (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        match *self {
            Self::None => Duration::ZERO,
            Self::Fixed(d) => d,
            Self::Exponential { base, max } => {
                let factor = 2u32.saturating_pow(retry.saturating_sub(1));
                base.saturating_mul(factor).min(max)
            }
        }
    }
}

/// Final result of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded(TaskOutput),
    /// Retries exhausted or the error was not retryable.
    Failed { error: String },
    /// Shutdown began before the task could finish.
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct TaskReport {
    pub id: Uuid,
    pub name: String,
    pub priority: Priority,
    /// Attempts actually started; zero if the task never left the queue.
    pub attempts: u32,
    pub outcome: TaskOutcome,
}

struct Queued {
    seq: u64,
    id: Uuid,
    priority: Priority,
    task: Task,
}

impl Queued {
    fn report(&self, attempts: u32, outcome: TaskOutcome) -> TaskReport {
        TaskReport {
            id: self.id,
            name: self.task.name().to_string(),
            priority: self.priority,
            attempts,
            outcome,
        }
    }
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == cmp::Ordering::Equal
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    // BinaryHeap pops the greatest: higher priority, then lower sequence.
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Per-run values every spawned task needs.
#[derive(Clone)]
struct RunContext {
    env: TaskEnv,
    cancel: CancellationToken,
    logger: Logger,
    backoff: Backoff,
    max_retries: u32,
}

/// Queue of pending tasks plus the limits they run under.
pub struct TaskScheduler {
    settings: Settings,
    logger: Logger,
    backoff: Backoff,
    queue: BinaryHeap<Queued>,
    next_seq: u64,
}

impl TaskScheduler {
    pub fn new(settings: Settings, logger: Logger) -> Self {
        Self {
            settings,
            logger,
            backoff: Backoff::None,
            queue: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn enqueue(&mut self, task: impl Into<Task>) -> Uuid {
        self.enqueue_with_priority(task, Priority::Normal)
    }

    pub fn enqueue_with_priority(&mut self, task: impl Into<Task>, priority: Priority) -> Uuid {
        let id = Uuid::new_v4();
        self.next_seq += 1;
        self.queue.push(Queued {
            seq: self.next_seq,
            id,
            priority,
            task: task.into(),
        });
        id
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Run queued tasks until the queue is empty or `cancel` fires.
    ///
    /// After cancellation, in-flight tasks get `shutdown_timeout` to finish;
    /// any still running then are aborted and reported as cancelled.
    /// Returns one report per task, in completion order.
    pub async fn run(&mut self, env: TaskEnv, cancel: CancellationToken) -> Vec<TaskReport> {
        let grace = self.settings.shutdown_timeout();
        let deadline = {
            let cancel = cancel.clone();
            async move {
                cancel.cancelled().await;
                tokio::time::sleep(grace).await;
            }
        };
        self.run_until(env, cancel, deadline).await
    }

    /// Like [`run`](Self::run), but in-flight tasks are aborted when
    /// `deadline` resolves.
    pub async fn run_until(
        &mut self,
        env: TaskEnv,
        cancel: CancellationToken,
        deadline: impl Future<Output = ()>,
    ) -> Vec<TaskReport> {
        let permits = Arc::new(Semaphore::new(self.settings.max_processes.max(1) as usize));
        let ctx = RunContext {
            env,
            cancel: cancel.clone(),
            logger: self.logger.clone(),
            backoff: self.backoff,
            max_retries: self.settings.max_retries,
        };
        let mut running = JoinSet::new();
        let mut spawned: HashMap<task::Id, Spawned> = HashMap::new();
        let mut reports = Vec::with_capacity(self.queue.len());

        self.logger.note(
            LogLevel::Debug,
            "scheduler started",
            &[
                ("queued", &self.queue.len()),
                ("max_processes", &self.settings.max_processes),
            ],
        );

        while let Some(next) = self.queue.pop() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = Arc::clone(&permits).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                self.queue.push(next);
                break;
            };

            let attempts = Arc::new(AtomicU32::new(0));
            let entry = Spawned {
                id: next.id,
                name: next.task.name().to_string(),
                priority: next.priority,
                attempts: Arc::clone(&attempts),
            };
            let ctx = ctx.clone();
            let handle = running.spawn(async move {
                let report = execute(next, ctx, attempts).await;
                drop(permit);
                report
            });
            spawned.insert(handle.id(), entry);
        }

        // Anything still queued was never started.
        while let Some(skipped) = self.queue.pop() {
            self.logger.note(
                LogLevel::Warn,
                "task cancelled before start",
                &[("task", &skipped.task.name()), ("id", &skipped.id)],
            );
            reports.push(skipped.report(0, TaskOutcome::Cancelled));
        }

        let mut deadline = std::pin::pin!(deadline);
        let mut aborted = false;
        loop {
            let joined = tokio::select! {
                biased;
                joined = running.join_next_with_id() => joined,
                _ = deadline.as_mut(), if !aborted => {
                    aborted = true;
                    self.logger.note(
                        LogLevel::Warn,
                        "shutdown deadline reached, aborting tasks",
                        &[("running", &running.len())],
                    );
                    running.abort_all();
                    continue;
                }
            };
            let Some(joined) = joined else { break };

            match joined {
                Ok((id, report)) => {
                    spawned.remove(&id);
                    reports.push(report);
                }
                Err(e) => match spawned.remove(&e.id()) {
                    Some(entry) => reports.push(self.lost(entry, &e)),
                    None => self.logger.note(
                        LogLevel::Critical,
                        "untracked task ended abnormally",
                        &[("error", &e)],
                    ),
                },
            }
        }

        reports
    }

    /// Report for a task that panicked or was aborted before returning.
    fn lost(&self, entry: Spawned, error: &JoinError) -> TaskReport {
        let outcome = if error.is_panic() {
            self.logger.note(
                LogLevel::Critical,
                "task panicked",
                &[("task", &entry.name), ("id", &entry.id), ("error", error)],
            );
            TaskOutcome::Failed {
                error: format!("panicked: {error}"),
            }
        } else {
            self.logger.note(
                LogLevel::Warn,
                "task aborted",
                &[("task", &entry.name), ("id", &entry.id)],
            );
            TaskOutcome::Cancelled
        };
        TaskReport {
            id: entry.id,
            name: entry.name,
            priority: entry.priority,
            attempts: entry.attempts.load(Ordering::SeqCst),
            outcome,
        }
    }
}

/// Identity of a running task, kept so a panic or abort still yields a report.
struct Spawned {
    id: Uuid,
    name: String,
    priority: Priority,
    attempts: Arc<AtomicU32>,
}

async fn execute(job: Queued, ctx: RunContext, attempts: Arc<AtomicU32>) -> TaskReport {
    let name = job.task.name().to_string();
    let max_attempts = ctx.max_retries.saturating_add(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        attempts.store(attempt, Ordering::SeqCst);
        tracing::debug!(task = %name, id = %job.id, attempt, "Starting task attempt");

        let input = TaskInput {
            env: ctx.env.clone(),
            cancel: ctx.cancel.clone(),
            attempt,
        };

        let error = match job.task.perform(&input).await {
            Ok(output) => {
                ctx.logger.note(
                    LogLevel::Info,
                    "task succeeded",
                    &[("task", &name), ("attempts", &attempt)],
                );
                return job.report(attempt, TaskOutcome::Succeeded(output));
            }
            Err(TaskError::Cancelled { .. }) => {
                ctx.logger.note(
                    LogLevel::Warn,
                    "task cancelled",
                    &[("task", &name), ("attempts", &attempt)],
                );
                return job.report(attempt, TaskOutcome::Cancelled);
            }
            Err(e) => e,
        };

        if !error.is_retryable() || attempt >= max_attempts {
            ctx.logger.note(
                LogLevel::Error,
                "task permanently failed",
                &[("task", &name), ("attempts", &attempt), ("error", &error)],
            );
            return job.report(
                attempt,
                TaskOutcome::Failed {
                    error: error.to_string(),
                },
            );
        }

        let delay = ctx.backoff.delay(attempt);
        ctx.logger.note(
            LogLevel::Warn,
            "task attempt failed, retrying",
            &[
                ("task", &name),
                ("attempt", &attempt),
                ("retry_in_ms", &delay.as_millis()),
                ("error", &error),
            ],
        );

        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => {
                return job.report(attempt, TaskOutcome::Cancelled);
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::{BufferSink, SharedSink};
    use crate::tasks::task::Operation;

    fn scheduler() -> TaskScheduler {
        let logger = Logger::new(SharedSink::new(BufferSink::new()), LogLevel::Debug);
        TaskScheduler::new(Settings::default(), logger)
    }

    #[test]
    fn pops_by_priority_then_fifo() {
        let mut s = scheduler();
        let a = s.enqueue(Operation::Authenticate);
        let b = s.enqueue_with_priority(Operation::ApplyMigrations, Priority::Low);
        let c = s.enqueue(Operation::Authenticate);
        let d = s.enqueue_with_priority(Operation::Authenticate, Priority::High);

        let order: Vec<Uuid> = std::iter::from_fn(|| s.queue.pop().map(|q| q.id)).collect();
        assert_eq!(order, vec![d, a, c, b]);
    }

    #[test]
    fn backoff_delays() {
        assert_eq!(Backoff::None.delay(3), Duration::ZERO);
        assert_eq!(
            Backoff::Fixed(Duration::from_millis(250)).delay(7),
            Duration::from_millis(250)
        );

        let exp = Backoff::Exponential {
            base: Duration::from_millis(100),
            max: Duration::from_secs(1),
        };
        assert_eq!(exp.delay(1), Duration::from_millis(100));
        assert_eq!(exp.delay(2), Duration::from_millis(200));
        assert_eq!(exp.delay(4), Duration::from_millis(800));
        assert_eq!(exp.delay(5), Duration::from_secs(1));
        assert_eq!(exp.delay(64), Duration::from_secs(1));
    }

    #[test]
    fn len_tracks_queue() {
        let mut s = scheduler();
        assert!(s.is_empty());
        s.enqueue(Operation::Authenticate);
        s.enqueue(Operation::ApplyMigrations);
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn default_priority_is_normal() {
        assert_eq!(Priority::default(), Priority::Normal);
        assert!(Priority::High > Priority::Normal && Priority::Normal > Priority::Low);
    }
}
