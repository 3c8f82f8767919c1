//! Task types: the closed set of work the scheduler can run.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::api::{PostId, RemoteApi};
use crate::error::TaskError;
use crate::store::{Database, Record};

/// Collaborators a task may call.
#[derive(Clone)]
pub struct TaskEnv {
    pub api: Arc<dyn RemoteApi>,
    pub db: Arc<dyn Database>,
}

/// Everything `perform` receives for one attempt.
#[derive(Clone)]
pub struct TaskInput {
    pub env: TaskEnv,
    /// Fires when the lifecycle is shutting down.
    pub cancel: CancellationToken,
    /// 1-based attempt number.
    pub attempt: u32,
}

/// What a successful task produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutput {
    Authenticated { handle: String },
    Posted { id: PostId },
    Migrated,
    Inserted { table: String },
}

/// A single call against the collaborators.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Create a session and discard it; verifies credentials.
    Authenticate,
    /// Authenticate, then publish `content`.
    Post { content: String },
    /// Apply pending schema migrations.
    ApplyMigrations,
    /// Store one record.
    Insert { record: Record },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Authenticate => "authenticate",
            Self::Post { .. } => "post",
            Self::ApplyMigrations => "apply_migrations",
            Self::Insert { .. } => "insert",
        }
    }

    /// Run the operation. Cancellation is checked before each remote call;
    /// a call already in flight is not interrupted.
    pub async fn perform(&self, input: &TaskInput) -> Result<TaskOutput, TaskError> {
        let cancelled = || TaskError::Cancelled {
            task: self.name().to_string(),
        };
        if input.cancel.is_cancelled() {
            return Err(cancelled());
        }

        match self {
            Self::Authenticate => {
                let session = input.env.api.authenticate().await?;
                Ok(TaskOutput::Authenticated {
                    handle: session.handle,
                })
            }
            Self::Post { content } => {
                // A failed login ends the attempt here; posting needs a real session.
                let session = input.env.api.authenticate().await?;
                if input.cancel.is_cancelled() {
                    return Err(cancelled());
                }
                let id = input.env.api.post(&session, content).await?;
                Ok(TaskOutput::Posted { id })
            }
            Self::ApplyMigrations => {
                input.env.db.apply_migrations().await?;
                Ok(TaskOutput::Migrated)
            }
            Self::Insert { record } => {
                input.env.db.insert(record).await?;
                Ok(TaskOutput::Inserted {
                    table: record.table.clone(),
                })
            }
        }
    }
}

/// An operation gated on the next fire time of a cron expression.
#[derive(Debug, Clone)]
pub struct CronJob {
    name: String,
    expression: String,
    schedule: cron::Schedule,
    operation: Operation,
}

impl CronJob {
    /// `expression` uses the six/seven field form: `sec min hour dom month dow [year]`.
    pub fn new(
        name: impl Into<String>,
        expression: &str,
        operation: Operation,
    ) -> Result<Self, TaskError> {
        let schedule =
            cron::Schedule::from_str(expression).map_err(|e| TaskError::InvalidSchedule {
                schedule: expression.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            name: name.into(),
            expression: expression.to_string(),
            schedule,
            operation,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn next_fire_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }

    /// Sleep until the next fire time (or cancellation), then run the operation.
    pub async fn perform(&self, input: &TaskInput) -> Result<TaskOutput, TaskError> {
        let next = self
            .next_fire_after(Utc::now())
            .ok_or_else(|| TaskError::InvalidSchedule {
                schedule: self.expression.clone(),
                reason: "no upcoming fire time".to_string(),
            })?;
        let delay = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);

        tokio::select! {
            biased;
            _ = input.cancel.cancelled() => {
                return Err(TaskError::Cancelled { task: self.name.clone() });
            }
            _ = tokio::time::sleep(delay) => {}
        }

        self.operation.perform(input).await
    }
}

/// Unit of work accepted by the scheduler.
#[derive(Debug, Clone)]
pub enum Task {
    Operation(Operation),
    CronJob(CronJob),
}

impl Task {
    pub fn name(&self) -> &str {
        match self {
            Self::Operation(op) => op.name(),
            Self::CronJob(job) => job.name(),
        }
    }

    pub async fn perform(&self, input: &TaskInput) -> Result<TaskOutput, TaskError> {
        match self {
            Self::Operation(op) => op.perform(input).await,
            Self::CronJob(job) => job.perform(input).await,
        }
    }
}

impl From<Operation> for Task {
    fn from(op: Operation) -> Self {
        Self::Operation(op)
    }
}

impl From<CronJob> for Task {
    fn from(job: CronJob) -> Self {
        Self::CronJob(job)
    }
}
