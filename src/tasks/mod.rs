//! Scheduled work.
//!
//! - `task`: the closed set of tasks and what they need to run
//! - `scheduler`: priority queue, concurrency cap and retry policy

pub mod scheduler;
pub mod task;

pub use scheduler::{Backoff, Priority, TaskOutcome, TaskReport, TaskScheduler};
pub use task::{CronJob, Operation, Task, TaskEnv, TaskInput, TaskOutput};
