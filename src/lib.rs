//! Synapse: a long-running worker with a heartbeat, graceful shutdown and
//! a bounded task scheduler, logging through a shared leveled logger.

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod logger;
pub mod store;
pub mod tasks;
pub mod worker;

pub use error::{Error, Result};
