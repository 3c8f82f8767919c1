//! Worker lifecycle: heartbeat, signal watching and graceful shutdown.
//!
//! Core components:
//! - `heartbeat`: periodic tick source with an explicit, idempotent stop
//! - `signal`: termination request watcher (OS or in-process)
//! - `state`: lifecycle state machine (Created → Running → ShuttingDown → Terminated)
//! - `lifecycle`: ties the above together and drives shutdown

pub mod heartbeat;
pub mod lifecycle;
pub mod signal;
pub mod state;

pub use heartbeat::{HeartbeatTimer, Heartbeats, Tick};
pub use lifecycle::{ShutdownReport, WorkerLifecycle};
pub use signal::{ShutdownHandle, ShutdownSignal, SignalWatcher};
pub use state::{LifecycleState, StateTracker, StateTransition};
