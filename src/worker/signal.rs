//! Termination signal watcher.
//!
//! Converts SIGINT/SIGTERM (Ctrl+C and console close on Windows) into a
//! single [`ShutdownSignal`]. Handlers are installed by
//! [`SignalWatcher::register`], so a failure surfaces before the worker starts.
//! [`SignalWatcher::wait`] consumes the watcher, so at most one request is
//! ever observed per watcher.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::LifecycleError;

/// A termination request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Interrupt => "interrupt",
            Self::Terminate => "terminated",
        };
        write!(f, "{s}")
    }
}

enum Source {
    #[cfg(unix)]
    Os {
        interrupt: tokio::signal::unix::Signal,
        terminate: tokio::signal::unix::Signal,
    },
    #[cfg(windows)]
    Console {
        ctrl_c: tokio::signal::windows::CtrlC,
        close: tokio::signal::windows::CtrlClose,
    },
    Manual(mpsc::Receiver<ShutdownSignal>),
}

/// Resolves once, on the first termination request.
pub struct SignalWatcher {
    source: Source,
}

impl SignalWatcher {
    /// Install OS handlers for interrupt and terminate.
    #[cfg(unix)]
    pub fn register() -> Result<Self, LifecycleError> {
        use tokio::signal::unix::{SignalKind, signal};

        let interrupt =
            signal(SignalKind::interrupt()).map_err(|source| LifecycleError::SignalRegistration {
                signal: "SIGINT".to_string(),
                source,
            })?;
        let terminate =
            signal(SignalKind::terminate()).map_err(|source| LifecycleError::SignalRegistration {
                signal: "SIGTERM".to_string(),
                source,
            })?;

        Ok(Self {
            source: Source::Os {
                interrupt,
                terminate,
            },
        })
    }

    /// Install the Ctrl+C and console-close handlers.
    #[cfg(windows)]
    pub fn register() -> Result<Self, LifecycleError> {
        use tokio::signal::windows;

        let ctrl_c = windows::ctrl_c().map_err(|source| LifecycleError::SignalRegistration {
            signal: "CTRL_C".to_string(),
            source,
        })?;
        let close = windows::ctrl_close().map_err(|source| LifecycleError::SignalRegistration {
            signal: "CTRL_CLOSE".to_string(),
            source,
        })?;

        Ok(Self {
            source: Source::Console { ctrl_c, close },
        })
    }

    /// A watcher driven by an in-process [`ShutdownHandle`] instead of the OS.
    pub fn manual() -> (Self, ShutdownHandle) {
        let (tx, rx) = mpsc::channel(1);
        (
            Self {
                source: Source::Manual(rx),
            },
            ShutdownHandle { tx },
        )
    }

    /// Wait for the first termination request.
    pub async fn wait(self) -> ShutdownSignal {
        match self.source {
            #[cfg(unix)]
            Source::Os {
                mut interrupt,
                mut terminate,
            } => {
                tokio::select! {
                    _ = interrupt.recv() => ShutdownSignal::Interrupt,
                    _ = terminate.recv() => ShutdownSignal::Terminate,
                }
            }
            #[cfg(windows)]
            Source::Console {
                mut ctrl_c,
                mut close,
            } => {
                tokio::select! {
                    _ = ctrl_c.recv() => ShutdownSignal::Interrupt,
                    _ = close.recv() => ShutdownSignal::Terminate,
                }
            }
            Source::Manual(mut rx) => match rx.recv().await {
                Some(signal) => signal,
                // Every handle dropped: no request can ever arrive.
                None => std::future::pending().await,
            },
        }
    }
}

/// Requests shutdown from inside the process.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: mpsc::Sender<ShutdownSignal>,
}

impl ShutdownHandle {
    /// Returns `false` if a request is already pending or the watcher is gone.
    pub fn request(&self, signal: ShutdownSignal) -> bool {
        self.tx.try_send(signal).is_ok()
    }
}
