//! Lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// State of a worker lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Settings and logger set; nothing started yet.
    Created,
    /// Heartbeat and signal watcher active.
    Running,
    /// A termination request arrived; tearing down.
    ShuttingDown,
    /// Teardown finished. Final.
    Terminated,
}

impl LifecycleState {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: LifecycleState) -> bool {
        use LifecycleState::*;

        matches!(
            (self, target),
            (Created, Running) | (Running, ShuttingDown) | (ShuttingDown, Terminated)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::ShuttingDown => "shutting_down",
            Self::Terminated => "terminated",
        };
        write!(f, "{s}")
    }
}

/// A state transition event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: LifecycleState,
    pub to: LifecycleState,
    pub timestamp: DateTime<Utc>,
}

/// Current state plus the history that led to it.
#[derive(Debug, Clone, Serialize)]
pub struct StateTracker {
    state: LifecycleState,
    transitions: Vec<StateTransition>,
}

impl StateTracker {
    pub fn new() -> Self {
        Self {
            state: LifecycleState::Created,
            transitions: Vec::new(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn transitions(&self) -> &[StateTransition] {
        &self.transitions
    }

    pub fn transition_to(&mut self, new_state: LifecycleState) -> Result<(), String> {
        if !self.state.can_transition_to(new_state) {
            return Err(format!(
                "Cannot transition from {} to {}",
                self.state, new_state
            ));
        }

        self.transitions.push(StateTransition {
            from: self.state,
            to: new_state,
            timestamp: Utc::now(),
        });
        self.state = new_state;
        Ok(())
    }
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions_valid() {
        assert!(LifecycleState::Created.can_transition_to(LifecycleState::Running));
        assert!(LifecycleState::Running.can_transition_to(LifecycleState::ShuttingDown));
        assert!(LifecycleState::ShuttingDown.can_transition_to(LifecycleState::Terminated));
    }

    #[test]
    fn skipping_and_reversing_invalid() {
        assert!(!LifecycleState::Created.can_transition_to(LifecycleState::ShuttingDown));
        assert!(!LifecycleState::Running.can_transition_to(LifecycleState::Terminated));
        assert!(!LifecycleState::Terminated.can_transition_to(LifecycleState::Running));
        assert!(!LifecycleState::Terminated.can_transition_to(LifecycleState::Created));
    }

    #[test]
    fn only_terminated_is_terminal() {
        assert!(LifecycleState::Terminated.is_terminal());
        assert!(!LifecycleState::ShuttingDown.is_terminal());
        assert!(!LifecycleState::Created.is_terminal());
    }

    #[test]
    fn tracker_records_history() {
        let mut tracker = StateTracker::new();
        tracker.transition_to(LifecycleState::Running).unwrap();
        tracker.transition_to(LifecycleState::ShuttingDown).unwrap();
        tracker.transition_to(LifecycleState::Terminated).unwrap();
        assert!(tracker.transition_to(LifecycleState::Running).is_err());

        let path: Vec<_> = tracker.transitions().iter().map(|t| t.to).collect();
        assert_eq!(
            path,
            vec![
                LifecycleState::Running,
                LifecycleState::ShuttingDown,
                LifecycleState::Terminated
            ]
        );
    }

    #[test]
    fn state_serde() {
        let json = serde_json::to_string(&LifecycleState::ShuttingDown).unwrap();
        assert_eq!(json, "\"shutting_down\"");
        assert_eq!(LifecycleState::ShuttingDown.to_string(), "shutting_down");
    }
}
