//! Operation lifecycle
//!
//! An `Operation` is one install or remove of one package. Its state only
//! moves forward:
//!
//! ```text
//! Pending ──start()──▶ Running ──succeed()──▶ Succeeded
//!                         │
//!                         └────fail()───────▶ Failed
//! ```
//!
//! Succeeded and Failed are terminal. A failed operation is never retried;
//! retrying means issuing a fresh request.

use crate::types::Action;
use strum::Display;
use thiserror::Error;

/// Identifier of an operation within one session
pub type OperationId = u64;

/// Lifecycle state of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum OperationState {
    /// Created, worker not started yet
    Pending,
    /// Package manager command running
    Running,
    /// Command finished successfully (terminal)
    Succeeded,
    /// Command failed or could not be started (terminal)
    Failed,
}

impl OperationState {
    /// Returns true if this is a terminal state (Succeeded or Failed)
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Errors that can occur during state transitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OperationTransitionError {
    /// Attempted to leave a terminal state
    #[error("Cannot transition from terminal state {from}")]
    FromTerminalState { from: OperationState },

    /// Attempted a transition the lifecycle does not allow
    #[error("Cannot transition from {from} to {to}")]
    InvalidTransition {
        from: OperationState,
        to: OperationState,
    },
}

/// Terminal outcome reported by the executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationResult {
    Succeeded(String),
    Failed(String),
}

impl OperationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Succeeded(message) | Self::Failed(message) => message,
        }
    }
}

/// Secondary report of the post-removal cleanup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub success: bool,
    pub message: String,
}

/// One install or remove action and its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    id: OperationId,
    target: String,
    action: Action,
    state: OperationState,
    message: Option<String>,
    progress: Vec<String>,
    cleanup: Option<CleanupReport>,
}

impl Operation {
    /// Create a new operation in the Pending state.
    pub fn new(id: OperationId, target: impl Into<String>, action: Action) -> Self {
        Self {
            id,
            target: target.into(),
            action,
            state: OperationState::Pending,
            message: None,
            progress: Vec::new(),
            cleanup: None,
        }
    }

    #[inline]
    pub fn id(&self) -> OperationId {
        self.id
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    #[inline]
    pub fn action(&self) -> Action {
        self.action
    }

    #[inline]
    pub fn state(&self) -> OperationState {
        self.state
    }

    /// Result or error text once terminal
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Progress lines in the order they were reported
    pub fn progress(&self) -> &[String] {
        &self.progress
    }

    pub fn cleanup(&self) -> Option<&CleanupReport> {
        self.cleanup.as_ref()
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Pending → Running
    pub fn start(&mut self) -> Result<(), OperationTransitionError> {
        self.transition(OperationState::Running)
    }

    /// Running → Succeeded
    pub fn succeed(&mut self, message: impl Into<String>) -> Result<(), OperationTransitionError> {
        self.transition(OperationState::Succeeded)?;
        self.message = Some(message.into());
        Ok(())
    }

    /// Running → Failed
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), OperationTransitionError> {
        self.transition(OperationState::Failed)?;
        self.message = Some(message.into());
        Ok(())
    }

    /// Apply an executor result.
    pub fn finish(&mut self, result: &OperationResult) -> Result<(), OperationTransitionError> {
        match result {
            OperationResult::Succeeded(message) => self.succeed(message.clone()),
            OperationResult::Failed(message) => self.fail(message.clone()),
        }
    }

    pub fn record_progress(&mut self, line: impl Into<String>) {
        self.progress.push(line.into());
    }

    /// Attach the cleanup report. Never changes the terminal state.
    pub fn record_cleanup(&mut self, report: CleanupReport) {
        self.cleanup = Some(report);
    }

    fn transition(&mut self, to: OperationState) -> Result<(), OperationTransitionError> {
        if self.state.is_terminal() {
            return Err(OperationTransitionError::FromTerminalState { from: self.state });
        }

        let allowed = matches!(
            (self.state, to),
            (OperationState::Pending, OperationState::Running)
                | (OperationState::Running, OperationState::Succeeded)
                | (OperationState::Running, OperationState::Failed)
        );
        if !allowed {
            return Err(OperationTransitionError::InvalidTransition {
                from: self.state,
                to,
            });
        }

        self.state = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_operation_is_pending() {
        let op = Operation::new(1, "nvidia-driver", Action::Install);
        assert_eq!(op.state(), OperationState::Pending);
        assert!(op.message().is_none());
        assert!(!op.is_terminal());
    }

    #[test]
    fn test_success_path() {
        let mut op = Operation::new(1, "nvidia-driver", Action::Install);
        op.start().unwrap();
        op.record_progress("Installing nvidia-driver...");
        op.succeed("Successfully installed nvidia-driver").unwrap();

        assert_eq!(op.state(), OperationState::Succeeded);
        assert_eq!(op.message(), Some("Successfully installed nvidia-driver"));
        assert_eq!(op.progress(), ["Installing nvidia-driver..."]);
    }

    #[test]
    fn test_cannot_skip_running() {
        let mut op = Operation::new(1, "cups", Action::Remove);
        assert_eq!(
            op.succeed("done"),
            Err(OperationTransitionError::InvalidTransition {
                from: OperationState::Pending,
                to: OperationState::Succeeded,
            })
        );
        assert!(op.fail("nope").is_err());
        assert_eq!(op.state(), OperationState::Pending);
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut op = Operation::new(1, "cups", Action::Remove);
        op.start().unwrap();
        op.fail("Error: E: dpkg was interrupted").unwrap();

        assert_eq!(
            op.start(),
            Err(OperationTransitionError::FromTerminalState {
                from: OperationState::Failed
            })
        );
        assert!(op.succeed("late").is_err());
        assert_eq!(op.message(), Some("Error: E: dpkg was interrupted"));
    }

    #[test]
    fn test_cleanup_does_not_change_state() {
        let mut op = Operation::new(1, "cups", Action::Remove);
        op.start().unwrap();
        op.finish(&OperationResult::Succeeded("Successfully removed cups".into()))
            .unwrap();
        op.record_cleanup(CleanupReport {
            success: false,
            message: "Error during autoremove: lock held".into(),
        });

        assert_eq!(op.state(), OperationState::Succeeded);
        assert!(!op.cleanup().unwrap().success);
    }

    #[test]
    fn test_result_accessors() {
        let ok = OperationResult::Succeeded("yes".into());
        let err = OperationResult::Failed("no".into());
        assert!(ok.is_success());
        assert!(!err.is_success());
        assert_eq!(err.message(), "no");
    }

    #[test]
    fn test_transition_error_display() {
        let err = OperationTransitionError::FromTerminalState {
            from: OperationState::Succeeded,
        };
        assert_eq!(err.to_string(), "Cannot transition from terminal state Succeeded");
        assert_eq!(OperationState::Running.to_string(), "Running");
    }
}
