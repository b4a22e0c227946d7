//! executor.rs - Runs one install/remove operation on a background thread.
//!
//! The worker streams `OperationEvent`s back over an mpsc channel so the
//! session (and whatever front end drives it) stays responsive while apt-get
//! runs. Event order for one operation is fixed:
//!
//! ```text
//! Progress* → Terminal → [CleanupStarted → Cleanup]   (cleanup only after a successful Remove)
//! ```
//!
//! The worker owns the only `Sender`; the channel disconnects when it is done.

use crate::backend::{PackageBackend, PackageCommand};
use crate::operation::{CleanupReport, OperationId, OperationResult};
use crate::types::Action;
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

/// A request to run one package manager action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRequest {
    pub id: OperationId,
    pub target: String,
    pub action: Action,
}

/// Notification emitted by a running operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationEvent {
    /// Human-readable progress line
    Progress { id: OperationId, line: String },
    /// Exactly one per operation
    Terminal {
        id: OperationId,
        result: OperationResult,
    },
    /// Autoremove is about to run
    CleanupStarted { id: OperationId },
    /// Secondary cleanup result; never changes the terminal result
    Cleanup {
        id: OperationId,
        report: CleanupReport,
    },
}

impl OperationEvent {
    pub fn id(&self) -> OperationId {
        match self {
            Self::Progress { id, .. }
            | Self::Terminal { id, .. }
            | Self::CleanupStarted { id }
            | Self::Cleanup { id, .. } => *id,
        }
    }
}

/// Run `request` to completion on the calling thread, passing every event to
/// `emit` in order.
pub fn execute(
    backend: &dyn PackageBackend,
    request: &OperationRequest,
    emit: &mut dyn FnMut(OperationEvent),
) {
    let id = request.id;
    let target = request.target.as_str();

    emit(OperationEvent::Progress {
        id,
        line: format!("{} {}...", request.action.progressive(), target),
    });

    let command = PackageCommand::for_action(request.action, target);
    let outcome = backend.run(&command, &mut |line| {
        emit(OperationEvent::Progress {
            id,
            line: line.to_string(),
        })
    });

    let result = match outcome {
        Ok(output) if output.success => OperationResult::Succeeded(format!(
            "Successfully {} {}",
            request.action.past_tense(),
            target
        )),
        Ok(output) => OperationResult::Failed(format!("Error: {}", output.diagnostic())),
        Err(e) => OperationResult::Failed(format!("Error: {}", e)),
    };

    let succeeded = result.is_success();
    if succeeded {
        info!("{}", result.message());
    } else {
        warn!("{} {} failed: {}", request.action, target, result.message().trim());
    }
    emit(OperationEvent::Terminal { id, result });

    if succeeded && request.action == Action::Remove {
        emit(OperationEvent::CleanupStarted { id });
        let report = run_cleanup(backend);
        emit(OperationEvent::Cleanup { id, report });
    }
}

/// Autoremove after a successful removal. Failures become a report, not an error.
fn run_cleanup(backend: &dyn PackageBackend) -> CleanupReport {
    match backend.run(&PackageCommand::Autoremove, &mut |line| {
        debug!("[autoremove] {}", line)
    }) {
        Ok(output) if output.success => {
            let message = output.stdout.trim();
            CleanupReport {
                success: true,
                message: if message.is_empty() {
                    "Unused dependencies removed".to_string()
                } else {
                    message.to_string()
                },
            }
        }
        Ok(output) => CleanupReport {
            success: false,
            message: format!("Error during autoremove: {}", output.diagnostic()),
        },
        Err(e) => CleanupReport {
            success: false,
            message: format!("Error during autoremove: {}", e),
        },
    }
}

/// Spawns a dedicated thread running `request` and sending its events on `events`.
pub fn spawn_operation(
    backend: Arc<dyn PackageBackend>,
    request: OperationRequest,
    events: Sender<OperationEvent>,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name(format!("drivermgr-op-{}", request.id))
        .spawn(move || {
            debug!("Operation worker {} started: {:?}", request.id, request);
            let mut receiver_gone = false;
            execute(backend.as_ref(), &request, &mut |event| {
                if !receiver_gone && events.send(event).is_err() {
                    // Keep running: apt must not be abandoned midway
                    error!("Failed to send operation event. Receiver probably dropped.");
                    receiver_gone = true;
                }
            });
            debug!("Operation worker {} finished", request.id);
        })
}
