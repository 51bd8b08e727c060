//! Error types for the MBT bridge
//!
//! Domain errors use thiserror; failures from user-supplied model code are
//! carried as anyhow payloads and collapsed to status messages at the
//! dispatcher boundary.

use std::io;
use thiserror::Error;

/// Failure raised by user-supplied model, role, or action code.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The action is deliberately unsupported by the model. The engine treats
    /// this as expected rather than as a defect.
    #[error("not implemented")]
    NotImplemented,

    /// Any other failure from user code or internal resolution (missing role,
    /// unregistered action).
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl ActionError {
    /// Build a generic execution failure from a message.
    pub fn failed(message: impl Into<String>) -> Self {
        ActionError::Failed(anyhow::anyhow!(message.into()))
    }
}

/// Convenience result alias for user-facing model and action code.
pub type ActionResult<T> = std::result::Result<T, ActionError>;

/// Errors surfaced by the runner lifecycle manager.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The engine binary could not be started at all.
    #[error("failed to start engine '{binary}': {source}")]
    Spawn {
        /// Binary the runner attempted to execute.
        binary: String,
        /// Underlying spawn error.
        #[source]
        source: io::Error,
    },

    /// The engine exited with a nonzero code.
    #[error("engine exited with code {0}")]
    EngineExit(i32),

    /// The engine was terminated by a signal before exiting.
    #[error("engine terminated by signal {0}")]
    EngineSignal(i32),

    /// I/O failure while standing up or driving the endpoint.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Convenience result alias for runner operations.
pub type RunnerResult<T> = std::result::Result<T, RunnerError>;
