//! Error types for the shepherd supervisor.
//!
//! All supervisor failures are local and recoverable: they are reported to
//! the caller through results or reporter channels, and none of them bring
//! the supervisor itself down.

use thiserror::Error;

/// Result type alias for supervisor operations.
pub type ProcessResult<T> = std::result::Result<T, ProcessError>;

/// Error taxonomy for process supervision.
///
/// Each variant carries enough context to identify the affected entry.
/// Runtime outcomes of a worker (clean exit, crash, kill) are not errors;
/// they travel on the exit-report channel instead.
#[derive(Error, Debug, Clone)]
pub enum ProcessError {
    /// The process spec was missing or incomplete; nothing was registered.
    #[error("Invalid process spec: {reason}")]
    Validation { reason: String },

    /// The script's extension maps to no known spawn strategy; nothing
    /// was registered.
    #[error("Don't know how to start {script}")]
    UnsupportedScript { script: String },

    /// The OS failed to create the process. The entry stays registered
    /// and remains eligible for restart scheduling.
    #[error("Process spawn failed: {id} - {reason}")]
    SpawnFailed { id: String, reason: String },

    /// Stop was requested for an entry with no live process.
    #[error("No process to stop: {id}")]
    NotRunning { id: String },

    /// The supervisor actor is gone (all handles dropped or the actor
    /// dropped a response).
    #[error("Supervisor unavailable: {context}")]
    ChannelClosed { context: String },
}

impl ProcessError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    pub fn unsupported_script(script: impl Into<String>) -> Self {
        Self::UnsupportedScript {
            script: script.into(),
        }
    }

    pub fn spawn_failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn not_running(id: impl Into<String>) -> Self {
        Self::NotRunning { id: id.into() }
    }

    pub fn channel_closed(context: impl Into<String>) -> Self {
        Self::ChannelClosed {
            context: context.into(),
        }
    }
}
