//! Process registry and supervision API - actor-based orchestration.
//!
//! This module follows an actor-style design:
//! - A single event loop owns the registry and all per-entry state
//! - Message enums represent commands to the supervisor and event
//!   notifications from worker tasks
//! - The `Supervisor` handle provides the public API by sending commands
//!   over a channel
//! - Capture, exit-monitor, and timer tasks never touch shared state;
//!   they report back on the event channel, tagged with the entry index
//!   and spawn generation
//!
//! ## Actor Lifecycle
//!
//! The actor runs until every `Supervisor` handle is dropped. At that
//! point it requests a graceful stop of every live worker and exits once
//! all exit notices and grace timers have drained, so no child outlives
//! its supervisor unsupervised.
//!
//! ## Registry Semantics
//!
//! The registry is append-only: `start` always pushes a new entry, names
//! are not required to be unique, and by-name operations fan out to every
//! match. Entries are never removed; "stopped" is a state, so a stopped
//! entry can be relaunched later by name.

mod actor;
mod commands;
mod handle;
mod types;

#[cfg(test)]
mod tests;

// Re-export public types only
pub use handle::Supervisor;
pub use types::{ExitReport, ProcessSnapshot, SupervisorConfig};

// Private imports for this module (used by Supervisor::new)
use actor::SupervisorActor;
use commands::SupervisorCommand;
use tokio::sync::mpsc;

impl Supervisor {
    /// Supervisor with the built-in handler table and the default grace
    /// period.
    ///
    /// Must be called from within a Tokio runtime; the actor task is
    /// spawned immediately.
    pub fn new() -> Self {
        Self::with_config(SupervisorConfig::default())
    }

    /// Supervisor with an explicit handler table and grace period.
    pub fn with_config(config: SupervisorConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel::<SupervisorCommand>(32);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let actor = SupervisorActor::new(config, event_tx);
        tokio::spawn(actor.run(cmd_rx, event_rx));

        Supervisor { cmd_tx }
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}
