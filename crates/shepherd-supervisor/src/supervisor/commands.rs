//! Internal message protocol for the supervisor actor.
//!
//! Two channels feed the actor: commands from `Supervisor` handles, and
//! worker events from the per-process capture, monitor, and timer tasks.
//! Events are tagged with the entry index and spawn generation so stale
//! notifications from a previous spawn are recognized and dropped. These
//! types are NOT exposed outside the supervisor module.

use super::types::{ExitReport, ProcessSnapshot};
use shepherd_common::{Pid, ProcessResult, StreamKind};
use shepherd_spawn::{ProcessSpec, SpawnStrategy};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Command messages for the supervisor actor.
///
/// External code interacts via `Supervisor` methods.
pub(super) enum SupervisorCommand {
    /// Register and launch a new worker.
    Start {
        spec: ProcessSpec,
        reporter: Option<mpsc::UnboundedSender<ExitReport>>,
        resp: oneshot::Sender<ProcessResult<Pid>>,
    },
    /// Stop-then-relaunch every entry matching the name.
    Restart {
        name: String,
        resp: oneshot::Sender<Vec<ProcessResult<()>>>,
    },
    /// Gracefully stop every entry matching the name.
    Stop {
        name: String,
        resp: oneshot::Sender<Vec<ProcessResult<()>>>,
    },
    /// Gracefully stop every entry with a live process.
    StopAll {
        resp: oneshot::Sender<Vec<(String, ProcessResult<()>)>>,
    },
    /// Register (or replace) the spawn strategy for a script extension.
    RegisterHandler {
        extension: String,
        strategy: Arc<dyn SpawnStrategy>,
        resp: oneshot::Sender<()>,
    },
    /// Snapshot every registry entry.
    Processes {
        resp: oneshot::Sender<Vec<ProcessSnapshot>>,
    },
}

/// Notifications from the per-worker tasks back to the actor.
pub(super) enum WorkerEvent {
    /// A chunk of captured stream data.
    Output {
        entry: usize,
        generation: u64,
        stream: StreamKind,
        chunk: Vec<u8>,
    },
    /// A capture stream reached end-of-file.
    StreamEof {
        entry: usize,
        generation: u64,
        stream: StreamKind,
    },
    /// The monitor task reaped the child.
    Exited {
        entry: usize,
        generation: u64,
        code: Option<i32>,
        signal: Option<i32>,
    },
    /// The graceful-stop grace period elapsed.
    GraceExpired { entry: usize, generation: u64 },
    /// A restart-backoff timer elapsed.
    RestartDue { entry: usize, generation: u64 },
}
