//! Supervisor handle - public API for interacting with the supervisor.
//!
//! This module contains the `Supervisor` struct, a lightweight handle
//! that can be cloned and shared across tasks. All methods send commands
//! to the internal actor and await responses.

use super::commands::SupervisorCommand;
use super::types::{ExitReport, ProcessSnapshot};
use shepherd_common::{Pid, ProcessError, ProcessResult};
use shepherd_spawn::{ProcessSpec, SpawnStrategy};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Cloneable handle to a supervisor actor.
///
/// The actor (and with it every supervised worker) is stopped gracefully
/// once the last handle is dropped.
#[derive(Clone)]
pub struct Supervisor {
    pub(super) cmd_tx: mpsc::Sender<SupervisorCommand>,
}

impl Supervisor {
    // -------------------------------------------------------------------------
    // Error Mapping Helpers
    // -------------------------------------------------------------------------

    /// Map a channel send error to a ProcessError.
    fn map_send_err(context: &str) -> ProcessError {
        ProcessError::channel_closed(format!("{}: actor unavailable (channel closed)", context))
    }

    /// Map a oneshot receive error to a ProcessError.
    fn map_recv_err(context: &str) -> ProcessError {
        ProcessError::channel_closed(format!("{}: actor dropped response", context))
    }

    // -------------------------------------------------------------------------
    // Lifecycle Methods
    // -------------------------------------------------------------------------

    /// Register and launch a worker, returning its process id.
    ///
    /// Terminal outcomes of the worker are logged with the process name;
    /// use [`Supervisor::start_reported`] to receive them on a channel
    /// instead.
    ///
    /// # Errors
    /// - `ProcessError::Validation` if the spec names neither a script
    ///   nor a working directory, or no script could be resolved
    /// - `ProcessError::UnsupportedScript` if no strategy is registered
    ///   for the script's extension (nothing is registered)
    /// - `ProcessError::SpawnFailed` if the OS rejected the spawn; the
    ///   entry stays registered and remains eligible for restarts
    pub async fn start(&self, spec: ProcessSpec) -> ProcessResult<Pid> {
        self.start_with(spec, None).await
    }

    /// Like [`Supervisor::start`], but terminal outcomes ([`ExitReport`])
    /// are delivered on the given channel, one per distinct termination.
    pub async fn start_reported(
        &self,
        spec: ProcessSpec,
        reporter: mpsc::UnboundedSender<ExitReport>,
    ) -> ProcessResult<Pid> {
        self.start_with(spec, Some(reporter)).await
    }

    async fn start_with(
        &self,
        spec: ProcessSpec,
        reporter: Option<mpsc::UnboundedSender<ExitReport>>,
    ) -> ProcessResult<Pid> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(SupervisorCommand::Start {
                spec,
                reporter,
                resp: tx,
            })
            .await
            .map_err(|_| Self::map_send_err("start"))?;
        rx.await.map_err(|_| Self::map_recv_err("start"))?
    }

    /// Restart every entry matching the name (one-to-many fan-out).
    ///
    /// A live entry is stopped first and relaunched only after its grace
    /// period resolves; a stopped entry is relaunched immediately. The
    /// returned vector holds one relaunch result per matching entry and
    /// is empty when nothing matched.
    pub async fn restart(&self, name: &str) -> ProcessResult<Vec<ProcessResult<()>>> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(SupervisorCommand::Restart {
                name: name.to_string(),
                resp: tx,
            })
            .await
            .map_err(|_| Self::map_send_err("restart"))?;
        rx.await.map_err(|_| Self::map_recv_err("restart"))
    }

    /// Gracefully stop every entry matching the name.
    ///
    /// Each match gets the "please stop" message (control line or
    /// termination signal), then a force kill once the grace period
    /// elapses. One result per match: `Ok` when the stop resolved,
    /// `ProcessError::NotRunning` when the entry had no live process.
    pub async fn stop(&self, name: &str) -> ProcessResult<Vec<ProcessResult<()>>> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(SupervisorCommand::Stop {
                name: name.to_string(),
                resp: tx,
            })
            .await
            .map_err(|_| Self::map_send_err("stop"))?;
        rx.await.map_err(|_| Self::map_recv_err("stop"))
    }

    /// Gracefully stop every entry with a live process.
    ///
    /// Returns one `(display id, result)` pair per affected entry, not an
    /// aggregate; an empty registry yields an empty vector.
    pub async fn stop_all(&self) -> ProcessResult<Vec<(String, ProcessResult<()>)>> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(SupervisorCommand::StopAll { resp: tx })
            .await
            .map_err(|_| Self::map_send_err("stop_all"))?;
        rx.await.map_err(|_| Self::map_recv_err("stop_all"))
    }

    // -------------------------------------------------------------------------
    // Configuration and Query Methods
    // -------------------------------------------------------------------------

    /// Register (or replace) the spawn strategy for a script extension.
    ///
    /// The table is open: new worker kinds plug in without touching any
    /// other component. Affects workers launched after the call.
    pub async fn register_handler(
        &self,
        extension: &str,
        strategy: Arc<dyn SpawnStrategy>,
    ) -> ProcessResult<()> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(SupervisorCommand::RegisterHandler {
                extension: extension.to_string(),
                strategy,
                resp: tx,
            })
            .await
            .map_err(|_| Self::map_send_err("register_handler"))?;
        rx.await.map_err(|_| Self::map_recv_err("register_handler"))
    }

    /// Snapshot every registry entry, in registration order.
    pub async fn processes(&self) -> ProcessResult<Vec<ProcessSnapshot>> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(SupervisorCommand::Processes { resp: tx })
            .await
            .map_err(|_| Self::map_send_err("processes"))?;
        rx.await.map_err(|_| Self::map_recv_err("processes"))
    }
}
