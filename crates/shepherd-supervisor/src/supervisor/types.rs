//! Shared data types for the supervisor module.
//!
//! This module contains:
//! - Public types exposed to external callers (ExitReport,
//!   ProcessSnapshot, SupervisorConfig)
//! - Actor-internal types for the registry entries (ManagedEntry,
//!   LiveHandle, PendingStop)

use crate::restart::{BackoffCursor, RestartPolicy};
use chrono::{DateTime, Utc};
use shepherd_common::{Pid, ProcessResult};
use shepherd_output::{LineFramer, LogSink};
use shepherd_spawn::{HandlerRegistry, ProcessSpec, SpawnStrategy};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::ChildStdin;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

// ============================================================================
// Public Types - Exposed to external callers
// ============================================================================

/// Terminal outcome of one worker run, delivered on the reporter channel.
///
/// Duplicate notifications from the underlying termination surface are
/// deduplicated before a report is produced, so at most one report is
/// delivered per distinct (exit code, signal) pair per spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReport {
    /// The worker exited with code zero and no signal.
    Completed { pid: Pid },
    /// The worker exited with a non-zero code.
    Errored { pid: Pid, code: i32 },
    /// The worker was terminated by a signal.
    Killed { pid: Pid, signal: i32 },
    /// The OS failed to create the process on a scheduled relaunch.
    SpawnFailed { reason: String },
}

/// Point-in-time view of one registry entry.
#[derive(Debug, Clone)]
pub struct ProcessSnapshot {
    pub name: Option<String>,
    /// Pid of the live process, if one is running.
    pub pid: Option<Pid>,
    pub running: bool,
    pub started_at: Option<DateTime<Utc>>,
    /// How many times the entry has been relaunched after its first start.
    pub restart_count: u32,
}

/// Supervisor-wide settings.
pub struct SupervisorConfig {
    /// Extension-to-strategy table used to launch workers.
    pub handlers: HandlerRegistry,
    /// How long a worker gets to honor "please stop" before the force
    /// kill fires.
    pub grace_period: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            handlers: HandlerRegistry::default(),
            grace_period: Duration::from_millis(200),
        }
    }
}

// ============================================================================
// Actor-Internal Types
// ============================================================================

pub(super) type StopResponder = oneshot::Sender<ProcessResult<()>>;

/// Exclusively owned handle to an entry's live process.
///
/// Present only while a process is running; dropping it never kills the
/// child (the monitor task owns the `Child` and always reaps it).
pub(super) struct LiveHandle {
    pub pid: Pid,
    /// Control-channel writer (managed-runtime workers only); taken when
    /// the stop message is sent.
    pub control: Option<ChildStdin>,
    /// Trigger for the force kill performed by the monitor task.
    pub kill: Option<oneshot::Sender<()>>,
}

/// An in-progress graceful stop, resolved when the grace period elapses.
pub(super) struct PendingStop {
    /// Callers waiting for the stop itself; answered `Ok` at grace
    /// expiry.
    pub stop_waiters: Vec<StopResponder>,
    /// Callers waiting for the relaunch that follows the stop; answered
    /// with the relaunch result.
    pub relaunch_waiters: Vec<StopResponder>,
}

/// One registry entry: the supervisor's record of a worker across all of
/// its respawns.
///
/// All fields are owned by the actor; worker tasks only ever send events
/// tagged with the entry index and spawn generation.
pub(super) struct ManagedEntry {
    pub spec: ProcessSpec,
    /// Resolved script path (explicit, or from the manifest).
    pub script: PathBuf,
    pub strategy: Arc<dyn SpawnStrategy>,
    pub policy: RestartPolicy,
    pub cursor: BackoffCursor,

    /// At most one live handle per entry.
    pub live: Option<LiveHandle>,
    /// Monotonically increasing spawn generation; events carrying an
    /// older generation are stale.
    pub generation: u64,
    /// Pid of the most recent spawn, kept for reports after `live` is
    /// cleared.
    pub last_pid: Pid,

    pub started_at: Option<DateTime<Utc>>,
    pub started_mono: Option<Instant>,
    /// How long the most recently finished run lasted.
    pub last_run: Duration,
    pub restart_count: u32,

    pub stop_requested: bool,
    pub pending_stop: Option<PendingStop>,
    pub restart_timer: Option<JoinHandle<()>>,

    pub stdout_framer: LineFramer,
    pub stderr_framer: LineFramer,
    pub stdout_eof: bool,
    pub stderr_eof: bool,
    pub sink: LogSink,

    pub reporter: Option<mpsc::UnboundedSender<ExitReport>>,
    /// Dedup key: the last (exit code, signal) pair reported for the
    /// current generation.
    pub last_reported: Option<(Option<i32>, Option<i32>)>,
    /// Exit status recorded for the current generation, once reaped.
    pub exit_status: Option<(Option<i32>, Option<i32>)>,
}

impl ManagedEntry {
    pub fn new(
        spec: ProcessSpec,
        script: PathBuf,
        strategy: Arc<dyn SpawnStrategy>,
        reporter: Option<mpsc::UnboundedSender<ExitReport>>,
    ) -> Self {
        let policy = RestartPolicy::new(spec.restart_delays.clone(), spec.stable_after);
        let sink = match &spec.log_file {
            Some(path) => LogSink::file(path.clone(), spec.name.clone(), spec.strip_ansi),
            None => LogSink::console(spec.name.clone(), spec.strip_ansi),
        };
        Self {
            spec,
            script,
            strategy,
            policy,
            cursor: BackoffCursor::new(),
            live: None,
            generation: 0,
            last_pid: 0,
            started_at: None,
            started_mono: None,
            last_run: Duration::ZERO,
            restart_count: 0,
            stop_requested: false,
            pending_stop: None,
            restart_timer: None,
            stdout_framer: LineFramer::new(),
            stderr_framer: LineFramer::new(),
            stdout_eof: false,
            stderr_eof: false,
            sink,
            reporter,
            last_reported: None,
            exit_status: None,
        }
    }

    /// Display identity used in logs, errors, and stop-all results.
    pub fn display_id(&self) -> String {
        self.spec.display_id()
    }

    pub fn is_running(&self) -> bool {
        self.live.is_some()
    }

    /// By-name operations match named entries only, and may match more
    /// than one.
    pub fn matches(&self, name: &str) -> bool {
        self.spec.name.as_deref() == Some(name)
    }

    pub fn snapshot(&self) -> ProcessSnapshot {
        ProcessSnapshot {
            name: self.spec.name.clone(),
            pid: self.live.as_ref().map(|live| live.pid),
            running: self.live.is_some(),
            started_at: self.started_at,
            restart_count: self.restart_count,
        }
    }
}
