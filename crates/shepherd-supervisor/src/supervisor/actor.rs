//! Supervisor actor - single event loop owning the process registry.
//!
//! All registry mutations happen here, in arrival order, so a caller
//! never races its own commands. Per-worker tasks (stream capture, exit
//! monitor, grace and restart timers) hold no shared state; they report
//! back on the event channel, tagged with (entry index, spawn
//! generation).
//!
//! ## Exit Classification
//!
//! The termination surface delivers notices from two sources - the
//! monitor task that reaps the child, and the "closed" notification once
//! both capture streams hit end-of-file after the exit status is known -
//! in either order, possibly repeating one termination. On any terminal
//! notice for the current generation the actor clears the live handle
//! first (later observers see "not running"), flushes capture, and only
//! then consults the per-generation (exit code, signal) dedup key, so a
//! duplicate can never lose output or double-report.

use super::commands::{SupervisorCommand, WorkerEvent};
use super::types::{
    ExitReport, LiveHandle, ManagedEntry, PendingStop, StopResponder, SupervisorConfig,
};
use shepherd_common::{Pid, ProcessError, ProcessResult, StreamKind};
use shepherd_spawn::{resolve_script, HandlerRegistry, ProcessSpec, SpawnContext, STOP_MESSAGE};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

pub(super) struct SupervisorActor {
    pub(super) entries: Vec<ManagedEntry>,
    handlers: HandlerRegistry,
    grace_period: Duration,
    event_tx: mpsc::UnboundedSender<WorkerEvent>,
}

impl SupervisorActor {
    pub(super) fn new(config: SupervisorConfig, event_tx: mpsc::UnboundedSender<WorkerEvent>) -> Self {
        Self {
            entries: Vec::new(),
            handlers: config.handlers,
            grace_period: config.grace_period,
            event_tx,
        }
    }

    /// Main actor event loop.
    ///
    /// ## Termination
    ///
    /// When the command channel closes (all handles dropped) the actor
    /// requests a graceful stop of every live worker, then keeps
    /// processing events until no live handle, pending stop, or armed
    /// restart timer remains, so no child outlives its supervisor
    /// unsupervised and no oneshot responder hangs.
    pub(super) async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<SupervisorCommand>,
        mut event_rx: mpsc::UnboundedReceiver<WorkerEvent>,
    ) {
        let mut cmd_closed = false;

        loop {
            if cmd_closed && self.is_fully_drained() {
                debug!("command channel closed and all workers stopped; actor exiting");
                break;
            }

            // Events first: they clear live handles and resolve pending
            // stops, state that both commands and the drain check read.
            // The command arm is only polled while its channel is open,
            // so a dropped handle set never busy-loops the select.
            tokio::select! {
                biased;

                maybe_event = event_rx.recv() => {
                    if let Some(event) = maybe_event {
                        self.handle_event(event).await;
                    }
                }

                maybe_cmd = cmd_rx.recv(), if !cmd_closed => {
                    match maybe_cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        None => {
                            debug!("all supervisor handles dropped; stopping live workers");
                            cmd_closed = true;
                            self.stop_everything();
                        }
                    }
                }
            }
        }
    }

    fn is_fully_drained(&self) -> bool {
        self.entries.iter().all(|entry| {
            entry.live.is_none() && entry.pending_stop.is_none() && entry.restart_timer.is_none()
        })
    }

    /// Drain-mode cleanup: cancel every timer and stop every live worker.
    fn stop_everything(&mut self) {
        for idx in 0..self.entries.len() {
            if let Some(timer) = self.entries[idx].restart_timer.take() {
                timer.abort();
            }
            if self.entries[idx].is_running() {
                self.begin_stop(idx, None);
            } else {
                self.entries[idx].stop_requested = true;
            }
        }
    }

    // -------------------------------------------------------------------------
    // Command Handling
    // -------------------------------------------------------------------------

    async fn handle_command(&mut self, cmd: SupervisorCommand) {
        match cmd {
            SupervisorCommand::Start {
                spec,
                reporter,
                resp,
            } => {
                let result = self.start_entry(spec, reporter).await;
                let _ = resp.send(result);
            }

            SupervisorCommand::Restart { name, resp } => {
                let mut pending = Vec::new();
                for idx in self.matching(&name) {
                    let (tx, rx) = oneshot::channel();
                    self.begin_restart(idx, tx).await;
                    pending.push(rx);
                }
                collect_results(pending, resp);
            }

            SupervisorCommand::Stop { name, resp } => {
                let mut pending = Vec::new();
                for idx in self.matching(&name) {
                    let (tx, rx) = oneshot::channel();
                    self.begin_stop(idx, Some(tx));
                    pending.push(rx);
                }
                collect_results(pending, resp);
            }

            SupervisorCommand::StopAll { resp } => {
                let mut pending = Vec::new();
                for idx in 0..self.entries.len() {
                    if !self.entries[idx].is_running() {
                        continue;
                    }
                    let id = self.entries[idx].display_id();
                    let (tx, rx) = oneshot::channel();
                    self.begin_stop(idx, Some(tx));
                    pending.push((id, rx));
                }
                collect_named_results(pending, resp);
            }

            SupervisorCommand::RegisterHandler {
                extension,
                strategy,
                resp,
            } => {
                self.handlers.register(extension, strategy);
                let _ = resp.send(());
            }

            SupervisorCommand::Processes { resp } => {
                let snapshots = self.entries.iter().map(ManagedEntry::snapshot).collect();
                let _ = resp.send(snapshots);
            }
        }
    }

    /// Indices of entries matching a name, in registration order.
    fn matching(&self, name: &str) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.matches(name))
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Validate, resolve, register, and launch a new entry.
    ///
    /// Validation and resolution failures register nothing. A spawn-level
    /// OS failure is returned to the caller, but the entry stays
    /// registered and remains eligible for restart scheduling.
    async fn start_entry(
        &mut self,
        spec: ProcessSpec,
        reporter: Option<mpsc::UnboundedSender<ExitReport>>,
    ) -> ProcessResult<Pid> {
        spec.validate()?;
        let Some(script) = resolve_script(&spec).await else {
            return Err(ProcessError::validation("no script given to run"));
        };
        let strategy = self.handlers.select(&script)?;

        self.entries
            .push(ManagedEntry::new(spec, script, strategy, reporter));
        let idx = self.entries.len() - 1;

        match self.spawn_entry(idx).await {
            Ok(pid) => Ok(pid),
            Err(e) => {
                self.entries[idx].last_run = Duration::ZERO;
                self.maybe_schedule_restart(idx);
                Err(e)
            }
        }
    }

    /// Spawn a fresh process for an existing entry and wire capture and
    /// exit monitoring to it.
    async fn spawn_entry(&mut self, idx: usize) -> ProcessResult<Pid> {
        let events = self.event_tx.clone();
        let entry = &mut self.entries[idx];

        // Any armed restart timer is for the generation we are replacing.
        if let Some(timer) = entry.restart_timer.take() {
            timer.abort();
        }

        let id = entry.display_id();
        let strategy = Arc::clone(&entry.strategy);
        let worker = strategy
            .spawn(SpawnContext {
                id: &id,
                script: &entry.script,
                working_dir: entry.spec.working_dir.as_deref(),
                env: &entry.spec.env,
                args: &entry.spec.args,
            })
            .await?;

        let mut child = worker.child;
        entry.generation += 1;
        let generation = entry.generation;

        match child.stdout.take() {
            Some(stdout) => {
                tokio::spawn(read_stream(
                    stdout,
                    events.clone(),
                    idx,
                    generation,
                    StreamKind::Stdout,
                ));
                entry.stdout_eof = false;
            }
            None => entry.stdout_eof = true,
        }
        match child.stderr.take() {
            Some(stderr) => {
                tokio::spawn(read_stream(
                    stderr,
                    events.clone(),
                    idx,
                    generation,
                    StreamKind::Stderr,
                ));
                entry.stderr_eof = false;
            }
            None => entry.stderr_eof = true,
        }

        let (kill_tx, kill_rx) = oneshot::channel();
        tokio::spawn(monitor_child(child, kill_rx, events, idx, generation, id));

        entry.live = Some(LiveHandle {
            pid: worker.pid,
            control: worker.control,
            kill: Some(kill_tx),
        });
        entry.last_pid = worker.pid;
        entry.started_at = Some(chrono::Utc::now());
        entry.started_mono = Some(Instant::now());
        entry.exit_status = None;
        entry.last_reported = None;

        Ok(worker.pid)
    }

    /// Relaunch an existing entry, clearing the stop flag and counting
    /// the respawn.
    async fn relaunch(&mut self, idx: usize) -> ProcessResult<()> {
        self.entries[idx].stop_requested = false;
        let result = self.spawn_entry(idx).await;
        if result.is_ok() {
            self.entries[idx].restart_count += 1;
        }
        result.map(|_| ())
    }

    /// Begin a restart: a live entry is stopped first and relaunched only
    /// once its grace period resolves; a stopped entry relaunches now.
    async fn begin_restart(&mut self, idx: usize, responder: StopResponder) {
        if self.entries[idx].is_running() {
            self.begin_stop(idx, None);
            if let Some(pending) = self.entries[idx].pending_stop.as_mut() {
                pending.relaunch_waiters.push(responder);
                return;
            }
        }
        let result = self.relaunch(idx).await;
        let _ = responder.send(result);
    }

    /// Begin (or join) a graceful stop of one entry.
    ///
    /// Cancels any pending restart timer, marks stop requested, delivers
    /// "please stop", and arms the grace timer. The responder is answered
    /// once the grace period resolves; an entry with no live process
    /// answers `NotRunning` immediately.
    fn begin_stop(&mut self, idx: usize, responder: Option<StopResponder>) {
        let events = self.event_tx.clone();
        let grace = self.grace_period;
        let entry = &mut self.entries[idx];

        if let Some(timer) = entry.restart_timer.take() {
            timer.abort();
        }
        entry.stop_requested = true;

        let id = entry.display_id();
        let Some(live) = entry.live.as_mut() else {
            if let Some(responder) = responder {
                let _ = responder.send(Err(ProcessError::not_running(id)));
            }
            return;
        };

        // A stop is already in flight; just wait on its grace timer.
        if let Some(pending) = entry.pending_stop.as_mut() {
            if let Some(responder) = responder {
                pending.stop_waiters.push(responder);
            }
            return;
        }

        // Best-effort "please stop": the control line when the worker
        // has a channel, a termination signal otherwise. Delivery
        // failure is logged; the force kill still follows the grace
        // period.
        if let Some(mut control) = live.control.take() {
            let process = id.clone();
            tokio::spawn(async move {
                let line = format!("{}\n", STOP_MESSAGE);
                if let Err(e) = control.write_all(line.as_bytes()).await {
                    warn!(process = %process, error = %e, "failed to deliver stop message");
                }
            });
        } else {
            send_term_signal(&id, live.pid);
        }

        let generation = entry.generation;
        tokio::spawn(async move {
            sleep(grace).await;
            let _ = events.send(WorkerEvent::GraceExpired {
                entry: idx,
                generation,
            });
        });

        entry.pending_stop = Some(PendingStop {
            stop_waiters: responder.into_iter().collect(),
            relaunch_waiters: Vec::new(),
        });
        debug!(process = %id, ?grace, "graceful stop requested");
    }

    // -------------------------------------------------------------------------
    // Event Handling
    // -------------------------------------------------------------------------

    pub(super) async fn handle_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Output {
                entry,
                generation,
                stream,
                chunk,
            } => self.on_output(entry, generation, stream, &chunk).await,
            WorkerEvent::StreamEof {
                entry,
                generation,
                stream,
            } => self.on_stream_eof(entry, generation, stream).await,
            WorkerEvent::Exited {
                entry,
                generation,
                code,
                signal,
            } => self.on_exited(entry, generation, code, signal).await,
            WorkerEvent::GraceExpired { entry, generation } => {
                self.on_grace_expired(entry, generation).await
            }
            WorkerEvent::RestartDue { entry, generation } => {
                self.on_restart_due(entry, generation).await
            }
        }
    }

    async fn on_output(&mut self, idx: usize, generation: u64, stream: StreamKind, chunk: &[u8]) {
        let entry = &mut self.entries[idx];
        if generation != entry.generation {
            debug!(process = %entry.display_id(), "dropping output from a previous spawn");
            return;
        }
        let framer = match stream {
            StreamKind::Stdout => &mut entry.stdout_framer,
            StreamKind::Stderr => &mut entry.stderr_framer,
        };
        let lines = framer.push(chunk);
        for line in &lines {
            entry.sink.emit(stream, line).await;
        }
    }

    async fn on_stream_eof(&mut self, idx: usize, generation: u64, stream: StreamKind) {
        let (both_eof, status) = {
            let entry = &mut self.entries[idx];
            if generation != entry.generation {
                return;
            }
            match stream {
                StreamKind::Stdout => entry.stdout_eof = true,
                StreamKind::Stderr => entry.stderr_eof = true,
            }
            (entry.stdout_eof && entry.stderr_eof, entry.exit_status)
        };

        // Both streams closing after the exit status was recorded is the
        // trailing "closed" notification; the dedup key in
        // handle_terminal suppresses the repeat report.
        if both_eof {
            if let Some((code, signal)) = status {
                self.handle_terminal(idx, code, signal).await;
            }
        }
    }

    async fn on_exited(
        &mut self,
        idx: usize,
        generation: u64,
        code: Option<i32>,
        signal: Option<i32>,
    ) {
        let both_eof = {
            let entry = &mut self.entries[idx];
            if generation != entry.generation {
                debug!(process = %entry.display_id(), "ignoring exit notice from a previous spawn");
                return;
            }
            entry.exit_status = Some((code, signal));
            entry.last_run = entry
                .started_mono
                .map(|started| started.elapsed())
                .unwrap_or_default();
            entry.stdout_eof && entry.stderr_eof
        };

        self.handle_terminal(idx, code, signal).await;

        // When the capture streams were already drained, the trailing
        // "closed" notification has effectively fired too.
        if both_eof {
            self.handle_terminal(idx, code, signal).await;
        }
    }

    /// Process one terminal notification for the current generation.
    ///
    /// The live handle is cleared before anything else so later
    /// observers see "not running"; capture is flushed before the dedup
    /// check so a suppressed duplicate still cannot lose output.
    async fn handle_terminal(&mut self, idx: usize, code: Option<i32>, signal: Option<i32>) {
        let entry = &mut self.entries[idx];
        entry.live = None;

        if let Some(line) = entry.stdout_framer.flush() {
            entry.sink.emit(StreamKind::Stdout, &line).await;
        }
        if let Some(line) = entry.stderr_framer.flush() {
            entry.sink.emit(StreamKind::Stderr, &line).await;
        }

        if entry.last_reported == Some((code, signal)) {
            debug!(process = %entry.display_id(), "suppressing duplicate exit notice");
        } else {
            entry.last_reported = Some((code, signal));
            let pid = entry.last_pid;
            let report = match (code, signal) {
                (Some(code), _) if code != 0 => ExitReport::Errored { pid, code },
                (_, Some(signal)) => ExitReport::Killed { pid, signal },
                _ => ExitReport::Completed { pid },
            };
            self.report(idx, report);
        }

        self.maybe_schedule_restart(idx);
    }

    /// Deliver a terminal outcome on the entry's reporter channel, or log
    /// it with the process name when no reporter is attached.
    fn report(&mut self, idx: usize, report: ExitReport) {
        let entry = &mut self.entries[idx];
        if let Some(reporter) = &entry.reporter {
            if reporter.send(report.clone()).is_ok() {
                return;
            }
            entry.reporter = None;
        }
        let id = entry.display_id();
        match report {
            ExitReport::Completed { pid } => info!(process = %id, pid, "process completed"),
            ExitReport::Errored { pid, code } => {
                error!(process = %id, pid, code, "process exited with error")
            }
            ExitReport::Killed { pid, signal } => {
                warn!(process = %id, pid, signal, "process killed")
            }
            ExitReport::SpawnFailed { reason } => {
                error!(process = %id, %reason, "process spawn failed")
            }
        }
    }

    /// Arm the restart timer if policy and entry state allow it.
    ///
    /// Runs after every terminal notification; the guards make it a
    /// no-op when the entry is live, a stop was requested, or a timer is
    /// already armed, so duplicate notices never advance the backoff.
    fn maybe_schedule_restart(&mut self, idx: usize) {
        let events = self.event_tx.clone();
        let entry = &mut self.entries[idx];
        if entry.live.is_some() || entry.stop_requested || entry.restart_timer.is_some() {
            return;
        }
        let Some(delay) = entry.cursor.next_delay(&entry.policy, entry.last_run) else {
            return;
        };
        debug!(process = %entry.display_id(), ?delay, "restart scheduled");

        let generation = entry.generation;
        entry.restart_timer = Some(tokio::spawn(async move {
            sleep(delay).await;
            let _ = events.send(WorkerEvent::RestartDue {
                entry: idx,
                generation,
            });
        }));
    }

    async fn on_grace_expired(&mut self, idx: usize, generation: u64) {
        let entry = &mut self.entries[idx];
        let Some(pending) = entry.pending_stop.take() else {
            return;
        };

        // Only the generation the timer was armed for may be force
        // killed; a relaunch in the meantime means the live handle
        // belongs to a fresh process. The old run's exit notice will be
        // stale once the generation moves on, so flush its capture now.
        if generation == entry.generation {
            if let Some(live) = entry.live.as_mut() {
                if let Some(kill) = live.kill.take() {
                    let _ = kill.send(());
                }
                if let Some(line) = entry.stdout_framer.flush() {
                    entry.sink.emit(StreamKind::Stdout, &line).await;
                }
                if let Some(line) = entry.stderr_framer.flush() {
                    entry.sink.emit(StreamKind::Stderr, &line).await;
                }
            }
        }

        for waiter in pending.stop_waiters {
            let _ = waiter.send(Ok(()));
        }

        if !pending.relaunch_waiters.is_empty() {
            let relaunched_meanwhile =
                self.entries[idx].generation != generation && self.entries[idx].is_running();
            let result = if relaunched_meanwhile {
                Ok(())
            } else {
                self.relaunch(idx).await
            };
            for waiter in pending.relaunch_waiters {
                let _ = waiter.send(result.clone());
            }
        }
    }

    async fn on_restart_due(&mut self, idx: usize, generation: u64) {
        let entry = &mut self.entries[idx];
        entry.restart_timer = None;
        if generation != entry.generation {
            return;
        }
        // Someone started or stopped the entry while the timer was armed.
        if entry.live.is_some() || entry.stop_requested {
            return;
        }

        info!(process = %entry.display_id(), "restarting after backoff delay");
        if let Err(e) = self.relaunch(idx).await {
            self.report(
                idx,
                ExitReport::SpawnFailed {
                    reason: e.to_string(),
                },
            );
            self.entries[idx].last_run = Duration::ZERO;
            self.maybe_schedule_restart(idx);
        }
    }
}

// -----------------------------------------------------------------------------
// Per-Worker Tasks
// -----------------------------------------------------------------------------

/// Pump one capture stream into the event channel until end-of-file.
async fn read_stream<R>(
    mut stream: R,
    events: mpsc::UnboundedSender<WorkerEvent>,
    entry: usize,
    generation: u64,
    kind: StreamKind,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut buf = [0u8; 4096];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let chunk = buf[..n].to_vec();
                if events
                    .send(WorkerEvent::Output {
                        entry,
                        generation,
                        stream: kind,
                        chunk,
                    })
                    .is_err()
                {
                    return;
                }
            }
            Err(e) => {
                debug!(stream = %kind, error = %e, "capture read failed");
                break;
            }
        }
    }
    let _ = events.send(WorkerEvent::StreamEof {
        entry,
        generation,
        stream: kind,
    });
}

/// Own the child for its whole life and always reap it, so force kill
/// and exit reporting go through one place and no zombies remain.
async fn monitor_child(
    mut child: Child,
    mut kill_rx: oneshot::Receiver<()>,
    events: mpsc::UnboundedSender<WorkerEvent>,
    entry: usize,
    generation: u64,
    id: String,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = &mut kill_rx => {
            debug!(process = %id, "force kill requested");
            if let Err(e) = child.start_kill() {
                warn!(process = %id, error = %e, "force kill failed");
            }
            child.wait().await
        }
    };

    let (code, signal) = match status {
        Ok(status) => {
            #[cfg(unix)]
            let signal = {
                use std::os::unix::process::ExitStatusExt;
                status.signal()
            };
            #[cfg(not(unix))]
            let signal = None;
            (status.code(), signal)
        }
        Err(e) => {
            warn!(process = %id, error = %e, "failed to reap child");
            (None, None)
        }
    };

    let _ = events.send(WorkerEvent::Exited {
        entry,
        generation,
        code,
        signal,
    });
}

#[cfg(unix)]
fn send_term_signal(id: &str, pid: Pid) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid as NixPid;

    if let Err(e) = kill(NixPid::from_raw(pid as i32), Signal::SIGTERM) {
        warn!(process = %id, pid, error = %e, "failed to send SIGTERM");
    }
}

#[cfg(not(unix))]
fn send_term_signal(id: &str, pid: Pid) {
    // No graceful signal on this platform; the grace timer's force kill
    // follows.
    debug!(process = %id, pid, "no graceful termination signal available");
}

// -----------------------------------------------------------------------------
// Fan-Out Result Collection
// -----------------------------------------------------------------------------

/// Gather per-entry results for a by-name fan-out without blocking the
/// actor; the per-entry responders resolve as grace periods expire.
fn collect_results(
    pending: Vec<oneshot::Receiver<ProcessResult<()>>>,
    resp: oneshot::Sender<Vec<ProcessResult<()>>>,
) {
    tokio::spawn(async move {
        let mut results = Vec::with_capacity(pending.len());
        for rx in pending {
            results.push(
                rx.await
                    .unwrap_or_else(|_| Err(ProcessError::channel_closed("per-entry result"))),
            );
        }
        let _ = resp.send(results);
    });
}

fn collect_named_results(
    pending: Vec<(String, oneshot::Receiver<ProcessResult<()>>)>,
    resp: oneshot::Sender<Vec<(String, ProcessResult<()>)>>,
) {
    tokio::spawn(async move {
        let mut results = Vec::with_capacity(pending.len());
        for (id, rx) in pending {
            let result = rx
                .await
                .unwrap_or_else(|_| Err(ProcessError::channel_closed("per-entry result")));
            results.push((id, result));
        }
        let _ = resp.send(results);
    });
}
