//! Spawn strategies and the extension→strategy handler table.
//!
//! Handler selection is a pure mapping from a script's file extension to a
//! spawn strategy. The table is open: new worker kinds register a new
//! strategy without touching any other component. Two strategies ship
//! built in:
//!
//! - [`ManagedRuntimeStrategy`] launches trusted same-runtime workers and
//!   keeps a control channel (the worker's stdin) over which the single
//!   "please stop" message is delivered.
//! - [`InterpreterStrategy`] launches foreign-runtime interpreters with
//!   the script path as the first argument and no control channel.

use async_trait::async_trait;
use shepherd_common::{Pid, ProcessError, ProcessResult};
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::{Child, ChildStdin, Command};
use tracing::info;

/// The one control message understood by managed-runtime workers, sent as
/// a single line on their stdin.
pub const STOP_MESSAGE: &str = r#"{"stopping":true}"#;

/// Everything a strategy needs to build the child process.
pub struct SpawnContext<'a> {
    /// Display identity for logs and errors.
    pub id: &'a str,
    pub script: &'a Path,
    pub working_dir: Option<&'a Path>,
    pub env: &'a HashMap<String, String>,
    pub args: &'a [String],
}

/// A freshly spawned worker, before the supervisor wires capture and exit
/// monitoring to it.
pub struct SpawnedWorker {
    /// Child handle with stdout/stderr piped.
    pub child: Child,
    pub pid: Pid,
    /// Control-channel writer, present only for managed-runtime workers.
    pub control: Option<ChildStdin>,
}

/// One way of turning a script into a running child process.
#[async_trait]
pub trait SpawnStrategy: Send + Sync {
    /// Short label for logs.
    fn kind(&self) -> &'static str;

    /// Spawn the worker described by `ctx`.
    async fn spawn(&self, ctx: SpawnContext<'_>) -> ProcessResult<SpawnedWorker>;
}

fn base_command(program: &str, ctx: &SpawnContext<'_>) -> Command {
    let mut cmd = Command::new(program);
    cmd.arg(ctx.script);
    cmd.args(ctx.args);
    if let Some(dir) = ctx.working_dir {
        cmd.current_dir(dir);
    }
    cmd.envs(ctx.env);
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    cmd
}

fn finish_spawn(mut cmd: Command, ctx: &SpawnContext<'_>, kind: &str) -> ProcessResult<Child> {
    match cmd.spawn() {
        Ok(child) => {
            info!(
                process = %ctx.id,
                pid = child.id().unwrap_or(0),
                strategy = kind,
                "process spawned"
            );
            Ok(child)
        }
        Err(e) => Err(ProcessError::spawn_failed(ctx.id, e.to_string())),
    }
}

/// Spawns a trusted same-runtime worker (`node` by default) with its stdin
/// piped as the bidirectional control channel.
pub struct ManagedRuntimeStrategy {
    runtime: String,
}

impl ManagedRuntimeStrategy {
    pub fn new(runtime: impl Into<String>) -> Self {
        Self {
            runtime: runtime.into(),
        }
    }
}

#[async_trait]
impl SpawnStrategy for ManagedRuntimeStrategy {
    fn kind(&self) -> &'static str {
        "managed-runtime"
    }

    async fn spawn(&self, ctx: SpawnContext<'_>) -> ProcessResult<SpawnedWorker> {
        let mut cmd = base_command(&self.runtime, &ctx);
        cmd.stdin(Stdio::piped());

        let mut child = finish_spawn(cmd, &ctx, self.kind())?;
        let pid = child.id().unwrap_or(0);
        let control = child.stdin.take();
        Ok(SpawnedWorker {
            child,
            pid,
            control,
        })
    }
}

/// Plain subprocess spawn for foreign-runtime interpreters: the script
/// path is passed as the interpreter's first argument.
pub struct InterpreterStrategy {
    interpreter: String,
}

impl InterpreterStrategy {
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }
}

#[async_trait]
impl SpawnStrategy for InterpreterStrategy {
    fn kind(&self) -> &'static str {
        "interpreter"
    }

    async fn spawn(&self, ctx: SpawnContext<'_>) -> ProcessResult<SpawnedWorker> {
        let mut cmd = base_command(&self.interpreter, &ctx);
        cmd.stdin(Stdio::null());

        let child = finish_spawn(cmd, &ctx, self.kind())?;
        let pid = child.id().unwrap_or(0);
        Ok(SpawnedWorker {
            child,
            pid,
            control: None,
        })
    }
}

/// Open extension→strategy table.
///
/// Lookups are case-insensitive on the extension. Unknown extensions (or
/// scripts without one) are rejected before anything is registered.
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn SpawnStrategy>>,
}

impl Default for HandlerRegistry {
    /// Registry with the built-in worker kinds: `.js` through the managed
    /// node runtime, `.py` through the python interpreter.
    fn default() -> Self {
        let mut registry = Self {
            handlers: HashMap::new(),
        };
        registry.register("js", Arc::new(ManagedRuntimeStrategy::new("node")));
        registry.register("py", Arc::new(InterpreterStrategy::new("python")));
        registry
    }
}

impl HandlerRegistry {
    /// Registry with no handlers at all.
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register (or replace) the strategy for an extension.
    pub fn register(&mut self, extension: impl Into<String>, strategy: Arc<dyn SpawnStrategy>) {
        self.handlers
            .insert(extension.into().to_ascii_lowercase(), strategy);
    }

    /// Select the strategy for a script by its extension.
    pub fn select(&self, script: &Path) -> ProcessResult<Arc<dyn SpawnStrategy>> {
        script
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.handlers.get(&ext.to_ascii_lowercase()))
            .cloned()
            .ok_or_else(|| ProcessError::unsupported_script(script.display().to_string()))
    }
}
