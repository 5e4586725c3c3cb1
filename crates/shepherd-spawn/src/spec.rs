//! Process specification: what to run and how to supervise it.

use serde::{Deserialize, Serialize};
use shepherd_common::{ProcessError, ProcessResult};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Default restart-delay ladder, escalating from 100 ms to 15 minutes.
pub const DEFAULT_RESTART_DELAYS: [Duration; 6] = [
    Duration::from_millis(100),
    Duration::from_secs(1),
    Duration::from_secs(5),
    Duration::from_secs(30),
    Duration::from_secs(120),
    Duration::from_secs(900),
];

/// Default continuous runtime after which backoff resets to its shortest
/// delay: 30 minutes.
pub const DEFAULT_STABLE_AFTER: Duration = Duration::from_secs(30 * 60);

/// Specification of one worker process.
///
/// One of `script` / `working_dir` is required; everything else is
/// optional. When `script` is absent the entry script is resolved from the
/// `package.json` manifest in `working_dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessSpec {
    /// Display name. Not required to be unique; by-name operations fan
    /// out to every entry sharing the name.
    pub name: Option<String>,

    /// Script to run. Its extension selects the spawn strategy.
    pub script: Option<PathBuf>,

    /// Working directory for the worker (and manifest lookup root).
    pub working_dir: Option<PathBuf>,

    /// Append-only log file for captured output; absent means console.
    pub log_file: Option<PathBuf>,

    /// Strip ANSI escape sequences from captured lines.
    pub strip_ansi: bool,

    /// Restart-delay ladder. Empty, or the single value zero, disables
    /// restarting entirely.
    pub restart_delays: Vec<Duration>,

    /// Continuous runtime after which the backoff cursor resets.
    pub stable_after: Duration,

    /// Environment overrides applied to the worker.
    pub env: HashMap<String, String>,

    /// Extra arguments passed after the script path.
    pub args: Vec<String>,
}

impl Default for ProcessSpec {
    fn default() -> Self {
        Self {
            name: None,
            script: None,
            working_dir: None,
            log_file: None,
            strip_ansi: false,
            restart_delays: DEFAULT_RESTART_DELAYS.to_vec(),
            stable_after: DEFAULT_STABLE_AFTER,
            env: HashMap::new(),
            args: Vec::new(),
        }
    }
}

impl ProcessSpec {
    /// Spec for an explicit script path.
    pub fn from_script(script: impl Into<PathBuf>) -> Self {
        Self {
            script: Some(script.into()),
            ..Self::default()
        }
    }

    /// Spec for a working directory whose manifest names the entry script.
    pub fn from_dir(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: Some(working_dir.into()),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    pub fn with_strip_ansi(mut self, strip: bool) -> Self {
        self.strip_ansi = strip;
        self
    }

    pub fn with_restart_delays(mut self, delays: Vec<Duration>) -> Self {
        self.restart_delays = delays;
        self
    }

    pub fn with_stable_after(mut self, stable_after: Duration) -> Self {
        self.stable_after = stable_after;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Reject specs carrying neither a script nor a working directory.
    pub fn validate(&self) -> ProcessResult<()> {
        if self.script.is_none() && self.working_dir.is_none() {
            return Err(ProcessError::validation(
                "cannot start process without 'script' or 'working_dir'",
            ));
        }
        Ok(())
    }

    /// Display identity used in logs and error messages.
    pub fn display_id(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        if let Some(script) = &self.script {
            return script.display().to_string();
        }
        if let Some(dir) = &self.working_dir {
            return dir.display().to_string();
        }
        "<unnamed>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_spec_fails_validation() {
        let err = ProcessSpec::default().validate().unwrap_err();
        assert!(matches!(err, ProcessError::Validation { .. }));
    }

    #[test]
    fn test_script_or_dir_passes_validation() {
        assert!(ProcessSpec::from_script("worker.js").validate().is_ok());
        assert!(ProcessSpec::from_dir("/srv/worker").validate().is_ok());
    }

    #[test]
    fn test_defaults() {
        let spec = ProcessSpec::from_script("worker.js");
        assert_eq!(spec.restart_delays, DEFAULT_RESTART_DELAYS.to_vec());
        assert_eq!(spec.stable_after, DEFAULT_STABLE_AFTER);
        assert!(!spec.strip_ansi);
        assert!(spec.env.is_empty());
    }

    #[test]
    fn test_spec_round_trips_through_serde() {
        let spec = ProcessSpec::from_script("worker.py")
            .with_name("worker")
            .with_restart_delays(vec![Duration::from_millis(100), Duration::from_secs(1)])
            .with_env("PORT", "3131");

        let json = serde_json::to_string(&spec).unwrap();
        let back: ProcessSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name.as_deref(), Some("worker"));
        assert_eq!(back.restart_delays, spec.restart_delays);
        assert_eq!(back.env.get("PORT").map(String::as_str), Some("3131"));
    }

    #[test]
    fn test_display_id_prefers_name() {
        let spec = ProcessSpec::from_script("worker.js").with_name("w1");
        assert_eq!(spec.display_id(), "w1");
        let spec = ProcessSpec::from_script("worker.js");
        assert_eq!(spec.display_id(), "worker.js");
    }
}
