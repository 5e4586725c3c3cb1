//! Process-wide shutdown hook.
//!
//! [`on_stopping`] installs a single hook that fires at most once per
//! shutdown, triggered by whichever comes first: a `{"stopping":true}`
//! control line on the parent's own stdin (the parent may itself be a
//! supervised worker), a termination signal, or an explicit
//! [`notify_stopping`] call from the host's exit path. Re-installing
//! replaces the hook and re-arms it.

use lazy_static::lazy_static;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

type Hook = Box<dyn FnOnce() + Send + 'static>;

lazy_static! {
    static ref STOPPING_HOOK: Mutex<Option<Hook>> = Mutex::new(None);
}

static LISTENERS_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Install the process-wide shutdown hook.
///
/// The hook typically requests a graceful stop of every registered entry
/// before the parent terminates. Installing again replaces the previous
/// hook; any single hook runs at most once. Listener tasks for signals
/// and the stdin control channel are spawned on first install when a
/// Tokio runtime is available.
pub fn on_stopping(hook: impl FnOnce() + Send + 'static) {
    *STOPPING_HOOK.lock() = Some(Box::new(hook));
    install_listeners();
}

/// Fire the hook from the host's own exit path.
///
/// Hosts that shut down without receiving a signal or control message
/// call this before exiting. Idempotent once the hook has run.
pub fn notify_stopping() {
    fire();
}

fn fire() {
    let hook = STOPPING_HOOK.lock().take();
    match hook {
        Some(hook) => hook(),
        None => debug!("shutdown hook already fired or never installed"),
    }
}

fn install_listeners() {
    if LISTENERS_INSTALLED.swap(true, Ordering::SeqCst) {
        return;
    }
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        // No runtime to listen from; the hook still fires via
        // notify_stopping. Leave the flag clear so a later install from
        // async context gets the listeners.
        LISTENERS_INSTALLED.store(false, Ordering::SeqCst);
        debug!("no async runtime; shutdown hook armed for notify_stopping only");
        return;
    };
    runtime.spawn(listen_for_signals());
    runtime.spawn(listen_for_control_messages());
}

async fn listen_for_signals() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                return;
            }
        };
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "failed to install SIGINT handler");
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        info!("received ctrl-c");
    }

    fire();
}

/// Watch the parent's stdin for the stop control line. Non-control input
/// is ignored.
async fn listen_for_control_messages() {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let stopping = serde_json::from_str::<serde_json::Value>(&line)
            .ok()
            .and_then(|message| message.get("stopping").and_then(|v| v.as_bool()))
            .unwrap_or(false);
        if stopping {
            info!("received stopping control message");
            fire();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    // One test drives the whole sequence: the hook cell is process-wide
    // state, so separate test functions would race each other.
    #[tokio::test]
    async fn test_hook_fires_once_replaces_and_rearms() {
        let count = Arc::new(AtomicUsize::new(0));

        let hits = count.clone();
        on_stopping(move || {
            hits.fetch_add(1, Ordering::SeqCst);
        });

        // Fires exactly once no matter how many triggers arrive.
        notify_stopping();
        notify_stopping();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Installing twice before firing: only the latest hook runs.
        let replaced = count.clone();
        on_stopping(move || {
            replaced.fetch_add(10, Ordering::SeqCst);
        });
        let latest = count.clone();
        on_stopping(move || {
            latest.fetch_add(100, Ordering::SeqCst);
        });
        notify_stopping();
        assert_eq!(count.load(Ordering::SeqCst), 101);

        // Spent again until the next install.
        notify_stopping();
        assert_eq!(count.load(Ordering::SeqCst), 101);
    }
}
