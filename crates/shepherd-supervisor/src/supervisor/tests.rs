//! White-box tests for the actor's exit classification and restart
//! arming, driven through the event interface without real children.

use super::actor::SupervisorActor;
use super::commands::WorkerEvent;
use super::types::{ExitReport, ManagedEntry, SupervisorConfig};
use shepherd_common::StreamKind;
use shepherd_spawn::{InterpreterStrategy, ProcessSpec};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::UnboundedSender;

fn test_actor() -> (SupervisorActor, mpsc::UnboundedReceiver<WorkerEvent>) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    (
        SupervisorActor::new(SupervisorConfig::default(), event_tx),
        event_rx,
    )
}

/// Entry pretending its first spawn (generation 1, pid 4242) is in
/// flight; tests inject terminal notices directly.
fn test_entry(
    reporter: Option<UnboundedSender<ExitReport>>,
    delays: Vec<Duration>,
) -> ManagedEntry {
    let spec = ProcessSpec::from_script("worker.sh")
        .with_name("worker")
        .with_restart_delays(delays);
    let mut entry = ManagedEntry::new(
        spec,
        PathBuf::from("worker.sh"),
        Arc::new(InterpreterStrategy::new("sh")),
        reporter,
    );
    entry.generation = 1;
    entry.last_pid = 4242;
    entry
}

fn exited(code: Option<i32>, signal: Option<i32>) -> WorkerEvent {
    WorkerEvent::Exited {
        entry: 0,
        generation: 1,
        code,
        signal,
    }
}

fn stream_eof(stream: StreamKind) -> WorkerEvent {
    WorkerEvent::StreamEof {
        entry: 0,
        generation: 1,
        stream,
    }
}

#[tokio::test]
async fn test_duplicate_clean_exit_notices_report_once() {
    let (mut actor, _events) = test_actor();
    let (tx, mut rx) = mpsc::unbounded_channel();
    actor.entries.push(test_entry(Some(tx), vec![]));

    actor.handle_event(exited(Some(0), None)).await;
    actor.handle_event(exited(Some(0), None)).await;

    assert_eq!(rx.try_recv().unwrap(), ExitReport::Completed { pid: 4242 });
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_closed_notice_after_exit_is_suppressed() {
    let (mut actor, _events) = test_actor();
    let (tx, mut rx) = mpsc::unbounded_channel();
    actor.entries.push(test_entry(Some(tx), vec![]));

    actor.handle_event(exited(Some(0), None)).await;
    actor.handle_event(stream_eof(StreamKind::Stdout)).await;
    actor.handle_event(stream_eof(StreamKind::Stderr)).await;

    assert_eq!(rx.try_recv().unwrap(), ExitReport::Completed { pid: 4242 });
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_nonzero_code_classifies_as_errored() {
    let (mut actor, _events) = test_actor();
    let (tx, mut rx) = mpsc::unbounded_channel();
    actor.entries.push(test_entry(Some(tx), vec![]));

    actor.handle_event(exited(Some(3), None)).await;

    assert_eq!(
        rx.try_recv().unwrap(),
        ExitReport::Errored {
            pid: 4242,
            code: 3
        }
    );
}

#[tokio::test]
async fn test_signal_with_no_code_classifies_as_killed() {
    let (mut actor, _events) = test_actor();
    let (tx, mut rx) = mpsc::unbounded_channel();
    actor.entries.push(test_entry(Some(tx), vec![]));

    actor.handle_event(exited(None, Some(15))).await;

    assert_eq!(
        rx.try_recv().unwrap(),
        ExitReport::Killed {
            pid: 4242,
            signal: 15
        }
    );
}

// The dedup key is the (code, signal) pair, not a per-termination
// counter: a notice carrying a different pair is a new report even
// within one generation.
#[tokio::test]
async fn test_distinct_exit_pairs_each_report() {
    let (mut actor, _events) = test_actor();
    let (tx, mut rx) = mpsc::unbounded_channel();
    actor.entries.push(test_entry(Some(tx), vec![]));

    actor.handle_event(exited(Some(1), None)).await;
    actor.handle_event(exited(Some(0), None)).await;

    assert_eq!(
        rx.try_recv().unwrap(),
        ExitReport::Errored {
            pid: 4242,
            code: 1
        }
    );
    assert_eq!(rx.try_recv().unwrap(), ExitReport::Completed { pid: 4242 });
}

#[tokio::test]
async fn test_stale_generation_notice_is_ignored() {
    let (mut actor, _events) = test_actor();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut entry = test_entry(Some(tx), vec![]);
    entry.generation = 2;
    actor.entries.push(entry);

    // Generation 1 notice against a generation 2 entry.
    actor.handle_event(exited(Some(0), None)).await;

    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_terminal_notice_arms_restart_timer() {
    let (mut actor, _events) = test_actor();
    actor
        .entries
        .push(test_entry(None, vec![Duration::from_secs(60)]));

    actor.handle_event(exited(Some(1), None)).await;

    assert!(actor.entries[0].restart_timer.is_some());
    assert_eq!(actor.entries[0].cursor.position(), Some(0));
}

#[tokio::test]
async fn test_stop_requested_blocks_restart_arming() {
    let (mut actor, _events) = test_actor();
    let mut entry = test_entry(None, vec![Duration::from_millis(10)]);
    entry.stop_requested = true;
    actor.entries.push(entry);

    actor.handle_event(exited(Some(1), None)).await;

    assert!(actor.entries[0].restart_timer.is_none());
}

#[tokio::test]
async fn test_disabled_policy_never_arms() {
    let (mut actor, _events) = test_actor();
    actor.entries.push(test_entry(None, vec![Duration::ZERO]));

    actor.handle_event(exited(Some(1), None)).await;

    assert!(actor.entries[0].restart_timer.is_none());
}

// A duplicate notice re-enters the scheduler, but the armed-timer guard
// keeps it from advancing the backoff cursor.
#[tokio::test]
async fn test_duplicate_notice_does_not_advance_backoff() {
    let (mut actor, _events) = test_actor();
    actor.entries.push(test_entry(
        None,
        vec![Duration::from_secs(60), Duration::from_secs(120)],
    ));

    actor.handle_event(exited(Some(1), None)).await;
    actor.handle_event(exited(Some(1), None)).await;

    assert_eq!(actor.entries[0].cursor.position(), Some(0));
    assert!(actor.entries[0].restart_timer.is_some());
}
