//! Log routing for captured worker output.
//!
//! Each managed process owns exactly one sink. Lines go to an append-only
//! log file when one is configured, otherwise to the inherited console
//! (stderr lines to stderr, stdout lines to stdout). A write failure is
//! reported on the operator diagnostic channel (`tracing`) and otherwise
//! swallowed; it never reaches process-completion reporting.

use crate::ansi::strip_ansi;
use shepherd_common::StreamKind;
use std::borrow::Cow;
use std::path::PathBuf;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::error;

enum SinkTarget {
    Console,
    File {
        path: PathBuf,
        // Opened lazily on first line, kept open for the entry's lifetime.
        file: Option<File>,
    },
}

/// Routes log lines for one managed process.
pub struct LogSink {
    target: SinkTarget,
    prefix: Option<String>,
    strip_ansi: bool,
}

impl LogSink {
    /// Sink writing to the inherited console streams.
    pub fn console(name: Option<String>, strip_ansi: bool) -> Self {
        Self {
            target: SinkTarget::Console,
            prefix: name,
            strip_ansi,
        }
    }

    /// Sink appending to a dedicated log file.
    pub fn file(path: PathBuf, name: Option<String>, strip_ansi: bool) -> Self {
        Self {
            target: SinkTarget::File { path, file: None },
            prefix: name,
            strip_ansi,
        }
    }

    /// Emit one framed line.
    pub async fn emit(&mut self, stream: StreamKind, line: &str) {
        let line = if self.strip_ansi {
            strip_ansi(line)
        } else {
            Cow::Borrowed(line)
        };

        match &mut self.target {
            SinkTarget::Console => match (stream, &self.prefix) {
                (StreamKind::Stderr, Some(name)) => eprintln!("{}: {}", name, line),
                (StreamKind::Stderr, None) => eprintln!("{}", line),
                (StreamKind::Stdout, Some(name)) => println!("{}: {}", name, line),
                (StreamKind::Stdout, None) => println!("{}", line),
            },
            SinkTarget::File { path, file } => {
                let record = match &self.prefix {
                    Some(name) => format!("{}: {}\n", name, line),
                    None => format!("{}\n", line),
                };

                if file.is_none() {
                    match OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(path.as_path())
                        .await
                    {
                        Ok(f) => *file = Some(f),
                        Err(e) => {
                            error!(path = %path.display(), error = %e, "failed to open log file");
                            return;
                        }
                    }
                }

                if let Some(f) = file {
                    if let Err(e) = f.write_all(record.as_bytes()).await {
                        error!(path = %path.display(), error = %e, "failed to append log line");
                        // Drop the handle so the next line retries the open.
                        *file = None;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_sink_appends_prefixed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.log");

        let mut sink = LogSink::file(path.clone(), Some("worker".to_string()), false);
        sink.emit(StreamKind::Stdout, "first").await;
        sink.emit(StreamKind::Stderr, "second").await;

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents, "worker: first\nworker: second\n");
    }

    #[tokio::test]
    async fn test_file_sink_without_name_writes_bare_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("anon.log");

        let mut sink = LogSink::file(path.clone(), None, false);
        sink.emit(StreamKind::Stdout, "hello").await;

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents, "hello\n");
    }

    #[tokio::test]
    async fn test_file_sink_strips_ansi_when_asked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("colors.log");

        let mut sink = LogSink::file(path.clone(), None, true);
        sink.emit(StreamKind::Stdout, "\x1b[31mred\x1b[0m").await;

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents, "red\n");
    }

    #[tokio::test]
    async fn test_file_sink_swallows_write_failures() {
        // Unwritable path: the emit must not panic or error out.
        let mut sink = LogSink::file(
            PathBuf::from("/nonexistent-dir/worker.log"),
            Some("worker".to_string()),
            false,
        );
        sink.emit(StreamKind::Stdout, "lost line").await;
    }
}
