//! # Shepherd Output
//!
//! Output capture for the shepherd process supervisor.
//!
//! This crate provides:
//! - Line framing of raw stream chunks ([`LineFramer`])
//! - ANSI escape stripping ([`strip_ansi`])
//! - Per-process log routing to a file or the inherited console
//!   ([`LogSink`])

pub mod ansi;
pub mod framer;
pub mod sink;

// Re-export main types
pub use ansi::strip_ansi;
pub use framer::LineFramer;
pub use sink::LogSink;
