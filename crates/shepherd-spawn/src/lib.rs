//! # Shepherd Spawn
//!
//! Worker launching for the shepherd process supervisor.
//!
//! This crate provides:
//! - [`ProcessSpec`] — what to run and how to treat its output and restarts
//! - Script resolution, including the `package.json` manifest fallback
//! - [`HandlerRegistry`] — the open extension→strategy table
//! - The built-in spawn strategies ([`ManagedRuntimeStrategy`],
//!   [`InterpreterStrategy`])

pub mod manifest;
pub mod spec;
pub mod strategy;

// Re-export main types
pub use manifest::resolve_script;
pub use spec::{ProcessSpec, DEFAULT_RESTART_DELAYS, DEFAULT_STABLE_AFTER};
pub use strategy::{
    HandlerRegistry, InterpreterStrategy, ManagedRuntimeStrategy, SpawnContext, SpawnStrategy,
    SpawnedWorker, STOP_MESSAGE,
};
