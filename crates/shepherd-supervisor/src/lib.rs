//! # Shepherd Supervisor
//!
//! The supervisor engine for the shepherd process supervisor: process
//! registry and API, exit-event classification and deduplication,
//! restart-backoff scheduling, and the process-wide shutdown hook.
//!
//! A [`Supervisor`] is a cloneable handle to an actor task owning the
//! registry. Workers are described by
//! [`ProcessSpec`](shepherd_spawn::ProcessSpec) values and launched
//! through the strategy registered for their script extension:
//!
//! ```no_run
//! use shepherd_spawn::ProcessSpec;
//! use shepherd_supervisor::Supervisor;
//!
//! # async fn demo() -> shepherd_common::ProcessResult<()> {
//! let supervisor = Supervisor::new();
//! let pid = supervisor
//!     .start(ProcessSpec::from_script("worker.js").with_name("worker"))
//!     .await?;
//! supervisor.stop("worker").await?;
//! # Ok(())
//! # }
//! ```

pub mod restart;
pub mod shutdown;
pub mod supervisor;

// Re-export main types
pub use restart::{BackoffCursor, RestartPolicy};
pub use shutdown::{notify_stopping, on_stopping};
pub use supervisor::{ExitReport, ProcessSnapshot, Supervisor, SupervisorConfig};
