//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     init service → query capabilities → install signals → bind listeners
//!     → spawn one task per capability
//!
//! Shutdown (shutdown.rs):
//!     stop signal | handle.shutdown() | first task error
//!     → cancel group context → stop servers → wait for every task → close bus
//!
//! Signals (signals.rs):
//!     SIGINT/SIGTERM/SIGHUP/SIGQUIT → cancel root context
//! ```
//!
//! # Design Decisions
//! - Cancellation travels through `Context` (context.rs) only
//! - Startup is all-or-nothing: nothing runs until every listener is bound
//! - Shutdown is bounded per server by the grace period

pub mod context;
pub mod shutdown;
pub mod signals;
pub mod startup;
pub(crate) mod tasks;

pub use context::Context;
pub use shutdown::{LifecycleHandle, LifecycleState, Status};
pub use signals::{SignalListener, StopSignal};
pub use startup::{start, Capabilities, LifecycleError, Orchestrator};
