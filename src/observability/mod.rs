//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events with structured fields
//!     → logging.rs (env filter → pretty or JSON formatter → stderr)
//! ```
//!
//! # Design Decisions
//! - Library code only emits events; installing a subscriber is the binary's job
//! - Request IDs are attached by the REST middleware and show up in spans

pub mod logging;

pub use logging::{init, LogFormat};
