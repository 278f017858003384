//! REST serving subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (bound by net/listener.rs)
//!     → server.rs (hyper-util auto builder, HTTP/1.1 + HTTP/2)
//!     → request id → trace → [request dump]
//!     → transport timeout (write + margin) → body read timeout
//!     → handler timeout (write) → service Router
//! ```

pub mod server;

pub use server::{build_router, RestServer, TIMEOUT_BODY, WRITE_TIMEOUT_MARGIN};
