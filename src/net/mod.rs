//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! configured listen address
//!     → listener.rs (normalize, bind)
//!     → bound TcpListener handed to the REST server or the RPC server
//! ```

pub mod listener;

pub use listener::{bind, ListenerError};
