//! Service lifecycle framework.
//!
//! Hosts a [`CloudService`]: initializes it, runs its REST server, RPC server
//! and event subscriptions concurrently, and shuts all of them down together
//! on a stop signal or the first failure. Errors are expressed through a
//! small taxonomy ([`ErrorKind`]) that maps onto HTTP status codes.

pub mod bus;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod service;

pub use bus::{event_handler, EventHandler, MemoryBus, MessageBus};
pub use config::ServiceConfig;
pub use error::{classify, http_error, status_for, ContextError, Error, ErrorKind, ResultExt};
pub use lifecycle::{
    start, Context, LifecycleError, LifecycleHandle, LifecycleState, Orchestrator, StopSignal,
};
pub use service::{CloudService, Events, RpcServer};
