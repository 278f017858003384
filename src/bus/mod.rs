//! Message bus abstraction.
//!
//! # Data Flow
//! ```text
//! publisher
//!     → MessageBus::publish(topic, payload)
//!     → broker
//!     → MessageBus::subscribe(topic) loop (one task per topic)
//!     → EventHandler(ctx, payload), sequential, in receipt order
//! ```
//!
//! # Design Decisions
//! - `subscribe` blocks its task until the context finishes or the
//!   connection closes
//! - Handlers return nothing: a failed message is the handler's problem, the
//!   subscription carries on

pub mod memory;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::error::Error;
use crate::lifecycle::Context;

pub use memory::MemoryBus;

/// Callback executed for every message received on a subscribed topic.
pub type EventHandler = Arc<dyn Fn(Context, Vec<u8>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Build an [`EventHandler`] from an async closure.
pub fn event_handler<F, Fut>(f: F) -> EventHandler
where
    F: Fn(Context, Vec<u8>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |ctx, msg| f(ctx, msg).boxed())
}

#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish `msg` to `topic`. Fails with
    /// [`ErrorKind::ConnectionClosed`](crate::ErrorKind::ConnectionClosed) once the
    /// broker connection is closed.
    async fn publish(&self, ctx: &Context, topic: &str, msg: Vec<u8>) -> Result<(), Error>;

    /// Deliver every message on `topic` to `handler` until `ctx` finishes or
    /// the connection closes. Blocking.
    async fn subscribe(&self, ctx: &Context, topic: &str, handler: EventHandler)
        -> Result<(), Error>;

    /// Release the connection. Safe to call more than once.
    async fn close(&self) -> Result<(), Error>;
}
