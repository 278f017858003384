//! The contract a hosted service implements.
//!
//! A service is initialized once and then asked which capabilities it
//! exposes. Each capability is optional; an absent one is simply not run.
//! The orchestrator owns the service for the whole run, so no capability can
//! be queried before [`CloudService::init`] has completed.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use tokio::net::TcpListener;

use crate::bus::{EventHandler, MessageBus};
use crate::error::Error;
use crate::lifecycle::Context;

/// Topic name to the handler invoked for each message on that topic.
pub type Events = HashMap<String, EventHandler>;

/// An isolated component that serves REST and/or RPC requests and may listen
/// for events on a message bus.
#[async_trait]
pub trait CloudService: Send + Sync {
    /// Allocate connections, warm caches. Called exactly once, before any
    /// accessor.
    async fn init(&mut self, _ctx: &Context) -> Result<(), Error> {
        Ok(())
    }

    /// The REST handler, if this service serves HTTP requests.
    fn rest(&self) -> Option<Router> {
        None
    }

    /// The RPC server, if this service serves RPC requests.
    fn rpc(&self) -> Option<Arc<dyn RpcServer>> {
        None
    }

    /// The bus used for publishing and subscribing.
    fn bus(&self) -> Option<Arc<dyn MessageBus>> {
        None
    }

    /// Topics this service listens on. Requires [`CloudService::bus`].
    fn events(&self) -> Option<Events> {
        None
    }
}

/// A long-lived RPC server bound by the orchestrator.
#[async_trait]
pub trait RpcServer: Send + Sync {
    /// Serve on `listener` until stopped. Returning `Ok` after a stop is the
    /// normal exit.
    async fn serve(&self, listener: TcpListener) -> Result<(), Error>;

    /// Stop accepting and let in-flight calls finish.
    async fn graceful_stop(&self);

    /// Stop immediately, dropping in-flight calls. Used when
    /// [`RpcServer::graceful_stop`] outlives the shutdown grace period.
    async fn stop(&self);
}
