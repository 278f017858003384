//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::Notify;

use service_framework::config::ServiceConfig;
use service_framework::{
    CloudService, Context, Error, ErrorKind, Events, EventHandler, MessageBus, Orchestrator,
    RpcServer, StopSignal,
};

/// Config with every listener on an ephemeral loopback port.
pub fn test_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.rest.listen = "127.0.0.1:0".to_string();
    config.rpc.listen = "127.0.0.1:0".to_string();
    config.shutdown.grace_period = Duration::from_secs(2);
    config
}

/// HTTP client that never routes loopback traffic through a proxy.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// Orchestrator that ignores OS signals, so tests drive shutdown themselves.
pub fn orchestrator(config: ServiceConfig) -> Orchestrator {
    Orchestrator::new(config).with_stop_signals(Vec::<StopSignal>::new())
}

/// RPC server that records which of its hooks ran.
#[derive(Default)]
pub struct FakeRpc {
    pub served: AtomicBool,
    pub graceful_stopped: AtomicBool,
    pub stopped: AtomicBool,
    /// Fail `serve` right away with this kind.
    pub fail_with: Option<ErrorKind>,
    /// Make `graceful_stop` hang so the orchestrator escalates to `stop`.
    pub hang_on_graceful: bool,
    release: Notify,
}

impl FakeRpc {
    pub fn failing(kind: ErrorKind) -> Self {
        Self {
            fail_with: Some(kind),
            ..Self::default()
        }
    }

    pub fn hanging() -> Self {
        Self {
            hang_on_graceful: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl RpcServer for FakeRpc {
    async fn serve(&self, _listener: TcpListener) -> Result<(), Error> {
        self.served.store(true, Ordering::SeqCst);
        if let Some(kind) = self.fail_with {
            return Err(Error::with_detail(kind, "rpc serve"));
        }
        self.release.notified().await;
        Ok(())
    }

    async fn graceful_stop(&self) {
        self.graceful_stopped.store(true, Ordering::SeqCst);
        if self.hang_on_graceful {
            std::future::pending::<()>().await;
        }
        self.release.notify_one();
    }

    async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.release.notify_one();
    }
}

/// Bus whose subscriptions fail immediately.
pub struct FailingBus {
    pub closed: AtomicBool,
}

impl FailingBus {
    pub fn new() -> Self {
        Self {
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl MessageBus for FailingBus {
    async fn publish(&self, _ctx: &Context, _topic: &str, _msg: Vec<u8>) -> Result<(), Error> {
        Err(Error::new(ErrorKind::ConnectionClosed))
    }

    async fn subscribe(
        &self,
        _ctx: &Context,
        topic: &str,
        _handler: EventHandler,
    ) -> Result<(), Error> {
        Err(Error::with_detail(ErrorKind::ConnectionClosed, topic.to_string()))
    }

    async fn close(&self) -> Result<(), Error> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Service assembled from optional parts, counting accessor calls.
#[derive(Default)]
pub struct TestService {
    pub init_error: Option<ErrorKind>,
    pub rest: Option<Router>,
    pub rpc: Option<Arc<FakeRpc>>,
    pub bus: Option<Arc<dyn MessageBus>>,
    pub events: Option<Events>,
    pub accessor_calls: Arc<AtomicUsize>,
}

impl TestService {
    fn touch(&self) {
        self.accessor_calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CloudService for TestService {
    async fn init(&mut self, _ctx: &Context) -> Result<(), Error> {
        match self.init_error {
            Some(kind) => Err(Error::with_detail(kind, "init")),
            None => Ok(()),
        }
    }

    fn rest(&self) -> Option<Router> {
        self.touch();
        self.rest.clone()
    }

    fn rpc(&self) -> Option<Arc<dyn RpcServer>> {
        self.touch();
        self.rpc.clone().map(|rpc| rpc as Arc<dyn RpcServer>)
    }

    fn bus(&self) -> Option<Arc<dyn MessageBus>> {
        self.touch();
        self.bus.clone()
    }

    fn events(&self) -> Option<Events> {
        self.touch();
        self.events.clone()
    }
}
