//! REST server setup and configuration.
//!
//! # Responsibilities
//! - Wrap the service's handler with the timeout stack
//! - Wire up middleware (tracing, request ID, request dumping)
//! - Serve HTTP/1.1 and HTTP/2 connections from a bound listener
//! - Drain in-flight connections on shutdown, bounded by the grace period

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    error_handling::HandleErrorLayer,
    extract::Request,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    BoxError, Router,
};
use hyper_util::{
    rt::{TokioExecutor, TokioIo, TokioTimer},
    server::{conn::auto, graceful::GracefulShutdown},
    service::TowerToHyperService,
};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::{RequestBodyTimeoutLayer, TimeoutLayer},
    trace::TraceLayer,
};

use crate::config::RestConfig;
use crate::error::Error;
use crate::net::listener::{self, ListenerError};

/// Extra time the transport gives a response beyond the handler timeout, so
/// the handler's own timeout response can still be written.
pub const WRITE_TIMEOUT_MARGIN: Duration = Duration::from_secs(2);

/// Body written when a handler runs past the write timeout.
pub const TIMEOUT_BODY: &str = "timeout";

#[derive(Debug, thiserror::Error)]
#[error("timeout")]
struct HandlerTimeout;

/// REST server bound to its listener, ready to serve.
pub struct RestServer {
    listener: TcpListener,
    app: Router,
    config: RestConfig,
    grace_period: Duration,
}

impl RestServer {
    /// Bind the configured address and prepare `handler` for serving.
    pub async fn bind(
        config: &RestConfig,
        handler: Router,
        grace_period: Duration,
    ) -> Result<Self, ListenerError> {
        let listener = listener::bind(&config.listen).await?;
        Ok(Self {
            listener,
            app: build_router(handler, config),
            config: config.clone(),
            grace_period,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        listener::local_addr(&self.listener)
    }

    /// Accept connections until `shutdown` resolves, then drain.
    ///
    /// Connections still open once the grace period has elapsed are aborted,
    /// along with the requests they are serving.
    pub async fn serve<F>(self, shutdown: F) -> Result<(), Error>
    where
        F: Future<Output = ()> + Send,
    {
        let addr = self.local_addr();
        tracing::info!(address = %addr, "REST server starting");

        let mut builder = auto::Builder::new(TokioExecutor::new());
        builder
            .http1()
            .timer(TokioTimer::new())
            .header_read_timeout(self.config.read_header_timeout);

        let graceful = GracefulShutdown::new();
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to accept connection");
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            continue;
                        }
                    };
                    let service = TowerToHyperService::new(self.app.clone());
                    let conn = builder.serve_connection_with_upgrades(TokioIo::new(stream), service);
                    let conn = graceful.watch(conn.into_owned());
                    connections.spawn(async move {
                        if let Err(e) = conn.await {
                            tracing::debug!(peer = %peer, error = %e, "Connection closed with error");
                        }
                    });
                }
                // Reap finished connections.
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                _ = &mut shutdown => break,
            }
        }

        drop(self.listener);
        tracing::info!(address = %addr, "REST server draining connections");
        if tokio::time::timeout(self.grace_period, graceful.shutdown())
            .await
            .is_err()
        {
            tracing::warn!(
                grace_period = ?self.grace_period,
                connections = connections.len(),
                "Grace period elapsed; aborting remaining connections"
            );
            connections.abort_all();
        }
        while connections.join_next().await.is_some() {}

        tracing::info!(address = %addr, "REST server stopped");
        Ok(())
    }
}

/// Wrap `handler` with the middleware stack.
///
/// The handler itself may run for at most `write_timeout`; the transport
/// allows `write_timeout + WRITE_TIMEOUT_MARGIN` for the whole response.
#[allow(deprecated)]
pub fn build_router(handler: Router, config: &RestConfig) -> Router {
    let mut router = handler
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_middleware_error))
                .timeout(config.write_timeout),
        )
        .layer(RequestBodyTimeoutLayer::new(config.read_timeout))
        .layer(TimeoutLayer::new(config.write_timeout + WRITE_TIMEOUT_MARGIN));

    if config.dump_requests {
        router = router.layer(middleware::from_fn(dump_request));
    }

    router
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

async fn handle_middleware_error(err: BoxError) -> Response {
    if err.is::<tower::timeout::error::Elapsed>() {
        tracing::warn!("Handler exceeded the write timeout");
        return Error::other(HandlerTimeout).into_response();
    }
    Error::other(err).into_response()
}

async fn dump_request(request: Request, next: Next) -> Response {
    tracing::debug!(
        method = %request.method(),
        uri = %request.uri(),
        version = ?request.version(),
        headers = ?request.headers(),
        "Incoming request"
    );
    next.run(request).await
}
