//! Startup orchestration and the run loop.
//!
//! # Responsibilities
//! - Initialize the service, then query its capabilities once
//! - Install signal handlers and bind every listener before any task starts
//! - Run one task per capability (plus a stop task per long-lived server)
//! - First error wins: cancel the shared context, wait for every task
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal and leaves nothing running
//! - Cancellation is cooperative; the context is the only shared state
//! - Stop routines are bounded by the configured grace period

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};

use crate::bus::MessageBus;
use crate::config::{loader, ConfigError, ServiceConfig};
use crate::error::Error;
use crate::http::RestServer;
use crate::lifecycle::shutdown::{LifecycleHandle, LifecycleState, Status};
use crate::lifecycle::signals::{SignalListener, StopSignal};
use crate::lifecycle::tasks::{join_error_message, TaskGroup};
use crate::lifecycle::Context;
use crate::net::listener::{self, ListenerError};
use crate::service::{CloudService, Events, RpcServer};

/// Why a run ended badly.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("failed to init service: {0}")]
    Init(#[source] Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("service listens for events but exposes no message bus")]
    MissingBus,

    #[error("failed to bind {capability} listener: {source}")]
    Listener {
        capability: &'static str,
        #[source]
        source: ListenerError,
    },

    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] std::io::Error),

    #[error("received an error during serving: {0}")]
    Serve(#[source] Error),

    #[error("service panicked: {0}")]
    Panicked(String),
}

/// The capabilities a service exposed after `init`.
///
/// Event subscriptions without a bus are rejected on construction.
pub struct Capabilities {
    rest: Option<Router>,
    rpc: Option<Arc<dyn RpcServer>>,
    bus: Option<Arc<dyn MessageBus>>,
    events: Events,
}

impl Capabilities {
    pub fn collect<S>(service: &S) -> Result<Self, LifecycleError>
    where
        S: CloudService + ?Sized,
    {
        let events = service.events().unwrap_or_default();
        let bus = service.bus();
        if !events.is_empty() && bus.is_none() {
            return Err(LifecycleError::MissingBus);
        }
        Ok(Self {
            rest: service.rest(),
            rpc: service.rpc(),
            bus,
            events,
        })
    }

    pub fn has_rest(&self) -> bool {
        self.rest.is_some()
    }

    pub fn has_rpc(&self) -> bool {
        self.rpc.is_some()
    }

    pub fn has_bus(&self) -> bool {
        self.bus.is_some()
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.events.keys().map(String::as_str)
    }
}

/// Everything a run needs, acquired before the first task is spawned.
struct Prepared {
    rest: Option<RestServer>,
    rpc: Option<(Arc<dyn RpcServer>, TcpListener)>,
    bus: Option<Arc<dyn MessageBus>>,
    events: Events,
    signals: SignalListener,
}

/// Brings a [`CloudService`] up, runs its capabilities concurrently and
/// shuts them down together.
pub struct Orchestrator {
    config: ServiceConfig,
    stop_signals: Vec<StopSignal>,
    ctx: Context,
    status: watch::Sender<Status>,
}

impl Orchestrator {
    pub fn new(config: ServiceConfig) -> Self {
        let (status, _) = watch::channel(Status::default());
        Self {
            config,
            stop_signals: StopSignal::DEFAULT.to_vec(),
            ctx: Context::background(),
            status,
        }
    }

    /// Replace the OS signals that trigger shutdown. An empty set disables
    /// signal handling.
    pub fn with_stop_signals<I>(mut self, signals: I) -> Self
    where
        I: IntoIterator<Item = StopSignal>,
    {
        self.stop_signals = signals.into_iter().collect();
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn handle(&self) -> LifecycleHandle {
        LifecycleHandle::new(self.ctx.clone(), self.status.subscribe())
    }

    /// Run `service` until a stop signal, an external shutdown or the first
    /// capability failure; returns once every task has finished.
    pub async fn run<S>(self, mut service: S) -> Result<(), LifecycleError>
    where
        S: CloudService,
    {
        tracing::info!("Initializing service");
        if let Err(err) = service.init(&self.ctx).await {
            tracing::error!(error = %err, "Failed to init service");
            self.transition(LifecycleState::Failed);
            return Err(LifecycleError::Init(err));
        }
        self.transition(LifecycleState::Initialized);

        let prepared = match self.prepare(&service).await {
            Ok(prepared) => prepared,
            Err(err) => {
                tracing::error!(error = %err, "Failed to start service");
                self.transition(LifecycleState::Failed);
                return Err(err);
            }
        };

        self.serve(prepared).await
    }

    /// [`Orchestrator::run`] on its own task, so a panic ends the run with
    /// an error instead of unwinding through the caller.
    pub async fn run_guarded<S>(self, service: S) -> Result<(), LifecycleError>
    where
        S: CloudService + 'static,
    {
        match tokio::spawn(self.run(service)).await {
            Ok(result) => result,
            Err(err) => {
                let message = join_error_message(err);
                tracing::error!(message = %message, "panic");
                Err(LifecycleError::Panicked(message))
            }
        }
    }

    async fn prepare<S>(&self, service: &S) -> Result<Prepared, LifecycleError>
    where
        S: CloudService,
    {
        let capabilities = Capabilities::collect(service)?;
        let signals =
            SignalListener::install(&self.stop_signals).map_err(LifecycleError::Signals)?;

        let grace_period = self.config.shutdown.grace_period;
        let rest = match capabilities.rest {
            Some(handler) => Some(
                RestServer::bind(&self.config.rest, handler, grace_period)
                    .await
                    .map_err(|source| LifecycleError::Listener {
                        capability: "rest",
                        source,
                    })?,
            ),
            None => None,
        };

        let rpc = match capabilities.rpc {
            Some(server) => {
                let listener = listener::bind(&self.config.rpc.listen).await.map_err(
                    |source| LifecycleError::Listener {
                        capability: "rpc",
                        source,
                    },
                )?;
                Some((server, listener))
            }
            None => None,
        };

        Ok(Prepared {
            rest,
            rpc,
            bus: capabilities.bus,
            events: capabilities.events,
            signals,
        })
    }

    async fn serve(self, prepared: Prepared) -> Result<(), LifecycleError> {
        let Prepared {
            rest,
            rpc,
            bus,
            events,
            mut signals,
        } = prepared;

        // Every task watches `group`; the first failure cancels it.
        let group = self.ctx.child();
        let grace_period = self.config.shutdown.grace_period;
        let mut tasks = TaskGroup::new();
        let mut capabilities: Vec<&'static str> = Vec::new();
        let mut status = Status {
            state: LifecycleState::Running,
            ..Status::default()
        };

        if let Some(server) = rest {
            let addr = server.local_addr();
            status.rest_addr = Some(addr);
            capabilities.push("rest");
            tracing::info!(capability = "rest", address = %addr, "Starting server");

            let (stop_tx, stop_rx) = oneshot::channel::<()>();
            tasks.spawn("rest", async move {
                server
                    .serve(async move {
                        let _ = stop_rx.await;
                    })
                    .await
            });
            let ctx = group.clone();
            tasks.spawn("rest-shutdown", async move {
                ctx.done().await;
                tracing::info!(capability = "rest", "Shutting down server");
                let _ = stop_tx.send(());
                Ok(())
            });
        }

        if let Some((server, rpc_listener)) = rpc {
            let addr = listener::local_addr(&rpc_listener);
            status.rpc_addr = Some(addr);
            capabilities.push("rpc");
            tracing::info!(capability = "rpc", address = %addr, "Starting server");

            let serving = server.clone();
            tasks.spawn("rpc", async move {
                serving.serve(rpc_listener).await
            });
            let ctx = group.clone();
            tasks.spawn("rpc-shutdown", async move {
                ctx.done().await;
                tracing::info!(capability = "rpc", "Shutting down server");
                if tokio::time::timeout(grace_period, server.graceful_stop())
                    .await
                    .is_err()
                {
                    tracing::warn!(
                        capability = "rpc",
                        grace_period = ?grace_period,
                        "Graceful rpc stop timed out; stopping abruptly"
                    );
                    server.stop().await;
                }
                Ok(())
            });
        }

        if let Some(bus) = &bus {
            capabilities.push("events");
            for (topic, handler) in events {
                tracing::info!(capability = "events", topic = %topic, "Subscribing for events");
                let bus = bus.clone();
                let ctx = group.clone();
                tasks.spawn(format!("events:{topic}"), async move {
                    bus.subscribe(&ctx, &topic, handler).await
                });
            }
        }

        let root = self.ctx.clone();
        let ctx = group.clone();
        tasks.spawn("signals", async move {
            tokio::select! {
                signal = signals.recv() => {
                    tracing::info!(capability = "signals", signal = %signal, "Received stop signal");
                    root.cancel();
                }
                _ = ctx.done() => {}
            }
            Ok(())
        });

        self.status.send_replace(status);
        tracing::info!(
            state = %LifecycleState::Running,
            capabilities = ?capabilities,
            tasks = tasks.len(),
            "Lifecycle transition"
        );

        let mut first_error: Option<Error> = None;
        let mut shutting_down = false;
        loop {
            tokio::select! {
                joined = tasks.join_next() => {
                    let Some((task, result)) = joined else { break };
                    let Err(err) = result else { continue };

                    // A task reporting the cancellation it was asked to honour.
                    if err.context_error().is_some() && group.is_done() {
                        tracing::debug!(task = %task, "Task acknowledged shutdown");
                        continue;
                    }

                    if first_error.is_none() {
                        tracing::error!(task = %task, error = %err, "Task failed; shutting down");
                        group.cancel();
                        first_error = Some(err);
                    } else {
                        tracing::warn!(task = %task, error = %err, "Task failed during shutdown");
                    }
                }
                _ = group.done(), if !shutting_down => {
                    shutting_down = true;
                    self.transition(LifecycleState::ShuttingDown);
                }
            }
        }

        if let Some(bus) = bus {
            if let Err(err) = bus.close().await {
                tracing::warn!(capability = "bus", error = %err, "Failed to close message bus");
            }
        }
        self.transition(LifecycleState::Stopped);

        match first_error {
            Some(err) => {
                tracing::error!(error = %err, "Received an error during serving");
                Err(LifecycleError::Serve(err))
            }
            None => Ok(()),
        }
    }

    fn transition(&self, state: LifecycleState) {
        tracing::info!(capability = "service", state = %state, "Lifecycle transition");
        self.status.send_modify(|status| status.state = state);
    }
}

/// Load configuration from the environment and run `service` with the default
/// stop signals until it stops.
pub async fn start<S>(service: S) -> Result<(), LifecycleError>
where
    S: CloudService + 'static,
{
    let config = match loader::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "Failed to load configuration");
            return Err(err.into());
        }
    };
    Orchestrator::new(config).run_guarded(service).await
}
