//! Shutdown coordination and run status.

use std::fmt;
use std::net::SocketAddr;

use tokio::sync::watch;

use crate::lifecycle::Context;

/// Where a run is in its lifecycle.
///
/// `Created → Initialized → Running → ShuttingDown → Stopped`, or
/// `Created → Failed` when start-up fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum LifecycleState {
    #[default]
    Created,
    Initialized,
    Running,
    ShuttingDown,
    Stopped,
    Failed,
}

impl LifecycleState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Stopped | LifecycleState::Failed)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Created => "created",
            LifecycleState::Initialized => "initialized",
            LifecycleState::Running => "running",
            LifecycleState::ShuttingDown => "shutting down",
            LifecycleState::Stopped => "stopped",
            LifecycleState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Snapshot of a run: its state and the addresses its servers are bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Status {
    pub state: LifecycleState,
    pub rest_addr: Option<SocketAddr>,
    pub rpc_addr: Option<SocketAddr>,
}

/// Handle for observing a run and triggering its shutdown from outside.
#[derive(Debug, Clone)]
pub struct LifecycleHandle {
    ctx: Context,
    status: watch::Receiver<Status>,
}

impl LifecycleHandle {
    pub(crate) fn new(ctx: Context, status: watch::Receiver<Status>) -> Self {
        Self { ctx, status }
    }

    /// Trigger a graceful shutdown. Returns `false` if one was already
    /// underway.
    pub fn shutdown(&self) -> bool {
        self.ctx.cancel()
    }

    /// The root context of the run.
    pub fn context(&self) -> Context {
        self.ctx.clone()
    }

    pub fn status(&self) -> Status {
        *self.status.borrow()
    }

    /// Wait until the run reaches `state` (or any later one).
    ///
    /// A failed run satisfies every wait, so callers never hang on a run that
    /// did not start.
    pub async fn wait_for(&self, state: LifecycleState) -> Status {
        let mut rx = self.status.clone();
        let status = match rx
            .wait_for(|status| status.state >= state || status.state == LifecycleState::Failed)
            .await
        {
            Ok(status) => *status,
            // Orchestrator dropped; report whatever was last published.
            Err(_) => *self.status.borrow(),
        };
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_for_later_state() {
        let (tx, rx) = watch::channel(Status::default());
        let handle = LifecycleHandle::new(Context::background(), rx);

        let waiter = tokio::spawn({
            let handle = handle.clone();
            async move { handle.wait_for(LifecycleState::Running).await }
        });
        tx.send_modify(|s| s.state = LifecycleState::ShuttingDown);

        let status = waiter.await.unwrap();
        assert_eq!(status.state, LifecycleState::ShuttingDown);
    }

    #[tokio::test]
    async fn test_failed_releases_waiters() {
        let (tx, rx) = watch::channel(Status::default());
        let handle = LifecycleHandle::new(Context::background(), rx);
        tx.send_modify(|s| s.state = LifecycleState::Failed);

        let status = handle.wait_for(LifecycleState::Running).await;
        assert_eq!(status.state, LifecycleState::Failed);
    }

    #[tokio::test]
    async fn test_wait_for_after_orchestrator_dropped() {
        let (tx, rx) = watch::channel(Status::default());
        let handle = LifecycleHandle::new(Context::background(), rx);
        tx.send_modify(|s| s.state = LifecycleState::Initialized);
        drop(tx);

        let status = handle.wait_for(LifecycleState::Stopped).await;
        assert_eq!(status.state, LifecycleState::Initialized);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let (_tx, rx) = watch::channel(Status::default());
        let handle = LifecycleHandle::new(Context::background(), rx);
        assert!(handle.shutdown());
        assert!(!handle.shutdown());
        assert!(handle.context().is_done());
    }
}
