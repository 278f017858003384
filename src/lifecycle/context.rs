//! Cancellable context shared by every task of a run.
//!
//! A context finishes exactly once, either because it was cancelled or because
//! its deadline passed; the first cause wins. Cancelling a context finishes all
//! of its descendants, never its ancestors.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::select_all;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::ContextError;

/// Handle to a node in a cancellation tree. Clones share the same node.
#[derive(Debug, Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    cause: watch::Sender<Option<ContextError>>,
    parent: Option<Context>,
    deadline: Option<Instant>,
}

impl Context {
    /// A root context that only finishes when cancelled.
    pub fn background() -> Self {
        Self::node(None, None)
    }

    /// A context that finishes when `self` does, or when cancelled itself.
    pub fn child(&self) -> Self {
        Self::node(Some(self.clone()), None)
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(&self, deadline: Instant) -> Self {
        Self::node(Some(self.clone()), Some(deadline))
    }

    fn node(parent: Option<Context>, deadline: Option<Instant>) -> Self {
        let (cause, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                cause,
                parent,
                deadline,
            }),
        }
    }

    /// Cancel this context and its descendants.
    ///
    /// Returns `false` if the context had already finished.
    pub fn cancel(&self) -> bool {
        if self.err().is_some() {
            return false;
        }
        self.record(ContextError::Canceled)
    }

    /// The reason this context finished, or `None` while it is still live.
    pub fn err(&self) -> Option<ContextError> {
        if let Some(cause) = *self.inner.cause.borrow() {
            return Some(cause);
        }
        if let Some(cause) = self.inner.parent.as_ref().and_then(Context::err) {
            return Some(self.finish(cause));
        }
        match self.inner.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                Some(self.finish(ContextError::DeadlineExceeded))
            }
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// The earliest deadline governing this context, inherited or its own.
    pub fn deadline(&self) -> Option<Instant> {
        let inherited = self.inner.parent.as_ref().and_then(Context::deadline);
        earliest(inherited, self.inner.deadline)
    }

    /// Wait until this context finishes and return why.
    pub async fn done(&self) -> ContextError {
        if let Some(cause) = self.err() {
            return cause;
        }

        let mut receivers = Vec::new();
        let mut node = Some(self);
        while let Some(ctx) = node {
            receivers.push(Box::pin(wait_cause(ctx.inner.cause.subscribe())));
            node = ctx.inner.parent.as_ref();
        }
        let signalled = select_all(receivers);

        let cause = match self.deadline() {
            Some(deadline) => tokio::select! {
                (cause, _, _) = signalled => cause,
                _ = tokio::time::sleep_until(deadline) => ContextError::DeadlineExceeded,
            },
            None => signalled.await.0,
        };
        self.finish(cause)
    }

    /// Record `cause` unless another one got there first; returns the winner.
    fn finish(&self, cause: ContextError) -> ContextError {
        self.record(cause);
        (*self.inner.cause.borrow()).unwrap_or(cause)
    }

    fn record(&self, cause: ContextError) -> bool {
        self.inner.cause.send_if_modified(|current| match current {
            Some(_) => false,
            None => {
                *current = Some(cause);
                true
            }
        })
    }
}

async fn wait_cause(mut rx: watch::Receiver<Option<ContextError>>) -> ContextError {
    loop {
        if let Some(cause) = *rx.borrow_and_update() {
            return cause;
        }
        if rx.changed().await.is_err() {
            return std::future::pending().await;
        }
    }
}

fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}
