//! In-process message bus.

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::bus::{EventHandler, MessageBus};
use crate::error::{Error, ErrorKind};
use crate::lifecycle::Context;

/// A [`MessageBus`] that never leaves the process.
///
/// Each subscription owns an unbounded channel; publishing fans a copy of the
/// payload out to every live subscription of the topic. Messages published
/// before a subscription registers are not replayed to it.
#[derive(Debug)]
pub struct MemoryBus {
    topics: DashMap<String, Vec<mpsc::UnboundedSender<Vec<u8>>>>,
    closed: Context,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self {
            topics: DashMap::new(),
            closed: Context::background(),
        }
    }

    /// Live subscriptions on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .get(topic)
            .map(|subs| subs.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_done()
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn publish(&self, ctx: &Context, topic: &str, msg: Vec<u8>) -> Result<(), Error> {
        if self.is_closed() {
            return Err(Error::new(ErrorKind::ConnectionClosed));
        }
        if let Some(cause) = ctx.err() {
            return Err(cause.into());
        }

        let delivered = match self.topics.get_mut(topic) {
            Some(mut subs) => {
                subs.retain(|tx| tx.send(msg.clone()).is_ok());
                subs.len()
            }
            None => 0,
        };
        tracing::trace!(topic, delivered, "message published");
        Ok(())
    }

    async fn subscribe(
        &self,
        ctx: &Context,
        topic: &str,
        handler: EventHandler,
    ) -> Result<(), Error> {
        if self.is_closed() {
            return Err(Error::new(ErrorKind::ConnectionClosed));
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        self.topics.entry(topic.to_string()).or_default().push(tx);
        tracing::debug!(topic, "subscription registered");

        loop {
            tokio::select! {
                biased;
                cause = ctx.done() => return Err(cause.into()),
                _ = self.closed.done() => return Err(Error::new(ErrorKind::ConnectionClosed)),
                msg = rx.recv() => match msg {
                    Some(msg) => handler(ctx.clone(), msg).await,
                    None => return Err(Error::new(ErrorKind::ConnectionClosed)),
                },
            }
        }
    }

    async fn close(&self) -> Result<(), Error> {
        if self.closed.cancel() {
            tracing::debug!("memory bus closed");
        }
        self.topics.clear();
        Ok(())
    }
}
