//! Named task set for a run.
//!
//! Every task carries the name of the capability it belongs to, so a failure
//! (a panic included) can be attributed when it is reported.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;

use tokio::task::{Id, JoinError, JoinSet};

use crate::error::{Error, ErrorKind};

#[derive(Default)]
pub(crate) struct TaskGroup {
    tasks: JoinSet<Result<(), Error>>,
    names: HashMap<Id, String>,
}

impl TaskGroup {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn spawn<F>(&mut self, name: impl Into<String>, task: F)
    where
        F: Future<Output = Result<(), Error>> + Send + 'static,
    {
        let handle = self.tasks.spawn(task);
        self.names.insert(handle.id(), name.into());
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Next finished task with its name. A panic becomes an
    /// [`ErrorKind::Unexpected`] error.
    pub(crate) async fn join_next(&mut self) -> Option<(String, Result<(), Error>)> {
        let (id, result) = match self.tasks.join_next_with_id().await? {
            Ok((id, result)) => (id, result),
            Err(err) => {
                let id = err.id();
                let detail = join_error_message(err);
                (id, Err(Error::with_detail(ErrorKind::Unexpected, detail)))
            }
        };
        let name = self
            .names
            .remove(&id)
            .unwrap_or_else(|| format!("task-{id}"));
        Some((name, result))
    }
}

pub(crate) fn join_error_message(err: JoinError) -> String {
    if !err.is_panic() {
        return "task cancelled".to_string();
    }
    panic_message(err.into_panic())
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("task panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("task panicked: {message}")
    } else {
        "task panicked".to_string()
    }
}
