//! Per-replica worker driver.
//!
//! One tokio task is spawned per (node, replica) pair. Each runs the task's
//! lifecycle phases in order and publishes the replica's finished flag only
//! after teardown completes, which is what downstream completion detection
//! reads.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::node::{Node, NodeStatus, Task, TaskError};

/// A spawned worker and the identity it reports under.
#[derive(Debug)]
pub(crate) struct Worker {
    pub(crate) node: String,
    pub(crate) replica: usize,
    pub(crate) handle: JoinHandle<Result<(), TaskError>>,
}

pub(crate) fn spawn_worker(node: &Node, replica: usize) -> Worker {
    let task = node.task_handle();
    let status = node.status_handle();
    let name = node.name().to_string();
    let span = tracing::info_span!("worker", node = %name, replica);
    let handle = tokio::spawn(drive(task, status, replica).instrument(span));
    Worker {
        node: name,
        replica,
        handle,
    }
}

/// Run one replica through setup, action, and teardown.
///
/// An `Err` from any phase is fatal to this replica: the remaining phases do
/// not run and the finished flag stays unset. Teardown does run when `action`
/// exits early with `Ok`. The flag is published strictly after teardown, so a
/// consumer that observes it can trust that this replica will enqueue nothing
/// further.
async fn drive(
    task: Arc<dyn Task>,
    status: Arc<NodeStatus>,
    replica: usize,
) -> Result<(), TaskError> {
    tracing::debug!("worker starting");
    task.setup().await?;
    task.action().await?;
    task.teardown().await?;
    status.mark_finished(replica);
    tracing::debug!("worker finished");
    Ok(())
}

/// Record of one worker that did not exit cleanly.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerFailure {
    /// Name of the node the worker belonged to.
    pub node: String,
    /// Replica index within the node.
    pub replica: usize,
    /// When the failure was observed.
    pub when: DateTime<Utc>,
    /// Rendered error or panic message.
    pub message: String,
}

impl WorkerFailure {
    pub(crate) fn new(node: String, replica: usize, message: String) -> Self {
        Self {
            node,
            replica,
            when: Utc::now(),
            message,
        }
    }
}
