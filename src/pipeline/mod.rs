//! Pipeline orchestration: registration, validation, and the run lifecycle.
//!
//! A [`Pipeline`] is an explicit collection of [`Node`]s. It validates the
//! whole graph before anything runs, spawns one worker per (node, replica)
//! pair, and exposes bulk start/join/kill operations. There is no scheduler
//! beyond that: once started, workers coordinate only through their shared
//! queues and finished flags, and each one decides for itself when its input
//! is exhausted.
//!
//! # Examples
//!
//! ```no_run
//! use pipeweave::pipeline::Pipeline;
//! # use pipeweave::node::Node;
//! # async fn demo(source: Node, target: Node) -> miette::Result<()> {
//! let pipeline = Pipeline::builder().node(source).node(target).build()?;
//!
//! pipeline.validate()?;
//! pipeline.run().await?;
//! # Ok(())
//! # }
//! ```

mod execution;

use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::future::join_all;
use miette::Diagnostic;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use crate::node::{Node, NodeError};
use self::execution::{Worker, spawn_worker};

pub use self::execution::WorkerFailure;

/// A validated set of nodes run as one unit.
///
/// Built with [`Pipeline::builder`]. All operations take `&self`; the worker
/// table lives behind a mutex so `kill` can be called from another task while
/// `wait_for_exit` is pending.
#[derive(Debug)]
pub struct Pipeline {
    nodes: Vec<Node>,
    started: AtomicBool,
    workers: Mutex<Vec<Worker>>,
}

impl Pipeline {
    /// Start assembling a pipeline.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder { nodes: Vec::new() }
    }

    /// The registered nodes, in registration order.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Total number of workers this pipeline allocates: the sum of every
    /// node's replica count.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.nodes.iter().map(Node::replicas).sum()
    }

    /// Number of spawned workers that have not yet exited. Zero before
    /// [`run_async`](Self::run_async) and after [`wait_for_exit`](Self::wait_for_exit).
    #[must_use]
    pub fn workers_alive(&self) -> usize {
        self.workers
            .lock()
            .iter()
            .filter(|worker| !worker.handle.is_finished())
            .count()
    }

    /// Validate every node and the shape of the graph as a whole.
    ///
    /// Each node's own validation runs first (role shape, every connector
    /// wired). Then any node whose connections reach no other node registered
    /// with *this* pipeline is rejected: it would either starve or leak data
    /// into queues nothing drains.
    ///
    /// Read-only and repeatable.
    #[instrument(skip(self), err)]
    pub fn validate(&self) -> Result<(), PipelineError> {
        for node in &self.nodes {
            node.validate()?;
        }

        let declared: FxHashSet<Uuid> = self.nodes.iter().map(Node::id).collect();
        for node in &self.nodes {
            let reaches_declared = node
                .neighbor_ids()
                .iter()
                .any(|id| *id != node.id() && declared.contains(id));
            if !reaches_declared {
                return Err(PipelineError::OrphanedNode {
                    node: node.name().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Validate, then spawn every worker without blocking.
    ///
    /// Allocates one tokio task per (node, replica) pair. Must be called from
    /// within a tokio runtime. A pipeline starts at most once; a node shared
    /// with another pipeline cannot be started a second time either.
    #[instrument(skip(self), err)]
    pub fn run_async(&self) -> Result<(), PipelineError> {
        self.validate()?;

        if self.started.swap(true, Ordering::SeqCst) {
            return Err(PipelineError::AlreadyStarted);
        }
        for node in &self.nodes {
            if !node.mark_started() {
                return Err(PipelineError::NodeAlreadyStarted {
                    node: node.name().to_string(),
                });
            }
        }

        let mut workers = self.workers.lock();
        for node in &self.nodes {
            for replica in 0..node.replicas() {
                workers.push(spawn_worker(node, replica));
            }
        }
        tracing::info!(
            nodes = self.nodes.len(),
            workers = workers.len(),
            "pipeline started"
        );
        Ok(())
    }

    /// Block until every spawned worker has exited.
    ///
    /// Workers that were killed count as exited, not failed. Task errors and
    /// panics are collected into [`PipelineError::Workers`] after *all*
    /// workers have been joined; one bad replica never cuts the join short.
    pub async fn wait_for_exit(&self) -> Result<(), PipelineError> {
        let workers: Vec<Worker> = std::mem::take(&mut *self.workers.lock());
        let mut identities = Vec::with_capacity(workers.len());
        let mut handles = Vec::with_capacity(workers.len());
        for worker in workers {
            identities.push((worker.node, worker.replica));
            handles.push(worker.handle);
        }

        let results = join_all(handles).await;
        let mut failures = Vec::new();
        for ((node, replica), result) in identities.into_iter().zip(results) {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    tracing::error!(node = %node, replica, error = %error, "worker failed");
                    failures.push(WorkerFailure::new(node, replica, error.to_string()));
                }
                Err(join_error) if join_error.is_cancelled() => {
                    tracing::debug!(node = %node, replica, "worker killed");
                }
                Err(join_error) => {
                    tracing::error!(node = %node, replica, error = %join_error, "worker panicked");
                    failures.push(WorkerFailure::new(
                        node,
                        replica,
                        format!("worker panicked: {join_error}"),
                    ));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::Workers { failures })
        }
    }

    /// Request immediate termination of every worker.
    ///
    /// Cancellation lands at the worker's next suspension point (a queue read
    /// or write); teardown does not run and buffered data is lost. Safe to
    /// call repeatedly and on a pipeline whose workers already exited.
    pub fn kill(&self) {
        let workers = self.workers.lock();
        for worker in workers.iter() {
            worker.handle.abort();
        }
        tracing::info!(workers = workers.len(), "pipeline kill requested");
    }

    /// [`run_async`](Self::run_async) followed by
    /// [`wait_for_exit`](Self::wait_for_exit).
    pub async fn run(&self) -> Result<(), PipelineError> {
        self.run_async()?;
        self.wait_for_exit().await
    }
}

/// Builder returned by [`Pipeline::builder`].
pub struct PipelineBuilder {
    nodes: Vec<Node>,
}

impl PipelineBuilder {
    /// Register a node with the pipeline.
    #[must_use]
    pub fn node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    /// Assemble the pipeline. Fails if two nodes share a name, since names
    /// identify workers in logs and failure reports.
    pub fn build(self) -> Result<Pipeline, PipelineError> {
        let mut seen = FxHashSet::default();
        for node in &self.nodes {
            if !seen.insert(node.name().to_string()) {
                return Err(PipelineError::DuplicateNode {
                    node: node.name().to_string(),
                });
            }
        }
        Ok(Pipeline {
            nodes: self.nodes,
            started: AtomicBool::new(false),
            workers: Mutex::new(Vec::new()),
        })
    }
}

/// Errors raised by pipeline assembly, validation, and execution.
#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    /// A node failed its own validation.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Node(#[from] NodeError),

    /// Two registered nodes share a name.
    #[error("node {node} is registered more than once")]
    #[diagnostic(
        code(pipeweave::pipeline::duplicate_node),
        help("Give each node a unique name; names identify workers in logs and reports.")
    )]
    DuplicateNode { node: String },

    /// A node's connections reach no other node in this pipeline.
    #[error("orphaned node {node}: no connection reaches another node in this pipeline")]
    #[diagnostic(
        code(pipeweave::pipeline::orphaned_node),
        help("Wire the node to another registered node, or remove it from the pipeline.")
    )]
    OrphanedNode { node: String },

    /// The pipeline was started a second time.
    #[error("pipeline has already been started")]
    #[diagnostic(code(pipeweave::pipeline::already_started))]
    AlreadyStarted,

    /// A node was already started, by this pipeline or another one.
    #[error("node {node} has already been started")]
    #[diagnostic(code(pipeweave::pipeline::node_already_started))]
    NodeAlreadyStarted { node: String },

    /// One or more workers exited with an error or panic.
    #[error("{} worker(s) exited with errors", .failures.len())]
    #[diagnostic(code(pipeweave::pipeline::worker_failures))]
    Workers { failures: Vec<WorkerFailure> },
}
