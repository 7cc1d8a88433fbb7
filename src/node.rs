//! Node construction and the worker lifecycle.
//!
//! A [`Node`] couples one [`Task`] implementation with the connectors it
//! owns, a replica count, and shared completion state. Every replica runs the
//! task's `setup`, `action`, and `teardown` phases once, in that order, then
//! publishes a finished flag that downstream nodes read to decide whether
//! more data can still arrive.
//!
//! Connectors are registered explicitly on the builder; nothing is discovered
//! by inspecting the task value.
//!
//! # Roles
//!
//! A node declares what kind of participant it is, and validation checks the
//! declaration against the registered connectors:
//!
//! - [`Role::Source`]: only outputs; seeds the graph and never waits on the
//!   completion protocol.
//! - [`Role::Target`]: only inputs; drains the graph.
//! - [`Role::Inline`]: any mix of inputs and outputs; transforms data in
//!   transit.
//!
//! # Examples
//!
//! ```
//! use async_trait::async_trait;
//! use pipeweave::connectors::Output;
//! use pipeweave::node::{Node, Task, TaskError};
//!
//! struct Countdown {
//!     out: Output<u32>,
//! }
//!
//! #[async_trait]
//! impl Task for Countdown {
//!     async fn action(&self) -> Result<(), TaskError> {
//!         for n in (0..3).rev() {
//!             self.out.put(n).await?;
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let countdown = Countdown { out: Output::new("counts") };
//! let node = Node::source("countdown")
//!     .output(&countdown.out)
//!     .build(countdown)?;
//! assert_eq!(node.replicas(), 1);
//! # Ok::<(), pipeweave::node::NodeError>(())
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::connectors::errors::{RecvError, SendError};
use crate::connectors::{ErasedPort, Input, Output};

// ============================================================================
// Task trait
// ============================================================================

/// The unit of work a node runs, once per replica.
///
/// Implementations hold their own connectors as fields and use them from
/// `action`. Replicas share one task value through an `Arc`, so any mutable
/// state needs interior mutability; connectors are already safe to share.
///
/// The three phases run in a fixed order. `teardown` runs whenever `action`
/// returns `Ok`, including early exits from the processing loop; an `Err`
/// from any phase is fatal to that replica and skips the remaining phases.
#[async_trait]
pub trait Task: Send + Sync + 'static {
    /// One-time preparation before `action`.
    async fn setup(&self) -> Result<(), TaskError> {
        Ok(())
    }

    /// The node's processing loop.
    async fn action(&self) -> Result<(), TaskError>;

    /// Cleanup after `action` returns normally.
    async fn teardown(&self) -> Result<(), TaskError> {
        Ok(())
    }
}

/// Errors surfaced by [`Task`] implementations.
#[derive(Debug, Error, Diagnostic)]
pub enum TaskError {
    /// A connector send failed.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Send(#[from] SendError),

    /// A connector receive failed.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Recv(#[from] RecvError),

    /// JSON serialization/deserialization error.
    #[error(transparent)]
    #[diagnostic(code(pipeweave::node::serde_json))]
    Serde(#[from] serde_json::Error),

    /// Free-form task failure.
    #[error("{message}")]
    #[diagnostic(code(pipeweave::node::task_failed))]
    Failed { message: String },
}

impl TaskError {
    /// Build a [`TaskError::Failed`] from any displayable message.
    pub fn msg(message: impl Into<String>) -> Self {
        TaskError::Failed {
            message: message.into(),
        }
    }
}

// ============================================================================
// Roles & shared status
// ============================================================================

/// Declared capability of a node, validated against its connectors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Only outputs; seeds the graph.
    Source,
    /// Inputs and outputs; transforms data in transit.
    Inline,
    /// Only inputs; drains the graph.
    Target,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Source => write!(f, "source"),
            Role::Inline => write!(f, "inline"),
            Role::Target => write!(f, "target"),
        }
    }
}

/// Completion state shared between a node's replicas and every downstream
/// consumer that needs to observe them.
///
/// Each replica owns one finished flag, written exactly once after its
/// teardown completes. The aggregate [`node_finished`](Self::node_finished)
/// is derived on demand as the conjunction over all replica flags; a node
/// configured with zero replicas is finished from the start, since no worker
/// will ever run for it.
#[derive(Debug)]
pub struct NodeStatus {
    id: Uuid,
    name: String,
    finished: Box<[AtomicBool]>,
    started: AtomicBool,
}

impl NodeStatus {
    fn new(name: impl Into<String>, replicas: usize) -> Self {
        let finished = (0..replicas).map(|_| AtomicBool::new(false)).collect();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            finished,
            started: AtomicBool::new(false),
        }
    }

    /// The node's display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of worker replicas configured for this node.
    #[must_use]
    pub fn replicas(&self) -> usize {
        self.finished.len()
    }

    /// Whether the given replica has completed its teardown.
    #[must_use]
    pub fn replica_finished(&self, replica: usize) -> bool {
        self.finished
            .get(replica)
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    /// Whether every replica has completed its teardown.
    #[must_use]
    pub fn node_finished(&self) -> bool {
        self.finished
            .iter()
            .all(|flag| flag.load(Ordering::Acquire))
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    /// Publish one replica's completion. The `Release` store pairs with the
    /// `Acquire` loads in [`node_finished`]: a consumer that observes the
    /// flag also observes every item the replica enqueued before setting it.
    pub(crate) fn mark_finished(&self, replica: usize) {
        if let Some(flag) = self.finished.get(replica) {
            flag.store(true, Ordering::Release);
        }
    }

    /// Claim the node for execution. Returns false if it was already claimed.
    pub(crate) fn mark_started(&self) -> bool {
        !self.started.swap(true, Ordering::SeqCst)
    }
}

// ============================================================================
// Node & builder
// ============================================================================

/// A pipeline node: one task, its registered connectors, a replica count,
/// and the shared completion state the protocol reads.
///
/// Cheap to clone; clones share the same task and status.
#[derive(Clone)]
pub struct Node {
    task: Arc<dyn Task>,
    status: Arc<NodeStatus>,
    role: Role,
    inputs: Vec<Arc<dyn ErasedPort>>,
    outputs: Vec<Arc<dyn ErasedPort>>,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name())
            .field("role", &self.role)
            .field("replicas", &self.replicas())
            .field("inputs", &self.inputs.len())
            .field("outputs", &self.outputs.len())
            .finish()
    }
}

impl Node {
    /// Start building a node that only produces data.
    #[must_use]
    pub fn source(name: impl Into<String>) -> NodeBuilder {
        NodeBuilder::new(name, Role::Source)
    }

    /// Start building a node that consumes and produces data.
    #[must_use]
    pub fn inline(name: impl Into<String>) -> NodeBuilder {
        NodeBuilder::new(name, Role::Inline)
    }

    /// Start building a node that only consumes data.
    #[must_use]
    pub fn target(name: impl Into<String>) -> NodeBuilder {
        NodeBuilder::new(name, Role::Target)
    }

    /// The name given at construction.
    #[must_use]
    pub fn name(&self) -> &str {
        self.status.name()
    }

    /// The declared role.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Number of worker replicas this node runs with.
    #[must_use]
    pub fn replicas(&self) -> usize {
        self.status.replicas()
    }

    /// Whether every replica has finished. See [`NodeStatus::node_finished`].
    #[must_use]
    pub fn node_finished(&self) -> bool {
        self.status.node_finished()
    }

    /// Whether one specific replica has finished.
    #[must_use]
    pub fn replica_finished(&self, replica: usize) -> bool {
        self.status.replica_finished(replica)
    }

    /// Check that the registered connectors match the declared role and that
    /// every one of them is wired.
    ///
    /// Pure and repeatable; called by pipeline validation and usable
    /// directly.
    pub fn validate(&self) -> Result<(), NodeError> {
        match self.role {
            Role::Source => {
                if !self.inputs.is_empty() {
                    return Err(NodeError::MalformedSource {
                        node: self.name().to_string(),
                    });
                }
                if self.outputs.is_empty() {
                    return Err(NodeError::OrphanedNode {
                        node: self.name().to_string(),
                        detail: "a source needs at least one output connector".to_string(),
                    });
                }
            }
            Role::Target => {
                if !self.outputs.is_empty() {
                    return Err(NodeError::MalformedTarget {
                        node: self.name().to_string(),
                    });
                }
                if self.inputs.is_empty() {
                    return Err(NodeError::OrphanedNode {
                        node: self.name().to_string(),
                        detail: "a target needs at least one input connector".to_string(),
                    });
                }
            }
            Role::Inline => {
                if self.inputs.is_empty() && self.outputs.is_empty() {
                    return Err(NodeError::OrphanedNode {
                        node: self.name().to_string(),
                        detail: "no connectors are registered".to_string(),
                    });
                }
            }
        }

        for port in self.inputs.iter().chain(self.outputs.iter()) {
            if !port.is_connected() {
                return Err(NodeError::MissingConnection {
                    node: self.name().to_string(),
                    connector: port.label().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Whether any input can still deliver data.
    ///
    /// Evaluates each input in registration order with the per-port
    /// predicate, which reads the upstream finished flag before sampling the
    /// queue (see [`Input::expecting_input`](crate::connectors::Input::expecting_input)
    /// for why that ordering matters). Sources have no inputs, so for them
    /// this is always false.
    #[must_use]
    pub fn expecting_input(&self) -> bool {
        self.inputs.iter().any(|port| port.expecting_input())
    }

    /// Names of the nodes feeding this node's inputs.
    #[must_use]
    pub fn upstream_nodes(&self) -> Vec<String> {
        neighbor_names(&self.inputs)
    }

    /// Names of the nodes fed by this node's outputs.
    #[must_use]
    pub fn downstream_nodes(&self) -> Vec<String> {
        neighbor_names(&self.outputs)
    }

    pub(crate) fn task_handle(&self) -> Arc<dyn Task> {
        Arc::clone(&self.task)
    }

    pub(crate) fn status_handle(&self) -> Arc<NodeStatus> {
        Arc::clone(&self.status)
    }

    pub(crate) fn id(&self) -> Uuid {
        self.status.id()
    }

    pub(crate) fn mark_started(&self) -> bool {
        self.status.mark_started()
    }

    /// Identities of every node reachable over one connection, in either
    /// direction.
    pub(crate) fn neighbor_ids(&self) -> Vec<Uuid> {
        self.inputs
            .iter()
            .chain(self.outputs.iter())
            .filter_map(|port| port.peer_status())
            .map(|status| status.id())
            .collect()
    }
}

fn neighbor_names(ports: &[Arc<dyn ErasedPort>]) -> Vec<String> {
    ports
        .iter()
        .filter_map(|port| port.peer_status())
        .map(|status| status.name().to_string())
        .collect()
}

/// Builder returned by [`Node::source`], [`Node::inline`], and
/// [`Node::target`].
pub struct NodeBuilder {
    name: String,
    role: Role,
    replicas: usize,
    inputs: Vec<Arc<dyn ErasedPort>>,
    outputs: Vec<Arc<dyn ErasedPort>>,
}

impl NodeBuilder {
    fn new(name: impl Into<String>, role: Role) -> Self {
        Self {
            name: name.into(),
            role,
            replicas: 1,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// How many worker replicas to run for this node. Defaults to 1. Zero is
    /// allowed: the node never runs and counts as finished immediately.
    #[must_use]
    pub fn replicas(mut self, replicas: usize) -> Self {
        self.replicas = replicas;
        self
    }

    /// Register an input connector owned by this node.
    #[must_use]
    pub fn input<T: Send + 'static>(mut self, port: &Input<T>) -> Self {
        self.inputs.push(Arc::new(port.clone()));
        self
    }

    /// Register an output connector owned by this node.
    #[must_use]
    pub fn output<T: Send + 'static>(mut self, port: &Output<T>) -> Self {
        self.outputs.push(Arc::new(port.clone()));
        self
    }

    /// Assemble the node around `task`, claiming ownership of every
    /// registered connector.
    ///
    /// Fails with [`NodeError::ConnectorAlreadyOwned`] if a connector was
    /// already registered on another node (or twice on this one). Role-shape
    /// checks happen later, in [`Node::validate`], so a half-wired node can
    /// still be constructed and inspected.
    pub fn build(self, task: impl Task) -> Result<Node, NodeError> {
        let status = Arc::new(NodeStatus::new(self.name, self.replicas));
        for port in self.inputs.iter().chain(self.outputs.iter()) {
            if !port.bind_owner(&status) {
                let owner = port
                    .owner()
                    .map(|prior| prior.name().to_string())
                    .unwrap_or_default();
                return Err(NodeError::ConnectorAlreadyOwned {
                    connector: port.label().to_string(),
                    owner,
                });
            }
        }
        tracing::debug!(
            node = %status.name(),
            role = %self.role,
            replicas = status.replicas(),
            inputs = self.inputs.len(),
            outputs = self.outputs.len(),
            "node built"
        );
        Ok(Node {
            task: Arc::new(task),
            status,
            role: self.role,
            inputs: self.inputs,
            outputs: self.outputs,
        })
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Graph-shape errors raised at node construction or validation time, before
/// any worker is spawned.
#[derive(Debug, Error, Diagnostic)]
pub enum NodeError {
    /// A source node has input connectors registered.
    #[error("source node {node} cannot have input connectors")]
    #[diagnostic(
        code(pipeweave::node::malformed_source),
        help("Sources only produce data; use an inline node to consume and produce.")
    )]
    MalformedSource { node: String },

    /// A target node has output connectors registered.
    #[error("target node {node} cannot have output connectors")]
    #[diagnostic(
        code(pipeweave::node::malformed_target),
        help("Targets only consume data; use an inline node to consume and produce.")
    )]
    MalformedTarget { node: String },

    /// The node has no connectors that could link it into a pipeline.
    #[error("orphaned node {node}: {detail}")]
    #[diagnostic(
        code(pipeweave::node::orphaned),
        help("Register at least one connector and wire it to another node.")
    )]
    OrphanedNode { node: String, detail: String },

    /// A registered connector was never wired to a partner.
    #[error("connector {connector} on node {node} has no established connection")]
    #[diagnostic(
        code(pipeweave::node::missing_connection),
        help("Every registered connector must be connected before the pipeline can run.")
    )]
    MissingConnection { node: String, connector: String },

    /// A connector was registered on more than one node.
    #[error("connector {connector} is already owned by node {owner}")]
    #[diagnostic(
        code(pipeweave::node::connector_already_owned),
        help("Each connector belongs to exactly one node; create a separate connector per node.")
    )]
    ConnectorAlreadyOwned { connector: String, owner: String },
}
