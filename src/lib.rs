//! # Pipeweave: Dataflow Pipelines with Decentralized Completion Detection
//!
//! Pipeweave runs a user-declared graph of processing nodes as a set of
//! concurrent workers wired together by point-to-point connectors. There is
//! no central coordinator: every consumer decides on its own, from upstream
//! completion flags and its queue contents, whether more data can still
//! arrive, and the whole graph drains and terminates cleanly.
//!
//! ## Core Concepts
//!
//! - **Connectors**: typed [`Output`](connectors::Output)/[`Input`](connectors::Input)
//!   endpoints; connecting a pair makes both ends share one bounded queue
//! - **Tasks**: the [`Task`](node::Task) trait's `setup` → `action` →
//!   `teardown` lifecycle, run once per worker
//! - **Nodes**: a task plus its registered connectors, a declared role
//!   (source / inline / target), a replica count, and shared completion state
//! - **Pipelines**: explicit node registration, whole-graph validation, and
//!   bulk start / join / kill
//!
//! ## Quick Start
//!
//! ```no_run
//! use async_trait::async_trait;
//! use pipeweave::connectors::{Input, Output};
//! use pipeweave::node::{Node, Task, TaskError};
//! use pipeweave::pipeline::Pipeline;
//!
//! struct Emit {
//!     numbers: Output<i64>,
//! }
//!
//! #[async_trait]
//! impl Task for Emit {
//!     async fn action(&self) -> Result<(), TaskError> {
//!         for n in 1..=3 {
//!             self.numbers.put(n).await?;
//!         }
//!         Ok(())
//!     }
//! }
//!
//! struct Print {
//!     numbers: Input<i64>,
//! }
//!
//! #[async_trait]
//! impl Task for Print {
//!     async fn action(&self) -> Result<(), TaskError> {
//!         // recv() unblocks with an error once every upstream node has
//!         // finished and the queue is drained.
//!         while let Ok(n) = self.numbers.recv().await {
//!             println!("{n}");
//!         }
//!         Ok(())
//!     }
//! }
//!
//! # async fn demo() -> miette::Result<()> {
//! let emit = Emit { numbers: Output::new("numbers_out") };
//! let print = Print { numbers: Input::new("numbers_in") };
//! emit.numbers.connect(&print.numbers)?;
//!
//! let source = Node::source("emit").output(&emit.numbers).build(emit)?;
//! let target = Node::target("print").input(&print.numbers).build(print)?;
//!
//! let pipeline = Pipeline::builder().node(source).node(target).build()?;
//! pipeline.run().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Completion Detection
//!
//! The one subtle piece is how a consumer knows it is done. Before blocking
//! on input, it asks two questions *in order*: is any upstream node still
//! unfinished, and if not, is anything still buffered? Reading the finished
//! flags first closes the race where a producer is mid-flight between "queue
//! looks empty" and "item lands", which would otherwise terminate consumers
//! early and drop data. See
//! [`Input::expecting_input`](connectors::Input::expecting_input).
//!
//! ## Module Guide
//!
//! - [`connectors`] - typed endpoints, shared queues, and the receive family
//! - [`message`] - the optional in-band [`Packet`](message::Packet) framing
//! - [`node`] - the [`Task`](node::Task) trait, roles, and node construction
//! - [`pipeline`] - registration, validation, and the run lifecycle
//! - [`config`] - environment-driven runtime defaults
//! - [`telemetry`] - tracing subscriber setup for binaries and tests

pub mod config;
pub mod connectors;
pub mod message;
pub mod node;
pub mod pipeline;
pub mod telemetry;
