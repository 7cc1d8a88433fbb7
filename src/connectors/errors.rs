//! Error types for connector wiring and queue I/O.
//!
//! Wiring errors ([`ConnectError`]) are reported synchronously at the call
//! site and leave both endpoints untouched. Queue I/O errors ([`SendError`],
//! [`RecvError`]) are local to one `put`/`recv` call and never corrupt the
//! underlying queue.

use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

use super::Direction;

/// Errors raised while wiring two connectors together.
#[derive(Debug, Error, Diagnostic)]
pub enum ConnectError {
    /// Both endpoints have the same direction.
    #[error("cannot connect two {direction} connectors ({left} and {right})")]
    #[diagnostic(
        code(pipeweave::connectors::type_mismatch),
        help("An input can only be connected to an output, and vice versa.")
    )]
    TypeMismatch {
        direction: Direction,
        left: String,
        right: String,
    },

    /// One of the endpoints already has a partner.
    #[error("connector {connector} already has an established connection")]
    #[diagnostic(
        code(pipeweave::connectors::already_connected),
        help("Call disconnect() on the connector before rewiring it.")
    )]
    AlreadyConnected { connector: String },
}

/// Errors raised by [`Output::put`](super::Output::put).
#[derive(Debug, Error, Diagnostic)]
pub enum SendError {
    /// The shared queue was torn down while the send was in flight.
    #[error("connector queue was disconnected while sending")]
    #[diagnostic(
        code(pipeweave::connectors::send_disconnected),
        help("The partner connector was disconnected mid-send; the item was dropped.")
    )]
    Disconnected,
}

/// Errors raised by the [`Input`](super::Input) receive family.
#[derive(Debug, Error, Diagnostic)]
pub enum RecvError {
    /// A non-blocking receive found nothing buffered.
    #[error("no data buffered on the connector")]
    #[diagnostic(code(pipeweave::connectors::empty))]
    Empty,

    /// A bounded-wait receive gave up before data arrived.
    #[error("no data arrived within {waited:?}")]
    #[diagnostic(code(pipeweave::connectors::timeout))]
    Timeout { waited: Duration },

    /// Every upstream node has finished and the queue is empty.
    ///
    /// This is the normal end-of-stream signal, not a fault: no more data can
    /// ever arrive on this connector.
    #[error("upstream nodes finished and the queue is drained")]
    #[diagnostic(code(pipeweave::connectors::drained))]
    Drained,
}
