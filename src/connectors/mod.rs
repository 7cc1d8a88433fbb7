//! Typed endpoints that carry data between pipeline nodes.
//!
//! A connector is one half of a point-to-point link: an [`Output`] enqueues
//! items, an [`Input`] dequeues them. Wiring an output to an input with
//! [`connect`] makes both endpoints share a single bounded queue; until then
//! each endpoint holds its own private, empty queue. [`Input::recv`] blocks
//! until data arrives or the upstream completion protocol proves that no more
//! data can ever arrive, so consumers need no sentinel values and no central
//! scheduler to know when to stop.
//!
//! Connector handles are cheap clones over shared state: the handle a worker
//! task holds observes the wiring performed on the handle the builder saw.

pub mod errors;

use std::fmt;
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config;
use crate::node::NodeStatus;

pub use self::errors::{ConnectError, RecvError, SendError};

/// The direction of a connector, from the owning node's point of view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Receives data from an upstream node.
    Input,
    /// Sends data to a downstream node.
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => write!(f, "input"),
            Direction::Output => write!(f, "output"),
        }
    }
}

/// The queue behind a connector: both flume handles, so either endpoint can
/// introspect it and a disconnect can replace it wholesale.
struct Queue<T> {
    tx: flume::Sender<T>,
    rx: flume::Receiver<T>,
}

impl<T> Clone for Queue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
        }
    }
}

impl<T> Queue<T> {
    /// Capacity `0` means unbounded.
    fn new(capacity: usize) -> Self {
        let (tx, rx) = if capacity == 0 {
            flume::unbounded()
        } else {
            flume::bounded(capacity)
        };
        Self { tx, rx }
    }

    fn len(&self) -> usize {
        self.rx.len()
    }

    fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    fn is_full(&self) -> bool {
        self.rx.is_full()
    }
}

/// Mutable wiring state, shared by every clone of one endpoint.
struct Link<T> {
    queue: Queue<T>,
    partner: Option<Weak<Core<T>>>,
}

/// State shared by all clones of a single connector endpoint.
struct Core<T> {
    label: String,
    direction: Direction,
    capacity: usize,
    /// The node this connector belongs to; assigned exactly once when the
    /// owning node is built.
    owner: OnceLock<Arc<NodeStatus>>,
    link: Mutex<Link<T>>,
}

impl<T> Core<T> {
    fn new(label: impl Into<String>, direction: Direction, capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            direction,
            capacity,
            owner: OnceLock::new(),
            link: Mutex::new(Link {
                queue: Queue::new(capacity),
                partner: None,
            }),
        })
    }

    fn queue(&self) -> Queue<T> {
        self.link.lock().queue.clone()
    }

    fn partner(&self) -> Option<Arc<Core<T>>> {
        self.link.lock().partner.as_ref().and_then(Weak::upgrade)
    }

    fn is_connected(&self) -> bool {
        self.link.lock().partner.is_some()
    }
}

/// The receiving endpoint of a connector pair.
///
/// Owned by exactly one node (registered through the node builder) and
/// connected to at most one [`Output`] at a time. Clones share wiring state.
///
/// # Examples
///
/// ```
/// use pipeweave::connectors::{Input, Output};
///
/// let out: Output<u32> = Output::new("numbers");
/// let inp: Input<u32> = Input::new("numbers");
///
/// out.connect(&inp)?;
/// assert!(inp.is_connected());
///
/// inp.disconnect();
/// assert!(!out.is_connected());
/// # Ok::<(), pipeweave::connectors::ConnectError>(())
/// ```
pub struct Input<T> {
    core: Arc<Core<T>>,
    refresh: Duration,
}

impl<T> Clone for Input<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            refresh: self.refresh,
        }
    }
}

/// The sending endpoint of a connector pair.
///
/// Owned by exactly one node and connected to at most one [`Input`] at a
/// time. [`put`](Output::put) blocks once the shared bounded queue is full,
/// which is the only flow control the system applies.
pub struct Output<T> {
    core: Arc<Core<T>>,
}

impl<T> Clone for Output<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

/// A direction-erased borrow of either endpoint, accepted by [`connect`].
pub enum PortRef<'a, T> {
    Input(&'a Input<T>),
    Output(&'a Output<T>),
}

impl<'a, T> From<&'a Input<T>> for PortRef<'a, T> {
    fn from(port: &'a Input<T>) -> Self {
        PortRef::Input(port)
    }
}

impl<'a, T> From<&'a Output<T>> for PortRef<'a, T> {
    fn from(port: &'a Output<T>) -> Self {
        PortRef::Output(port)
    }
}

impl<'a, T> PortRef<'a, T> {
    fn core(&self) -> &Arc<Core<T>> {
        match self {
            PortRef::Input(port) => &port.core,
            PortRef::Output(port) => &port.core,
        }
    }
}

/// Wire two connectors together so they share a single queue.
///
/// Directions are checked at runtime so callers holding direction-erased
/// references get the same guarantees as the typed
/// [`Output::connect`]/[`Input::connect`] sugar:
///
/// - two endpoints of the same direction fail with
///   [`ConnectError::TypeMismatch`];
/// - an endpoint that already has a partner fails with
///   [`ConnectError::AlreadyConnected`].
///
/// On success both endpoints reference each other and read/write the same
/// queue instance. The shared queue adopts the output side's declared
/// capacity, since blocking-on-full is a producer concern.
pub fn connect<'a, T>(
    a: impl Into<PortRef<'a, T>>,
    b: impl Into<PortRef<'a, T>>,
) -> Result<(), ConnectError>
where
    T: 'a,
{
    let (a, b) = (a.into(), b.into());
    let (a_core, b_core) = (a.core(), b.core());

    if a_core.direction == b_core.direction {
        return Err(ConnectError::TypeMismatch {
            direction: a_core.direction,
            left: a_core.label.clone(),
            right: b_core.label.clone(),
        });
    }

    // Two distinct mutexes; lock in address order so concurrent wiring of the
    // same pair from both sides cannot deadlock.
    let (mut a_link, mut b_link) = if Arc::as_ptr(a_core) as usize <= Arc::as_ptr(b_core) as usize {
        let a_guard = a_core.link.lock();
        let b_guard = b_core.link.lock();
        (a_guard, b_guard)
    } else {
        let b_guard = b_core.link.lock();
        let a_guard = a_core.link.lock();
        (a_guard, b_guard)
    };

    if a_link.partner.is_some() {
        return Err(ConnectError::AlreadyConnected {
            connector: a_core.label.clone(),
        });
    }
    if b_link.partner.is_some() {
        return Err(ConnectError::AlreadyConnected {
            connector: b_core.label.clone(),
        });
    }

    let producer = if a_core.direction == Direction::Output {
        a_core
    } else {
        b_core
    };
    let queue = Queue::new(producer.capacity);
    a_link.queue = queue.clone();
    b_link.queue = queue;
    a_link.partner = Some(Arc::downgrade(b_core));
    b_link.partner = Some(Arc::downgrade(a_core));

    tracing::debug!(
        left = %a_core.label,
        right = %b_core.label,
        capacity = producer.capacity,
        "connectors wired"
    );
    Ok(())
}

/// Unwire an endpoint and, if it had a partner, the partner too.
///
/// Both endpoints end up with fresh, independent, empty queues of their own
/// declared capacity. Calling this on an endpoint that is not connected is a
/// no-op, so it is always safe.
fn disconnect_core<T>(core: &Arc<Core<T>>) {
    let partner = {
        let mut link = core.link.lock();
        match link.partner.take() {
            Some(partner) => {
                link.queue = Queue::new(core.capacity);
                Some(partner)
            }
            None => None,
        }
    };

    let Some(partner) = partner.and_then(|weak| weak.upgrade()) else {
        return;
    };

    let mut peer_link = partner.link.lock();
    let points_back = peer_link
        .partner
        .as_ref()
        .is_some_and(|weak| weak.as_ptr() == Arc::as_ptr(core));
    if points_back {
        peer_link.partner = None;
        peer_link.queue = Queue::new(partner.capacity);
    }
    drop(peer_link);

    tracing::debug!(left = %core.label, right = %partner.label, "connectors unwired");
}

macro_rules! endpoint_common {
    () => {
        /// The label given at construction, used in validation errors.
        #[must_use]
        pub fn label(&self) -> &str {
            &self.core.label
        }

        /// Which way data flows through this endpoint.
        #[must_use]
        pub fn direction(&self) -> Direction {
            self.core.direction
        }

        /// Whether a partner connector is currently attached.
        #[must_use]
        pub fn is_connected(&self) -> bool {
            self.core.is_connected()
        }

        /// Number of items currently buffered.
        ///
        /// Advisory: in a running pipeline the queue can change between this
        /// call and the next read or write.
        #[must_use]
        pub fn len(&self) -> usize {
            self.core.queue().len()
        }

        /// Whether the queue currently holds no items. Advisory, like
        /// [`len`](Self::len).
        #[must_use]
        pub fn is_empty(&self) -> bool {
            self.core.queue().is_empty()
        }

        /// Whether the queue is at capacity. Always false for unbounded
        /// queues. Advisory, like [`len`](Self::len).
        #[must_use]
        pub fn is_full(&self) -> bool {
            self.core.queue().is_full()
        }

        /// The capacity declared at construction (`0` = unbounded).
        #[must_use]
        pub fn capacity(&self) -> usize {
            self.core.capacity
        }

        /// Detach this endpoint from its partner, if any.
        ///
        /// Symmetric and idempotent: the partner is detached too, both sides
        /// get fresh empty queues, and repeating the call does nothing.
        pub fn disconnect(&self) {
            disconnect_core(&self.core);
        }
    };
}

impl<T: Send + 'static> Input<T> {
    /// An unbounded input endpoint.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self::bounded(label, 0)
    }

    /// An input endpoint whose private queue holds at most `capacity` items
    /// (`0` = unbounded). The capacity of a *connected* queue comes from the
    /// output side; this one applies before wiring and after disconnect.
    #[must_use]
    pub fn bounded(label: impl Into<String>, capacity: usize) -> Self {
        Self {
            core: Core::new(label, Direction::Input, capacity),
            refresh: config::recv_refresh_interval(),
        }
    }

    /// Override how often a blocked [`recv`](Self::recv) re-checks upstream
    /// completion state. Defaults to the crate-wide value from
    /// [`config::recv_refresh_interval`].
    #[must_use]
    pub fn with_refresh_interval(mut self, refresh: Duration) -> Self {
        self.refresh = refresh;
        self
    }

    endpoint_common!();

    /// Connect this input to an output. See [`connect`].
    pub fn connect<'a>(&'a self, other: impl Into<PortRef<'a, T>>) -> Result<(), ConnectError> {
        connect(PortRef::Input(self), other)
    }

    /// Whether more data can still arrive on this endpoint.
    ///
    /// Evaluates, in this order:
    /// 1. Is the upstream node on the other end of the connection still
    ///    unfinished? If so, more data may be produced: answer yes without
    ///    looking at the queue.
    /// 2. Otherwise, is anything still buffered? If so, answer yes so the
    ///    caller drains it.
    /// 3. Otherwise no: nothing buffered and nothing can be produced.
    ///
    /// The upstream check must happen before the queue is sampled. A producer
    /// that is still running may enqueue between the two reads; sampling the
    /// queue first opens a window where that item is missed and the consumer
    /// exits early, silently dropping data.
    ///
    /// An upstream node configured with zero replicas never runs a worker, so
    /// it counts as finished from the start. An unconnected input can only
    /// ever yield what is already buffered.
    #[must_use]
    pub fn expecting_input(&self) -> bool {
        if let Some(partner) = self.core.partner()
            && let Some(upstream) = partner.owner.get()
            && !upstream.node_finished()
        {
            return true;
        }
        !self.core.queue().is_empty()
    }

    /// Non-blocking dequeue. Fails with [`RecvError::Empty`] when nothing is
    /// buffered right now, regardless of upstream state.
    pub fn try_recv(&self) -> Result<T, RecvError> {
        self.core.queue().rx.try_recv().map_err(|_| RecvError::Empty)
    }

    /// Blocking dequeue that releases itself at end-of-stream.
    ///
    /// Waits until an item arrives, re-checking upstream completion every
    /// refresh interval. Returns [`RecvError::Drained`] once every upstream
    /// node has finished and the queue holds nothing, which is the signal to
    /// move toward teardown.
    pub async fn recv(&self) -> Result<T, RecvError> {
        loop {
            if !self.expecting_input() {
                return Err(RecvError::Drained);
            }
            // Re-resolve the queue each pass: a disconnect swaps it out.
            let queue = self.core.queue();
            match tokio::time::timeout(self.refresh, queue.rx.recv_async()).await {
                Ok(Ok(value)) => return Ok(value),
                // Queue torn down mid-wait or refresh tick elapsed; loop and
                // re-evaluate upstream state.
                Ok(Err(_)) | Err(_) => continue,
            }
        }
    }

    /// Like [`recv`](Self::recv), but gives up with [`RecvError::Timeout`]
    /// after `timeout` if neither data nor end-of-stream was seen.
    pub async fn recv_timeout(&self, timeout: Duration) -> Result<T, RecvError> {
        let started = tokio::time::Instant::now();
        loop {
            if !self.expecting_input() {
                return Err(RecvError::Drained);
            }
            let Some(remaining) = timeout.checked_sub(started.elapsed()) else {
                return Err(RecvError::Timeout { waited: timeout });
            };
            let window = remaining.min(self.refresh);
            let queue = self.core.queue();
            match tokio::time::timeout(window, queue.rx.recv_async()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(_)) | Err(_) => continue,
            }
        }
    }
}

impl<T: Send + 'static> Output<T> {
    /// An unbounded output endpoint.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self::bounded(label, 0)
    }

    /// An output endpoint declaring a bounded queue of `capacity` items
    /// (`0` = unbounded). Once connected, the shared queue uses this
    /// capacity and [`put`](Self::put) blocks when it is full.
    #[must_use]
    pub fn bounded(label: impl Into<String>, capacity: usize) -> Self {
        Self {
            core: Core::new(label, Direction::Output, capacity),
        }
    }

    endpoint_common!();

    /// Connect this output to an input. See [`connect`].
    pub fn connect<'a>(&'a self, other: impl Into<PortRef<'a, T>>) -> Result<(), ConnectError> {
        connect(PortRef::Output(self), other)
    }

    /// Enqueue one item, waiting while the shared queue is at capacity.
    ///
    /// Fails with [`SendError::Disconnected`] only if the queue is torn down
    /// while the send is in flight; the item is lost in that case.
    pub async fn put(&self, value: T) -> Result<(), SendError> {
        let tx = self.core.link.lock().queue.tx.clone();
        tx.send_async(value)
            .await
            .map_err(|_| SendError::Disconnected)
    }
}

/// Object-safe view of an endpoint, used by node construction and
/// validation where the item type has been erased.
pub(crate) trait ErasedPort: Send + Sync {
    fn label(&self) -> &str;
    fn is_connected(&self) -> bool;
    /// Attach the owning node. Returns false if already owned.
    fn bind_owner(&self, owner: &Arc<NodeStatus>) -> bool;
    /// The node this connector is registered on, if any.
    fn owner(&self) -> Option<Arc<NodeStatus>>;
    /// The node on the other end of the connection, if wired and owned.
    fn peer_status(&self) -> Option<Arc<NodeStatus>>;
    /// Per-port completion predicate; always false for outputs.
    fn expecting_input(&self) -> bool;
}

fn peer_status_of<T>(core: &Core<T>) -> Option<Arc<NodeStatus>> {
    core.partner()
        .and_then(|partner| partner.owner.get().cloned())
}

impl<T: Send + 'static> ErasedPort for Input<T> {
    fn label(&self) -> &str {
        Input::label(self)
    }

    fn is_connected(&self) -> bool {
        Input::is_connected(self)
    }

    fn bind_owner(&self, owner: &Arc<NodeStatus>) -> bool {
        self.core.owner.set(Arc::clone(owner)).is_ok()
    }

    fn owner(&self) -> Option<Arc<NodeStatus>> {
        self.core.owner.get().cloned()
    }

    fn peer_status(&self) -> Option<Arc<NodeStatus>> {
        peer_status_of(&self.core)
    }

    fn expecting_input(&self) -> bool {
        Input::expecting_input(self)
    }
}

impl<T: Send + 'static> ErasedPort for Output<T> {
    fn label(&self) -> &str {
        Output::label(self)
    }

    fn is_connected(&self) -> bool {
        Output::is_connected(self)
    }

    fn bind_owner(&self, owner: &Arc<NodeStatus>) -> bool {
        self.core.owner.set(Arc::clone(owner)).is_ok()
    }

    fn owner(&self) -> Option<Arc<NodeStatus>> {
        self.core.owner.get().cloned()
    }

    fn peer_status(&self) -> Option<Arc<NodeStatus>> {
        peer_status_of(&self.core)
    }

    fn expecting_input(&self) -> bool {
        false
    }
}
