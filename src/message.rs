use serde::{Deserialize, Serialize};

/// A tagged payload for in-band control flow between nodes.
///
/// Connectors carry whatever item type the two endpoints agree on. When a
/// producer wants to tell its consumer to shut down with a message instead of
/// relying on upstream completion tracking, the endpoints can agree on
/// `Packet<T>` as the item type and the producer pushes [`Packet::Kill`]
/// through the connector like any other item.
///
/// This is a cooperative convention layered on top of completion tracking,
/// not a replacement for it: a consumer that never sees a `Kill` packet still
/// unblocks once every upstream node has finished and its queues are drained.
///
/// # Examples
///
/// ```
/// use pipeweave::message::Packet;
///
/// let data = Packet::Data(42);
/// assert!(!data.is_kill());
/// assert_eq!(data.into_data(), Some(42));
///
/// let kill: Packet<i32> = Packet::Kill;
/// assert!(kill.is_kill());
/// assert_eq!(kill.into_data(), None);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Packet<T> {
    /// An ordinary data item.
    Data(T),
    /// A request for the receiving worker to exit its processing loop.
    Kill,
}

impl<T> Packet<T> {
    /// Returns true if this packet is a shutdown request.
    #[must_use]
    pub fn is_kill(&self) -> bool {
        matches!(self, Packet::Kill)
    }

    /// Unwrap the carried item, discarding the packet framing.
    ///
    /// Returns `None` for [`Packet::Kill`].
    #[must_use]
    pub fn into_data(self) -> Option<T> {
        match self {
            Packet::Data(value) => Some(value),
            Packet::Kill => None,
        }
    }

    /// Borrow the carried item, if any.
    #[must_use]
    pub fn data(&self) -> Option<&T> {
        match self {
            Packet::Data(value) => Some(value),
            Packet::Kill => None,
        }
    }
}

impl<T> From<T> for Packet<T> {
    fn from(value: T) -> Self {
        Packet::Data(value)
    }
}
