//! Transport Adapter
//!
//! Narrow boundary to whatever moves bytes between peers. Both sides are
//! polled from the single driving loop: `poll` drains what arrived since the
//! last call and never blocks, `send` only queues.
//!
//! Guarantees expected from every implementation:
//! - `ReliableOrdered` messages arrive at most once and in send order, or the
//!   connection is torn down (which surfaces as `Disconnected`).
//! - `Unreliable` messages may be dropped.
//! - A `ClientId` is not handed to a new connection until the `Disconnected`
//!   event of its previous holder has been returned by `poll`.

pub mod key;
pub mod memory;
pub mod websocket;

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

use crate::core::ids::ClientId;

pub use key::ConnectKey;

/// Delivery guarantee requested for a send.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeliveryMode {
    /// In order, at most once, or the connection is closed.
    ReliableOrdered,
    /// Best effort.
    Unreliable,
}

/// Events produced by a listening transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// A peer passed the key check.
    Connected(ClientId),
    /// A peer is gone. Nothing else will arrive from it.
    Disconnected(ClientId),
    /// Bytes from a connected peer.
    Message {
        /// Sender
        from: ClientId,
        /// Raw message
        data: Vec<u8>,
    },
}

/// Events produced by a connecting transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Connection to the server established.
    Connected,
    /// Connection to the server lost or closed.
    Disconnected,
    /// Bytes from the server.
    Message(Vec<u8>),
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No live connection for this client id.
    #[error("no connected peer {0}")]
    UnknownPeer(ClientId),

    /// Client transport is not connected.
    #[error("not connected")]
    NotConnected,

    /// Peer's reliable queue overflowed; the connection is being closed.
    #[error("outbound queue full for {0}, closing connection")]
    QueueFull(ClientId),

    /// The server refused the connection (bad key or full).
    #[error("connection rejected: {0}")]
    Rejected(String),

    /// Socket-level failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket failure.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Server half of the transport boundary.
pub trait ServerTransport {
    /// Queue `data` for `to`.
    fn send(&mut self, to: ClientId, data: &[u8], mode: DeliveryMode) -> Result<(), TransportError>;

    /// Drain pending events.
    fn poll(&mut self) -> Vec<ServerEvent>;
}

/// Client half of the transport boundary.
pub trait ClientTransport {
    /// Queue `data` for the server.
    fn send(&mut self, data: &[u8], mode: DeliveryMode) -> Result<(), TransportError>;

    /// Drain pending events.
    fn poll(&mut self) -> Vec<ClientEvent>;

    /// True while the connection is up (as last observed by `poll`).
    fn is_connected(&self) -> bool;
}

/// Lock a mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// PEER ID POOL
// =============================================================================

/// Lowest-free allocator for zero-based peer indices.
#[derive(Debug, Default)]
pub struct PeerIdPool {
    in_use: BTreeSet<u32>,
    limit: usize,
}

impl PeerIdPool {
    /// Pool with room for `limit` simultaneous peers.
    pub fn new(limit: usize) -> Self {
        Self { in_use: BTreeSet::new(), limit }
    }

    /// Claim the lowest free index. None when full.
    pub fn acquire(&mut self) -> Option<ClientId> {
        if self.in_use.len() >= self.limit {
            return None;
        }
        let peer = (0u32..)
            .zip(self.in_use.iter())
            .find(|(expected, used)| expected != *used)
            .map(|(expected, _)| expected)
            .unwrap_or(self.in_use.len() as u32);
        let client = ClientId::from_peer(peer)?;
        self.in_use.insert(peer);
        Some(client)
    }

    /// Return an index to the pool.
    pub fn release(&mut self, client: ClientId) {
        self.in_use.remove(&client.peer());
    }

    /// Peers currently held.
    pub fn len(&self) -> usize {
        self.in_use.len()
    }

    /// True if no peer is held.
    pub fn is_empty(&self) -> bool {
        self.in_use.is_empty()
    }
}
