//! # RoomLink
//!
//! Room-based multiplayer session and object replication over a pluggable
//! transport.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         ROOMLINK                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Ids and poses                             │
//! │  ├── ids.rs      - ClientId, ActorId, NetworkObjectId        │
//! │  └── pose.rs     - Vec3, Quat, Pose                          │
//! │                                                              │
//! │  protocol/       - Wire format (no I/O)                      │
//! │  ├── tag.rs      - Message tags and limits                   │
//! │  ├── codec.rs    - Little-endian reader / writer             │
//! │  └── message.rs  - Client and server messages                │
//! │                                                              │
//! │  transport/      - Byte movers                               │
//! │  ├── key.rs      - Connect key hashing                       │
//! │  ├── memory.rs   - In-process transport                      │
//! │  └── websocket.rs- WebSocket transport                       │
//! │                                                              │
//! │  session/        - Room membership                           │
//! │  ├── authority.rs- Server-side rooms and routing             │
//! │  ├── proxy.rs    - Client-side mirror                        │
//! │  ├── events.rs   - Client events                             │
//! │  └── observer.rs - Event subscriptions                       │
//! │                                                              │
//! │  replication/    - Network objects                           │
//! │  ├── allocator.rs- Per-actor id allocation                   │
//! │  ├── registry.rs - Server object table                       │
//! │  └── replicator.rs- Client owned objects and replicas        │
//! │                                                              │
//! │  network/        - Tick drivers                              │
//! │  ├── server.rs   - RoomServer                                │
//! │  └── client.rs   - RoomClient                                │
//! │                                                              │
//! │  config.rs       - File / env / CLI configuration            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Authority
//!
//! The server owns room membership and the object table. A client may only
//! create and move objects whose id falls in its own actor's range; anything
//! else is dropped on arrival.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod network;
pub mod protocol;
pub mod replication;
pub mod session;
pub mod transport;

// Re-export commonly used types
pub use crate::core::ids::{ActorId, ClientId, NetworkObjectId};
pub use crate::core::pose::{Pose, Quat, Vec3};
pub use config::{ClientConfig, ServerConfig};
pub use network::{RoomClient, RoomServer, ShutdownHandle};
pub use protocol::{ClientMessage, ServerMessage};
pub use session::{ClientError, SessionEvent};
pub use transport::DeliveryMode;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
