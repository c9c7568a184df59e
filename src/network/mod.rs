//! Network Drivers
//!
//! Tick loops that glue a transport to the session and replication layers.
//! Each driver is single-threaded: every state change happens inside `tick`.

pub mod client;
pub mod server;

pub use client::RoomClient;
pub use server::{RoomServer, ShutdownHandle};
