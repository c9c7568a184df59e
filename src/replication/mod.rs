//! Network Object Replication
//!
//! Id allocation, the server's authoritative object table and the client's
//! owned/replica bookkeeping.

pub mod allocator;
pub mod registry;
pub mod replicator;

pub use allocator::{ObjectIdAllocator, ReplicationError};
pub use registry::{ObjectRecord, ObjectRegistry};
pub use replicator::{NetworkObject, Replicator};
