//! Object Id Allocation
//!
//! Round-robin scan over an actor's sub id slots. The cursor remembers the
//! last sub id handed out, so freed slots are reused only after the scan
//! wraps around.

use thiserror::Error;

use crate::core::ids::{ActorId, NetworkObjectId, MAX_SUB_ID};

/// Object bookkeeping errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplicationError {
    /// Every sub id of the actor is in use.
    #[error("object id space exhausted for {0}")]
    Exhausted(ActorId),

    /// The actor cannot own objects (no id assigned, or out of range).
    #[error("{0} cannot own objects")]
    InvalidOwner(ActorId),

    /// No such object in the table consulted.
    #[error("unknown object {0}")]
    UnknownObject(NetworkObjectId),

    /// The id does not belong to the actor that used it.
    #[error("{object} is not owned by {actor}")]
    NotOwner {
        /// Offending id
        object: NetworkObjectId,
        /// Actor that tried to use it
        actor: ActorId,
    },

    /// The id is already live.
    #[error("{0} already exists")]
    AlreadyExists(NetworkObjectId),
}

/// Round-robin sub id cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectIdAllocator {
    cursor: i32,
}

impl ObjectIdAllocator {
    /// Fresh allocator; the first id handed out has sub id 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last sub id handed out (0 before the first allocation).
    pub fn cursor(&self) -> i32 {
        self.cursor
    }

    /// Forget the cursor.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Pick the next free id for `owner`.
    ///
    /// Scans sub ids after the cursor, wrapping modulo `MAX_SUB_ID` and
    /// skipping 0, for at most `MAX_SUB_ID` candidates.
    pub fn allocate<F>(&mut self, owner: ActorId, in_use: F) -> Result<NetworkObjectId, ReplicationError>
    where
        F: Fn(NetworkObjectId) -> bool,
    {
        let mut sub_id = self.cursor;
        for _ in 0..MAX_SUB_ID {
            sub_id = (sub_id + 1) % MAX_SUB_ID;
            if sub_id == 0 {
                continue;
            }
            let candidate =
                NetworkObjectId::compose(owner, sub_id).ok_or(ReplicationError::InvalidOwner(owner))?;
            if !in_use(candidate) {
                self.cursor = sub_id;
                return Ok(candidate);
            }
        }
        Err(ReplicationError::Exhausted(owner))
    }
}
