//! Identifiers
//!
//! Transport peers, admitted actors and network objects all share one flat
//! integer namespace. Object ids encode their owner:
//!
//! ```text
//! object_id = sub_id + MAX_SUB_ID * owner_actor_id      (1 <= sub_id < MAX_SUB_ID)
//! owner     = object_id / MAX_SUB_ID
//! ```
//!
//! Removal-by-actor relies on every object of an actor living in the
//! contiguous range `[MAX_SUB_ID * actor, MAX_SUB_ID * (actor + 1))`.

use std::fmt;
use std::ops::Range;
use serde::{Serialize, Deserialize};

/// Number of object slots per actor. Sub id 0 is reserved.
pub const MAX_SUB_ID: i32 = 1000;

/// Largest actor id whose whole object range still fits in an `i32`.
pub const MAX_ACTOR_ID: i32 = i32::MAX / MAX_SUB_ID - 1;

// =============================================================================
// CLIENT ID
// =============================================================================

/// Transport-level connection identifier (`peer + 1`, never 0).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClientId(i32);

impl ClientId {
    /// Map a zero-based transport peer index to its client id.
    pub fn from_peer(peer: u32) -> Option<Self> {
        let id = i32::try_from(peer).ok()?.checked_add(1)?;
        (id <= MAX_ACTOR_ID).then_some(Self(id))
    }

    /// The zero-based peer index this id was derived from.
    pub fn peer(self) -> u32 {
        (self.0 - 1) as u32
    }

    /// Raw wire value.
    pub const fn get(self) -> i32 {
        self.0
    }

    /// The actor id this client is admitted under.
    pub const fn actor(self) -> ActorId {
        ActorId(self.0)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client#{}", self.0)
    }
}

// =============================================================================
// ACTOR ID
// =============================================================================

/// Identifier of an admitted participant. Numerically equal to its `ClientId`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActorId(pub i32);

impl ActorId {
    /// Wire value meaning "not connected / not joined".
    pub const NONE: i32 = -1;

    /// Raw wire value.
    pub const fn get(self) -> i32 {
        self.0
    }

    /// The client this actor is reached through.
    pub const fn client(self) -> ClientId {
        ClientId(self.0)
    }

    /// Half-open range of object ids owned by this actor
    /// (including the never-allocated sub id 0).
    pub fn object_range(self) -> Range<i32> {
        let start = self.0.saturating_mul(MAX_SUB_ID);
        start..start.saturating_add(MAX_SUB_ID)
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor#{}", self.0)
    }
}

// =============================================================================
// NETWORK OBJECT ID
// =============================================================================

/// Ownership-encoded replicated object identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NetworkObjectId(pub i32);

impl NetworkObjectId {
    /// Compose an id from its owner and sub id.
    ///
    /// Returns None for sub id 0, out-of-range sub ids, or owners whose
    /// range overflows.
    pub fn compose(owner: ActorId, sub_id: i32) -> Option<Self> {
        if sub_id <= 0 || sub_id >= MAX_SUB_ID || owner.0 < 0 {
            return None;
        }
        owner.0
            .checked_mul(MAX_SUB_ID)?
            .checked_add(sub_id)
            .map(Self)
    }

    /// Raw wire value.
    pub const fn get(self) -> i32 {
        self.0
    }

    /// Actor that created (and is authoritative for) this object.
    pub const fn owner(self) -> ActorId {
        ActorId(self.0 / MAX_SUB_ID)
    }

    /// Slot within the owner's range.
    pub const fn sub_id(self) -> i32 {
        self.0 % MAX_SUB_ID
    }

    /// True if this id could have come out of the allocator.
    pub const fn is_allocatable(self) -> bool {
        self.0 > 0 && self.sub_id() != 0
    }

    /// True if `actor` owns this id.
    pub fn is_owned_by(self, actor: ActorId) -> bool {
        self.is_allocatable() && self.owner() == actor
    }
}

impl fmt::Display for NetworkObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj#{}", self.0)
    }
}
