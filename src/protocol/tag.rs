//! Message Tags and Wire Limits
//!
//! The first byte of every message. Values are part of the wire contract.

use std::fmt;

use crate::transport::DeliveryMode;

/// Largest inbound message accepted, in bytes.
pub const MAX_MESSAGE_BYTES: usize = 64 * 1024;

/// Largest encoded string, in bytes (UTF-8, excluding the length prefix).
pub const MAX_STRING_BYTES: usize = 1024;

/// Pose entries per server-sent `UpdateObjectPose`; larger snapshots are split.
pub const MAX_POSES_PER_MESSAGE: usize = 1024;

/// Encoded size of one pose entry: object id + 3 position + 4 rotation floats.
pub const POSE_ENTRY_BYTES: usize = 4 + 4 * 7;

/// One-byte message type tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum MessageTag {
    /// S→C: assigned actor id
    OnConnectedServer = 0,
    /// C→S: create a room
    CreateRoom = 1,
    /// S→C: room created for the requester
    OnCreatedRoom = 2,
    /// C→S: join (and implicitly create) a room
    JoinRoom = 3,
    /// S→C: an actor (possibly self) joined
    OnJoinedRoom = 4,
    /// C→S: leave the current room
    LeaveRoom = 5,
    /// S→C: an actor (possibly self) left
    OnLeftRoom = 6,
    /// S→C: another actor left
    OnPlayerLeftRoom = 7,
    /// Both: object spawned
    NetworkInstantiate = 8,
    /// S→C: objects of an actor removed
    RemoveNetworkObjects = 9,
    /// Both: pose snapshot
    UpdateObjectPose = 10,
}

impl MessageTag {
    /// Every tag, in wire order.
    pub const ALL: [MessageTag; 11] = [
        MessageTag::OnConnectedServer,
        MessageTag::CreateRoom,
        MessageTag::OnCreatedRoom,
        MessageTag::JoinRoom,
        MessageTag::OnJoinedRoom,
        MessageTag::LeaveRoom,
        MessageTag::OnLeftRoom,
        MessageTag::OnPlayerLeftRoom,
        MessageTag::NetworkInstantiate,
        MessageTag::RemoveNetworkObjects,
        MessageTag::UpdateObjectPose,
    ];

    /// Wire byte.
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Delivery mode this message type is sent with.
    pub const fn delivery_mode(self) -> DeliveryMode {
        match self {
            MessageTag::UpdateObjectPose => DeliveryMode::Unreliable,
            _ => DeliveryMode::ReliableOrdered,
        }
    }
}

impl TryFrom<u8> for MessageTag {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        MessageTag::ALL
            .get(value as usize)
            .copied()
            .ok_or(value)
    }
}

impl fmt::Display for MessageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_table_is_dense() {
        for (index, tag) in MessageTag::ALL.iter().enumerate() {
            assert_eq!(tag.as_u8() as usize, index);
            assert_eq!(MessageTag::try_from(index as u8), Ok(*tag));
        }
    }

    #[test]
    fn test_unknown_tag() {
        assert_eq!(MessageTag::try_from(11), Err(11));
        assert_eq!(MessageTag::try_from(255), Err(255));
    }

    #[test]
    fn test_delivery_modes() {
        assert_eq!(MessageTag::UpdateObjectPose.delivery_mode(), DeliveryMode::Unreliable);
        assert_eq!(MessageTag::JoinRoom.delivery_mode(), DeliveryMode::ReliableOrdered);
        assert_eq!(MessageTag::NetworkInstantiate.delivery_mode(), DeliveryMode::ReliableOrdered);
    }

    #[test]
    fn test_pose_batches_fit_message_limit() {
        assert!(5 + MAX_POSES_PER_MESSAGE * POSE_ENTRY_BYTES <= MAX_MESSAGE_BYTES);
    }
}
