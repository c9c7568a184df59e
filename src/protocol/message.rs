//! Protocol Messages
//!
//! Binary wire format: `[tag:u8][payload]`. Client-bound and server-bound
//! messages are separate enums because `UpdateObjectPose` differs by
//! direction (the server-bound form carries the sender's group name).

use crate::core::ids::{ActorId, NetworkObjectId};
use crate::core::pose::Pose;
use crate::transport::DeliveryMode;
use super::codec::{CodecError, NetReader, NetWriter};
use super::tag::{MessageTag, MAX_MESSAGE_BYTES, MAX_POSES_PER_MESSAGE, POSE_ENTRY_BYTES};

// =============================================================================
// SHARED PAYLOADS
// =============================================================================

/// Object creation payload, relayed unchanged by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSpawn {
    /// Ownership-encoded id.
    pub object_id: NetworkObjectId,
    /// Logical type (prefab key) the receiver instantiates.
    pub type_key: String,
    /// Initial pose.
    pub pose: Pose,
}

impl ObjectSpawn {
    fn encode(&self, w: &mut NetWriter) {
        w.put_i32(self.object_id.get());
        w.put_str(&self.type_key);
        w.put_pose(&self.pose);
    }

    fn decode(r: &mut NetReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            object_id: NetworkObjectId(r.get_i32()?),
            type_key: r.get_string()?,
            pose: r.get_pose()?,
        })
    }
}

/// One entry of a pose snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectPose {
    /// Object being moved.
    pub object_id: NetworkObjectId,
    /// New pose.
    pub pose: Pose,
}

fn encode_poses(w: &mut NetWriter, poses: &[ObjectPose]) {
    w.put_i32(poses.len() as i32);
    for entry in poses {
        w.put_i32(entry.object_id.get());
        w.put_pose(&entry.pose);
    }
}

fn decode_poses(r: &mut NetReader<'_>) -> Result<Vec<ObjectPose>, CodecError> {
    let count = r.get_count(POSE_ENTRY_BYTES)?;
    let mut poses = Vec::with_capacity(count);
    for _ in 0..count {
        poses.push(ObjectPose {
            object_id: NetworkObjectId(r.get_i32()?),
            pose: r.get_pose()?,
        });
    }
    Ok(poses)
}

fn split_tag(data: &[u8]) -> Result<(u8, NetReader<'_>), CodecError> {
    if data.len() > MAX_MESSAGE_BYTES {
        return Err(CodecError::Oversized(data.len()));
    }
    let (&tag, payload) = data.split_first().ok_or(CodecError::Empty)?;
    Ok((tag, NetReader::new(payload)))
}

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Create a room without joining it.
    CreateRoom {
        /// Room name
        group_name: String,
    },

    /// Join a room, creating it if needed.
    JoinRoom {
        /// Display name
        user_name: String,
        /// Room name
        group_name: String,
    },

    /// Leave the current room. The server trusts the connection, not this id.
    LeaveRoom {
        /// Sender's own actor id
        actor_id: ActorId,
    },

    /// Announce a newly created owned object.
    NetworkInstantiate(ObjectSpawn),

    /// Snapshot of every object the sender owns.
    UpdateObjectPose {
        /// Sender's room
        group_name: String,
        /// Owned object poses
        poses: Vec<ObjectPose>,
    },
}

impl ClientMessage {
    /// Wire tag.
    pub fn tag(&self) -> MessageTag {
        match self {
            ClientMessage::CreateRoom { .. } => MessageTag::CreateRoom,
            ClientMessage::JoinRoom { .. } => MessageTag::JoinRoom,
            ClientMessage::LeaveRoom { .. } => MessageTag::LeaveRoom,
            ClientMessage::NetworkInstantiate(_) => MessageTag::NetworkInstantiate,
            ClientMessage::UpdateObjectPose { .. } => MessageTag::UpdateObjectPose,
        }
    }

    /// Delivery mode used when sending this message.
    pub fn delivery_mode(&self) -> DeliveryMode {
        self.tag().delivery_mode()
    }

    /// Serialize to binary.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = NetWriter::with_capacity(32);
        w.put_u8(self.tag().as_u8());
        match self {
            ClientMessage::CreateRoom { group_name } => {
                w.put_str(group_name);
            }
            ClientMessage::JoinRoom { user_name, group_name } => {
                w.put_str(user_name);
                w.put_str(group_name);
            }
            ClientMessage::LeaveRoom { actor_id } => {
                w.put_i32(actor_id.get());
            }
            ClientMessage::NetworkInstantiate(spawn) => {
                spawn.encode(&mut w);
            }
            ClientMessage::UpdateObjectPose { group_name, poses } => {
                w.put_str(group_name);
                encode_poses(&mut w, poses);
            }
        }
        w.into_bytes()
    }

    /// Deserialize from binary.
    pub fn from_bytes(data: &[u8]) -> Result<Self, CodecError> {
        let (tag, mut r) = split_tag(data)?;
        let tag = MessageTag::try_from(tag).map_err(CodecError::UnknownTag)?;
        let msg = match tag {
            MessageTag::CreateRoom => ClientMessage::CreateRoom {
                group_name: r.get_string()?,
            },
            MessageTag::JoinRoom => ClientMessage::JoinRoom {
                user_name: r.get_string()?,
                group_name: r.get_string()?,
            },
            MessageTag::LeaveRoom => ClientMessage::LeaveRoom {
                actor_id: ActorId(r.get_i32()?),
            },
            MessageTag::NetworkInstantiate => {
                ClientMessage::NetworkInstantiate(ObjectSpawn::decode(&mut r)?)
            }
            MessageTag::UpdateObjectPose => ClientMessage::UpdateObjectPose {
                group_name: r.get_string()?,
                poses: decode_poses(&mut r)?,
            },
            other => return Err(CodecError::UnknownTag(other.as_u8())),
        };
        Ok(msg)
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// First message on every connection: the id this client will act under.
    OnConnectedServer {
        /// Assigned actor id
        actor_id: ActorId,
    },

    /// A room was created on the requester's behalf.
    OnCreatedRoom {
        /// Requester
        actor_id: ActorId,
        /// Room name
        group_name: String,
    },

    /// An actor joined the room. Sent to every member, including the joiner.
    OnJoinedRoom {
        /// Joining actor
        actor_id: ActorId,
        /// Joining actor's display name
        user_name: String,
        /// Room name
        group_name: String,
    },

    /// An actor left the room. Sent to every member, including the leaver.
    OnLeftRoom {
        /// Leaving actor
        actor_id: ActorId,
    },

    /// Another actor left the room.
    OnPlayerLeftRoom {
        /// Leaving actor
        actor_id: ActorId,
    },

    /// An object was created by another member.
    NetworkInstantiate(ObjectSpawn),

    /// Objects removed because their owner left.
    RemoveNetworkObjects {
        /// Former owner
        actor_id: ActorId,
        /// Removed ids
        object_ids: Vec<NetworkObjectId>,
    },

    /// Authoritative pose snapshot for the room.
    UpdateObjectPose {
        /// Object poses
        poses: Vec<ObjectPose>,
    },
}

impl ServerMessage {
    /// Wire tag.
    pub fn tag(&self) -> MessageTag {
        match self {
            ServerMessage::OnConnectedServer { .. } => MessageTag::OnConnectedServer,
            ServerMessage::OnCreatedRoom { .. } => MessageTag::OnCreatedRoom,
            ServerMessage::OnJoinedRoom { .. } => MessageTag::OnJoinedRoom,
            ServerMessage::OnLeftRoom { .. } => MessageTag::OnLeftRoom,
            ServerMessage::OnPlayerLeftRoom { .. } => MessageTag::OnPlayerLeftRoom,
            ServerMessage::NetworkInstantiate(_) => MessageTag::NetworkInstantiate,
            ServerMessage::RemoveNetworkObjects { .. } => MessageTag::RemoveNetworkObjects,
            ServerMessage::UpdateObjectPose { .. } => MessageTag::UpdateObjectPose,
        }
    }

    /// Delivery mode used when sending this message.
    pub fn delivery_mode(&self) -> DeliveryMode {
        self.tag().delivery_mode()
    }

    /// Split a room snapshot into messages of at most `MAX_POSES_PER_MESSAGE` entries.
    pub fn pose_batches(poses: &[ObjectPose]) -> Vec<ServerMessage> {
        poses
            .chunks(MAX_POSES_PER_MESSAGE)
            .map(|chunk| ServerMessage::UpdateObjectPose { poses: chunk.to_vec() })
            .collect()
    }

    /// Serialize to binary.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = NetWriter::with_capacity(32);
        w.put_u8(self.tag().as_u8());
        match self {
            ServerMessage::OnConnectedServer { actor_id }
            | ServerMessage::OnLeftRoom { actor_id }
            | ServerMessage::OnPlayerLeftRoom { actor_id } => {
                w.put_i32(actor_id.get());
            }
            ServerMessage::OnCreatedRoom { actor_id, group_name } => {
                w.put_i32(actor_id.get());
                w.put_str(group_name);
            }
            ServerMessage::OnJoinedRoom { actor_id, user_name, group_name } => {
                w.put_i32(actor_id.get());
                w.put_str(user_name);
                w.put_str(group_name);
            }
            ServerMessage::NetworkInstantiate(spawn) => {
                spawn.encode(&mut w);
            }
            ServerMessage::RemoveNetworkObjects { actor_id, object_ids } => {
                w.put_i32(actor_id.get());
                w.put_i32(object_ids.len() as i32);
                for id in object_ids {
                    w.put_i32(id.get());
                }
            }
            ServerMessage::UpdateObjectPose { poses } => {
                encode_poses(&mut w, poses);
            }
        }
        w.into_bytes()
    }

    /// Deserialize from binary.
    pub fn from_bytes(data: &[u8]) -> Result<Self, CodecError> {
        let (tag, mut r) = split_tag(data)?;
        let tag = MessageTag::try_from(tag).map_err(CodecError::UnknownTag)?;
        let msg = match tag {
            MessageTag::OnConnectedServer => ServerMessage::OnConnectedServer {
                actor_id: ActorId(r.get_i32()?),
            },
            MessageTag::OnCreatedRoom => ServerMessage::OnCreatedRoom {
                actor_id: ActorId(r.get_i32()?),
                group_name: r.get_string()?,
            },
            MessageTag::OnJoinedRoom => ServerMessage::OnJoinedRoom {
                actor_id: ActorId(r.get_i32()?),
                user_name: r.get_string()?,
                group_name: r.get_string()?,
            },
            MessageTag::OnLeftRoom => ServerMessage::OnLeftRoom {
                actor_id: ActorId(r.get_i32()?),
            },
            MessageTag::OnPlayerLeftRoom => ServerMessage::OnPlayerLeftRoom {
                actor_id: ActorId(r.get_i32()?),
            },
            MessageTag::NetworkInstantiate => {
                ServerMessage::NetworkInstantiate(ObjectSpawn::decode(&mut r)?)
            }
            MessageTag::RemoveNetworkObjects => {
                let actor_id = ActorId(r.get_i32()?);
                let count = r.get_count(4)?;
                let mut object_ids = Vec::with_capacity(count);
                for _ in 0..count {
                    object_ids.push(NetworkObjectId(r.get_i32()?));
                }
                ServerMessage::RemoveNetworkObjects { actor_id, object_ids }
            }
            MessageTag::UpdateObjectPose => ServerMessage::UpdateObjectPose {
                poses: decode_poses(&mut r)?,
            },
            other => return Err(CodecError::UnknownTag(other.as_u8())),
        };
        Ok(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pose::{Quat, Vec3};
    use crate::protocol::tag::MAX_STRING_BYTES;
    use proptest::prelude::*;

    fn spawn(id: i32, key: &str) -> ObjectSpawn {
        ObjectSpawn {
            object_id: NetworkObjectId(id),
            type_key: key.to_string(),
            pose: Pose::new(Vec3::new(1.0, 2.0, 3.0), Quat::from_rotation_y(0.3)),
        }
    }

    fn pose_entry(id: i32) -> ObjectPose {
        ObjectPose {
            object_id: NetworkObjectId(id),
            pose: Pose::at(Vec3::new(id as f32, 0.5, -1.0)),
        }
    }

    fn all_client_messages(name: &str) -> Vec<ClientMessage> {
        vec![
            ClientMessage::CreateRoom { group_name: name.to_string() },
            ClientMessage::JoinRoom { user_name: name.to_string(), group_name: name.to_string() },
            ClientMessage::LeaveRoom { actor_id: ActorId(3) },
            ClientMessage::NetworkInstantiate(spawn(1001, name)),
            ClientMessage::UpdateObjectPose { group_name: name.to_string(), poses: vec![] },
            ClientMessage::UpdateObjectPose {
                group_name: name.to_string(),
                poses: vec![pose_entry(1001), pose_entry(1002)],
            },
        ]
    }

    fn all_server_messages(name: &str) -> Vec<ServerMessage> {
        vec![
            ServerMessage::OnConnectedServer { actor_id: ActorId(1) },
            ServerMessage::OnCreatedRoom { actor_id: ActorId(1), group_name: name.to_string() },
            ServerMessage::OnJoinedRoom {
                actor_id: ActorId(2),
                user_name: name.to_string(),
                group_name: name.to_string(),
            },
            ServerMessage::OnLeftRoom { actor_id: ActorId(2) },
            ServerMessage::OnPlayerLeftRoom { actor_id: ActorId(2) },
            ServerMessage::NetworkInstantiate(spawn(2001, name)),
            ServerMessage::RemoveNetworkObjects { actor_id: ActorId(2), object_ids: vec![] },
            ServerMessage::RemoveNetworkObjects {
                actor_id: ActorId(2),
                object_ids: vec![NetworkObjectId(2001), NetworkObjectId(2005)],
            },
            ServerMessage::UpdateObjectPose { poses: vec![pose_entry(2001)] },
        ]
    }

    #[test]
    fn test_client_message_roundtrip_edge_strings() {
        let max = "m".repeat(MAX_STRING_BYTES);
        for name in ["", "room-1", max.as_str()] {
            for msg in all_client_messages(name) {
                let bytes = msg.to_bytes();
                let parsed = ClientMessage::from_bytes(&bytes).unwrap();
                assert_eq!(parsed, msg);
                assert_eq!(parsed.to_bytes(), bytes);
            }
        }
    }

    #[test]
    fn test_server_message_roundtrip_edge_strings() {
        let max = "m".repeat(MAX_STRING_BYTES);
        for name in ["", "room-1", max.as_str()] {
            for msg in all_server_messages(name) {
                let bytes = msg.to_bytes();
                let parsed = ServerMessage::from_bytes(&bytes).unwrap();
                assert_eq!(parsed, msg);
                assert_eq!(parsed.to_bytes(), bytes);
            }
        }
    }

    #[test]
    fn test_join_room_wire_layout() {
        let bytes = ClientMessage::JoinRoom {
            user_name: "al".to_string(),
            group_name: "R".to_string(),
        }
        .to_bytes();
        assert_eq!(bytes, vec![3, 2, 0, 0, 0, b'a', b'l', 1, 0, 0, 0, b'R']);
    }

    #[test]
    fn test_on_connected_wire_layout() {
        let bytes = ServerMessage::OnConnectedServer { actor_id: ActorId(5) }.to_bytes();
        assert_eq!(bytes, vec![0, 5, 0, 0, 0]);
    }

    #[test]
    fn test_instantiate_wire_size() {
        let bytes = ClientMessage::NetworkInstantiate(spawn(1001, "Ball")).to_bytes();
        // tag + id + (len + "Ball") + 7 floats
        assert_eq!(bytes.len(), 1 + 4 + 4 + 4 + 28);
        assert_eq!(bytes[0], MessageTag::NetworkInstantiate.as_u8());
    }

    #[test]
    fn test_unknown_tag_is_reported() {
        assert_eq!(ClientMessage::from_bytes(&[200, 1, 2]), Err(CodecError::UnknownTag(200)));
        assert_eq!(ServerMessage::from_bytes(&[11]), Err(CodecError::UnknownTag(11)));
    }

    #[test]
    fn test_wrong_direction_is_unknown() {
        let bytes = ServerMessage::OnLeftRoom { actor_id: ActorId(1) }.to_bytes();
        assert_eq!(ClientMessage::from_bytes(&bytes), Err(CodecError::UnknownTag(6)));

        let bytes = ClientMessage::JoinRoom {
            user_name: "a".to_string(),
            group_name: "b".to_string(),
        }
        .to_bytes();
        assert_eq!(ServerMessage::from_bytes(&bytes), Err(CodecError::UnknownTag(3)));
    }

    #[test]
    fn test_empty_and_oversized() {
        assert_eq!(ClientMessage::from_bytes(&[]), Err(CodecError::Empty));
        let big = vec![MessageTag::CreateRoom.as_u8(); MAX_MESSAGE_BYTES + 1];
        assert_eq!(ClientMessage::from_bytes(&big), Err(CodecError::Oversized(MAX_MESSAGE_BYTES + 1)));
    }

    #[test]
    fn test_truncated_payloads_are_errors() {
        for msg in all_server_messages("room") {
            let bytes = msg.to_bytes();
            for cut in 1..bytes.len() {
                let result = ServerMessage::from_bytes(&bytes[..cut]);
                assert!(result.is_err(), "{:?} cut at {} decoded", msg.tag(), cut);
            }
        }
    }

    #[test]
    fn test_trailing_bytes_tolerated() {
        let mut bytes = ServerMessage::OnLeftRoom { actor_id: ActorId(4) }.to_bytes();
        bytes.extend_from_slice(&[9, 9, 9]);
        assert_eq!(
            ServerMessage::from_bytes(&bytes),
            Ok(ServerMessage::OnLeftRoom { actor_id: ActorId(4) })
        );
    }

    #[test]
    fn test_hostile_pose_count() {
        let mut w = NetWriter::new();
        w.put_u8(MessageTag::UpdateObjectPose.as_u8());
        w.put_i32(1_000_000);
        w.put_i32(1001);
        assert_eq!(
            ServerMessage::from_bytes(&w.into_bytes()),
            Err(CodecError::InvalidCount(1_000_000))
        );
    }

    #[test]
    fn test_pose_batches_split() {
        let poses: Vec<_> = (0..(MAX_POSES_PER_MESSAGE as i32 * 2 + 3)).map(pose_entry).collect();
        let batches = ServerMessage::pose_batches(&poses);
        assert_eq!(batches.len(), 3);
        for batch in &batches {
            assert!(batch.to_bytes().len() <= MAX_MESSAGE_BYTES);
        }
        assert!(ServerMessage::pose_batches(&[]).is_empty());
    }

    fn pose_strategy() -> impl Strategy<Value = ObjectPose> {
        (any::<i32>(), prop::array::uniform7(-1.0e6f32..1.0e6)).prop_map(|(id, f)| ObjectPose {
            object_id: NetworkObjectId(id),
            pose: Pose::new(Vec3::new(f[0], f[1], f[2]), Quat::new(f[3], f[4], f[5], f[6])),
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

        #[test]
        fn test_roundtrip_client_pose_update(
            group in "\\PC{0,40}",
            poses in prop::collection::vec(pose_strategy(), 0..40),
        ) {
            let msg = ClientMessage::UpdateObjectPose { group_name: group, poses };
            let bytes = msg.to_bytes();
            prop_assert_eq!(ClientMessage::from_bytes(&bytes), Ok(msg));
        }

        #[test]
        fn test_roundtrip_joined_room(actor in any::<i32>(), user in "\\PC{0,64}", group in "\\PC{0,64}") {
            let msg = ServerMessage::OnJoinedRoom {
                actor_id: ActorId(actor),
                user_name: user,
                group_name: group,
            };
            let bytes = msg.to_bytes();
            prop_assert_eq!(ServerMessage::from_bytes(&bytes), Ok(msg));
        }

        #[test]
        fn test_decode_never_panics(data in prop::collection::vec(any::<u8>(), 0..256)) {
            let _ = ClientMessage::from_bytes(&data);
            let _ = ServerMessage::from_bytes(&data);
        }
    }
}
