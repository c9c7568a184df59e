//! Application-Facing Events
//!
//! What a client process tells its game layer. Produced by the session proxy
//! (membership) and the replicator (objects).

use crate::core::ids::{ActorId, NetworkObjectId};
use crate::core::pose::Pose;
use crate::protocol::ServerMessage;

/// Event published to client-side observers.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The server confirmed the connection and assigned an actor id.
    ConnectedToServer(ActorId),
    /// The transport connection is gone.
    DisconnectedFromServer,
    /// The server created the requested room.
    CreatedRoom(String),
    /// An actor (possibly this one) joined the room.
    JoinedRoom {
        /// Joining actor
        actor_id: ActorId,
        /// Joining actor's display name
        user_name: String,
        /// Room name
        group_name: String,
    },
    /// This client left its room.
    LeftRoom,
    /// Another member left the room.
    PlayerLeftRoom(ActorId),
    /// A remote object appeared.
    NetworkObjectCreated {
        /// Object id
        object_id: NetworkObjectId,
        /// Logical type / prefab key
        type_key: String,
        /// Initial pose
        pose: Pose,
    },
    /// Remote objects are gone.
    NetworkObjectsRemoved(Vec<NetworkObjectId>),
    /// A known remote object moved.
    NetworkObjectPose {
        /// Object id
        object_id: NetworkObjectId,
        /// New pose
        pose: Pose,
    },
    /// Raw decoded message, published after its semantic events.
    Message(ServerMessage),
}
