//! Session Proxy
//!
//! Client-side mirror of the identity and membership state the server has
//! confirmed. It changes only in response to transport events and server
//! messages; downward calls merely build the request.

use thiserror::Error;
use tracing::{debug, info};

use crate::core::ids::ActorId;
use crate::protocol::{check_str, ClientMessage, CodecError, ServerMessage};
use crate::replication::ReplicationError;
use crate::session::events::SessionEvent;
use crate::transport::TransportError;

/// Errors returned by client-side downward calls.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No transport connection (or no actor id assigned yet).
    #[error("not connected to server")]
    NotConnected,

    /// The call needs a joined room.
    #[error("not in a room")]
    NotJoined,

    /// A name or type key does not fit on the wire.
    #[error("invalid argument: {0}")]
    Codec(#[from] CodecError),

    /// Object bookkeeping failure.
    #[error("replication error: {0}")]
    Replication(#[from] ReplicationError),

    /// The transport refused the send.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Locally mirrored session state.
#[derive(Debug, Clone)]
pub struct SessionProxy {
    connected: bool,
    joined: bool,
    local_actor_id: ActorId,
    local_user_name: String,
    group_name: String,
}

impl Default for SessionProxy {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionProxy {
    /// Disconnected, not joined.
    pub fn new() -> Self {
        Self {
            connected: false,
            joined: false,
            local_actor_id: ActorId(ActorId::NONE),
            local_user_name: String::new(),
            group_name: String::new(),
        }
    }

    /// Transport connection is up.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Server confirmed this client in a room.
    pub fn is_joined(&self) -> bool {
        self.joined
    }

    /// Actor id assigned by the server, or `ActorId::NONE`.
    pub fn local_actor_id(&self) -> ActorId {
        self.local_actor_id
    }

    /// Confirmed actor id, if any.
    pub fn actor(&self) -> Option<ActorId> {
        (self.local_actor_id.get() != ActorId::NONE).then_some(self.local_actor_id)
    }

    /// Display name confirmed at join (empty when not joined).
    pub fn local_user_name(&self) -> &str {
        &self.local_user_name
    }

    /// Current room (empty when not joined).
    pub fn group_name(&self) -> &str {
        &self.group_name
    }

    // =========================================================================
    // INBOUND
    // =========================================================================

    /// Transport reported the connection up. The actor id arrives later
    /// with `OnConnectedServer`.
    pub fn on_transport_connected(&mut self) {
        self.connected = true;
        self.joined = false;
    }

    /// Transport reported the connection gone. Clears everything.
    pub fn on_transport_disconnected(&mut self) -> Vec<SessionEvent> {
        let was_connected = self.connected;
        *self = Self::new();
        if was_connected {
            info!("Disconnected from server");
            vec![SessionEvent::DisconnectedFromServer]
        } else {
            Vec::new()
        }
    }

    /// Apply a membership message and return the resulting events.
    /// Object messages produce nothing here.
    pub fn handle(&mut self, message: &ServerMessage) -> Vec<SessionEvent> {
        match message {
            ServerMessage::OnConnectedServer { actor_id } => {
                self.connected = true;
                self.joined = false;
                self.local_actor_id = *actor_id;
                info!("Connected to server as {}", actor_id);
                vec![SessionEvent::ConnectedToServer(*actor_id)]
            }
            ServerMessage::OnCreatedRoom { group_name, .. } => {
                debug!("Room '{}' created", group_name);
                vec![SessionEvent::CreatedRoom(group_name.clone())]
            }
            ServerMessage::OnJoinedRoom { actor_id, user_name, group_name } => {
                if *actor_id == self.local_actor_id {
                    self.joined = true;
                    self.local_user_name = user_name.clone();
                    self.group_name = group_name.clone();
                    info!("Joined '{}' as '{}'", group_name, user_name);
                }
                vec![SessionEvent::JoinedRoom {
                    actor_id: *actor_id,
                    user_name: user_name.clone(),
                    group_name: group_name.clone(),
                }]
            }
            ServerMessage::OnLeftRoom { actor_id } if *actor_id == self.local_actor_id => {
                info!("Left '{}'", self.group_name);
                self.joined = false;
                self.local_user_name.clear();
                self.group_name.clear();
                vec![SessionEvent::LeftRoom]
            }
            ServerMessage::OnPlayerLeftRoom { actor_id } => {
                debug!("{} left the room", actor_id);
                vec![SessionEvent::PlayerLeftRoom(*actor_id)]
            }
            _ => Vec::new(),
        }
    }

    // =========================================================================
    // DOWNWARD CALLS
    // =========================================================================

    /// Request a room.
    pub fn create_room(&self, group_name: &str) -> Result<ClientMessage, ClientError> {
        self.require_connected()?;
        check_str(group_name)?;
        Ok(ClientMessage::CreateRoom { group_name: group_name.to_string() })
    }

    /// Request to join (and implicitly create) a room.
    pub fn join_room(&self, user_name: &str, group_name: &str) -> Result<ClientMessage, ClientError> {
        self.require_connected()?;
        check_str(user_name)?;
        check_str(group_name)?;
        Ok(ClientMessage::JoinRoom {
            user_name: user_name.to_string(),
            group_name: group_name.to_string(),
        })
    }

    /// Request to leave the current room.
    pub fn leave_room(&self) -> Result<ClientMessage, ClientError> {
        self.require_connected()?;
        let actor_id = self.actor().ok_or(ClientError::NotConnected)?;
        Ok(ClientMessage::LeaveRoom { actor_id })
    }

    fn require_connected(&self) -> Result<(), ClientError> {
        if self.connected {
            Ok(())
        } else {
            Err(ClientError::NotConnected)
        }
    }
}
