//! Room Client
//!
//! Drives one client connection: pumps the transport, keeps the session
//! proxy and replicator current, publishes events to observers and sends the
//! per-tick pose update for owned objects.

use tracing::{debug, info, instrument, warn};

use crate::config::ClientConfig;
use crate::core::ids::NetworkObjectId;
use crate::core::pose::Pose;
use crate::protocol::{check_str, ClientMessage, CodecError, ServerMessage};
use crate::replication::Replicator;
use crate::session::{ClientError, Observers, SessionEvent, SessionProxy, SubscriptionToken};
use crate::transport::websocket::WsClient;
use crate::transport::{ClientEvent, ClientTransport};

/// A client connection and its mirrored state.
pub struct RoomClient<T: ClientTransport> {
    transport: T,
    proxy: SessionProxy,
    replicator: Replicator,
    observers: Observers<SessionEvent>,
}

impl RoomClient<WsClient> {
    /// Connect to the configured server over WebSocket.
    #[instrument(skip(config), fields(address = %config.address, port = config.port))]
    pub async fn connect(config: &ClientConfig) -> Result<Self, ClientError> {
        let transport =
            WsClient::connect(&config.address, config.port, &config.key, config.outbound_queue).await?;
        Ok(Self::new(transport))
    }
}

impl<T: ClientTransport> RoomClient<T> {
    /// Wrap a connecting transport.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            proxy: SessionProxy::new(),
            replicator: Replicator::new(),
            observers: Observers::new(),
        }
    }

    /// Mirrored session state.
    pub fn session(&self) -> &SessionProxy {
        &self.proxy
    }

    /// Owned objects and replicas.
    pub fn objects(&self) -> &Replicator {
        &self.replicator
    }

    /// Underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Underlying transport, mutably.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Register an event handler.
    pub fn subscribe<F>(&mut self, handler: F) -> SubscriptionToken
    where
        F: FnMut(&SessionEvent) + Send + 'static,
    {
        self.observers.subscribe(handler)
    }

    /// Remove an event handler.
    pub fn unsubscribe(&mut self, token: SubscriptionToken) -> bool {
        self.observers.unsubscribe(token)
    }

    /// One pump step. Returns the events published to observers.
    pub fn tick(&mut self) -> Vec<SessionEvent> {
        let mut published = Vec::new();
        for event in self.transport.poll() {
            match event {
                ClientEvent::Connected => {
                    debug!("Transport connected");
                    self.proxy.on_transport_connected();
                }
                ClientEvent::Disconnected => {
                    published.extend(self.proxy.on_transport_disconnected());
                    published.extend(self.replicator.clear());
                }
                ClientEvent::Message(data) => match ServerMessage::from_bytes(&data) {
                    Ok(message) => published.extend(self.handle_message(message)),
                    Err(CodecError::UnknownTag(tag)) => {
                        debug!("Ignoring message with unknown tag {}", tag);
                    }
                    Err(e) => warn!("Dropping malformed message from server: {}", e),
                },
            }
        }

        self.send_pose_update();

        for event in &published {
            self.observers.notify(event);
        }
        published
    }

    fn handle_message(&mut self, message: ServerMessage) -> Vec<SessionEvent> {
        let mut events = self.proxy.handle(&message);
        if events.contains(&SessionEvent::LeftRoom) {
            events.extend(self.replicator.clear());
        }
        events.extend(self.replicator.apply(&message));
        events.push(SessionEvent::Message(message));
        events
    }

    fn send_pose_update(&mut self) {
        if !self.proxy.is_joined() {
            return;
        }
        let Some(update) = self.replicator.pose_update(self.proxy.group_name()) else {
            return;
        };
        if let Err(e) = self.send(&update) {
            debug!("Pose update not sent: {}", e);
        }
    }

    fn send(&mut self, message: &ClientMessage) -> Result<(), ClientError> {
        self.transport
            .send(&message.to_bytes(), message.delivery_mode())
            .map_err(ClientError::from)
    }

    // =========================================================================
    // DOWNWARD CALLS
    // =========================================================================

    /// Ask the server to create a room.
    pub fn create_room(&mut self, group_name: &str) -> Result<(), ClientError> {
        let message = self.proxy.create_room(group_name)?;
        self.send(&message)
    }

    /// Ask the server to put this client in a room.
    pub fn join_room(&mut self, user_name: &str, group_name: &str) -> Result<(), ClientError> {
        let message = self.proxy.join_room(user_name, group_name)?;
        info!("Joining '{}' as '{}'", group_name, user_name);
        self.send(&message)
    }

    /// Ask the server to take this client out of its room.
    pub fn leave_room(&mut self) -> Result<(), ClientError> {
        let message = self.proxy.leave_room()?;
        self.send(&message)
    }

    /// Create an owned object and announce it to the room.
    ///
    /// The object lives until this client leaves the room or disconnects;
    /// its id is not handed out again before then.
    pub fn network_instantiate(&mut self, type_key: &str, pose: Pose) -> Result<NetworkObjectId, ClientError> {
        if !self.proxy.is_connected() {
            return Err(ClientError::NotConnected);
        }
        if !self.proxy.is_joined() {
            return Err(ClientError::NotJoined);
        }
        let owner = self.proxy.actor().ok_or(ClientError::NotConnected)?;
        check_str(type_key)?;
        let spawn = self.replicator.instantiate(owner, type_key, pose)?;
        let object_id = spawn.object_id;
        if let Err(e) = self.send(&ClientMessage::NetworkInstantiate(spawn)) {
            self.replicator.discard(object_id);
            return Err(e);
        }
        Ok(object_id)
    }

    /// Move an owned object. Sent with the next tick's pose update.
    pub fn set_object_pose(&mut self, object_id: NetworkObjectId, pose: Pose) -> Result<(), ClientError> {
        self.replicator.set_pose(object_id, pose)?;
        Ok(())
    }
}
