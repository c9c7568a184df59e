//! Room Server
//!
//! Single-threaded driver around the session authority and object registry.
//! One `tick` drains the transport, dispatches every event in arrival order,
//! broadcasts one pose snapshot per room and flushes the outbox.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::config::ServerConfig;
use crate::core::ids::{ActorId, ClientId};
use crate::protocol::{ClientMessage, CodecError, ObjectPose, ObjectSpawn, ServerMessage};
use crate::replication::ObjectRegistry;
use crate::session::{Outbound, SessionAuthority};
use crate::transport::websocket::WsServer;
use crate::transport::{ServerEvent, ServerTransport, TransportError};

/// Stops `RoomServer::run`. A request made before `run` starts is kept,
/// and `run` then returns without ticking.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Ask the loop to exit after the current tick.
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }
}

/// The room server.
pub struct RoomServer<T: ServerTransport> {
    transport: T,
    authority: SessionAuthority,
    objects: ObjectRegistry,
    shutdown_tx: Arc<watch::Sender<bool>>,
    ticks: u64,
}

impl RoomServer<WsServer> {
    /// Listen on the configured host and port over WebSocket.
    pub async fn bind(config: &ServerConfig) -> Result<Self, TransportError> {
        let transport = WsServer::listen(
            &config.host,
            config.port,
            &config.key,
            config.max_connections,
            config.outbound_queue,
        )
        .await?;
        Ok(Self::new(transport))
    }
}

impl<T: ServerTransport> RoomServer<T> {
    /// Wrap an already listening transport.
    pub fn new(transport: T) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            transport,
            authority: SessionAuthority::new(),
            objects: ObjectRegistry::new(),
            shutdown_tx: Arc::new(shutdown_tx),
            ticks: 0,
        }
    }

    /// Membership registry.
    pub fn authority(&self) -> &SessionAuthority {
        &self.authority
    }

    /// Membership registry, e.g. to subscribe to room lifecycle events.
    pub fn authority_mut(&mut self) -> &mut SessionAuthority {
        &mut self.authority
    }

    /// Authoritative object table.
    pub fn objects(&self) -> &ObjectRegistry {
        &self.objects
    }

    /// Underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Underlying transport, mutably.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Ticks run so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Handle that stops `run`.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle { tx: self.shutdown_tx.clone() }
    }

    /// Drive `tick` at `tick_rate` Hz until shut down.
    #[instrument(skip(self))]
    pub async fn run(&mut self, tick_rate: u32) {
        let period = Duration::from_secs_f64(1.0 / f64::from(tick_rate.max(1)));
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        if *shutdown_rx.borrow() {
            info!("Shutdown requested before start");
            return;
        }
        info!("Room server running at {} Hz", tick_rate);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick(),
                _ = shutdown_rx.changed() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }
    }

    /// One dispatch and broadcast step.
    pub fn tick(&mut self) {
        for event in self.transport.poll() {
            self.handle_event(event);
        }
        self.broadcast_poses();
        self.flush();
        self.ticks += 1;
    }

    fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Connected(client) => {
                info!("{} connected", client);
                let actor_id = client.actor();
                self.authority.send_to(actor_id, ServerMessage::OnConnectedServer { actor_id });
            }
            ServerEvent::Disconnected(client) => {
                info!("{} disconnected", client);
                self.remove_actor(client.actor());
                self.authority.release_pending_rooms(client.actor());
            }
            ServerEvent::Message { from, data } => self.handle_message(from, &data),
        }
    }

    fn handle_message(&mut self, from: ClientId, data: &[u8]) {
        #[cfg(feature = "debug-tracing")]
        tracing::trace!("{} sent {}", from, hex::encode(data));

        match ClientMessage::from_bytes(data) {
            Ok(message) => self.dispatch(from.actor(), message),
            Err(CodecError::UnknownTag(tag)) => {
                debug!("Ignoring message with unknown tag {} from {}", tag, from);
            }
            Err(e) => {
                warn!("Dropping malformed message from {}: {}", from, e);
            }
        }
    }

    fn dispatch(&mut self, actor: ActorId, message: ClientMessage) {
        debug!("{} -> {}", actor, message.tag());
        match message {
            ClientMessage::CreateRoom { group_name } => {
                self.authority.create_room(actor, &group_name);
            }
            ClientMessage::JoinRoom { user_name, group_name } => {
                if self.authority.join_room(actor, &user_name, &group_name) {
                    self.catch_up(actor, &group_name);
                }
            }
            ClientMessage::LeaveRoom { actor_id } => {
                if actor_id != actor {
                    debug!("{} asked to leave as {}, using connection id", actor, actor_id);
                }
                self.remove_actor(actor);
            }
            ClientMessage::NetworkInstantiate(spawn) => self.instantiate(actor, spawn),
            ClientMessage::UpdateObjectPose { group_name, poses } => {
                self.update_poses(actor, &group_name, &poses);
            }
        }
    }

    /// Tell a fresh joiner about objects already live in the room.
    fn catch_up(&mut self, actor: ActorId, group_name: &str) {
        let spawns: Vec<ObjectSpawn> = self
            .objects
            .in_group(group_name)
            .map(|record| record.to_spawn())
            .collect();
        if !spawns.is_empty() {
            debug!("Sending {} existing objects to {}", spawns.len(), actor);
        }
        for spawn in spawns {
            self.authority.send_to(actor, ServerMessage::NetworkInstantiate(spawn));
        }
    }

    fn instantiate(&mut self, actor: ActorId, spawn: ObjectSpawn) {
        let Some(group_name) = self.authority.group_of(actor) else {
            warn!("{} instantiated {} without joining a room", actor, spawn.object_id);
            return;
        };
        if let Err(e) = self.objects.insert(actor, group_name, &spawn) {
            warn!("Rejected instantiate from {}: {}", actor, e);
            return;
        }
        info!("{} instantiated {} '{}'", actor, spawn.object_id, spawn.type_key);
        self.authority
            .broadcast_to_group_except_self(actor, ServerMessage::NetworkInstantiate(spawn));
    }

    fn update_poses(&mut self, actor: ActorId, group_name: &str, poses: &[ObjectPose]) {
        match self.authority.group_of(actor) {
            Some(current) if current == group_name => {}
            Some(current) => {
                warn!(
                    "{} sent poses for '{}' while in '{}', dropping",
                    actor, group_name, current
                );
                return;
            }
            None => {
                debug!("Poses from unjoined {} dropped", actor);
                return;
            }
        }
        for update in poses {
            if let Err(e) = self.objects.update_pose(actor, update) {
                debug!("Ignoring pose from {}: {}", actor, e);
            }
        }
    }

    /// Leave path shared by explicit leave and disconnect. Idempotent.
    fn remove_actor(&mut self, actor: ActorId) {
        let removed = self.objects.remove_owned_by(actor);
        if !removed.is_empty() {
            info!("Removed {} objects owned by {}", removed.len(), actor);
            self.authority.broadcast_to_group_except_self(
                actor,
                ServerMessage::RemoveNetworkObjects { actor_id: actor, object_ids: removed },
            );
        }
        self.authority.leave_room(actor);
    }

    fn broadcast_poses(&mut self) {
        let rooms: Vec<String> = self.authority.groups().map(|g| g.name.clone()).collect();
        for room in rooms {
            let snapshot = self.objects.snapshot(&room);
            if snapshot.is_empty() {
                continue;
            }
            for batch in ServerMessage::pose_batches(&snapshot) {
                self.authority.broadcast_to_group(&room, batch);
            }
        }
    }

    fn flush(&mut self) {
        for Outbound { to, message, mode } in self.authority.drain_outbox() {
            let bytes = message.to_bytes();
            match self.transport.send(to, &bytes, mode) {
                Ok(()) => {}
                Err(TransportError::UnknownPeer(peer)) => {
                    debug!("Dropped {} for disconnected {}", message.tag(), peer);
                }
                Err(e) => warn!("Send of {} to {} failed: {}", message.tag(), to, e),
            }
        }
    }
}
