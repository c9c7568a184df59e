//! Session Authority
//!
//! Server-side registry of actors and groups. The only place that decides
//! who is in which room.
//!
//! The authority performs no I/O. Every operation appends the messages it
//! produces to an outbox that the server driver flushes through the
//! transport after each dispatch step.

use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::core::ids::{ActorId, ClientId};
use crate::protocol::ServerMessage;
use crate::session::observer::{Observers, SubscriptionToken};
use crate::transport::DeliveryMode;

// =============================================================================
// TYPES
// =============================================================================

/// A joined participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    /// Actor id (equal to the client id).
    pub actor_id: ActorId,
    /// Display name given at join.
    pub user_name: String,
    /// Room the actor is in.
    pub group_name: String,
}

/// Rooms one actor may hold open through `CreateRoom` before anybody joins.
pub const MAX_PENDING_ROOMS_PER_ACTOR: usize = 16;

/// A named room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    /// Unique room name.
    pub name: String,
    creator: ActorId,
    members: Vec<ActorId>,
}

impl Group {
    fn new(name: &str, creator: ActorId) -> Self {
        Self { name: name.to_string(), creator, members: Vec::new() }
    }

    /// Actor whose request created the room.
    pub fn creator(&self) -> ActorId {
        self.creator
    }

    /// Members in join order.
    pub fn members(&self) -> &[ActorId] {
        &self.members
    }

    /// True if `actor` is a member.
    pub fn contains(&self, actor: ActorId) -> bool {
        self.members.contains(&actor)
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// True if nobody is in the room.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// A message waiting to be handed to the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    /// Destination connection.
    pub to: ClientId,
    /// Message to encode.
    pub message: ServerMessage,
    /// Delivery mode for the send.
    pub mode: DeliveryMode,
}

/// Local notifications about room lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorityEvent {
    /// A room came into existence.
    RoomCreated(String),
    /// An actor joined a room.
    ActorJoined {
        /// Joining actor
        actor_id: ActorId,
        /// Room name
        group_name: String,
    },
    /// An actor left (or was disconnected from) a room.
    ActorLeft {
        /// Leaving actor
        actor_id: ActorId,
        /// Room name
        group_name: String,
    },
    /// The last member left and the room was deleted.
    RoomClosed(String),
}

// =============================================================================
// SESSION AUTHORITY
// =============================================================================

/// Canonical actor/group registry.
#[derive(Debug, Default)]
pub struct SessionAuthority {
    actors: BTreeMap<ActorId, Actor>,
    groups: BTreeMap<String, Group>,
    outbox: Vec<Outbound>,
    observers: Observers<AuthorityEvent>,
}

impl SessionAuthority {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `group_name` on behalf of `actor`.
    ///
    /// Replies `OnCreatedRoom` to the requester only. No-op (returns false)
    /// if the room already exists or the actor already holds
    /// `MAX_PENDING_ROOMS_PER_ACTOR` rooms nobody has joined.
    pub fn create_room(&mut self, actor: ActorId, group_name: &str) -> bool {
        if self.groups.contains_key(group_name) {
            debug!("Room '{}' already exists, ignoring create from {}", group_name, actor);
            return false;
        }
        if self.pending_rooms_of(actor) >= MAX_PENDING_ROOMS_PER_ACTOR {
            warn!("{} holds too many empty rooms, refusing '{}'", actor, group_name);
            return false;
        }
        self.open_room(actor, group_name);
        true
    }

    fn open_room(&mut self, actor: ActorId, group_name: &str) {
        self.groups.insert(group_name.to_string(), Group::new(group_name, actor));
        info!("Room '{}' created by {}", group_name, actor);
        self.observers.notify(&AuthorityEvent::RoomCreated(group_name.to_string()));

        self.send_to(
            actor,
            ServerMessage::OnCreatedRoom {
                actor_id: actor,
                group_name: group_name.to_string(),
            },
        );
    }

    /// Empty rooms created by `actor`.
    fn pending_rooms_of(&self, actor: ActorId) -> usize {
        self.groups
            .values()
            .filter(|group| group.is_empty() && group.creator == actor)
            .count()
    }

    /// Delete the rooms `actor` created that nobody joined. Called when the
    /// actor's connection goes away. Returns how many were deleted.
    pub fn release_pending_rooms(&mut self, actor: ActorId) -> usize {
        let names: Vec<String> = self
            .groups
            .values()
            .filter(|group| group.is_empty() && group.creator == actor)
            .map(|group| group.name.clone())
            .collect();
        for name in &names {
            self.groups.remove(name);
            debug!("Room '{}' closed, its creator {} is gone", name, actor);
            self.observers.notify(&AuthorityEvent::RoomClosed(name.clone()));
        }
        names.len()
    }

    /// Admit `actor` into `group_name`, creating the room if needed.
    ///
    /// Broadcasts `OnJoinedRoom` to every member including the joiner.
    /// Returns false (no state change) if the actor is already registered.
    pub fn join_room(&mut self, actor: ActorId, user_name: &str, group_name: &str) -> bool {
        if let Some(existing) = self.actors.get(&actor) {
            warn!(
                "{} has already joined '{}', ignoring join to '{}'",
                actor, existing.group_name, group_name
            );
            return false;
        }

        if !self.groups.contains_key(group_name) {
            self.open_room(actor, group_name);
        }
        let Some(group) = self.groups.get_mut(group_name) else {
            return false;
        };
        group.members.push(actor);
        self.actors.insert(
            actor,
            Actor {
                actor_id: actor,
                user_name: user_name.to_string(),
                group_name: group_name.to_string(),
            },
        );
        info!("{} ('{}') joined '{}'", actor, user_name, group_name);
        self.observers.notify(&AuthorityEvent::ActorJoined {
            actor_id: actor,
            group_name: group_name.to_string(),
        });

        self.broadcast_to_group(
            group_name,
            ServerMessage::OnJoinedRoom {
                actor_id: actor,
                user_name: user_name.to_string(),
                group_name: group_name.to_string(),
            },
        );
        true
    }

    /// Remove `actor` from its room.
    ///
    /// Broadcasts `OnLeftRoom` to the whole room and `OnPlayerLeftRoom` to
    /// the remaining members, then deletes the room if it became empty.
    /// Idempotent: returns None if the actor was not registered.
    pub fn leave_room(&mut self, actor: ActorId) -> Option<Actor> {
        let group_name = self.group_of(actor)?.to_string();

        self.broadcast_to_group(&group_name, ServerMessage::OnLeftRoom { actor_id: actor });
        self.broadcast_to_group_except_self(actor, ServerMessage::OnPlayerLeftRoom { actor_id: actor });

        let removed = self.actors.remove(&actor);
        let now_empty = match self.groups.get_mut(&group_name) {
            Some(group) => {
                group.members.retain(|member| *member != actor);
                group.is_empty()
            }
            None => false,
        };
        info!("{} left '{}'", actor, group_name);
        self.observers.notify(&AuthorityEvent::ActorLeft {
            actor_id: actor,
            group_name: group_name.clone(),
        });

        if now_empty {
            self.groups.remove(&group_name);
            info!("Room '{}' closed", group_name);
            self.observers.notify(&AuthorityEvent::RoomClosed(group_name));
        }
        removed
    }

    // =========================================================================
    // ROUTING
    // =========================================================================

    /// Queue `message` for `actor`'s connection.
    ///
    /// Addressed by connection, so it also reaches peers that have not joined
    /// a room yet. A dead connection is reported by the transport on flush.
    pub fn send_to(&mut self, actor: ActorId, message: ServerMessage) {
        let mode = message.delivery_mode();
        self.outbox.push(Outbound { to: actor.client(), message, mode });
    }

    /// Queue `message` for every member of `group_name`. No-op for unknown rooms.
    pub fn broadcast_to_group(&mut self, group_name: &str, message: ServerMessage) {
        let Some(group) = self.groups.get(group_name) else {
            debug!("Broadcast to unknown room '{}' dropped", group_name);
            return;
        };
        let mode = message.delivery_mode();
        for member in &group.members {
            self.outbox.push(Outbound {
                to: member.client(),
                message: message.clone(),
                mode,
            });
        }
    }

    /// Queue `message` for every member of `sender`'s room except `sender`.
    /// No-op if the sender is not registered.
    pub fn broadcast_to_group_except_self(&mut self, sender: ActorId, message: ServerMessage) {
        let Some(group) = self
            .actors
            .get(&sender)
            .and_then(|actor| self.groups.get(&actor.group_name))
        else {
            debug!("Broadcast from unregistered {} dropped", sender);
            return;
        };
        let mode = message.delivery_mode();
        for member in group.members.iter().filter(|member| **member != sender) {
            self.outbox.push(Outbound {
                to: member.client(),
                message: message.clone(),
                mode,
            });
        }
    }

    /// Take everything queued since the last call.
    pub fn drain_outbox(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbox)
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Look up a registered actor.
    pub fn actor(&self, actor: ActorId) -> Option<&Actor> {
        self.actors.get(&actor)
    }

    /// Look up a room.
    pub fn group(&self, group_name: &str) -> Option<&Group> {
        self.groups.get(group_name)
    }

    /// Room `actor` is in.
    pub fn group_of(&self, actor: ActorId) -> Option<&str> {
        self.actors.get(&actor).map(|a| a.group_name.as_str())
    }

    /// Iterate rooms in name order.
    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    /// Registered actors.
    pub fn actor_count(&self) -> usize {
        self.actors.len()
    }

    /// Existing rooms.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    // =========================================================================
    // OBSERVERS
    // =========================================================================

    /// Register a room-lifecycle handler.
    pub fn subscribe<F>(&mut self, handler: F) -> SubscriptionToken
    where
        F: FnMut(&AuthorityEvent) + Send + 'static,
    {
        self.observers.subscribe(handler)
    }

    /// Remove a room-lifecycle handler.
    pub fn unsubscribe(&mut self, token: SubscriptionToken) -> bool {
        self.observers.unsubscribe(token)
    }
}
