//! Client Replicator
//!
//! Keeps the objects this client owns apart from the read-only replicas of
//! everybody else's, builds the per-tick pose update and applies the
//! server's object messages.

use std::collections::BTreeMap;
use tracing::{debug, trace};

use crate::core::ids::{ActorId, NetworkObjectId};
use crate::core::pose::Pose;
use crate::protocol::{ClientMessage, ObjectPose, ObjectSpawn, ServerMessage};
use crate::session::events::SessionEvent;
use super::{ObjectIdAllocator, ReplicationError};

/// A network object held by a client.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkObject {
    /// Object id.
    pub object_id: NetworkObjectId,
    /// Logical type / prefab key.
    pub type_key: String,
    /// Current pose.
    pub pose: Pose,
}

/// Owned objects plus remote replicas.
#[derive(Debug, Default)]
pub struct Replicator {
    allocator: ObjectIdAllocator,
    owned: BTreeMap<NetworkObjectId, NetworkObject>,
    replicas: BTreeMap<NetworkObjectId, NetworkObject>,
}

impl Replicator {
    /// Nothing owned, nothing replicated.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an owned object and return the announcement to send.
    pub fn instantiate(
        &mut self,
        owner: ActorId,
        type_key: &str,
        pose: Pose,
    ) -> Result<ObjectSpawn, ReplicationError> {
        let object_id = self
            .allocator
            .allocate(owner, |id| self.owned.contains_key(&id))?;
        let object = NetworkObject {
            object_id,
            type_key: type_key.to_string(),
            pose,
        };
        debug!("Instantiated {} '{}'", object_id, type_key);
        self.owned.insert(object_id, object);
        Ok(ObjectSpawn {
            object_id,
            type_key: type_key.to_string(),
            pose,
        })
    }

    /// Move an owned object. Sent with the next pose update.
    pub fn set_pose(&mut self, object_id: NetworkObjectId, pose: Pose) -> Result<(), ReplicationError> {
        let object = self
            .owned
            .get_mut(&object_id)
            .ok_or(ReplicationError::UnknownObject(object_id))?;
        object.pose = pose;
        Ok(())
    }

    /// Forget an owned object whose announcement never left this client.
    /// The server holds every announced id until the owner leaves, so this
    /// is the only way a slot is freed before `clear`.
    pub(crate) fn discard(&mut self, object_id: NetworkObjectId) -> Option<NetworkObject> {
        self.owned.remove(&object_id)
    }

    /// Snapshot of every owned object, or None if nothing is owned.
    pub fn pose_update(&self, group_name: &str) -> Option<ClientMessage> {
        if self.owned.is_empty() {
            return None;
        }
        let poses = self
            .owned
            .values()
            .map(|object| ObjectPose { object_id: object.object_id, pose: object.pose })
            .collect();
        Some(ClientMessage::UpdateObjectPose {
            group_name: group_name.to_string(),
            poses,
        })
    }

    /// Apply an object message from the server and return the resulting events.
    pub fn apply(&mut self, message: &ServerMessage) -> Vec<SessionEvent> {
        match message {
            ServerMessage::NetworkInstantiate(spawn) => self.apply_spawn(spawn),
            ServerMessage::RemoveNetworkObjects { actor_id, object_ids } => {
                let removed: Vec<NetworkObjectId> = object_ids
                    .iter()
                    .filter(|id| self.replicas.remove(*id).is_some())
                    .copied()
                    .collect();
                debug!("Removed {} objects of {}", removed.len(), actor_id);
                if removed.is_empty() {
                    Vec::new()
                } else {
                    vec![SessionEvent::NetworkObjectsRemoved(removed)]
                }
            }
            ServerMessage::UpdateObjectPose { poses } => poses
                .iter()
                .filter_map(|update| {
                    let replica = self.replicas.get_mut(&update.object_id)?;
                    replica.pose = update.pose;
                    Some(SessionEvent::NetworkObjectPose {
                        object_id: update.object_id,
                        pose: update.pose,
                    })
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    fn apply_spawn(&mut self, spawn: &ObjectSpawn) -> Vec<SessionEvent> {
        if self.owned.contains_key(&spawn.object_id) {
            trace!("Ignoring echo of owned {}", spawn.object_id);
            return Vec::new();
        }
        if let Some(replica) = self.replicas.get_mut(&spawn.object_id) {
            replica.pose = spawn.pose;
            return vec![SessionEvent::NetworkObjectPose {
                object_id: spawn.object_id,
                pose: spawn.pose,
            }];
        }
        self.replicas.insert(
            spawn.object_id,
            NetworkObject {
                object_id: spawn.object_id,
                type_key: spawn.type_key.clone(),
                pose: spawn.pose,
            },
        );
        vec![SessionEvent::NetworkObjectCreated {
            object_id: spawn.object_id,
            type_key: spawn.type_key.clone(),
            pose: spawn.pose,
        }]
    }

    /// Forget everything (room left or connection lost).
    pub fn clear(&mut self) -> Vec<SessionEvent> {
        let mut cleared: Vec<NetworkObjectId> = self.owned.keys().copied().collect();
        cleared.extend(self.replicas.keys().copied());
        cleared.sort_unstable();
        self.owned.clear();
        self.replicas.clear();
        self.allocator.reset();
        if cleared.is_empty() {
            Vec::new()
        } else {
            vec![SessionEvent::NetworkObjectsRemoved(cleared)]
        }
    }

    /// An owned object.
    pub fn owned(&self, object_id: NetworkObjectId) -> Option<&NetworkObject> {
        self.owned.get(&object_id)
    }

    /// A remote replica.
    pub fn replica(&self, object_id: NetworkObjectId) -> Option<&NetworkObject> {
        self.replicas.get(&object_id)
    }

    /// Owned objects in id order.
    pub fn owned_objects(&self) -> impl Iterator<Item = &NetworkObject> {
        self.owned.values()
    }

    /// Remote replicas in id order.
    pub fn replicas(&self) -> impl Iterator<Item = &NetworkObject> {
        self.replicas.values()
    }

    /// Number of owned objects.
    pub fn owned_count(&self) -> usize {
        self.owned.len()
    }

    /// Number of replicas.
    pub fn replica_count(&self) -> usize {
        self.replicas.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pose::Vec3;

    fn remote(id: i32) -> ServerMessage {
        ServerMessage::NetworkInstantiate(ObjectSpawn {
            object_id: NetworkObjectId(id),
            type_key: "Ball".into(),
            pose: Pose::IDENTITY,
        })
    }

    #[test]
    fn test_instantiate_allocates_in_owner_range() {
        let mut rep = Replicator::new();
        let a = rep.instantiate(ActorId(1), "Ball", Pose::IDENTITY).unwrap();
        let b = rep.instantiate(ActorId(1), "Cube", Pose::IDENTITY).unwrap();
        assert_eq!(a.object_id.get(), 1001);
        assert_eq!(b.object_id.get(), 1002);
        assert_eq!(rep.owned_count(), 2);
    }

    #[test]
    fn test_instantiate_without_actor_fails() {
        let mut rep = Replicator::new();
        assert!(rep.instantiate(ActorId(ActorId::NONE), "Ball", Pose::IDENTITY).is_err());
        assert_eq!(rep.owned_count(), 0);
    }

    #[test]
    fn test_held_ids_never_reissued() {
        let mut rep = Replicator::new();
        let first = rep.instantiate(ActorId(1), "Ball", Pose::IDENTITY).unwrap();
        for _ in 0..997 {
            rep.instantiate(ActorId(1), "Cube", Pose::IDENTITY).unwrap();
        }
        let last = rep.instantiate(ActorId(1), "Sword", Pose::IDENTITY).unwrap();
        assert_eq!(last.object_id.get(), 1999);
        assert_ne!(last.object_id, first.object_id);
        assert_eq!(
            rep.instantiate(ActorId(1), "Sword", Pose::IDENTITY),
            Err(ReplicationError::Exhausted(ActorId(1)))
        );
        assert_eq!(rep.owned(first.object_id).unwrap().type_key, "Ball");
    }

    #[test]
    fn test_discard_frees_slot_round_robin() {
        let mut rep = Replicator::new();
        let a = rep.instantiate(ActorId(1), "Ball", Pose::IDENTITY).unwrap();
        assert!(rep.discard(a.object_id).is_some());
        let b = rep.instantiate(ActorId(1), "Ball", Pose::IDENTITY).unwrap();
        assert_eq!(b.object_id.get(), 1002);
        assert!(rep.discard(a.object_id).is_none());
    }

    #[test]
    fn test_pose_update_lists_owned() {
        let mut rep = Replicator::new();
        assert!(rep.pose_update("R").is_none());

        let a = rep.instantiate(ActorId(2), "Ball", Pose::IDENTITY).unwrap();
        let moved = Pose::at(Vec3::new(0.0, 1.0, 0.0));
        rep.set_pose(a.object_id, moved).unwrap();

        assert_eq!(
            rep.pose_update("R"),
            Some(ClientMessage::UpdateObjectPose {
                group_name: "R".into(),
                poses: vec![ObjectPose { object_id: a.object_id, pose: moved }],
            })
        );
        assert!(rep.set_pose(NetworkObjectId(9001), moved).is_err());
    }

    #[test]
    fn test_remote_spawn_and_refresh() {
        let mut rep = Replicator::new();
        let events = rep.apply(&remote(2001));
        assert!(matches!(events.as_slice(), [SessionEvent::NetworkObjectCreated { .. }]));
        assert_eq!(rep.replica_count(), 1);

        let events = rep.apply(&remote(2001));
        assert!(matches!(events.as_slice(), [SessionEvent::NetworkObjectPose { .. }]));
        assert_eq!(rep.replica_count(), 1);
    }

    #[test]
    fn test_pose_snapshot_ignores_unknown_and_owned() {
        let mut rep = Replicator::new();
        let own = rep.instantiate(ActorId(1), "Ball", Pose::IDENTITY).unwrap();
        rep.apply(&remote(2001));

        let moved = Pose::at(Vec3::new(5.0, 0.0, 0.0));
        let events = rep.apply(&ServerMessage::UpdateObjectPose {
            poses: vec![
                ObjectPose { object_id: own.object_id, pose: moved },
                ObjectPose { object_id: NetworkObjectId(2001), pose: moved },
                ObjectPose { object_id: NetworkObjectId(3001), pose: moved },
            ],
        });
        assert_eq!(
            events,
            vec![SessionEvent::NetworkObjectPose { object_id: NetworkObjectId(2001), pose: moved }]
        );
        assert_eq!(rep.replica(NetworkObjectId(2001)).unwrap().pose, moved);
        assert_eq!(rep.owned(own.object_id).unwrap().pose, Pose::IDENTITY);
    }

    #[test]
    fn test_remove_reports_known_only() {
        let mut rep = Replicator::new();
        rep.apply(&remote(2001));
        let events = rep.apply(&ServerMessage::RemoveNetworkObjects {
            actor_id: ActorId(2),
            object_ids: vec![NetworkObjectId(2001), NetworkObjectId(2002)],
        });
        assert_eq!(events, vec![SessionEvent::NetworkObjectsRemoved(vec![NetworkObjectId(2001)])]);
        assert!(rep.replica(NetworkObjectId(2001)).is_none());
    }

    #[test]
    fn test_clear_resets_cursor() {
        let mut rep = Replicator::new();
        rep.instantiate(ActorId(1), "Ball", Pose::IDENTITY).unwrap();
        rep.instantiate(ActorId(1), "Ball", Pose::IDENTITY).unwrap();
        rep.apply(&remote(2001));

        let events = rep.clear();
        assert_eq!(
            events,
            vec![SessionEvent::NetworkObjectsRemoved(vec![
                NetworkObjectId(1001),
                NetworkObjectId(1002),
                NetworkObjectId(2001),
            ])]
        );
        assert_eq!(rep.owned_count() + rep.replica_count(), 0);
        assert!(rep.clear().is_empty());
        assert_eq!(rep.instantiate(ActorId(1), "Ball", Pose::IDENTITY).unwrap().object_id.get(), 1001);
    }
}
