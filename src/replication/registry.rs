//! Server Object Registry
//!
//! Authoritative copy of every live network object, used to answer late
//! joiners, to build per-room pose snapshots and to clean up after an actor
//! leaves.

use std::collections::BTreeMap;

use crate::core::ids::{ActorId, NetworkObjectId};
use crate::core::pose::Pose;
use crate::protocol::{ObjectPose, ObjectSpawn};
use super::ReplicationError;

/// A live object as the server knows it.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRecord {
    /// Object id.
    pub object_id: NetworkObjectId,
    /// Room the object lives in (its owner's room).
    pub group_name: String,
    /// Logical type / prefab key.
    pub type_key: String,
    /// Last pose reported by the owner.
    pub pose: Pose,
}

impl ObjectRecord {
    /// Actor authoritative for this object.
    pub fn owner(&self) -> ActorId {
        self.object_id.owner()
    }

    /// Spawn message describing the current state.
    pub fn to_spawn(&self) -> ObjectSpawn {
        ObjectSpawn {
            object_id: self.object_id,
            type_key: self.type_key.clone(),
            pose: self.pose,
        }
    }
}

/// Objects keyed by id. Ids sort by owner, so an actor's objects are a
/// contiguous key range.
#[derive(Debug, Default)]
pub struct ObjectRegistry {
    objects: BTreeMap<NetworkObjectId, ObjectRecord>,
}

impl ObjectRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an object announced by `sender` in `group_name`.
    pub fn insert(
        &mut self,
        sender: ActorId,
        group_name: &str,
        spawn: &ObjectSpawn,
    ) -> Result<(), ReplicationError> {
        if !spawn.object_id.is_owned_by(sender) {
            return Err(ReplicationError::NotOwner { object: spawn.object_id, actor: sender });
        }
        if self.objects.contains_key(&spawn.object_id) {
            return Err(ReplicationError::AlreadyExists(spawn.object_id));
        }
        self.objects.insert(
            spawn.object_id,
            ObjectRecord {
                object_id: spawn.object_id,
                group_name: group_name.to_string(),
                type_key: spawn.type_key.clone(),
                pose: spawn.pose,
            },
        );
        Ok(())
    }

    /// Overwrite the pose of an object `sender` owns.
    pub fn update_pose(&mut self, sender: ActorId, update: &ObjectPose) -> Result<(), ReplicationError> {
        if !update.object_id.is_owned_by(sender) {
            return Err(ReplicationError::NotOwner { object: update.object_id, actor: sender });
        }
        let record = self
            .objects
            .get_mut(&update.object_id)
            .ok_or(ReplicationError::UnknownObject(update.object_id))?;
        record.pose = update.pose;
        Ok(())
    }

    /// Remove everything `owner` owns. Returns the removed ids in order.
    pub fn remove_owned_by(&mut self, owner: ActorId) -> Vec<NetworkObjectId> {
        let range = owner.object_range();
        let ids: Vec<NetworkObjectId> = self
            .objects
            .range(NetworkObjectId(range.start)..NetworkObjectId(range.end))
            .map(|(id, _)| *id)
            .collect();
        for id in &ids {
            self.objects.remove(id);
        }
        ids
    }

    /// Look up an object.
    pub fn get(&self, object_id: NetworkObjectId) -> Option<&ObjectRecord> {
        self.objects.get(&object_id)
    }

    /// Objects in `group_name`, in id order.
    pub fn in_group<'a>(&'a self, group_name: &'a str) -> impl Iterator<Item = &'a ObjectRecord> + 'a {
        self.objects.values().filter(move |record| record.group_name == group_name)
    }

    /// Pose snapshot of every object in `group_name`.
    pub fn snapshot(&self, group_name: &str) -> Vec<ObjectPose> {
        self.in_group(group_name)
            .map(|record| ObjectPose { object_id: record.object_id, pose: record.pose })
            .collect()
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pose::Vec3;

    fn spawn(id: i32) -> ObjectSpawn {
        ObjectSpawn {
            object_id: NetworkObjectId(id),
            type_key: "Ball".into(),
            pose: Pose::IDENTITY,
        }
    }

    #[test]
    fn test_insert_checks_ownership() {
        let mut reg = ObjectRegistry::new();
        assert!(reg.insert(ActorId(1), "R", &spawn(1001)).is_ok());
        assert_eq!(
            reg.insert(ActorId(1), "R", &spawn(2001)),
            Err(ReplicationError::NotOwner { object: NetworkObjectId(2001), actor: ActorId(1) })
        );
        assert!(reg.insert(ActorId(1), "R", &spawn(1000)).is_err());
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get(NetworkObjectId(1001)).unwrap().owner(), ActorId(1));
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let mut reg = ObjectRegistry::new();
        reg.insert(ActorId(1), "R", &spawn(1001)).unwrap();
        assert_eq!(
            reg.insert(ActorId(1), "R", &spawn(1001)),
            Err(ReplicationError::AlreadyExists(NetworkObjectId(1001)))
        );
    }

    #[test]
    fn test_update_pose() {
        let mut reg = ObjectRegistry::new();
        reg.insert(ActorId(1), "R", &spawn(1001)).unwrap();
        let moved = Pose::at(Vec3::new(1.0, 2.0, 3.0));

        let update = ObjectPose { object_id: NetworkObjectId(1001), pose: moved };
        reg.update_pose(ActorId(1), &update).unwrap();
        assert_eq!(reg.get(NetworkObjectId(1001)).unwrap().pose, moved);

        assert!(reg.update_pose(ActorId(2), &update).is_err());
        let unknown = ObjectPose { object_id: NetworkObjectId(1002), pose: moved };
        assert_eq!(
            reg.update_pose(ActorId(1), &unknown),
            Err(ReplicationError::UnknownObject(NetworkObjectId(1002)))
        );
    }

    #[test]
    fn test_remove_owned_by_range() {
        let mut reg = ObjectRegistry::new();
        reg.insert(ActorId(1), "R", &spawn(1001)).unwrap();
        reg.insert(ActorId(1), "R", &spawn(1999)).unwrap();
        reg.insert(ActorId(2), "R", &spawn(2001)).unwrap();

        let removed = reg.remove_owned_by(ActorId(1));
        assert_eq!(removed, vec![NetworkObjectId(1001), NetworkObjectId(1999)]);
        assert_eq!(reg.len(), 1);
        assert!(reg.remove_owned_by(ActorId(1)).is_empty());
    }

    #[test]
    fn test_snapshot_per_group() {
        let mut reg = ObjectRegistry::new();
        reg.insert(ActorId(1), "R", &spawn(1001)).unwrap();
        reg.insert(ActorId(2), "S", &spawn(2001)).unwrap();
        reg.insert(ActorId(3), "R", &spawn(3001)).unwrap();

        let ids: Vec<i32> = reg.snapshot("R").iter().map(|p| p.object_id.get()).collect();
        assert_eq!(ids, vec![1001, 3001]);
        assert!(reg.snapshot("nowhere").is_empty());
        assert_eq!(reg.in_group("S").next().unwrap().to_spawn(), spawn(2001));
    }
}
