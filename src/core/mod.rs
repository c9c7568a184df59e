//! Core identifiers and spatial types shared by every layer.

pub mod ids;
pub mod pose;

pub use ids::{ActorId, ClientId, NetworkObjectId, MAX_ACTOR_ID, MAX_SUB_ID};
pub use pose::{Pose, Quat, Vec3};
