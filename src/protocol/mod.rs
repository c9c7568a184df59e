//! Wire Protocol
//!
//! Tagged binary messages shared by server and client. Nothing here does I/O.

pub mod tag;
pub mod codec;
pub mod message;

pub use tag::{
    MessageTag, MAX_MESSAGE_BYTES, MAX_STRING_BYTES, MAX_POSES_PER_MESSAGE, POSE_ENTRY_BYTES,
};
pub use codec::{check_str, CodecError, NetReader, NetWriter};
pub use message::{ClientMessage, ServerMessage, ObjectSpawn, ObjectPose};
