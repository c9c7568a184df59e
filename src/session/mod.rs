//! Session Layer
//!
//! Room membership on both sides of the wire: the authority owns the truth on
//! the server, the proxy mirrors what the server confirmed on the client.

pub mod authority;
pub mod events;
pub mod observer;
pub mod proxy;

pub use authority::{
    Actor, AuthorityEvent, Group, Outbound, SessionAuthority, MAX_PENDING_ROOMS_PER_ACTOR,
};
pub use events::SessionEvent;
pub use observer::{Observers, SubscriptionToken};
pub use proxy::{ClientError, SessionProxy};
