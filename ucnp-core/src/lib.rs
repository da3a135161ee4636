//! UCNP ("USB-C Net Protocol") peer rendezvous reference implementation.
//! Host-driven core: the link layer performs no I/O; a session drives it
//! against an injected channel capability.

pub mod channel;
pub mod identity;
pub mod integrity;
pub mod link;
pub mod session;
pub mod wire;

pub use channel::{Channel, ChannelError, MemoryMailbox};
pub use identity::{PeerId, BROADCAST_ID};
pub use link::{Link, LinkError, LinkEvents, LinkState, NullEvents};
pub use session::{Session, SessionConfig, SessionError};
pub use wire::{decode_frame, encode_frame, Header, MsgType, PROTOCOL_VERSION, WireError};
