//! Transport Layer
//!
//! The external real-time session, wrapped. The adapter owns the session's
//! lifecycle and is the only place transport primitives are called; the
//! gossip backend is the reference session implementation.

mod adapter;
mod gossip;
mod room;
mod session;

pub use adapter::{ConnectError, TransportAdapter, TransportEvent};
pub use gossip::{GossipConfig, GossipError, GossipSession};
pub use room::RoomName;
pub use session::{SessionCommand, SessionEvent, SessionHandle};
