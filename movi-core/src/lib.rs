//! Movi Watch Together - Core Library
//!
//! Keeps any number of viewers' media players converged on a shared
//! play/pause/seek state. One participant is the host, the authoritative
//! source of playback truth; every participant reconciles to the most recent
//! snapshot received over a best-effort room broadcast channel, with latency
//! compensation and feedback-loop suppression.
//!
//! The video pipeline, UI, and account handling live in the host
//! application; this crate covers the synchronization core: wire protocol,
//! sync engine, roster, transport adapter, and the player-binding contract.

pub mod observer;
pub mod player;
pub mod session;
pub mod sync;
pub mod token;
pub mod transport;

// Re-exports for convenience
pub use observer::{ConnectionObserver, ErrorObserver, PlaybackObserver, RosterObserver};
pub use player::{MediaPlayer, PlaybackError};
pub use session::{init_tracing, SessionOptions, SyncSession};
pub use sync::{
    ControlMode, EngineConfig, EmojiReaction, EmojiType, Participant, PlaybackState, Role,
    SyncEngine, SyncMessage,
};
pub use token::{AccessToken, TokenClient, TokenError};
pub use transport::{ConnectError, GossipConfig, RoomName, TransportAdapter};
