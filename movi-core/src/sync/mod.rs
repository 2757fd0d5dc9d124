//! Sync Engine
//!
//! Playback-state propagation between participants: the wire protocol, the
//! convergence math, the engine itself, and the roster.

pub mod engine;
pub mod playback;
pub mod protocol;
pub mod roster;

pub use engine::{ControlMode, EngineConfig, SyncEngine};
pub use playback::{plan_reconcile, PlaybackState, ReconcilePlan};
pub use protocol::{DecodeError, EmojiReaction, EmojiType, MessageBody, Role, SyncMessage};
pub use roster::{Participant, Roster};
