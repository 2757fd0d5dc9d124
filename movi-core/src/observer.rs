//! Typed listener interfaces implemented by the host application.
//!
//! The engine depends only on these capabilities, never on a concrete UI.
//! Register whichever ones the application cares about; unregistered
//! capabilities are simply not notified.

use crate::sync::playback::PlaybackState;
use crate::sync::protocol::EmojiReaction;
use crate::sync::roster::Participant;

/// Playback-related events.
pub trait PlaybackObserver: Send + Sync {
    /// A remote snapshot was applied to the local player.
    fn on_state_applied(&self, state: &PlaybackState);

    /// An ephemeral reaction arrived.
    fn on_reaction(&self, _reaction: &EmojiReaction) {}
}

/// Roster changes. Receives the full snapshot on every add/remove/update;
/// the local participant is always the first entry.
pub trait RosterObserver: Send + Sync {
    fn on_roster_changed(&self, participants: &[Participant]);
}

/// Connection-state transitions of the underlying session.
pub trait ConnectionObserver: Send + Sync {
    fn on_connection_changed(&self, connected: bool);
}

/// Connectivity and auth failures. Steady-state message errors are absorbed
/// by the engine and never reach this.
pub trait ErrorObserver: Send + Sync {
    fn on_error(&self, message: &str);
}
