//! Player Binding
//!
//! Contract between the sync engine and the actual media element. The
//! element itself (HLS pipeline, codecs, rendering) lives in the host
//! application; the engine only needs to read its live state and steer it.

use thiserror::Error;

use crate::sync::playback::PlaybackState;

/// A play or seek call the media element refused, e.g. an autoplay policy
/// rejecting `play()` or a detached element. The engine swallows these; they
/// never interrupt synchronization.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("media element rejected play/pause: {0}")]
    PlayRejected(String),

    #[error("media element rejected seek to {position_secs}s: {reason}")]
    SeekRejected { position_secs: f64, reason: String },

    #[error("no media element attached")]
    Detached,
}

/// Read/write surface of the local media player.
///
/// `snapshot` reads the live position and play flag, stamped with the
/// capture time; it returns `None` while no media is loaded, which also
/// tells the engine there is nothing to report to a sync request.
/// `seek_to` and `set_playing` must catch the element's own rejections and
/// return them as [`PlaybackError`] instead of panicking.
pub trait MediaPlayer: Send + Sync {
    fn snapshot(&self) -> Option<PlaybackState>;

    fn seek_to(&self, position_secs: f64) -> Result<(), PlaybackError>;

    fn set_playing(&self, playing: bool) -> Result<(), PlaybackError>;
}
