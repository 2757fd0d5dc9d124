//! Playback State Model
//!
//! The value type participants exchange, plus the latency-compensation and
//! drift math the engine uses to converge on it.

use serde::{Deserialize, Serialize};

/// A participant's playback snapshot at a moment in time.
///
/// `timestamp_ms` is the sender's wall clock when the snapshot was captured.
/// Per sender it is non-decreasing, but there is no ordering across senders:
/// receivers treat it purely as a latency-compensation hint, never as a
/// total order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    #[serde(rename = "isPlaying")]
    pub is_playing: bool,
    /// Playback position in seconds at the time of `timestamp_ms`.
    #[serde(rename = "currentTime")]
    pub position_secs: f64,
    /// Sender wall-clock milliseconds since the Unix epoch.
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,
    /// Which media asset this state refers to, when known.
    #[serde(rename = "videoUrl", default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

impl PlaybackState {
    pub fn new(is_playing: bool, position_secs: f64, timestamp_ms: i64) -> Self {
        Self {
            is_playing,
            position_secs: position_secs.max(0.0),
            timestamp_ms,
            source_url: None,
        }
    }

    pub fn with_source(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    /// Copy of this state stamped at `now_ms`. Used when answering a sync
    /// request: time has passed since the snapshot was captured, and reusing
    /// the original stamp would make receivers over-compensate.
    pub fn restamped(&self, now_ms: i64) -> Self {
        Self {
            timestamp_ms: now_ms,
            ..self.clone()
        }
    }

    /// Where the sender's playhead is estimated to be at `now_ms`.
    ///
    /// While playing, the position keeps advancing after the snapshot was
    /// stamped, so receivers extrapolate forward by the elapsed wall-clock
    /// time. Negative skew (a sender clock ahead of ours) is ignored rather
    /// than applied as a rewind. While paused the position is stable.
    pub fn target_position_at(&self, now_ms: i64) -> f64 {
        let base = self.position_secs.max(0.0);
        if self.is_playing {
            let latency_secs = (now_ms - self.timestamp_ms).max(0) as f64 / 1000.0;
            base + latency_secs
        } else {
            base
        }
    }

    /// Absolute difference between a local position and this state's
    /// latency-compensated target.
    pub fn drift_from(&self, local_position_secs: f64, now_ms: i64) -> f64 {
        (local_position_secs - self.target_position_at(now_ms)).abs()
    }
}

/// What a receiver must do to converge on a remote snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcilePlan {
    pub target_position_secs: f64,
    pub drift_secs: f64,
    /// Seek to `target_position_secs`. Only set when drift exceeds the
    /// tolerance; smaller drifts are normal timer jitter.
    pub seek: bool,
    /// `Some(true)` start playback, `Some(false)` pause, `None` leave as-is.
    pub set_playing: Option<bool>,
}

/// Decide how to reconcile the local player with a remote snapshot.
pub fn plan_reconcile(
    remote: &PlaybackState,
    local_position_secs: f64,
    local_playing: bool,
    now_ms: i64,
    tolerance_secs: f64,
) -> ReconcilePlan {
    let target_position_secs = remote.target_position_at(now_ms);
    let drift_secs = (local_position_secs - target_position_secs).abs();
    let set_playing = if remote.is_playing != local_playing {
        Some(remote.is_playing)
    } else {
        None
    };

    ReconcilePlan {
        target_position_secs,
        drift_secs,
        seek: drift_secs > tolerance_secs,
        set_playing,
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn current_time_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playing_state_extrapolates_forward() {
        let state = PlaybackState::new(true, 10.0, 1_000);
        // Three seconds after the stamp, the sender is three seconds ahead.
        assert!((state.target_position_at(4_000) - 13.0).abs() < 1e-9);
    }

    #[test]
    fn paused_state_does_not_extrapolate() {
        let state = PlaybackState::new(false, 10.0, 1_000);
        assert_eq!(state.target_position_at(4_000), 10.0);
    }

    #[test]
    fn negative_skew_is_ignored() {
        // Sender's clock is ahead of ours; never rewind the target.
        let state = PlaybackState::new(true, 10.0, 5_000);
        assert_eq!(state.target_position_at(1_000), 10.0);
    }

    #[test]
    fn large_drift_forces_seek() {
        let state = PlaybackState::new(true, 10.0, 1_000);
        let plan = plan_reconcile(&state, 10.0, true, 4_000, 2.0);

        assert!((plan.target_position_secs - 13.0).abs() < 1e-9);
        assert!((plan.drift_secs - 3.0).abs() < 1e-9);
        assert!(plan.seek);
        assert_eq!(plan.set_playing, None);
    }

    #[test]
    fn small_drift_only_reconciles_play_state() {
        let state = PlaybackState::new(true, 10.0, 1_000);
        // Half a second of drift, but we are paused while the sender plays.
        let plan = plan_reconcile(&state, 10.5, false, 1_000, 2.0);

        assert!(!plan.seek);
        assert_eq!(plan.set_playing, Some(true));
    }

    #[test]
    fn matching_state_is_a_no_op() {
        let state = PlaybackState::new(false, 25.0, 1_000);
        let plan = plan_reconcile(&state, 25.2, false, 9_000, 1.5);

        assert!(!plan.seek);
        assert_eq!(plan.set_playing, None);
    }

    #[test]
    fn drift_is_measured_against_the_compensated_target() {
        let state = PlaybackState::new(true, 10.0, 1_000);
        assert!((state.drift_from(10.0, 4_000) - 3.0).abs() < 1e-9);
        assert!((state.drift_from(13.0, 4_000)).abs() < 1e-9);
    }

    #[test]
    fn restamp_keeps_position() {
        let state = PlaybackState::new(true, 33.0, 1_000).with_source("https://cdn/stream.m3u8");
        let fresh = state.restamped(9_000);

        assert_eq!(fresh.timestamp_ms, 9_000);
        assert_eq!(fresh.position_secs, 33.0);
        assert_eq!(fresh.source_url, state.source_url);
    }

    #[test]
    fn negative_positions_are_clamped() {
        let state = PlaybackState::new(false, -4.0, 0);
        assert_eq!(state.position_secs, 0.0);
        assert_eq!(state.target_position_at(1_000), 0.0);
    }
}
