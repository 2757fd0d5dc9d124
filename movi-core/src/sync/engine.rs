//! Sync Engine
//!
//! The protocol core: processes everything the transport delivers, decides
//! what to apply and what to broadcast, and keeps the local player converged
//! on the most recently received snapshot.
//!
//! Two mechanisms prevent echo storms between peers that would otherwise
//! endlessly re-sync each other:
//! - inbound messages carrying our own sender identity are discarded, and
//! - while a remote snapshot is being applied (plus a settle window), locally
//!   observed play/pause/seek events are treated as echoes of our own
//!   adjustment and suppressed from re-broadcast.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::observer::{ConnectionObserver, ErrorObserver, PlaybackObserver, RosterObserver};
use crate::player::MediaPlayer;
use crate::transport::{TransportAdapter, TransportEvent};

use super::playback::{current_time_ms, plan_reconcile, PlaybackState};
use super::protocol::{encode, EmojiReaction, EmojiType, MessageBody, Role, SyncMessage};
use super::roster::{Participant, Roster};

/// Which senders' snapshots a receiver adopts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlMode {
    /// Any participant's broadcast becomes the new target: a viewer's seek
    /// steers the whole room. This is the shipped behavior.
    #[default]
    Collaborative,
    /// Only snapshots from the announced host are applied.
    HostOnly,
}

/// Engine tunables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Drift beyond this forces a seek; smaller drifts are normal timer
    /// jitter and not worth a visible jump.
    pub seek_tolerance_secs: f64,
    /// Coalescing window for rapid local play/pause/seek events, so
    /// scrubbing does not flood the channel.
    pub debounce: Duration,
    /// How long locally observed events stay suppressed after applying a
    /// remote snapshot. Must outlast everything the forced seek/play/pause
    /// emits, synchronously or not.
    pub settle_window: Duration,
    pub control_mode: ControlMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seek_tolerance_secs: 1.5,
            debounce: Duration::from_millis(300),
            settle_window: Duration::from_millis(250),
            control_mode: ControlMode::Collaborative,
        }
    }
}

/// Feedback-loop guard.
///
/// An explicit state machine rather than a bare flag: every transition takes
/// the current instant, so the timing logic is testable without touching the
/// wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ApplyGuard {
    Idle,
    ApplyingRemote { expires_at: Instant },
}

impl ApplyGuard {
    /// Re-engaging extends the window rather than stacking timers.
    fn engage(&mut self, settle: Duration, now: Instant) {
        *self = ApplyGuard::ApplyingRemote {
            expires_at: now + settle,
        };
    }

    fn is_active(&self, now: Instant) -> bool {
        match self {
            ApplyGuard::Idle => false,
            ApplyGuard::ApplyingRemote { expires_at } => now < *expires_at,
        }
    }

    fn release(&mut self) {
        *self = ApplyGuard::Idle;
    }
}

#[derive(Default)]
struct Observers {
    playback: RwLock<Option<Arc<dyn PlaybackObserver>>>,
    roster: RwLock<Option<Arc<dyn RosterObserver>>>,
    connection: RwLock<Option<Arc<dyn ConnectionObserver>>>,
    error: RwLock<Option<Arc<dyn ErrorObserver>>>,
}

/// The synchronization protocol core.
pub struct SyncEngine {
    name: String,
    role: Role,
    config: EngineConfig,
    adapter: Arc<TransportAdapter>,
    identity: RwLock<Option<String>>,
    player: RwLock<Option<Arc<dyn MediaPlayer>>>,
    /// Most recently applied remote snapshot.
    last_applied: Mutex<Option<PlaybackState>>,
    guard: Mutex<ApplyGuard>,
    /// Pending debounced broadcast, cancel-and-replace.
    pending_broadcast: Mutex<Option<JoinHandle<()>>>,
    roster: Mutex<Option<Roster>>,
    observers: Observers,
}

impl SyncEngine {
    pub fn new(
        name: &str,
        role: Role,
        config: EngineConfig,
        adapter: Arc<TransportAdapter>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            role,
            config,
            adapter,
            identity: RwLock::new(None),
            player: RwLock::new(None),
            last_applied: Mutex::new(None),
            guard: Mutex::new(ApplyGuard::Idle),
            pending_broadcast: Mutex::new(None),
            roster: Mutex::new(None),
            observers: Observers::default(),
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn local_identity(&self) -> Option<String> {
        self.identity.read().clone()
    }

    pub fn last_applied(&self) -> Option<PlaybackState> {
        self.last_applied.lock().clone()
    }

    pub fn participants(&self) -> Vec<Participant> {
        self.roster
            .lock()
            .as_ref()
            .map(|r| r.snapshot())
            .unwrap_or_default()
    }

    pub fn attach_player(&self, player: Arc<dyn MediaPlayer>) {
        *self.player.write() = Some(player);
    }

    pub fn set_playback_observer(&self, observer: Arc<dyn PlaybackObserver>) {
        *self.observers.playback.write() = Some(observer);
    }

    pub fn set_roster_observer(&self, observer: Arc<dyn RosterObserver>) {
        *self.observers.roster.write() = Some(observer);
    }

    pub fn set_connection_observer(&self, observer: Arc<dyn ConnectionObserver>) {
        *self.observers.connection.write() = Some(observer);
    }

    pub fn set_error_observer(&self, observer: Arc<dyn ErrorObserver>) {
        *self.observers.error.write() = Some(observer);
    }

    /// Called once the transport is up: fixes the local identity, seeds the
    /// roster, announces ourselves, and asks the room for state when we are
    /// a viewer. New joiners must not wait for the next spontaneous host
    /// action to synchronize.
    pub(crate) fn bind(&self, identity: &str) {
        *self.identity.write() = Some(identity.to_string());
        *self.roster.lock() = Some(Roster::new(identity, &self.name, self.role));

        match encode(&self.envelope(MessageBody::UserLeft {
            name: Some(self.name.clone()),
        })) {
            Ok(bytes) => self.adapter.install_leave_notice(bytes),
            Err(e) => warn!("failed to encode leave notice: {e}"),
        }

        self.broadcast(MessageBody::UserJoined {
            name: self.name.clone(),
            role: self.role,
        });
        if self.role == Role::Viewer {
            self.broadcast(MessageBody::SyncRequest {});
        }
        self.emit_roster();
    }

    /// Cancel pending timers. The session facade calls this ahead of
    /// transport teardown; the departure notice itself is published by the
    /// adapter, at most once.
    pub(crate) fn shutdown(&self) {
        if let Some(handle) = self.pending_broadcast.lock().take() {
            handle.abort();
        }
        self.guard.lock().release();
    }

    /// Entry point for everything the transport delivers.
    pub fn handle_event(self: &Arc<Self>, event: TransportEvent) {
        match event {
            TransportEvent::Connected => self.notify_connection(true),
            TransportEvent::Disconnected => self.notify_connection(false),
            TransportEvent::PeerJoined { identity } => {
                let changed = self
                    .roster
                    .lock()
                    .as_mut()
                    .map(|r| r.peer_connected(&identity))
                    .unwrap_or(false);
                if changed {
                    self.emit_roster();
                }
            }
            TransportEvent::PeerLeft { identity } => {
                let changed = self
                    .roster
                    .lock()
                    .as_mut()
                    .map(|r| r.peer_disconnected(&identity))
                    .unwrap_or(false);
                if changed {
                    self.emit_roster();
                }
            }
            TransportEvent::Message(message) => self.handle_message(message),
            TransportEvent::Error(e) => {
                warn!("transport error: {e}");
                if let Some(observer) = self.observers.error.read().as_ref() {
                    observer.on_error(&e);
                }
            }
        }
    }

    fn handle_message(self: &Arc<Self>, message: SyncMessage) {
        let SyncMessage {
            body,
            sender_id,
            sender_name,
            sender_role,
        } = message;

        // Some transports echo broadcasts back to the whole room, sender
        // included.
        if Some(sender_id.as_str()) == self.identity.read().as_deref() {
            debug!("ignoring self-echo");
            return;
        }

        match body {
            MessageBody::PlaybackState(state) | MessageBody::SyncResponse(state) => {
                if self.accepts_control_from(&sender_id, sender_role) {
                    self.apply_remote(state, &sender_name);
                } else {
                    debug!(sender = %sender_name, "ignoring playback state from non-host");
                }
            }
            MessageBody::UserJoined { name, role } => {
                debug!(name = %name, ?role, "user joined");
                let changed = {
                    let mut roster = self.roster.lock();
                    match roster.as_mut() {
                        Some(r) => {
                            let announced = r.announce(&sender_id, &name, role);
                            let pruned = r.refresh();
                            announced || pruned
                        }
                        None => false,
                    }
                };
                if changed {
                    self.emit_roster();
                }
            }
            MessageBody::UserLeft { .. } => {
                debug!(sender = %sender_name, "user left");
                let changed = {
                    let mut roster = self.roster.lock();
                    match roster.as_mut() {
                        Some(r) => {
                            let departed = r.depart(&sender_id);
                            let pruned = r.refresh();
                            departed || pruned
                        }
                        None => false,
                    }
                };
                if changed {
                    self.emit_roster();
                }
            }
            MessageBody::SyncRequest {} => self.answer_sync_request(&sender_name),
            MessageBody::EmojiReaction(reaction) => {
                if let Some(observer) = self.observers.playback.read().as_ref() {
                    observer.on_reaction(&reaction);
                }
            }
        }
    }

    fn accepts_control_from(&self, sender_id: &str, sender_role: Option<Role>) -> bool {
        match self.config.control_mode {
            ControlMode::Collaborative => true,
            ControlMode::HostOnly => {
                let announced = sender_role.map(Role::is_host);
                let known = self
                    .roster
                    .lock()
                    .as_ref()
                    .and_then(|r| r.role_of(sender_id))
                    .map(Role::is_host);
                announced.or(known).unwrap_or(false)
            }
        }
    }

    /// Converge the local player on a remote snapshot.
    fn apply_remote(&self, state: PlaybackState, sender: &str) {
        // Everything the forced seek/play/pause emits during the settle
        // window is an echo, not a user action.
        self.guard
            .lock()
            .engage(self.config.settle_window, Instant::now());

        if let Some(player) = self.player.read().as_ref() {
            match player.snapshot() {
                Some(local) => {
                    let plan = plan_reconcile(
                        &state,
                        local.position_secs,
                        local.is_playing,
                        current_time_ms(),
                        self.config.seek_tolerance_secs,
                    );
                    debug!(
                        sender,
                        drift = plan.drift_secs,
                        target = plan.target_position_secs,
                        "reconciling to remote state"
                    );

                    if plan.seek {
                        if let Err(e) = player.seek_to(plan.target_position_secs) {
                            debug!("seek rejected: {e}");
                        }
                    }
                    if let Some(playing) = plan.set_playing {
                        if let Err(e) = player.set_playing(playing) {
                            debug!("play/pause rejected: {e}");
                        }
                    }
                }
                None => debug!("no local media; recording remote state without applying"),
            }
        }

        if let Some(observer) = self.observers.playback.read().as_ref() {
            observer.on_state_applied(&state);
        }
        *self.last_applied.lock() = Some(state);
    }

    /// Anyone able to report state answers a sync request. The response is
    /// broadcast, which also re-syncs any other participant that drifted.
    fn answer_sync_request(&self, requester: &str) {
        let snapshot = self.player.read().as_ref().and_then(|p| p.snapshot());
        let Some(snapshot) = snapshot else {
            debug!(requester, "sync request ignored: no local state to report");
            return;
        };

        // Time has passed since the snapshot was captured; stamp at send
        // time, not with the capture clock.
        let state = snapshot.restamped(current_time_ms());
        info!(requester, position = state.position_secs, "answering sync request");
        self.broadcast(MessageBody::SyncResponse(state));
    }

    /// A local play/pause/seek observed by the player binding. Suppressed
    /// while a remote snapshot is settling, otherwise debounced into a
    /// single broadcast carrying the latest values.
    pub fn notify_local_change(self: &Arc<Self>) {
        if self.guard.lock().is_active(Instant::now()) {
            debug!("local playback event suppressed: applying remote state");
            return;
        }
        self.schedule_broadcast();
    }

    fn schedule_broadcast(self: &Arc<Self>) {
        let mut pending = self.pending_broadcast.lock();
        if let Some(handle) = pending.take() {
            handle.abort();
        }

        let engine = Arc::clone(self);
        let debounce = self.config.debounce;
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            engine.broadcast_snapshot();
        }));
    }

    /// Publish the player's current state. The snapshot is taken at send
    /// time so a coalesced burst of events carries the final values.
    fn broadcast_snapshot(&self) {
        if self.guard.lock().is_active(Instant::now()) {
            return;
        }
        let snapshot = self.player.read().as_ref().and_then(|p| p.snapshot());
        let Some(snapshot) = snapshot else {
            return;
        };

        let state = PlaybackState {
            timestamp_ms: current_time_ms(),
            ..snapshot
        };
        debug!(
            position = state.position_secs,
            playing = state.is_playing,
            "broadcasting playback state"
        );
        self.broadcast(MessageBody::PlaybackState(state));
    }

    /// Broadcast an ephemeral reaction. Not debounced: reactions are not
    /// playback state.
    pub fn send_reaction(&self, emoji: EmojiType) {
        let sender_id = self.identity.read().clone().unwrap_or_default();
        self.broadcast(MessageBody::EmojiReaction(EmojiReaction {
            emoji,
            sender_id,
            sender_name: self.name.clone(),
            timestamp: current_time_ms(),
        }));
    }

    fn envelope(&self, body: MessageBody) -> SyncMessage {
        SyncMessage {
            body,
            sender_id: self.identity.read().clone().unwrap_or_default(),
            sender_name: self.name.clone(),
            sender_role: Some(self.role),
        }
    }

    fn broadcast(&self, body: MessageBody) {
        match encode(&self.envelope(body)) {
            Ok(bytes) => self.adapter.send(bytes),
            Err(e) => warn!("failed to encode outbound message: {e}"),
        }
    }

    fn notify_connection(&self, connected: bool) {
        info!(connected, "connection state changed");
        if let Some(observer) = self.observers.connection.read().as_ref() {
            observer.on_connection_changed(connected);
        }
    }

    fn emit_roster(&self) {
        let snapshot = self.participants();
        if snapshot.is_empty() {
            return;
        }
        if let Some(observer) = self.observers.roster.read().as_ref() {
            observer.on_roster_changed(&snapshot);
        }
    }
}
