//! Watch Session
//!
//! The facade host applications hold: wires the transport adapter, the sync
//! engine, and the player binding together and owns the inbound event pump.

use std::sync::{Arc, Once};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::info;

use crate::observer::{ConnectionObserver, ErrorObserver, PlaybackObserver, RosterObserver};
use crate::player::MediaPlayer;
use crate::sync::engine::{EngineConfig, SyncEngine};
use crate::sync::playback::PlaybackState;
use crate::sync::protocol::{EmojiType, Role};
use crate::sync::roster::Participant;
use crate::token::AccessToken;
use crate::transport::{ConnectError, GossipConfig, RoomName, TransportAdapter, TransportEvent};

static TRACING_INIT: Once = Once::new();

/// Install a default tracing subscriber honoring `RUST_LOG`. Optional; host
/// applications that bring their own subscriber skip this.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive("movi_core=debug".parse().unwrap()),
            )
            .init();
    });
}

/// Everything needed to construct a session. The role is fixed here, based
/// on out-of-band authorization (whoever created the room is the host), and
/// never changes for the session's lifetime.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub participant_name: String,
    pub role: Role,
    pub transport: GossipConfig,
    pub engine: EngineConfig,
}

impl SessionOptions {
    pub fn new(room: RoomName, participant_name: impl Into<String>, role: Role) -> Self {
        Self {
            participant_name: participant_name.into(),
            role,
            transport: GossipConfig::lan(room),
            engine: EngineConfig::default(),
        }
    }

    pub fn with_transport(mut self, transport: GossipConfig) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }
}

/// A participant's session in a watch-together room.
pub struct SyncSession {
    engine: Arc<SyncEngine>,
    adapter: Arc<TransportAdapter>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl SyncSession {
    pub fn new(options: SessionOptions) -> Self {
        let adapter = Arc::new(TransportAdapter::new(options.transport));
        let engine = SyncEngine::new(
            &options.participant_name,
            options.role,
            options.engine,
            Arc::clone(&adapter),
        );

        Self {
            engine,
            adapter,
            pump: Mutex::new(None),
        }
    }

    /// Connect to the room with an opaque credential (see
    /// [`crate::token::TokenClient`]). Resolves once the transport reports a
    /// live session; on success the join announcement goes out and, for
    /// viewers, a sync request. There is no automatic reconnect: on a later
    /// drop, call `connect` again with a fresh credential.
    pub async fn connect(&self, credential: AccessToken) -> Result<(), ConnectError> {
        let (identity, mut events) = self.adapter.connect(credential).await?;
        self.engine.bind(&identity);

        let engine = Arc::clone(&self.engine);
        let pump = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                engine.handle_event(event);
            }
        });
        *self.pump.lock() = Some(pump);

        // The adapter consumed the initial connected signal while waiting;
        // replay it so observers see the transition.
        self.engine.handle_event(TransportEvent::Connected);
        info!("session connected");
        Ok(())
    }

    /// Announce departure and tear the session down. Safe to call
    /// repeatedly; the leave notification and session close happen at most
    /// once.
    pub fn disconnect(&self) {
        self.engine.shutdown();
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
        self.adapter.disconnect();
    }

    pub fn is_connected(&self) -> bool {
        self.adapter.is_connected()
    }

    pub fn local_identity(&self) -> Option<String> {
        self.engine.local_identity()
    }

    pub fn role(&self) -> Role {
        self.engine.role()
    }

    /// Current roster snapshot; the local participant is always present.
    pub fn participants(&self) -> Vec<Participant> {
        self.engine.participants()
    }

    /// Most recently applied remote snapshot, if any.
    pub fn last_applied(&self) -> Option<PlaybackState> {
        self.engine.last_applied()
    }

    pub fn attach_player(&self, player: Arc<dyn MediaPlayer>) {
        self.engine.attach_player(player);
    }

    pub fn set_playback_observer(&self, observer: Arc<dyn PlaybackObserver>) {
        self.engine.set_playback_observer(observer);
    }

    pub fn set_roster_observer(&self, observer: Arc<dyn RosterObserver>) {
        self.engine.set_roster_observer(observer);
    }

    pub fn set_connection_observer(&self, observer: Arc<dyn ConnectionObserver>) {
        self.engine.set_connection_observer(observer);
    }

    pub fn set_error_observer(&self, observer: Arc<dyn ErrorObserver>) {
        self.engine.set_error_observer(observer);
    }

    pub fn send_reaction(&self, emoji: EmojiType) {
        self.engine.send_reaction(emoji);
    }

    /// Player binding event feeds: the binding subscribes to its media
    /// element and reports user-visible transitions here.
    pub fn notify_local_play(&self) {
        self.engine.notify_local_change();
    }

    pub fn notify_local_pause(&self) {
        self.engine.notify_local_change();
    }

    pub fn notify_local_seek(&self) {
        self.engine.notify_local_change();
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        self.disconnect();
    }
}
