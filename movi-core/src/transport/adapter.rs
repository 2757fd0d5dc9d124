//! Transport Adapter
//!
//! Owns the external session's lifecycle: establishes it, decodes everything
//! it delivers, and forwards the result as [`TransportEvent`]s to a single
//! receiver (the sync engine's pump). Nothing else in the crate touches
//! session primitives directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::sync::protocol::{self, SyncMessage};
use crate::token::AccessToken;

use super::gossip::{GossipConfig, GossipSession};
use super::session::{SessionEvent, SessionHandle};

/// Failure to establish the underlying session. Steady-state message errors
/// never surface this way; they are absorbed where they happen.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("transport unreachable: {0}")]
    Unreachable(String),

    #[error("credential rejected: {0}")]
    Rejected(String),

    #[error("timed out waiting for the session to connect")]
    Timeout,

    #[error("already connected")]
    AlreadyConnected,
}

/// Decoded transport events delivered to the sync engine.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    PeerJoined { identity: String },
    PeerLeft { identity: String },
    Message(SyncMessage),
    Error(String),
}

/// How long `connect` waits for the backend to report a live session.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Wraps the external real-time session.
pub struct TransportAdapter {
    config: GossipConfig,
    handle: RwLock<Option<SessionHandle>>,
    /// Encoded `user_left` notice, installed by the engine after connect and
    /// published at most once on disconnect.
    leave_notice: Mutex<Option<Vec<u8>>>,
    torn_down: AtomicBool,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl TransportAdapter {
    pub fn new(config: GossipConfig) -> Self {
        Self {
            config,
            handle: RwLock::new(None),
            leave_notice: Mutex::new(None),
            torn_down: AtomicBool::new(false),
            pump: Mutex::new(None),
        }
    }

    /// Establish the session. Resolves once the backend reports a live
    /// connection, or fails within the transport's own timeout. Idempotent
    /// per established session: a second call while connected errors.
    ///
    /// Returns the transport-assigned local identity and the event stream;
    /// the session handle itself never leaves the adapter.
    pub async fn connect(
        &self,
        credential: AccessToken,
    ) -> Result<(String, mpsc::UnboundedReceiver<TransportEvent>), ConnectError> {
        if self.handle.read().is_some() {
            return Err(ConnectError::AlreadyConnected);
        }
        if credential.as_str().is_empty() {
            return Err(ConnectError::Rejected("empty credential".to_string()));
        }

        let (handle, mut events) = GossipSession::spawn(self.config.clone(), credential)
            .map_err(|e| ConnectError::Unreachable(e.to_string()))?;

        // Wait for the session to come up before wiring the event pump.
        let deadline = tokio::time::Instant::now() + CONNECT_TIMEOUT;
        loop {
            let event = tokio::time::timeout_at(deadline, events.recv())
                .await
                .map_err(|_| {
                    handle.shutdown();
                    ConnectError::Timeout
                })?
                .ok_or_else(|| ConnectError::Unreachable("session task ended".to_string()))?;

            match event {
                SessionEvent::ConnectionChanged { connected: true } => break,
                SessionEvent::Error(e) => {
                    handle.shutdown();
                    return Err(ConnectError::Unreachable(e));
                }
                // Ready and early peer churn arrive before the connected
                // signal; nothing to forward yet.
                _ => {}
            }
        }
        handle.set_connected(true);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let pump_handle = handle.clone();
        let pump = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let mapped = match event {
                    SessionEvent::Ready { .. } => continue,
                    SessionEvent::ConnectionChanged { connected } => {
                        pump_handle.set_connected(connected);
                        if connected {
                            TransportEvent::Connected
                        } else {
                            TransportEvent::Disconnected
                        }
                    }
                    SessionEvent::PeerJoined { identity } => TransportEvent::PeerJoined { identity },
                    SessionEvent::PeerLeft { identity } => TransportEvent::PeerLeft { identity },
                    SessionEvent::Data { bytes } => match protocol::decode(&bytes) {
                        Ok(message) => TransportEvent::Message(message),
                        Err(e) => {
                            warn!("dropping undecodable message: {e}");
                            continue;
                        }
                    },
                    SessionEvent::Error(e) => TransportEvent::Error(e),
                };
                if event_tx.send(mapped).is_err() {
                    break;
                }
            }
        });

        *self.pump.lock() = Some(pump);
        let identity = handle.local_identity().to_string();
        *self.handle.write() = Some(handle);
        self.torn_down.store(false, Ordering::SeqCst);
        info!(identity = %identity, "transport connected");
        Ok((identity, event_rx))
    }

    /// Best-effort broadcast to the room. Silently a no-op when not
    /// connected; callers fire-and-forget.
    pub fn send(&self, bytes: Vec<u8>) {
        if let Some(handle) = self.handle.read().as_ref() {
            handle.send(bytes);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.handle
            .read()
            .as_ref()
            .map(|h| h.is_connected())
            .unwrap_or(false)
    }

    pub fn local_identity(&self) -> Option<String> {
        self.handle
            .read()
            .as_ref()
            .map(|h| h.local_identity().to_string())
    }

    /// Install the encoded `user_left` message to publish on disconnect.
    pub fn install_leave_notice(&self, bytes: Vec<u8>) {
        *self.leave_notice.lock() = Some(bytes);
    }

    /// Publish the leave notice (best-effort), close the session, stop the
    /// pump. Safe to call repeatedly; after the first teardown it is a no-op
    /// until the next successful `connect`.
    pub fn disconnect(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.handle.write().take() {
            if let Some(notice) = self.leave_notice.lock().take() {
                handle.send(notice);
            }
            handle.shutdown();
            handle.set_connected(false);
            info!("transport disconnected");
        }
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
    }
}

impl Drop for TransportAdapter {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
impl TransportAdapter {
    /// Adapter wired to an in-memory session, bypassing `connect`.
    pub(crate) fn for_tests(handle: SessionHandle) -> Self {
        use super::room::RoomName;

        Self {
            config: GossipConfig {
                service_addrs: Vec::new(),
                room: RoomName::parse("test-room").unwrap(),
                enable_mdns: false,
            },
            handle: RwLock::new(Some(handle)),
            leave_notice: Mutex::new(None),
            torn_down: AtomicBool::new(false),
            pump: Mutex::new(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::session::SessionCommand;

    #[test]
    fn disconnect_tears_down_at_most_once() {
        let (handle, mut commands) = SessionHandle::loopback("peer-1");
        handle.set_connected(true);
        let adapter = TransportAdapter::for_tests(handle);
        adapter.install_leave_notice(b"goodbye".to_vec());

        adapter.disconnect();
        adapter.disconnect();
        adapter.disconnect();

        match commands.try_recv() {
            Ok(SessionCommand::Publish { bytes }) => assert_eq!(bytes, b"goodbye"),
            other => panic!("expected leave notice, got {other:?}"),
        }
        assert!(matches!(commands.try_recv(), Ok(SessionCommand::Shutdown)));
        assert!(commands.try_recv().is_err());
        assert!(!adapter.is_connected());
    }

    #[test]
    fn send_after_disconnect_is_a_noop() {
        let (handle, mut commands) = SessionHandle::loopback("peer-1");
        handle.set_connected(true);
        let adapter = TransportAdapter::for_tests(handle);

        adapter.disconnect();
        while commands.try_recv().is_ok() {}

        adapter.send(b"late".to_vec());
        assert!(commands.try_recv().is_err());
    }

    #[tokio::test]
    async fn connect_rejects_empty_credential() {
        use super::super::room::RoomName;

        let adapter = TransportAdapter::new(GossipConfig {
            service_addrs: Vec::new(),
            room: RoomName::parse("test-room").unwrap(),
            enable_mdns: false,
        });

        let result = adapter.connect(AccessToken::new("")).await;
        assert!(matches!(result, Err(ConnectError::Rejected(_))));
    }
}
