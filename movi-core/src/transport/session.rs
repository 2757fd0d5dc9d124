//! Session Handle
//!
//! The black-box surface of the underlying real-time session: a command
//! channel into the backend task, the transport-assigned local identity, and
//! an event stream out. Backends (see [`super::gossip`]) run the actual
//! session and speak only through these types.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

/// Commands accepted by a session backend.
#[derive(Debug)]
pub enum SessionCommand {
    /// Broadcast raw bytes to every room member. Some backends echo the
    /// broadcast back to the sender; receivers handle that.
    Publish { bytes: Vec<u8> },
    /// Tear the session down.
    Shutdown,
}

/// Events emitted by a session backend.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The session task is up and the room subscription is live.
    Ready { identity: String },
    ConnectionChanged { connected: bool },
    PeerJoined { identity: String },
    PeerLeft { identity: String },
    /// Raw message bytes from the room channel.
    Data { bytes: Vec<u8> },
    Error(String),
}

/// Cloneable handle to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    command_tx: mpsc::UnboundedSender<SessionCommand>,
    identity: Arc<str>,
    connected: Arc<AtomicBool>,
}

impl SessionHandle {
    pub fn new(command_tx: mpsc::UnboundedSender<SessionCommand>, identity: &str) -> Self {
        Self {
            command_tx,
            identity: Arc::from(identity),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Transport-assigned identity, stable for the connection's lifetime.
    pub fn local_identity(&self) -> &str {
        &self.identity
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Best-effort broadcast: no delivery confirmation, no ordering across
    /// senders, and silently a no-op while the session is not connected so
    /// callers can fire-and-forget through reconnect windows.
    pub fn send(&self, bytes: Vec<u8>) {
        if !self.is_connected() {
            debug!("dropping outbound message: session not connected");
            return;
        }
        if self
            .command_tx
            .send(SessionCommand::Publish { bytes })
            .is_err()
        {
            debug!("dropping outbound message: session task gone");
        }
    }

    pub fn shutdown(&self) {
        let _ = self.command_tx.send(SessionCommand::Shutdown);
    }

    /// Handle wired to an in-memory channel instead of a backend task.
    #[cfg(test)]
    pub(crate) fn loopback(identity: &str) -> (Self, mpsc::UnboundedReceiver<SessionCommand>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        (Self::new(command_tx, identity), command_rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_is_a_noop_until_connected() {
        let (handle, mut commands) = SessionHandle::loopback("peer-1");

        handle.send(b"early".to_vec());
        assert!(commands.try_recv().is_err());

        handle.set_connected(true);
        handle.send(b"hello".to_vec());
        match commands.try_recv() {
            Ok(SessionCommand::Publish { bytes }) => assert_eq!(bytes, b"hello"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn send_survives_a_dead_backend() {
        let (handle, commands) = SessionHandle::loopback("peer-1");
        handle.set_connected(true);
        drop(commands);

        // Must not panic or error out.
        handle.send(b"into the void".to_vec());
        handle.shutdown();
    }
}
