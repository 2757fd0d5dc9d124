//! Gossip Session Backend
//!
//! Reference implementation of the room session over libp2p: the broadcast
//! channel is a gossipsub topic, peers joined/left map to topic
//! subscribe/unsubscribe events, and the local identity is the peer ID.
//! A configured room-service address is dialed for internet rooms; mDNS
//! keeps same-LAN viewing parties working without one.

use std::collections::HashSet;
use std::time::Duration;

use futures::StreamExt;
use libp2p::{
    gossipsub, identify, identity, mdns, noise, ping, swarm::NetworkBehaviour,
    swarm::SwarmEvent, tcp, yamux, Multiaddr, PeerId, Swarm,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::token::AccessToken;

use super::room::RoomName;
use super::session::{SessionCommand, SessionEvent, SessionHandle};

/// Backend-level failures. Only startup failures reach the adapter; once the
/// session loop runs, problems become [`SessionEvent::Error`]s.
#[derive(Debug, Error)]
pub enum GossipError {
    #[error("failed to build transport: {0}")]
    Transport(String),

    #[error("failed to subscribe to room topic: {0}")]
    Subscribe(String),
}

/// Backend configuration.
#[derive(Debug, Clone)]
pub struct GossipConfig {
    /// Multiaddrs of the room service to dial. Empty means LAN-only mode:
    /// peers find each other via mDNS and the session counts as connected
    /// as soon as it is listening.
    pub service_addrs: Vec<String>,
    pub room: RoomName,
    /// Local-network peer discovery.
    pub enable_mdns: bool,
}

impl GossipConfig {
    pub fn lan(room: RoomName) -> Self {
        Self {
            service_addrs: Vec::new(),
            room,
            enable_mdns: true,
        }
    }

    pub fn with_service(room: RoomName, service_addrs: Vec<String>) -> Self {
        Self {
            service_addrs,
            room,
            enable_mdns: true,
        }
    }
}

#[derive(NetworkBehaviour)]
struct RoomBehaviour {
    /// Pub/sub for the room broadcast channel.
    gossipsub: gossipsub::Behaviour,
    /// Peer identification.
    identify: identify::Behaviour,
    /// Connection keep-alive.
    ping: ping::Behaviour,
    /// Local network discovery.
    mdns: mdns::tokio::Behaviour,
}

/// Runs the libp2p session in a background task.
pub struct GossipSession {
    peer_id: PeerId,
    keypair: identity::Keypair,
    config: GossipConfig,
    topic: gossipsub::IdentTopic,
    /// Peers subscribed to the room topic.
    room_peers: HashSet<PeerId>,
    /// Peer IDs parsed out of the configured service addresses.
    service_peers: HashSet<PeerId>,
    connected_service_peers: HashSet<PeerId>,
    connected: bool,
}

impl GossipSession {
    /// Build and spawn the session task. Returns immediately; the adapter
    /// waits on the event stream for the connected signal.
    ///
    /// The credential stays opaque here: gossipsub has no admission check,
    /// enforcement belongs to the room service at its own boundary.
    pub fn spawn(
        config: GossipConfig,
        credential: AccessToken,
    ) -> Result<(SessionHandle, mpsc::UnboundedReceiver<SessionEvent>), GossipError> {
        let keypair = identity::Keypair::generate_ed25519();
        let peer_id = PeerId::from(keypair.public());

        let mut service_peers = HashSet::new();
        for addr_str in &config.service_addrs {
            if let Ok(addr) = addr_str.parse::<Multiaddr>() {
                if let Some(libp2p::multiaddr::Protocol::P2p(id)) = addr.iter().last() {
                    service_peers.insert(id);
                }
            }
        }

        info!(
            identity = %peer_id,
            room = %config.room,
            service_addrs = config.service_addrs.len(),
            credential_bytes = credential.as_str().len(),
            "starting room session"
        );

        let topic = gossipsub::IdentTopic::new(config.room.topic());
        let session = Self {
            peer_id,
            keypair,
            config,
            topic,
            room_peers: HashSet::new(),
            service_peers,
            connected_service_peers: HashSet::new(),
            connected: false,
        };

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let handle = SessionHandle::new(command_tx, &peer_id.to_string());

        tokio::spawn(async move {
            if let Err(e) = session.run(event_tx.clone(), command_rx).await {
                warn!("session task error: {e}");
                let _ = event_tx.send(SessionEvent::Error(e.to_string()));
            }
        });

        Ok((handle, event_rx))
    }

    fn build_swarm(&self) -> Result<Swarm<RoomBehaviour>, GossipError> {
        let swarm = libp2p::SwarmBuilder::with_existing_identity(self.keypair.clone())
            .with_tokio()
            .with_tcp(
                tcp::Config::default().nodelay(true),
                noise::Config::new,
                yamux::Config::default,
            )
            .map_err(|e| GossipError::Transport(e.to_string()))?
            // QUIC for direct connections (built-in encryption/mux)
            .with_quic()
            // DNS resolution for service addresses
            .with_dns()
            .map_err(|e| GossipError::Transport(e.to_string()))?
            .with_behaviour(|keypair| {
                // Gossipsub config - tuned for small rooms
                let gossipsub_config = gossipsub::ConfigBuilder::default()
                    .heartbeat_interval(Duration::from_secs(1))
                    .validation_mode(gossipsub::ValidationMode::Strict)
                    .mesh_outbound_min(0)
                    .mesh_n_low(1)
                    .mesh_n(3)
                    .mesh_n_high(6)
                    .build()
                    .map_err(|e| e.to_string())?;

                let gossipsub = gossipsub::Behaviour::new(
                    gossipsub::MessageAuthenticity::Signed(keypair.clone()),
                    gossipsub_config,
                )
                .map_err(|e| e.to_string())?;

                let identify = identify::Behaviour::new(identify::Config::new(
                    "/movi-together/1.0.0".into(),
                    keypair.public(),
                ));

                let ping = ping::Behaviour::new(
                    ping::Config::new().with_interval(Duration::from_secs(15)),
                );

                let mdns = mdns::tokio::Behaviour::new(
                    mdns::Config::default(),
                    keypair.public().to_peer_id(),
                )
                .map_err(|e| e.to_string())?;

                Ok(RoomBehaviour {
                    gossipsub,
                    identify,
                    ping,
                    mdns,
                })
            })
            .map_err(|e| GossipError::Transport(e.to_string()))?
            // Keep idle connections alive while the room is quiet.
            .with_swarm_config(|c| c.with_idle_connection_timeout(Duration::from_secs(300)))
            .build();

        Ok(swarm)
    }

    async fn run(
        mut self,
        event_tx: mpsc::UnboundedSender<SessionEvent>,
        mut command_rx: mpsc::UnboundedReceiver<SessionCommand>,
    ) -> Result<(), GossipError> {
        let mut swarm = self.build_swarm()?;

        match swarm.listen_on("/ip4/0.0.0.0/tcp/0".parse().unwrap()) {
            Ok(id) => debug!("TCP listener started: {id:?}"),
            Err(e) => warn!("failed to listen on TCP: {e:?}"),
        }
        match swarm.listen_on("/ip4/0.0.0.0/udp/0/quic-v1".parse().unwrap()) {
            Ok(id) => debug!("QUIC listener started: {id:?}"),
            Err(e) => warn!("failed to listen on QUIC: {e:?}"),
        }

        swarm
            .behaviour_mut()
            .gossipsub
            .subscribe(&self.topic)
            .map_err(|e| GossipError::Subscribe(e.to_string()))?;

        for addr_str in &self.config.service_addrs {
            match addr_str.parse::<Multiaddr>() {
                Ok(addr) => {
                    info!("dialing room service at {addr}");
                    if let Err(e) = swarm.dial(addr) {
                        warn!("failed to dial room service: {e}");
                    }
                }
                Err(e) => warn!("invalid service address {addr_str}: {e}"),
            }
        }

        let _ = event_tx.send(SessionEvent::Ready {
            identity: self.peer_id.to_string(),
        });

        // Serverless rooms are live as soon as we are listening; with a room
        // service configured, "connected" means reaching it.
        if self.service_peers.is_empty() {
            self.connected = true;
            let _ = event_tx.send(SessionEvent::ConnectionChanged { connected: true });
        }

        loop {
            tokio::select! {
                event = swarm.select_next_some() => {
                    self.handle_swarm_event(&mut swarm, event, &event_tx);
                }
                Some(command) = command_rx.recv() => {
                    match command {
                        SessionCommand::Publish { bytes } => {
                            if let Err(e) = swarm
                                .behaviour_mut()
                                .gossipsub
                                .publish(self.topic.clone(), bytes)
                            {
                                debug!("publish failed (no mesh peers yet?): {e}");
                            }
                        }
                        SessionCommand::Shutdown => {
                            info!("room session shutting down");
                            let _ = swarm.behaviour_mut().gossipsub.unsubscribe(&self.topic);
                            break;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    fn handle_swarm_event(
        &mut self,
        swarm: &mut Swarm<RoomBehaviour>,
        event: SwarmEvent<RoomBehaviourEvent>,
        event_tx: &mpsc::UnboundedSender<SessionEvent>,
    ) {
        match event {
            SwarmEvent::NewListenAddr { address, .. } => {
                debug!("listening on {address}");
            }

            SwarmEvent::Behaviour(RoomBehaviourEvent::Mdns(mdns::Event::Discovered(peers))) => {
                if !self.config.enable_mdns {
                    return;
                }
                for (peer_id, addr) in peers {
                    if peer_id != self.peer_id {
                        debug!("mDNS discovered peer {peer_id} at {addr}");
                        swarm.behaviour_mut().gossipsub.add_explicit_peer(&peer_id);
                        if let Err(e) = swarm.dial(addr) {
                            debug!("failed to dial discovered peer {peer_id}: {e}");
                        }
                    }
                }
            }

            SwarmEvent::Behaviour(RoomBehaviourEvent::Mdns(mdns::Event::Expired(peers))) => {
                for (peer_id, _) in peers {
                    debug!("mDNS peer expired: {peer_id}");
                }
            }

            SwarmEvent::Behaviour(RoomBehaviourEvent::Gossipsub(gossipsub::Event::Message {
                message,
                ..
            })) => {
                let _ = event_tx.send(SessionEvent::Data {
                    bytes: message.data,
                });
            }

            SwarmEvent::Behaviour(RoomBehaviourEvent::Gossipsub(gossipsub::Event::Subscribed {
                peer_id,
                topic,
            })) => {
                if topic == self.topic.hash() && self.room_peers.insert(peer_id) {
                    info!("peer {peer_id} joined the room");
                    let _ = event_tx.send(SessionEvent::PeerJoined {
                        identity: peer_id.to_string(),
                    });
                }
            }

            SwarmEvent::Behaviour(RoomBehaviourEvent::Gossipsub(
                gossipsub::Event::Unsubscribed { peer_id, topic },
            )) => {
                if topic == self.topic.hash() && self.room_peers.remove(&peer_id) {
                    info!("peer {peer_id} left the room");
                    let _ = event_tx.send(SessionEvent::PeerLeft {
                        identity: peer_id.to_string(),
                    });
                }
            }

            SwarmEvent::Behaviour(RoomBehaviourEvent::Identify(identify::Event::Received {
                peer_id,
                info,
                ..
            })) => {
                debug!(
                    "identified peer {peer_id} running {} ({} protocols)",
                    info.protocol_version,
                    info.protocols.len()
                );
            }

            SwarmEvent::ConnectionEstablished { peer_id, .. } => {
                debug!("connection established with {peer_id}");
                swarm.behaviour_mut().gossipsub.add_explicit_peer(&peer_id);

                if self.service_peers.contains(&peer_id) {
                    self.connected_service_peers.insert(peer_id);
                    if !self.connected {
                        self.connected = true;
                        let _ = event_tx.send(SessionEvent::ConnectionChanged { connected: true });
                    }
                }
            }

            SwarmEvent::ConnectionClosed {
                peer_id,
                num_established,
                ..
            } => {
                if num_established > 0 {
                    return;
                }
                debug!("connection closed with {peer_id}");

                // A peer that vanishes without unsubscribing still leaves.
                if self.room_peers.remove(&peer_id) {
                    let _ = event_tx.send(SessionEvent::PeerLeft {
                        identity: peer_id.to_string(),
                    });
                }

                self.connected_service_peers.remove(&peer_id);
                if self.connected
                    && !self.service_peers.is_empty()
                    && self.connected_service_peers.is_empty()
                {
                    self.connected = false;
                    let _ = event_tx.send(SessionEvent::ConnectionChanged { connected: false });
                }
            }

            SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                if let Some(peer) = peer_id {
                    warn!("failed to connect to {peer}: {error}");
                } else {
                    warn!("outgoing connection error: {error}");
                }
            }

            _ => {}
        }
    }
}
