//! Host-side control channel: WebSocket peers and broadcast.
//!
//! Each connected agent gets a registry entry with a bounded outbound
//! queue and a dedicated forward task. The broadcast hot path takes the
//! registry read lock, serializes once, and queues to every peer; a peer
//! whose queue is full is disconnected rather than allowed to stall the
//! others.
//!
//! Inbound frames:
//! - `auth` – verified against the configured token (wrong token closes
//!   the connection),
//! - `switch` – executed through the switcher; the host is authoritative
//!   and its own broadcast fans the result back out,
//! - `sync_req` – answered with the full profile list and the forwarding
//!   flag.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::connect_info::ConnectInfo;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch, RwLock};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use vkvm_core::event::TimedEvent;
use vkvm_core::protocol::control::{SwitchPayload, SyncResponsePayload};
use vkvm_core::ControlMessage;

use crate::session::switcher::SwitchBroadcaster;

use super::ApiState;

/// Outbound frames queued per peer before we give up on it.
const PEER_QUEUE: usize = 256;
/// Read deadline; agents ping every 30 s.
const READ_DEADLINE: Duration = Duration::from_secs(60);
/// Per-frame write deadline.
const WRITE_DEADLINE: Duration = Duration::from_secs(10);
/// Server-side ping period.
const PING_INTERVAL: Duration = Duration::from_secs(30);

struct Peer {
    addr: SocketAddr,
    tx: mpsc::Sender<String>,
}

/// Registry of connected control channel peers.
pub struct PeerRegistry {
    peers: RwLock<HashMap<u64, Peer>>,
    next_id: AtomicU64,
    /// Source IPs of the connected peers, republished on every register
    /// and unregister. The host session feeds this into the UDP
    /// registration allow-list.
    ips_tx: watch::Sender<Vec<IpAddr>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        let (ips_tx, _) = watch::channel(Vec::new());
        Self {
            peers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            ips_tx,
        }
    }

    async fn register(&self, addr: SocketAddr) -> (u64, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(PEER_QUEUE);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut peers = self.peers.write().await;
        peers.insert(id, Peer { addr, tx });
        info!(peer = %addr, total = peers.len(), "control channel peer connected");
        let _ = self.ips_tx.send(peers.values().map(|p| p.addr.ip()).collect());
        (id, rx)
    }

    async fn unregister(&self, id: u64) {
        let mut peers = self.peers.write().await;
        if let Some(peer) = peers.remove(&id) {
            info!(peer = %peer.addr, total = peers.len(), "control channel peer disconnected");
            let _ = self.ips_tx.send(peers.values().map(|p| p.addr.ip()).collect());
        }
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.len()
    }

    /// Source IPs of every connected peer.
    pub async fn peer_ips(&self) -> Vec<IpAddr> {
        self.peers.read().await.values().map(|p| p.addr.ip()).collect()
    }

    /// Watch channel carrying the connected peers' source IPs.
    pub fn subscribe_ips(&self) -> watch::Receiver<Vec<IpAddr>> {
        self.ips_tx.subscribe()
    }

    /// Serializes once and queues to every peer. Peers with full queues
    /// are dropped from the registry — the control channel must not
    /// block on a stalled agent.
    pub async fn broadcast(&self, msg: &ControlMessage) {
        let Ok(json) = msg.to_json() else { return };
        let mut stalled = Vec::new();
        {
            let peers = self.peers.read().await;
            for (id, peer) in peers.iter() {
                if peer.tx.try_send(json.clone()).is_err() {
                    warn!(peer = %peer.addr, "peer queue full; disconnecting");
                    stalled.push(*id);
                }
            }
        }
        for id in stalled {
            self.unregister(id).await;
        }
    }

    /// Broadcasts a profile switch. `propagate` is false: receivers
    /// apply locally and must not forward further (loop prevention).
    pub async fn broadcast_switch(&self, profile: &str, origin: &str) {
        self.broadcast(&ControlMessage::Switch(SwitchPayload {
            profile: profile.to_string(),
            origin: origin.to_string(),
            propagate: false,
        }))
        .await;
    }

    /// Control-channel input fallback used while no agent is registered
    /// on the burst channel.
    pub async fn broadcast_input(&self, event: TimedEvent) {
        self.broadcast(&ControlMessage::Input(event)).await;
    }
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SwitchBroadcaster for PeerRegistry {
    async fn broadcast_switch(&self, profile: &str, origin: &str) {
        PeerRegistry::broadcast_switch(self, profile, origin).await;
    }
}

// ── Upgrade handler ───────────────────────────────────────────────────────────

pub async fn handle_upgrade(
    upgrade: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<ApiState>,
) -> Response {
    upgrade.on_upgrade(move |socket| handle_peer(socket, addr, state))
}

async fn handle_peer(socket: WebSocket, addr: SocketAddr, state: ApiState) {
    let (id, mut outbound_rx) = state.peers.register(addr).await;
    let (mut sink, mut source) = socket.split();

    // Forward task: registry queue → socket, plus server-side pings.
    let writer = tokio::spawn(async move {
        let mut ping_tick = tokio::time::interval(PING_INTERVAL);
        ping_tick.tick().await;
        loop {
            tokio::select! {
                maybe = outbound_rx.recv() => {
                    let Some(json) = maybe else { break };
                    match timeout(WRITE_DEADLINE, sink.send(Message::Text(json))).await {
                        Ok(Ok(())) => {}
                        _ => break,
                    }
                }
                _ = ping_tick.tick() => {
                    if sink.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read loop. With a token configured, the very first text frame
    // must be a valid `auth`; everything else closes the connection.
    let mut authenticated = state.token.is_empty();
    loop {
        let frame = match timeout(READ_DEADLINE, source.next()).await {
            Err(_) => {
                warn!(peer = %addr, "peer read deadline exceeded");
                break;
            }
            Ok(None) | Ok(Some(Err(_))) => break,
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            Message::Text(text) => {
                if !authenticated {
                    match ControlMessage::from_json(&text) {
                        Ok(ControlMessage::Auth(auth)) if auth.token == state.token => {
                            info!(peer = %addr, agent = %auth.agent_name, "agent authenticated");
                            authenticated = true;
                        }
                        _ => {
                            warn!(peer = %addr, "closing unauthenticated control channel");
                            break;
                        }
                    }
                    continue;
                }
                if !handle_frame(&text, addr, &state).await {
                    break;
                }
            }
            Message::Close(_) => break,
            // Pong and binary frames need no handling.
            _ => {}
        }
    }

    state.peers.unregister(id).await;
    writer.abort();
}

/// Processes one inbound frame; returns false to close the connection.
async fn handle_frame(text: &str, addr: SocketAddr, state: &ApiState) -> bool {
    let msg = match ControlMessage::from_json(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!(peer = %addr, error = %e, "dropping malformed control frame");
            return true;
        }
    };

    match msg {
        ControlMessage::Auth(auth) => {
            if !state.token.is_empty() && auth.token != state.token {
                warn!(peer = %addr, agent = %auth.agent_name, "auth token mismatch");
                return false;
            }
            info!(peer = %addr, agent = %auth.agent_name, version = %auth.agent_version, "agent authenticated");
        }

        ControlMessage::Switch(payload) => {
            info!(peer = %addr, profile = %payload.profile, "switch request from agent");
            // Apply on the host; the switcher's own broadcast fans the
            // decision out to every agent. Runs detached so a slow DDC
            // bus never stalls this peer's read loop.
            let switcher = std::sync::Arc::clone(&state.switcher);
            tokio::spawn(async move {
                if let Err(e) = switcher
                    .switch_to(&payload.profile, payload.propagate)
                    .await
                {
                    warn!(error = %e, "agent-requested switch failed");
                }
            });
        }

        ControlMessage::SyncReq => {
            let config = state.config.get();
            let resp = ControlMessage::SyncResp(SyncResponsePayload {
                profiles: config.profiles.clone(),
                usb_forwarding_enabled: config.general.usb_forwarding_enabled,
            });
            // Reply only to the requesting peer.
            if let Ok(json) = resp.to_json() {
                let peers = state.peers.peers.read().await;
                if let Some(peer) = peers.values().find(|p| p.addr == addr) {
                    let _ = peer.tx.try_send(json);
                }
            }
        }

        ControlMessage::Ping => {
            debug!(peer = %addr, "application ping");
        }

        // Input and sync_resp only ever flow host → agent.
        _ => {}
    }
    true
}
