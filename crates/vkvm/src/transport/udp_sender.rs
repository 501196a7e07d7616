//! Host-side UDP burst sender.
//!
//! Binds UDP on the API port (TCP and UDP share the port number),
//! answers agent `Register` packets with an `Ack`, tracks liveness via
//! `Heartbeat`, and broadcasts every captured input event to all
//! registered agents with per-kind redundancy.
//!
//! Agents silent for more than [`AGENT_TIMEOUT`] are evicted by a timer
//! task. The agents table is read on the broadcast hot loop and written
//! only on register/heartbeat/evict, hence the `RwLock`.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::net::UdpSocket;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

use vkvm_core::event::TimedEvent;
use vkvm_core::protocol::datagram::{decode_datagram, encode_datagram, Datagram, MAX_DATAGRAM_SIZE};
use vkvm_core::SequenceCounter;

use super::{redundancy_for, TransportError};

/// Registration expires after this long without a heartbeat.
pub const AGENT_TIMEOUT: Duration = Duration::from_secs(30);
/// Eviction sweep interval.
const EVICT_INTERVAL: Duration = Duration::from_secs(10);

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Host-side burst channel endpoint.
pub struct UdpSender {
    socket: Arc<UdpSocket>,
    agents: Arc<RwLock<HashMap<SocketAddr, Instant>>>,
    /// When set, registrations are accepted only from these source IPs
    /// (the host feeds it with control-channel peer addresses).
    allowed_ips: Arc<RwLock<Option<Vec<IpAddr>>>>,
    seq: SequenceCounter,
    shutdown: watch::Sender<bool>,
}

impl UdpSender {
    /// Binds the UDP socket on `0.0.0.0:port` (IPv4 explicitly, matching
    /// the TCP listener).
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Bind`] when the port is taken.
    pub async fn bind(port: u16) -> Result<Self, TransportError> {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| TransportError::Bind { addr, source })?;
        info!(port = socket.local_addr()?.port(), "UDP burst sender listening");
        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            socket: Arc::new(socket),
            agents: Arc::new(RwLock::new(HashMap::new())),
            allowed_ips: Arc::new(RwLock::new(None)),
            seq: SequenceCounter::new(),
            shutdown,
        })
    }

    /// The bound local address (tests bind port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Spawns the register/heartbeat read loop and the eviction timer.
    pub fn start(&self) {
        let socket = Arc::clone(&self.socket);
        let agents = Arc::clone(&self.agents);
        let allowed = Arc::clone(&self.allowed_ips);
        let mut shutdown_rx = self.shutdown.subscribe();
        tokio::spawn(async move {
            let mut buf = [0u8; MAX_DATAGRAM_SIZE];
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    result = socket.recv_from(&mut buf) => {
                        let Ok((len, peer)) = result else { continue };
                        handle_packet(&socket, &agents, &allowed, &buf[..len], peer).await;
                    }
                }
            }
        });

        let agents = Arc::clone(&self.agents);
        let mut shutdown_rx = self.shutdown.subscribe();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(EVICT_INTERVAL);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = tick.tick() => {
                        let mut table = agents.write().await;
                        table.retain(|addr, last_seen| {
                            let alive = last_seen.elapsed() <= AGENT_TIMEOUT;
                            if !alive {
                                warn!(agent = %addr, "evicting stale UDP agent");
                            }
                            alive
                        });
                    }
                }
            }
        });
    }

    /// Restricts registration to the given source IPs (`None` lifts the
    /// restriction). The host feeds this with its open control-channel
    /// peers; UDP itself is unauthenticated.
    pub async fn set_allowed_ips(&self, ips: Option<Vec<IpAddr>>) {
        *self.allowed_ips.write().await = ips;
    }

    /// Encodes `event`, assigns the next sequence number, and sends it
    /// to every registered agent with per-kind redundancy.
    pub async fn send_event(&self, event: TimedEvent) {
        let dgram = Datagram::Event {
            seq: self.seq.next(),
            event,
        };
        let bytes = encode_datagram(&dgram);
        let copies = redundancy_for(&event);

        let table = self.agents.read().await;
        for addr in table.keys() {
            for _ in 0..copies {
                if let Err(e) = self.socket.send_to(&bytes, addr).await {
                    debug!(agent = %addr, error = %e, "burst send failed");
                    break;
                }
            }
        }
    }

    /// True when at least one agent is registered; the session falls
    /// back to the control channel otherwise.
    pub async fn has_agents(&self) -> bool {
        !self.agents.read().await.is_empty()
    }

    pub async fn agent_count(&self) -> usize {
        self.agents.read().await.len()
    }

    /// Stops the background tasks. Idempotent.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }
}

impl Drop for UdpSender {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn handle_packet(
    socket: &UdpSocket,
    agents: &RwLock<HashMap<SocketAddr, Instant>>,
    allowed: &RwLock<Option<Vec<IpAddr>>>,
    data: &[u8],
    peer: SocketAddr,
) {
    let Ok(dgram) = decode_datagram(data) else {
        return;
    };

    match dgram {
        Datagram::Register { .. } | Datagram::Heartbeat { .. } => {
            if let Some(list) = allowed.read().await.as_ref() {
                if !list.contains(&peer.ip()) {
                    debug!(peer = %peer, "ignoring UDP registration from unknown IP");
                    return;
                }
            }
            let mut table = agents.write().await;
            if table.insert(peer, Instant::now()).is_none() {
                info!(agent = %peer, "UDP agent registered");
            }
            drop(table);

            if matches!(dgram, Datagram::Register { .. }) {
                let ack = encode_datagram(&Datagram::Ack { ts: now_ms() });
                let _ = socket.send_to(&ack, peer).await;
            }
        }
        // The host never receives event or ack datagrams.
        _ => {}
    }
}
