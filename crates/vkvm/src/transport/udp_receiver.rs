//! Agent-side UDP burst receiver.
//!
//! [`probe`](UdpReceiver::probe) first: three `Register` attempts with a
//! 500 ms `Ack` wait each. No `Ack` means a firewall or NAT is eating
//! UDP — the agent marks the burst channel closed and relies on the
//! control channel's `input` fallback instead.
//!
//! Once started, the receiver registers, heartbeats every 5 s, and
//! decodes incoming datagrams, suppressing the redundant copies of
//! critical events through a [`SeqWindow`] before dispatching into the
//! shared [`TransportEvent`] stream. Packets are processed in arrival
//! order — the first copy wins, no reordering.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use vkvm_core::protocol::datagram::{decode_datagram, encode_datagram, Datagram, MAX_DATAGRAM_SIZE};
use vkvm_core::SeqWindow;

use super::{TransportError, TransportEvent};

/// Heartbeat period keeping the host-side registration alive.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
/// Per-attempt `Ack` wait during the probe.
const PROBE_TIMEOUT: Duration = Duration::from_millis(500);
/// Register attempts before declaring the burst channel closed.
const PROBE_ATTEMPTS: u32 = 3;

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Agent-side burst channel endpoint.
pub struct UdpReceiver {
    host_addr: SocketAddr,
    socket: Arc<UdpSocket>,
    events_tx: mpsc::Sender<TransportEvent>,
    shutdown: watch::Sender<bool>,
}

impl UdpReceiver {
    /// Binds an ephemeral local socket aimed at the host's UDP port.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::BadAddress`] for an unresolvable host
    /// and [`TransportError::Bind`] when no local port is available.
    pub async fn new(
        host_addr: &str,
        events_tx: mpsc::Sender<TransportEvent>,
    ) -> Result<Self, TransportError> {
        let host_addr = tokio::net::lookup_host(host_addr)
            .await
            .map_err(|_| TransportError::BadAddress(host_addr.to_string()))?
            .find(|a| a.is_ipv4())
            .ok_or_else(|| TransportError::BadAddress(host_addr.to_string()))?;

        let local = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0);
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|source| TransportError::Bind { addr: local, source })?;

        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            host_addr,
            socket: Arc::new(socket),
            events_tx,
            shutdown,
        })
    }

    /// Tests whether the burst channel is open: sends `Register` and
    /// waits for an `Ack`, up to three attempts (≈1.5 s total).
    pub async fn probe(&self) -> bool {
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        for attempt in 1..=PROBE_ATTEMPTS {
            let register = encode_datagram(&Datagram::Register { ts: now_ms() });
            if self.socket.send_to(&register, self.host_addr).await.is_err() {
                continue;
            }

            match timeout(PROBE_TIMEOUT, self.socket.recv_from(&mut buf)).await {
                Ok(Ok((len, _))) => {
                    if matches!(decode_datagram(&buf[..len]), Ok(Datagram::Ack { .. })) {
                        info!(attempt, "UDP probe acked; burst channel open");
                        return true;
                    }
                }
                _ => debug!(attempt, "UDP probe attempt timed out"),
            }
        }
        warn!("no Ack after {PROBE_ATTEMPTS} attempts; burst channel closed");
        false
    }

    /// Sends a `Register` packet. Called at start and again after every
    /// control-channel reconnect (the host may have restarted and lost
    /// its registrations).
    pub async fn register(&self) -> Result<(), TransportError> {
        let register = encode_datagram(&Datagram::Register { ts: now_ms() });
        self.socket.send_to(&register, self.host_addr).await?;
        Ok(())
    }

    /// Registers with the host and spawns the heartbeat and receive
    /// loops.
    pub async fn start(&self) -> Result<(), TransportError> {
        self.register().await?;

        // Heartbeat loop.
        let socket = Arc::clone(&self.socket);
        let host_addr = self.host_addr;
        let mut shutdown_rx = self.shutdown.subscribe();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(HEARTBEAT_INTERVAL);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = tick.tick() => {
                        let beat = encode_datagram(&Datagram::Heartbeat { ts: now_ms() });
                        let _ = socket.send_to(&beat, host_addr).await;
                    }
                }
            }
        });

        // Receive loop with dedup.
        let socket = Arc::clone(&self.socket);
        let events_tx = self.events_tx.clone();
        let mut shutdown_rx = self.shutdown.subscribe();
        tokio::spawn(async move {
            let mut window = SeqWindow::new();
            let mut buf = [0u8; MAX_DATAGRAM_SIZE];
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    result = socket.recv_from(&mut buf) => {
                        let Ok((len, _)) = result else { continue };
                        let Ok(dgram) = decode_datagram(&buf[..len]) else { continue };
                        if let Datagram::Event { seq, event } = dgram {
                            // Session packets are exempt from dedup by
                            // construction; only events reach here.
                            if window.is_duplicate(seq) {
                                continue;
                            }
                            if events_tx.send(TransportEvent::Input(event)).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        });

        Ok(())
    }

    /// Stops the background loops. Idempotent.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }
}

impl Drop for UdpReceiver {
    fn drop(&mut self) {
        self.stop();
    }
}
