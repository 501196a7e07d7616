//! Agent-side control channel client.
//!
//! A long-lived WebSocket connection to `ws://<coordinator>/ws`, owned
//! by a background task that reconnects with a fixed 5-second backoff
//! until [`WsClient::close`] is called. Closing is cooperative via a
//! watch channel, never by injecting errors into the stream.
//!
//! Per connection:
//! - immediately sends `auth` (when a token is configured) and
//!   `sync_req`,
//! - emits [`TransportEvent::Connected`] / `Disconnected` so the session
//!   can reset injector modifier state and re-register for UDP,
//! - applies a 60 s read deadline, a 10 s write deadline per message,
//!   and sends an application-level ping every 30 s.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use vkvm_core::protocol::control::{AuthPayload, SwitchPayload};
use vkvm_core::ControlMessage;

use super::TransportEvent;

/// Fixed delay between reconnect attempts.
const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);
/// Read deadline: the host pings every 30 s, so 60 s of silence means
/// the connection is dead.
const READ_DEADLINE: Duration = Duration::from_secs(60);
/// Per-message write deadline.
const WRITE_DEADLINE: Duration = Duration::from_secs(10);
/// Application-level ping period.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Handle for sending on the control channel from anywhere in the
/// session.
#[derive(Clone)]
pub struct WsClientHandle {
    outbound: mpsc::Sender<ControlMessage>,
}

impl WsClientHandle {
    pub(crate) fn new(outbound: mpsc::Sender<ControlMessage>) -> Self {
        Self { outbound }
    }

    /// Queues a message; silently dropped when disconnected (the next
    /// sync after reconnect restores consistency).
    pub async fn send(&self, msg: ControlMessage) {
        let _ = self.outbound.send(msg).await;
    }

    /// Forwards a switch request to the host (the host is authoritative).
    pub async fn send_switch(&self, profile: &str, origin: &str) {
        self.send(ControlMessage::Switch(SwitchPayload {
            profile: profile.to_string(),
            origin: origin.to_string(),
            propagate: true,
        }))
        .await;
    }

    pub async fn send_sync_request(&self) {
        self.send(ControlMessage::SyncReq).await;
    }
}

/// Agent-side control channel client.
pub struct WsClient {
    handle: WsClientHandle,
    shutdown: watch::Sender<bool>,
}

impl WsClient {
    /// Spawns the connect/reconnect loop.
    ///
    /// `coordinator_addr` is `host:port`; `agent_name` identifies this
    /// machine in the `auth` message.
    pub fn start(
        coordinator_addr: String,
        token: String,
        agent_name: String,
        events_tx: mpsc::Sender<TransportEvent>,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel::<ControlMessage>(100);
        let (shutdown, shutdown_rx) = watch::channel(false);

        tokio::spawn(run_client(
            coordinator_addr,
            token,
            agent_name,
            events_tx,
            outbound_rx,
            shutdown_rx,
        ));

        Self {
            handle: WsClientHandle::new(outbound_tx),
            shutdown,
        }
    }

    pub fn handle(&self) -> WsClientHandle {
        self.handle.clone()
    }

    /// Ends the reconnect loop. Idempotent.
    pub fn close(&self) {
        let _ = self.shutdown.send(true);
    }
}

impl Drop for WsClient {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_client(
    coordinator_addr: String,
    token: String,
    agent_name: String,
    events_tx: mpsc::Sender<TransportEvent>,
    mut outbound_rx: mpsc::Receiver<ControlMessage>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let url = format!("ws://{coordinator_addr}/ws");
    loop {
        if *shutdown_rx.borrow() {
            return;
        }

        match connect_async(url.as_str()).await {
            Ok((stream, _)) => {
                info!(url = %url, "control channel connected");
                let _ = events_tx.send(TransportEvent::Connected).await;
                run_connection(
                    stream,
                    &token,
                    &agent_name,
                    &events_tx,
                    &mut outbound_rx,
                    &mut shutdown_rx,
                )
                .await;
                let _ = events_tx.send(TransportEvent::Disconnected).await;
                warn!("control channel lost");
            }
            Err(e) => {
                debug!(url = %url, error = %e, "control channel connect failed");
            }
        }

        tokio::select! {
            _ = shutdown_rx.changed() => return,
            _ = tokio::time::sleep(RECONNECT_BACKOFF) => {
                info!("attempting control channel reconnection");
            }
        }
    }
}

/// Runs one established connection until it drops or shutdown fires.
async fn run_connection(
    stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    token: &str,
    agent_name: &str,
    events_tx: &mpsc::Sender<TransportEvent>,
    outbound_rx: &mut mpsc::Receiver<ControlMessage>,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    let (mut sink, mut source) = stream.split();

    // Handshake: identify, then ask for the authoritative profile list.
    if !token.is_empty() {
        let auth = ControlMessage::Auth(AuthPayload {
            token: token.to_string(),
            agent_name: agent_name.to_string(),
            agent_version: env!("CARGO_PKG_VERSION").to_string(),
        });
        if send_frame(&mut sink, &auth).await.is_err() {
            return;
        }
    }
    if send_frame(&mut sink, &ControlMessage::SyncReq).await.is_err() {
        return;
    }

    let mut ping_tick = tokio::time::interval(PING_INTERVAL);
    ping_tick.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => return,

            _ = ping_tick.tick() => {
                if send_frame(&mut sink, &ControlMessage::Ping).await.is_err() {
                    return;
                }
            }

            Some(msg) = outbound_rx.recv() => {
                if send_frame(&mut sink, &msg).await.is_err() {
                    return;
                }
            }

            frame = timeout(READ_DEADLINE, source.next()) => {
                let frame = match frame {
                    Err(_) => {
                        warn!("control channel read deadline exceeded");
                        return;
                    }
                    Ok(None) | Ok(Some(Err(_))) => return,
                    Ok(Some(Ok(frame))) => frame,
                };
                match frame {
                    WsMessage::Text(text) => handle_frame(&text, events_tx).await,
                    WsMessage::Ping(payload) => {
                        let _ = sink.send(WsMessage::Pong(payload)).await;
                    }
                    WsMessage::Close(_) => return,
                    _ => {}
                }
            }
        }
    }
}

async fn handle_frame(text: &str, events_tx: &mpsc::Sender<TransportEvent>) {
    let msg = match ControlMessage::from_json(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!(error = %e, "dropping malformed control frame");
            return;
        }
    };

    let event = match msg {
        ControlMessage::Switch(payload) => {
            info!(profile = %payload.profile, origin = %payload.origin, "switch received");
            TransportEvent::Switch(payload)
        }
        ControlMessage::SyncResp(payload) => TransportEvent::ProfilesSynced {
            profiles: payload.profiles,
            usb_forwarding_enabled: payload.usb_forwarding_enabled,
        },
        ControlMessage::Input(event) => TransportEvent::Input(event),
        // Auth/SyncReq/Ping are inbound-to-host messages; ignore echoes.
        _ => return,
    };
    let _ = events_tx.send(event).await;
}

async fn send_frame<S>(sink: &mut S, msg: &ControlMessage) -> Result<(), ()>
where
    S: SinkExt<WsMessage> + Unpin,
{
    let json = msg.to_json().map_err(|_| ())?;
    match timeout(WRITE_DEADLINE, sink.send(WsMessage::Text(json))).await {
        Ok(Ok(())) => Ok(()),
        _ => Err(()),
    }
}
