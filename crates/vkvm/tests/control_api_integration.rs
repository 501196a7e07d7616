//! Control API and control-channel integration tests.
//!
//! Spins up the real axum router on an ephemeral loopback port and
//! drives it with raw HTTP requests and a real WebSocket client — the
//! same wire surface agents and the settings UI use.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use vkvm::api::{self, ApiState, PeerRegistry};
use vkvm::session::switcher::{SwitchBroadcaster, Switcher};
use vkvm_core::config::Profile;
use vkvm_core::protocol::control::SyncResponsePayload;
use vkvm_core::{ConfigManager, ControlMessage};
use vkvm_platform::ddc::mock::MockController;
use vkvm_platform::ddc::DdcController;

const WAIT: Duration = Duration::from_secs(3);

struct TestServer {
    addr: SocketAddr,
    config: Arc<ConfigManager>,
    switcher: Arc<Switcher>,
    peers: Arc<PeerRegistry>,
    ddc: MockController,
    _dir: tempfile::TempDir,
}

async fn start_server(token: &str) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(ConfigManager::with_path(dir.path().join("config.json")));
    config
        .update(|c| {
            c.profiles = vec![Profile::named("PC1"), {
                let mut mac = Profile::named("Mac");
                mac.monitor_inputs.insert("MON_A".to_string(), 0x11);
                mac
            }];
            c.general.current_profile = "PC1".to_string();
            c.general.api_token = token.to_string();
        })
        .unwrap();

    let ddc = MockController::new();
    ddc.add_monitor("MON_A", "Left", 0x0F);

    let peers = Arc::new(PeerRegistry::new());
    let switcher = Arc::new(Switcher::new(
        Arc::clone(&config),
        Some(Arc::new(ddc.clone()) as Arc<dyn DdcController>),
        Arc::clone(&peers) as Arc<dyn SwitchBroadcaster>,
    ));

    let state = ApiState {
        config: Arc::clone(&config),
        switcher: Arc::clone(&switcher),
        peers: Arc::clone(&peers),
        token: token.to_string(),
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = api::router(state).into_make_service_with_connect_info::<SocketAddr>();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        addr,
        config,
        switcher,
        peers,
        ddc,
        _dir: dir,
    }
}

/// Minimal HTTP/1.1 request helper; returns (status_line, body).
async fn http_request(
    addr: SocketAddr,
    method: &str,
    path: &str,
    auth: Option<&str>,
    body: Option<&str>,
) -> (String, String) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let auth_header = auth
        .map(|t| format!("Authorization: Bearer {t}\r\n"))
        .unwrap_or_default();
    let body = body.unwrap_or("");
    let request = format!(
        "{method} {path} HTTP/1.1\r\nHost: {addr}\r\n{auth_header}Content-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    timeout(WAIT, stream.read_to_end(&mut response))
        .await
        .expect("response timed out")
        .unwrap();
    let text = String::from_utf8_lossy(&response).into_owned();
    let status = text.lines().next().unwrap_or_default().to_string();
    let payload = text
        .split_once("\r\n\r\n")
        .map(|(_, b)| b.to_string())
        .unwrap_or_default();
    (status, payload)
}

fn json_body(body: &str) -> serde_json::Value {
    let start = body.find('{').expect("json object in body");
    let end = body.rfind('}').expect("json object in body");
    serde_json::from_str(&body[start..=end]).expect("valid json")
}

// ── REST surface ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health_requires_no_auth() {
    let server = start_server("sekrit").await;
    let (status, body) = http_request(server.addr, "GET", "/health", None, None).await;
    assert!(status.contains("200"), "got {status}");
    assert_eq!(json_body(&body)["status"], "ok");
}

#[tokio::test]
async fn test_status_reports_profiles() {
    let server = start_server("").await;
    let (status, body) = http_request(server.addr, "GET", "/api/status", None, None).await;
    assert!(status.contains("200"));
    let json = json_body(&body);
    assert_eq!(json["current_profile"], "PC1");
    assert_eq!(json["profiles"], serde_json::json!(["PC1", "Mac"]));
}

#[tokio::test]
async fn test_api_rejects_missing_token() {
    let server = start_server("sekrit").await;
    let (status, _) = http_request(server.addr, "GET", "/api/status", None, None).await;
    assert!(status.contains("401"), "got {status}");
}

#[tokio::test]
async fn test_api_rejects_wrong_token() {
    let server = start_server("sekrit").await;
    let (status, _) = http_request(server.addr, "GET", "/api/status", Some("wrong"), None).await;
    assert!(status.contains("401"), "got {status}");
}

#[tokio::test]
async fn test_api_accepts_correct_token() {
    let server = start_server("sekrit").await;
    let (status, _) =
        http_request(server.addr, "GET", "/api/status", Some("sekrit"), None).await;
    assert!(status.contains("200"), "got {status}");
}

#[tokio::test]
async fn test_switch_applies_profile_and_writes_ddc() {
    let server = start_server("").await;
    let (status, body) = http_request(
        server.addr,
        "POST",
        "/api/switch?profile=Mac&propagate=true",
        None,
        None,
    )
    .await;

    assert!(status.contains("200"), "got {status}");
    let json = json_body(&body);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["profile"], "Mac");

    assert_eq!(server.config.get().general.current_profile, "Mac");
    assert_eq!(server.ddc.input_writes(), vec![("MON_A".to_string(), 0x11)]);
}

#[tokio::test]
async fn test_switch_unknown_profile_is_404() {
    let server = start_server("").await;
    let (status, _) = http_request(
        server.addr,
        "POST",
        "/api/switch?profile=Nope",
        None,
        None,
    )
    .await;
    assert!(status.contains("404"), "got {status}");
    assert_eq!(server.config.get().general.current_profile, "PC1");
}

#[tokio::test]
async fn test_switch_without_profile_param_is_4xx() {
    let server = start_server("").await;
    let (status, _) = http_request(server.addr, "POST", "/api/switch", None, None).await;
    // Missing query string fails extraction.
    assert!(
        status.contains("400") || status.contains("422"),
        "got {status}"
    );
}

#[tokio::test]
async fn test_config_round_trip_via_api() {
    let server = start_server("").await;
    let (_, body) = http_request(server.addr, "GET", "/api/config", None, None).await;
    let mut config: serde_json::Value = json_body(&body);

    // Push back with a changed field (the push-sync path).
    config["general"]["current_profile"] = serde_json::json!("Mac");
    let (status, _) = http_request(
        server.addr,
        "POST",
        "/api/config",
        None,
        Some(&config.to_string()),
    )
    .await;
    assert!(status.contains("200"), "got {status}");
    assert_eq!(server.config.get().general.current_profile, "Mac");
}

// ── Control channel (/ws) ─────────────────────────────────────────────────────

async fn ws_connect(
    addr: SocketAddr,
) -> tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<TcpStream>> {
    let (stream, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("ws connect");
    stream
}

async fn next_control_message(
    stream: &mut tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<TcpStream>>,
) -> ControlMessage {
    loop {
        let frame = timeout(WAIT, stream.next())
            .await
            .expect("ws frame timed out")
            .expect("ws closed")
            .expect("ws error");
        match frame {
            WsMessage::Text(text) => return ControlMessage::from_json(&text).expect("valid frame"),
            WsMessage::Ping(payload) => {
                let _ = stream.send(WsMessage::Pong(payload)).await;
            }
            _ => {}
        }
    }
}

#[tokio::test]
async fn test_sync_req_returns_exact_profile_list() {
    let server = start_server("").await;
    let mut ws = ws_connect(server.addr).await;

    ws.send(WsMessage::Text(
        ControlMessage::SyncReq.to_json().unwrap(),
    ))
    .await
    .unwrap();

    match next_control_message(&mut ws).await {
        ControlMessage::SyncResp(SyncResponsePayload {
            profiles,
            usb_forwarding_enabled,
        }) => {
            let names: Vec<&str> = profiles.iter().map(|p| p.name.as_str()).collect();
            assert_eq!(names, vec!["PC1", "Mac"]);
            assert!(usb_forwarding_enabled);
        }
        other => panic!("expected sync_resp, got {other:?}"),
    }
}

#[tokio::test]
async fn test_host_broadcast_reaches_connected_peer() {
    let server = start_server("").await;
    let mut ws = ws_connect(server.addr).await;

    // Wait for registration before broadcasting.
    timeout(WAIT, async {
        while server.peers.peer_count().await == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("peer never registered");

    server.switcher.switch_to("Mac", true).await.unwrap();

    match next_control_message(&mut ws).await {
        ControlMessage::Switch(payload) => {
            assert_eq!(payload.profile, "Mac");
            assert_eq!(payload.origin, "host");
            assert!(!payload.propagate, "broadcasts must not propagate further");
        }
        other => panic!("expected switch, got {other:?}"),
    }
}

#[tokio::test]
async fn test_agent_switch_request_is_applied_and_broadcast() {
    let server = start_server("").await;
    let mut ws = ws_connect(server.addr).await;
    timeout(WAIT, async {
        while server.peers.peer_count().await == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    ws.send(WsMessage::Text(
        ControlMessage::Switch(vkvm_core::protocol::control::SwitchPayload {
            profile: "Mac".to_string(),
            origin: "agent".to_string(),
            propagate: true,
        })
        .to_json()
        .unwrap(),
    ))
    .await
    .unwrap();

    // The host applies the switch and fans it back out.
    match next_control_message(&mut ws).await {
        ControlMessage::Switch(payload) => assert_eq!(payload.profile, "Mac"),
        other => panic!("expected switch broadcast, got {other:?}"),
    }

    timeout(WAIT, async {
        while server.config.get().general.current_profile != "Mac" {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("switch was never applied host-side");
}

#[tokio::test]
async fn test_ws_requires_auth_message_when_token_configured() {
    let server = start_server("sekrit").await;
    let mut ws = ws_connect(server.addr).await;

    // First frame is not auth: the host closes without answering.
    ws.send(WsMessage::Text(
        ControlMessage::SyncReq.to_json().unwrap(),
    ))
    .await
    .unwrap();

    let closed = timeout(WAIT, async {
        loop {
            match ws.next().await {
                None | Some(Ok(WsMessage::Close(_))) | Some(Err(_)) => return true,
                Some(Ok(WsMessage::Text(_))) => return false,
                _ => {}
            }
        }
    })
    .await
    .expect("no close observed");
    assert!(closed, "unauthenticated peer must be disconnected");
}

#[tokio::test]
async fn test_ws_auth_message_admits_peer() {
    let server = start_server("sekrit").await;
    let mut ws = ws_connect(server.addr).await;

    ws.send(WsMessage::Text(
        ControlMessage::Auth(vkvm_core::protocol::control::AuthPayload {
            token: "sekrit".to_string(),
            agent_name: "test-agent".to_string(),
            agent_version: "0.0.0".to_string(),
        })
        .to_json()
        .unwrap(),
    ))
    .await
    .unwrap();
    ws.send(WsMessage::Text(
        ControlMessage::SyncReq.to_json().unwrap(),
    ))
    .await
    .unwrap();

    assert!(matches!(
        next_control_message(&mut ws).await,
        ControlMessage::SyncResp(_)
    ));
}

#[tokio::test]
async fn test_peer_registry_publishes_ips_for_udp_allow_list() {
    // The host session feeds this watch into the UDP registration
    // allow-list, so it must track connects and disconnects.
    let server = start_server("").await;
    let mut ips_rx = server.peers.subscribe_ips();
    assert!(ips_rx.borrow().is_empty());

    let ws = ws_connect(server.addr).await;
    timeout(WAIT, async {
        while ips_rx.borrow_and_update().is_empty() {
            if ips_rx.changed().await.is_err() {
                break;
            }
        }
    })
    .await
    .expect("peer IP never published");
    assert_eq!(ips_rx.borrow().len(), 1);

    drop(ws);
    timeout(WAIT, async {
        while !ips_rx.borrow_and_update().is_empty() {
            if ips_rx.changed().await.is_err() {
                break;
            }
        }
    })
    .await
    .expect("peer IP never withdrawn after disconnect");
}

#[tokio::test]
async fn test_malformed_ws_frame_is_ignored() {
    let server = start_server("").await;
    let mut ws = ws_connect(server.addr).await;

    ws.send(WsMessage::Text("{not json".to_string())).await.unwrap();
    ws.send(WsMessage::Text(
        ControlMessage::SyncReq.to_json().unwrap(),
    ))
    .await
    .unwrap();

    // The connection survived the garbage and still answers.
    assert!(matches!(
        next_control_message(&mut ws).await,
        ControlMessage::SyncResp(_)
    ));
}
