//! LAN sweep for peer VKVM instances.
//!
//! Probes `/api/status` on every address of the local /24 with a short
//! per-host timeout. The settings UI uses this to offer coordinator
//! candidates; nothing in the core depends on it.
//!
//! The probe is a minimal raw HTTP/1.1 GET over a plain TCP stream —
//! pulling in an HTTP client for one unauthenticated LAN request is not
//! worth the dependency.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Per-host connect+read budget.
const PROBE_TIMEOUT: Duration = Duration::from_millis(500);
/// Concurrent probes per wave.
const PROBE_BATCH: usize = 32;

/// A discovered peer instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerInstance {
    pub ip: String,
    pub port: u16,
    pub current_profile: String,
    pub profiles: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    current_profile: String,
    profiles: Vec<String>,
}

/// Sweeps the local /24 for listening VKVM instances.
pub async fn scan_lan(port: u16) -> Vec<PeerInstance> {
    let Some(local_ip) = local_ipv4() else {
        debug!("no local IPv4 address; skipping LAN scan");
        return Vec::new();
    };
    let octets = match local_ip {
        IpAddr::V4(v4) => v4.octets(),
        IpAddr::V6(_) => return Vec::new(),
    };

    let mut found = Vec::new();
    let hosts: Vec<Ipv4Addr> = (1..=254u8)
        .map(|last| Ipv4Addr::new(octets[0], octets[1], octets[2], last))
        .filter(|ip| IpAddr::V4(*ip) != local_ip)
        .collect();

    for batch in hosts.chunks(PROBE_BATCH) {
        let probes = batch.iter().map(|ip| probe_host(*ip, port));
        for result in join_all(probes).await.into_iter().flatten() {
            found.push(result);
        }
    }
    found
}

/// The primary local IPv4 address, discovered by the routing table (the
/// socket is never actually used to send anything).
fn local_ipv4() -> Option<IpAddr> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    socket.local_addr().ok().map(|a| a.ip())
}

async fn probe_host(ip: Ipv4Addr, port: u16) -> Option<PeerInstance> {
    let addr = SocketAddr::new(IpAddr::V4(ip), port);
    let body = timeout(PROBE_TIMEOUT, fetch_status(addr)).await.ok()??;
    Some(PeerInstance {
        ip: ip.to_string(),
        port,
        current_profile: body.current_profile,
        profiles: body.profiles,
    })
}

async fn fetch_status(addr: SocketAddr) -> Option<StatusBody> {
    let mut stream = TcpStream::connect(addr).await.ok()?;
    let request = format!(
        "GET /api/status HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        addr.ip()
    );
    stream.write_all(request.as_bytes()).await.ok()?;

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.ok()?;
    parse_status_response(&response)
}

/// Extracts the JSON body from a raw HTTP/1.1 response, accepting only
/// 200 answers that parse as a status body.
fn parse_status_response(raw: &[u8]) -> Option<StatusBody> {
    let text = std::str::from_utf8(raw).ok()?;
    let (head, body) = text.split_once("\r\n\r\n")?;
    let status_line = head.lines().next()?;
    if !status_line.contains(" 200 ") {
        return None;
    }
    // Chunked responses frame the body; take the JSON object substring.
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    serde_json::from_str(&body[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_response() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 50\r\n\r\n{\"current_profile\":\"PC1\",\"profiles\":[\"PC1\",\"Mac\"]}";
        let body = parse_status_response(raw).unwrap();
        assert_eq!(body.current_profile, "PC1");
        assert_eq!(body.profiles, vec!["PC1", "Mac"]);
    }

    #[test]
    fn test_parse_chunked_response() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n33\r\n{\"current_profile\":\"A\",\"profiles\":[\"A\"]}\r\n0\r\n\r\n";
        let body = parse_status_response(raw).unwrap();
        assert_eq!(body.current_profile, "A");
    }

    #[test]
    fn test_non_200_is_rejected() {
        let raw = b"HTTP/1.1 401 Unauthorized\r\n\r\n{\"current_profile\":\"A\",\"profiles\":[]}";
        assert!(parse_status_response(raw).is_none());
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(parse_status_response(b"not http at all").is_none());
        assert!(parse_status_response(b"HTTP/1.1 200 OK\r\n\r\nnot json").is_none());
    }
}
