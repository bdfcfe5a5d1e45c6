use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;
use tokio::time::timeout;

use crate::minecraft::common::*;
use crate::motd;

pub const TIMEOUT: Duration = Duration::from_secs(3);

// A lost datagram on a closed port is indistinguishable from offline, so
// retries stay disabled.
const MAX_RETRIES: usize = 0;

const UNCONNECTED_PING: u8 = 0x01;
const UNCONNECTED_PONG: u8 = 0x1C;
const OFFLINE_MESSAGE_ID: [u8; 16] = [
    0x00, 0xFF, 0xFF, 0x00, 0xFE, 0xFE, 0xFE, 0xFE, 0xFD, 0xFD, 0xFD, 0xFD, 0x12, 0x34, 0x56,
    0x78,
];

// Pong layout before the server-info string: id, timestamp, server GUID, magic
const PONG_HEADER_LEN: usize = 1 + 8 + 8 + 16;
const MIN_PONG_LEN: usize = PONG_HEADER_LEN + 2;

/// Performs a Bedrock Edition unconnected ping against `ip:port`.
pub async fn ping(ip: &str, port: u16, hostname: &str) -> Result<ServerStatus, String> {
    let mut last_err = String::new();
    for attempt in 0..=MAX_RETRIES {
        match ping_once(ip, port, hostname).await {
            Ok(status) => return Ok(status),
            // Only a timeout is worth another datagram
            Err(e) if e == "timeout" && attempt < MAX_RETRIES => last_err = e,
            Err(e) => return Err(e),
        }
    }
    Err(last_err)
}

async fn ping_once(ip: &str, port: u16, hostname: &str) -> Result<ServerStatus, String> {
    let socket = UdpSocket::bind("0.0.0.0:0")
        .await
        .map_err(|e| format!("Failed to bind socket: {}", e))?;

    // Connect so ICMP port-unreachable surfaces as an error instead of silence
    socket
        .connect((ip, port))
        .await
        .map_err(|e| format!("Failed to connect: {}", e))?;

    let mut packet = Vec::with_capacity(33);
    packet.push(UNCONNECTED_PING);
    packet.extend_from_slice(&epoch_millis().to_be_bytes());
    packet.extend_from_slice(&OFFLINE_MESSAGE_ID);
    packet.extend_from_slice(&rand::random::<i64>().to_be_bytes());

    socket
        .send(&packet)
        .await
        .map_err(|e| format!("Failed to send ping: {}", e))?;

    let mut buffer = [0u8; 4096];
    let size = timeout(TIMEOUT, socket.recv(&mut buffer))
        .await
        .map_err(|_| "timeout".to_string())?
        .map_err(|e| format!("Failed to receive pong: {}", e))?;

    parse_pong(&buffer[..size], hostname, port)
}

fn epoch_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Parses an UNCONNECTED_PONG datagram into a status document.
///
/// The server-info payload is a big-endian u16-length string of
/// semicolon-delimited fields:
/// `Edition;MOTD;Protocol;Version;OnlinePlayers;MaxPlayers;...`
fn parse_pong(buf: &[u8], hostname: &str, port: u16) -> Result<ServerStatus, String> {
    if buf.len() < MIN_PONG_LEN || buf[0] != UNCONNECTED_PONG {
        return Err("Invalid UNCONNECTED_PONG response".to_string());
    }

    let str_len = u16::from_be_bytes([buf[PONG_HEADER_LEN], buf[PONG_HEADER_LEN + 1]]) as usize;
    let start = PONG_HEADER_LEN + 2;
    if start + str_len > buf.len() {
        return Err("Server info length exceeds datagram".to_string());
    }

    let info = std::str::from_utf8(&buf[start..start + str_len])
        .map_err(|_| "Invalid UTF-8".to_string())?;

    let parts: Vec<&str> = info.split(';').collect();
    if parts.len() < 6 {
        return Err("Malformed server info string".to_string());
    }

    let edition = parts[0];
    let version = parts[3];

    let mut result = ServerStatus::online(hostname, port);
    result.version = Some(VersionInfo {
        name: format!("{} {}", edition, version),
        clean_name: version.to_string(),
        protocol: parts[2].parse().unwrap_or(0),
    });
    result.players = Some(PlayersInfo {
        online: parts[4].parse().unwrap_or(0),
        max: parts[5].parse().unwrap_or(0),
        sample: None,
    });
    result.motd = Some(motd::from_raw(parts[1].to_string()));
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pong(info: &str) -> Vec<u8> {
        let mut buf = vec![UNCONNECTED_PONG];
        buf.extend_from_slice(&1234i64.to_be_bytes());
        buf.extend_from_slice(&5678i64.to_be_bytes());
        buf.extend_from_slice(&OFFLINE_MESSAGE_ID);
        buf.extend_from_slice(&(info.len() as u16).to_be_bytes());
        buf.extend_from_slice(info.as_bytes());
        buf
    }

    #[test]
    fn parses_full_pong() {
        let buf = pong("MCPE;§aA Bedrock Server;686;1.21.50;12;40;123456789;Sub;Survival;1");
        let status = parse_pong(&buf, "bedrock.example.com", 19132).unwrap();

        assert!(status.online);
        let version = status.version.unwrap();
        assert_eq!(version.name, "MCPE 1.21.50");
        assert_eq!(version.clean_name, "1.21.50");
        assert_eq!(version.protocol, 686);
        let players = status.players.unwrap();
        assert_eq!(players.online, 12);
        assert_eq!(players.max, 40);
        assert_eq!(status.motd.unwrap().clean, "A Bedrock Server");
    }

    #[test]
    fn parses_minimal_six_fields() {
        let buf = pong("MCPE;motd;0;1.0;0;10");
        assert!(parse_pong(&buf, "h", 19132).is_ok());
    }

    #[test]
    fn rejects_too_few_fields() {
        let buf = pong("MCPE;motd;0;1.0;0");
        assert!(parse_pong(&buf, "h", 19132).is_err());
    }

    #[test]
    fn rejects_wrong_packet_type() {
        let mut buf = pong("MCPE;motd;0;1.0;0;10");
        buf[0] = 0x1D;
        assert!(parse_pong(&buf, "h", 19132).is_err());
    }

    #[test]
    fn rejects_short_datagram() {
        assert!(parse_pong(&[UNCONNECTED_PONG; 10], "h", 19132).is_err());
    }

    #[test]
    fn rejects_overrunning_length() {
        let mut buf = pong("MCPE;motd;0;1.0;0;10");
        let len_at = PONG_HEADER_LEN;
        buf[len_at] = 0xFF;
        buf[len_at + 1] = 0xFF;
        assert!(parse_pong(&buf, "h", 19132).is_err());
    }

    #[test]
    fn non_numeric_counts_default_to_zero() {
        let buf = pong("MCPE;motd;abc;1.0;x;y");
        let status = parse_pong(&buf, "h", 19132).unwrap();
        assert_eq!(status.version.as_ref().unwrap().protocol, 0);
        let players = status.players.unwrap();
        assert_eq!(players.online, 0);
        assert_eq!(players.max, 0);
    }
}
