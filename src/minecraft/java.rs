use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::minecraft::common::*;
use crate::motd;

pub const TIMEOUT: Duration = Duration::from_secs(5);
pub const PROTOCOL_VERSION: i32 = 767;

const MAX_FRAME_LEN: i32 = 1_048_576;

#[derive(serde::Deserialize)]
struct RawStatus {
    version: Option<RawVersion>,
    players: Option<RawPlayers>,
    description: Option<serde_json::Value>,
    favicon: Option<String>,
}

#[derive(serde::Deserialize)]
struct RawVersion {
    #[serde(default)]
    name: String,
    #[serde(default)]
    protocol: i32,
}

#[derive(serde::Deserialize)]
struct RawPlayers {
    #[serde(default)]
    online: i32,
    #[serde(default)]
    max: i32,
    sample: Option<Vec<PlayerSample>>,
}

/// Performs a Java Edition status ping against `ip:port`.
///
/// `hostname` is the user-supplied name and goes into the handshake verbatim;
/// proxy fronts route on that field, so it must not be the resolved IP.
pub async fn ping(ip: &str, port: u16, hostname: &str) -> Result<ServerStatus, String> {
    match timeout(TIMEOUT, ping_inner(ip, port, hostname)).await {
        Ok(result) => result,
        Err(_) => Err("timeout".to_string()),
    }
}

async fn ping_inner(ip: &str, port: u16, hostname: &str) -> Result<ServerStatus, String> {
    let mut stream = TcpStream::connect((ip, port))
        .await
        .map_err(|e| format!("Connection failed: {}", e))?;

    // Handshake: protocol version, server address, port, next-state = status
    let mut handshake = Vec::new();
    handshake.extend(write_varint(0x00));
    handshake.extend(write_varint(PROTOCOL_VERSION));
    handshake.extend(write_string(hostname));
    handshake.extend_from_slice(&port.to_be_bytes());
    handshake.extend(write_varint(1));
    send_frame(&mut stream, &handshake).await?;

    // Status request: empty payload, packet id 0
    send_frame(&mut stream, &write_varint(0x00)).await?;

    // The response may arrive fragmented; buffer until a full frame decodes.
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let json_str = loop {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| format!("Read error: {}", e))?;
        if n == 0 {
            return Err("Connection closed before full response".to_string());
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some(json) = try_decode_status(&buf)? {
            break json;
        }
    };

    let status: RawStatus =
        serde_json::from_str(&json_str).map_err(|_| "Invalid JSON response".to_string())?;

    let mut result = ServerStatus::online(hostname, port);
    result.version = status.version.map(|v| VersionInfo {
        clean_name: clean_version_name(&v.name),
        name: v.name,
        protocol: v.protocol,
    });
    result.players = status.players.map(|p| PlayersInfo {
        online: p.online,
        max: p.max,
        sample: p.sample,
    });
    result.motd = status.description.as_ref().map(motd::parse);
    result.favicon = status.favicon;
    Ok(result)
}

async fn send_frame(stream: &mut TcpStream, data: &[u8]) -> Result<(), String> {
    let length = write_varint(data.len() as i32);
    stream.write_all(&length).await.map_err(|e| e.to_string())?;
    stream.write_all(data).await.map_err(|e| e.to_string())?;
    stream.flush().await.map_err(|e| e.to_string())?;
    Ok(())
}

/// Attempts to decode a complete status-response frame from the buffer.
/// `Ok(None)` means more bytes are needed; `Err` means the stream is
/// unrecoverably malformed.
fn try_decode_status(buf: &[u8]) -> Result<Option<String>, String> {
    let mut offset = 0;
    let frame_len = match try_varint(buf, &mut offset)? {
        Some(len) => len,
        None => return Ok(None),
    };
    if frame_len <= 0 || frame_len > MAX_FRAME_LEN {
        return Err(format!("Bad frame length: {}", frame_len));
    }
    if buf.len() - offset < frame_len as usize {
        return Ok(None);
    }
    let frame = &buf[offset..offset + frame_len as usize];

    // The frame is complete from here on; truncation inside it is malformed
    let mut pos = 0;
    let packet_id = read_varint(frame, &mut pos)?;
    if packet_id != 0x00 {
        return Err(format!("Unexpected packet ID: 0x{:02x}", packet_id));
    }

    let str_len = read_varint(frame, &mut pos)?;
    if str_len < 0 || pos + str_len as usize > frame.len() {
        return Err("String length exceeds frame".to_string());
    }

    let json = String::from_utf8(frame[pos..pos + str_len as usize].to_vec())
        .map_err(|_| "Invalid UTF-8".to_string())?;
    Ok(Some(json))
}

/// VarInt decode that reports an incomplete buffer as `Ok(None)` rather
/// than an error, so the caller can wait for more bytes.
fn try_varint(data: &[u8], offset: &mut usize) -> Result<Option<i32>, String> {
    let mut value = 0i32;
    let mut position = 0;
    let mut pos = *offset;

    loop {
        if pos >= data.len() {
            return Ok(None);
        }
        let byte = data[pos];
        pos += 1;

        value |= ((byte & 0x7F) as i32) << position;

        if (byte & 0x80) == 0 {
            *offset = pos;
            return Ok(Some(value));
        }

        position += 7;
        if position >= 32 {
            return Err("VarInt is too big".to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_frame(json: &str) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend(write_varint(0x00));
        body.extend(write_string(json));
        let mut frame = write_varint(body.len() as i32);
        frame.extend(body);
        frame
    }

    #[test]
    fn decodes_complete_frame() {
        let json = r#"{"version":{"name":"1.21.1","protocol":767}}"#;
        let frame = status_frame(json);
        assert_eq!(try_decode_status(&frame).unwrap(), Some(json.to_string()));
    }

    #[test]
    fn incomplete_frame_asks_for_more() {
        let frame = status_frame(r#"{"description":"hi"}"#);
        for cut in 0..frame.len() {
            assert_eq!(
                try_decode_status(&frame[..cut]).unwrap(),
                None,
                "prefix of {} bytes decoded early",
                cut
            );
        }
        assert!(try_decode_status(&frame).unwrap().is_some());
    }

    #[test]
    fn rejects_wrong_packet_id() {
        let mut body = Vec::new();
        body.extend(write_varint(0x05));
        body.extend(write_string("{}"));
        let mut frame = write_varint(body.len() as i32);
        frame.extend(body);
        assert!(try_decode_status(&frame).is_err());
    }

    #[test]
    fn rejects_oversized_frame() {
        let frame = write_varint(MAX_FRAME_LEN + 1);
        assert!(try_decode_status(&frame).is_err());
    }

    #[test]
    fn rejects_string_overrunning_frame() {
        // frame claims 3 bytes: packet id + string length 200
        let frame = vec![2, 0x00, 200];
        assert!(try_decode_status(&frame).is_err());
    }
}
