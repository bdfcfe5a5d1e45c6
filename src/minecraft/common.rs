use serde::{Deserialize, Serialize};

use crate::geoip::{AsnInfo, LocationInfo};
use crate::motd::Motd;
use crate::resolver::{DnsRecord, SrvRecord};

pub const DEFAULT_JAVA_PORT: u16 = 25565;
pub const DEFAULT_BEDROCK_PORT: u16 = 19132;

/// Status document returned for a single probe of one server, either by the
/// controller itself or relayed from a probe node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerStatus {
    pub online: bool,
    pub host: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<VersionInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub players: Option<PlayersInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub motd: Option<Motd>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_info: Option<IpInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServerStatus {
    /// A failed probe: offline with the failure embedded in `error`.
    pub fn offline(host: impl Into<String>, port: u16, error: impl Into<String>) -> Self {
        Self {
            online: false,
            host: host.into(),
            port,
            protocol: None,
            version: None,
            players: None,
            motd: None,
            favicon: None,
            ip_info: None,
            error: Some(error.into()),
        }
    }

    pub fn online(host: impl Into<String>, port: u16) -> Self {
        Self {
            online: true,
            host: host.into(),
            port,
            protocol: None,
            version: None,
            players: None,
            motd: None,
            favicon: None,
            ip_info: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub name: String,
    pub clean_name: String,
    pub protocol: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayersInfo {
    pub online: i32,
    pub max: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample: Option<Vec<PlayerSample>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSample {
    pub name: String,
    pub id: String,
}

/// DNS and GeoIP enrichment attached by the controller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IpInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ips: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub srv_record: Option<SrvRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asn: Option<Vec<AsnInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns_records: Option<Vec<DnsRecord>>,
}

/// Strips legacy codes from a version name, then extracts the first
/// `major.minor[.patch]` run if one is present.
pub fn clean_version_name(name: &str) -> String {
    let stripped = crate::motd::strip_codes(name);
    extract_version(&stripped).unwrap_or(stripped)
}

fn extract_version(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            let start = i;
            let mut dots = 0;
            let mut end = i;
            while end < bytes.len() {
                let b = bytes[end];
                if b.is_ascii_digit() {
                    end += 1;
                } else if b == b'.' && dots < 2 && end + 1 < bytes.len() && bytes[end + 1].is_ascii_digit() {
                    dots += 1;
                    end += 1;
                } else {
                    break;
                }
            }
            if dots >= 1 {
                return Some(s[start..end].to_string());
            }
            i = end + 1;
        } else {
            i += 1;
        }
    }
    None
}

// VarInt encoding for Java-edition framing: 7 bits per byte, continuation
// bit in the MSB, little-endian groups, max 5 bytes.
pub fn write_varint(value: i32) -> Vec<u8> {
    let mut bytes = Vec::new();
    let mut val = value as u32;

    loop {
        if (val & !0x7F) == 0 {
            bytes.push(val as u8);
            break;
        }
        bytes.push((val & 0x7F | 0x80) as u8);
        val >>= 7;
    }

    bytes
}

pub fn read_varint(data: &[u8], offset: &mut usize) -> Result<i32, String> {
    let mut value = 0;
    let mut position = 0;

    loop {
        if *offset >= data.len() {
            return Err("VarInt exceeds data length".to_string());
        }

        let byte = data[*offset];
        *offset += 1;

        value |= ((byte & 0x7F) as i32) << position;

        if (byte & 0x80) == 0 {
            break;
        }

        position += 7;

        if position >= 32 {
            return Err("VarInt is too big".to_string());
        }
    }

    Ok(value)
}

pub fn write_string(s: &str) -> Vec<u8> {
    let bytes = s.as_bytes();
    let mut result = write_varint(bytes.len() as i32);
    result.extend_from_slice(bytes);
    result
}
