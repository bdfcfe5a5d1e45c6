pub mod bedrock;
pub mod common;
pub mod java;

use serde::{Deserialize, Serialize};

use crate::minecraft::common::ServerStatus;

/// Which edition's wire protocol to speak when probing a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Java,
    Bedrock,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Java => "java",
            Protocol::Bedrock => "bedrock",
        }
    }

    pub fn from_param(value: &str) -> Option<Self> {
        match value {
            "java" => Some(Protocol::Java),
            "bedrock" => Some(Protocol::Bedrock),
            _ => None,
        }
    }
}

/// Probes `ip:port` with the requested protocol. `hostname` is the
/// user-supplied name, preserved for the Java handshake.
pub async fn ping(
    ip: &str,
    port: u16,
    hostname: &str,
    protocol: Protocol,
) -> Result<ServerStatus, String> {
    match protocol {
        Protocol::Java => java::ping(ip, port, hostname).await,
        Protocol::Bedrock => bedrock::ping(ip, port, hostname).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_param_parsing() {
        assert_eq!(Protocol::from_param("java"), Some(Protocol::Java));
        assert_eq!(Protocol::from_param("bedrock"), Some(Protocol::Bedrock));
        assert_eq!(Protocol::from_param("JAVA"), None);
        assert_eq!(Protocol::from_param(""), None);
    }

    #[test]
    fn protocol_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Protocol::Java).unwrap(), "\"java\"");
        assert_eq!(
            serde_json::from_str::<Protocol>("\"bedrock\"").unwrap(),
            Protocol::Bedrock
        );
    }
}
