use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// Runtime configuration, read from the environment once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub geoip_dir: PathBuf,
    pub probes_file: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .expect("Invalid PORT");

        let host = std::env::var("HOST")
            .unwrap_or_else(|_| "0.0.0.0".to_string())
            .parse::<IpAddr>()
            .expect("Invalid HOST");

        let geoip_dir = std::env::var("GEOIP_DIR")
            .unwrap_or_else(|_| "./data/geoip".to_string())
            .into();

        let probes_file = std::env::var("PROBES_FILE")
            .unwrap_or_else(|_| "./probes.json".to_string())
            .into();

        Self {
            host,
            port,
            geoip_dir,
            probes_file,
        }
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
