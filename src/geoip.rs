//! GeoIP enrichment backed by MaxMind databases. Both databases are
//! optional; lookups against a missing database simply return `None`.

use std::net::IpAddr;
use std::path::Path;
use std::sync::OnceLock;

use maxminddb::{geoip2, Reader};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsnInfo {
    pub number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
}

struct GeoDb {
    city: Option<Reader<Vec<u8>>>,
    asn: Option<Reader<Vec<u8>>>,
}

static GEODB: OnceLock<GeoDb> = OnceLock::new();

fn open(path: &Path) -> Option<Reader<Vec<u8>>> {
    match Reader::open_readfile(path) {
        Ok(reader) => {
            info!("Loaded GeoIP database {}", path.display());
            Some(reader)
        }
        Err(e) => {
            warn!("GeoIP database {} unavailable: {}", path.display(), e);
            None
        }
    }
}

/// Opens the City and ASN databases under `dir`. Called once at startup.
pub fn init(dir: &Path) {
    let db = GeoDb {
        city: open(&dir.join("GeoLite2-City.mmdb")),
        asn: open(&dir.join("GeoLite2-ASN.mmdb")),
    };
    let _ = GEODB.set(db);
}

fn db() -> Option<&'static GeoDb> {
    GEODB.get()
}

pub fn location_of(ip: IpAddr) -> Option<LocationInfo> {
    let reader = db()?.city.as_ref()?;
    let city: geoip2::City = reader.lookup(ip).ok()?;

    let english = |names: Option<std::collections::BTreeMap<&str, &str>>| {
        names.and_then(|n| n.get("en").map(|s| s.to_string()))
    };

    Some(LocationInfo {
        country: english(city.country.as_ref().and_then(|c| c.names.clone())),
        country_code: city
            .country
            .as_ref()
            .and_then(|c| c.iso_code.map(|s| s.to_string())),
        city: english(city.city.as_ref().and_then(|c| c.names.clone())),
        latitude: city.location.as_ref().and_then(|l| l.latitude),
        longitude: city.location.as_ref().and_then(|l| l.longitude),
        timezone: city
            .location
            .as_ref()
            .and_then(|l| l.time_zone.map(|s| s.to_string())),
    })
}

pub fn asn_of(ip: IpAddr) -> Option<AsnInfo> {
    let reader = db()?.asn.as_ref()?;
    let asn: geoip2::Asn = reader.lookup(ip).ok()?;

    Some(AsnInfo {
        number: asn.autonomous_system_number?,
        organization: asn.autonomous_system_organization.map(|s| s.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_without_databases_return_none() {
        // init() is never called here, so no database is loaded
        assert!(location_of("203.0.113.5".parse().unwrap()).is_none());
        assert!(asn_of("203.0.113.5".parse().unwrap()).is_none());
    }

    #[test]
    fn asn_info_serializes_number() {
        let asn = AsnInfo {
            number: 13335,
            organization: Some("CLOUDFLARENET".to_string()),
        };
        let json = serde_json::to_value(&asn).unwrap();
        assert_eq!(json["number"], 13335);
    }
}
