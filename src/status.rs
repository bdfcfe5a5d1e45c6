//! The two probe orchestrators: a direct controller-side probe and the
//! distributed fan-out over every connected probe node. Both share the
//! address/SRV planning and the DNS + GeoIP enrichment chain.

use std::collections::HashMap;
use std::net::IpAddr;

use serde::Serialize;

use crate::address;
use crate::error::ApiError;
use crate::geoip;
use crate::minecraft::common::{IpInfo, ServerStatus, DEFAULT_BEDROCK_PORT, DEFAULT_JAVA_PORT};
use crate::minecraft::{self, Protocol};
use crate::probes::{dispatcher, registry};
use crate::resolver::{self, SrvRecord};

#[derive(Debug, Serialize)]
pub struct DistributedResponse {
    pub target: String,
    pub result_count: usize,
    pub nodes: HashMap<String, NodeStatus>,
}

#[derive(Debug, Serialize)]
pub struct NodeStatus {
    pub node_region: String,
    pub status: ServerStatus,
}

/// Where a probe should actually connect, after SRV indirection and the
/// Bedrock default-port substitution.
struct Plan {
    host: String,
    connect_host: String,
    connect_port: u16,
    srv: Option<SrvRecord>,
    is_ip: bool,
}

async fn plan(parsed: address::Address, is_ip: bool, protocol: Protocol) -> Plan {
    let mut connect_host = parsed.host.clone();
    let mut connect_port = parsed.port;
    let mut srv = None;

    if protocol == Protocol::Java && !is_ip {
        if let Some(record) = resolver::resolve_srv(&parsed.host).await {
            connect_host = record.target.clone();
            connect_port = record.port;
            srv = Some(record);
        }
    }

    // An implied Java default port means the user never chose one
    if protocol == Protocol::Bedrock && connect_port == DEFAULT_JAVA_PORT {
        connect_port = DEFAULT_BEDROCK_PORT;
    }

    Plan {
        host: parsed.host,
        connect_host,
        connect_port,
        srv,
        is_ip,
    }
}

/// Probes the server from the controller itself and assembles the enriched
/// status document.
pub async fn direct_status(server: &str, protocol: Protocol) -> ServerStatus {
    let parsed = address::parse(server, DEFAULT_JAVA_PORT);
    let is_ip = parsed.host.parse::<IpAddr>().is_ok();
    if !is_ip && !resolver::looks_resolvable(&parsed.host) {
        return ServerStatus::offline(
            parsed.host.clone(),
            parsed.port,
            format!("DNS resolution failed for {}", parsed.host),
        );
    }

    let plan = plan(parsed, is_ip, protocol).await;

    let Some(ip) = resolver::resolve_ip(&plan.connect_host).await else {
        return ServerStatus::offline(
            plan.host,
            plan.connect_port,
            format!("DNS resolution failed for {}", plan.connect_host),
        );
    };

    // The ping and the enrichment chain are independent; run them together
    let (ping_result, ip_info) = tokio::join!(
        minecraft::ping(&ip, plan.connect_port, &plan.host, protocol),
        enrich(&plan.host, plan.is_ip, Some(ip.as_str()), plan.srv.clone()),
    );

    let mut status = match ping_result {
        Ok(status) => status,
        Err(error) => ServerStatus::offline(plan.host.clone(), plan.connect_port, error),
    };
    status.host = plan.host;
    status.port = plan.connect_port;
    status.protocol = Some(protocol.as_str().to_string());
    status.ip_info = Some(ip_info);
    status
}

/// Fans the probe out to every connected node and merges the per-node
/// results with the controller-side enrichment.
pub async fn distributed_status(
    server: &str,
    protocol: Protocol,
) -> Result<DistributedResponse, ApiError> {
    // One snapshot feeds both the region map and the fan-out, so every node
    // in the result carries its region
    let probes = registry::snapshot();
    if probes.is_empty() {
        return Err(ApiError::NoProbes);
    }
    let regions: HashMap<String, String> = probes
        .iter()
        .map(|s| (s.id.clone(), s.region.clone()))
        .collect();

    let parsed = address::parse(server, DEFAULT_JAVA_PORT);
    let is_ip = parsed.host.parse::<IpAddr>().is_ok();
    let plan = plan(parsed, is_ip, protocol).await;

    let (ip_info, results) = tokio::join!(
        enrich_for_broadcast(&plan),
        dispatcher::broadcast_task(probes, &plan.connect_host, plan.connect_port, protocol),
    );

    let mut nodes = HashMap::new();
    for (probe_id, result) in results {
        let mut status = match result.data {
            Some(status) if result.success => status,
            _ => ServerStatus::offline(
                plan.host.clone(),
                plan.connect_port,
                result.error.unwrap_or_else(|| "Unknown error".to_string()),
            ),
        };
        status.protocol = Some(protocol.as_str().to_string());
        status.ip_info = Some(ip_info.clone());

        let node_region = regions.get(&probe_id).cloned().unwrap_or_default();
        nodes.insert(
            probe_id,
            NodeStatus {
                node_region,
                status,
            },
        );
    }

    Ok(DistributedResponse {
        target: server.to_string(),
        result_count: nodes.len(),
        nodes,
    })
}

async fn enrich_for_broadcast(plan: &Plan) -> IpInfo {
    if !plan.is_ip && !resolver::looks_resolvable(&plan.host) {
        return IpInfo::default();
    }
    let ip = resolver::resolve_ip(&plan.connect_host).await;
    enrich(&plan.host, plan.is_ip, ip.as_deref(), plan.srv.clone()).await
}

/// Builds the `ip_info` document: the full DNS chain from the original
/// hostname, the unique addresses it yields, ASN per unique address
/// (de-duplicated by number), and location for the primary address only.
async fn enrich(
    original_host: &str,
    is_ip: bool,
    primary_ip: Option<&str>,
    srv: Option<SrvRecord>,
) -> IpInfo {
    let mut info = IpInfo {
        ip: primary_ip.map(str::to_string),
        srv_record: srv.clone(),
        ..Default::default()
    };

    let records = resolver::collect_dns_records(original_host, srv.as_ref()).await;

    let mut ips: Vec<String> = Vec::new();
    for record in &records {
        if (record.kind == "A" || record.kind == "AAAA") && !ips.contains(&record.data) {
            ips.push(record.data.clone());
        }
    }
    if is_ip && ips.is_empty() {
        if let Some(primary) = primary_ip {
            ips.push(primary.to_string());
        }
    }

    let mut asns = Vec::new();
    for ip in &ips {
        if let Ok(addr) = ip.parse::<IpAddr>() {
            if let Some(asn) = geoip::asn_of(addr) {
                if !asns.iter().any(|a: &geoip::AsnInfo| a.number == asn.number) {
                    asns.push(asn);
                }
            }
        }
    }

    if let Some(addr) = primary_ip.and_then(|ip| ip.parse::<IpAddr>().ok()) {
        info.location = geoip::location_of(addr);
    }

    if !records.is_empty() {
        info.dns_records = Some(records);
    }
    if !ips.is_empty() {
        info.ips = Some(ips);
    }
    if !asns.is_empty() {
        info.asn = Some(asns);
    }
    info
}
