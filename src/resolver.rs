//! DNS resolution for probed hostnames: SRV service lookup, parallel A/AAAA
//! resolution, and recursive record collection for response enrichment.

use std::collections::HashSet;
use std::future::Future;
use std::net::IpAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::proto::rr::{RData, RecordType};
use trust_dns_resolver::TokioAsyncResolver;

/// Cap on any single upstream query, so a hanging resolver cannot stall an
/// API request.
pub const DNS_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SrvRecord {
    pub target: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    pub hostname: String,
    pub kind: String,
    pub data: String,
}

impl DnsRecord {
    fn new(hostname: &str, kind: &str, data: String) -> Self {
        Self {
            hostname: hostname.to_string(),
            kind: kind.to_string(),
            data,
        }
    }
}

fn resolver() -> TokioAsyncResolver {
    TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
}

/// Runs a DNS query with `DNS_TIMEOUT`, collapsing both failure and timeout
/// into the fallback value.
async fn bounded<T, E, F>(fut: F, fallback: T) -> T
where
    F: Future<Output = Result<T, E>>,
{
    match timeout(DNS_TIMEOUT, fut).await {
        Ok(Ok(value)) => value,
        _ => fallback,
    }
}

/// Looks up `_minecraft._tcp.<host>` and returns the first SRV record.
/// Priority and weight are ignored.
pub async fn resolve_srv(host: &str) -> Option<SrvRecord> {
    let resolver = resolver();
    let name = format!("_minecraft._tcp.{}", host);

    let lookup = match timeout(DNS_TIMEOUT, resolver.srv_lookup(name)).await {
        Ok(Ok(lookup)) => lookup,
        _ => return None,
    };

    lookup.iter().next().map(|srv| SrvRecord {
        target: srv.target().to_utf8().trim_end_matches('.').to_string(),
        port: srv.port(),
    })
}

/// Resolves a hostname to a single IP, preferring A over AAAA. The two
/// queries run in parallel. IP literals pass through unchanged.
pub async fn resolve_ip(host: &str) -> Option<String> {
    if host.parse::<IpAddr>().is_ok() {
        return Some(host.to_string());
    }

    let resolver = resolver();
    let (v4, v6) = tokio::join!(
        bounded(
            async {
                resolver
                    .ipv4_lookup(host.to_string())
                    .await
                    .map(|lookup| lookup.iter().next().map(|a| a.to_string()))
            },
            None,
        ),
        bounded(
            async {
                resolver
                    .ipv6_lookup(host.to_string())
                    .await
                    .map(|lookup| lookup.iter().next().map(|a| a.to_string()))
            },
            None,
        ),
    );

    v4.or(v6)
}

/// Collects the DNS chain used to reach `host`: an SRV line first when one
/// was used, then CNAME/A/AAAA records gathered recursively. A visited set
/// keeps CNAME cycles from looping.
pub async fn collect_dns_records(host: &str, srv: Option<&SrvRecord>) -> Vec<DnsRecord> {
    let resolver = resolver();
    let mut records = Vec::new();
    let mut visited = HashSet::new();

    if let Some(srv) = srv {
        records.push(DnsRecord::new(
            &format!("_minecraft._tcp.{}", host),
            "SRV",
            format!("1 1 {} {}", srv.port, srv.target),
        ));
        collect_host(&resolver, &srv.target, &mut visited, &mut records).await;
    }

    collect_host(&resolver, host, &mut visited, &mut records).await;
    records
}

/// Walks one hostname: follow the CNAME chain (recording each alias, without
/// also querying addresses on aliased names), then append every A and AAAA
/// record of the terminal name.
async fn collect_host(
    resolver: &TokioAsyncResolver,
    start: &str,
    visited: &mut HashSet<String>,
    records: &mut Vec<DnsRecord>,
) {
    let mut current = start.to_string();
    loop {
        if !visited.insert(current.clone()) {
            return;
        }
        if current.parse::<IpAddr>().is_ok() {
            return;
        }

        if let Some(target) = query_cname(resolver, &current).await {
            records.push(DnsRecord::new(&current, "CNAME", target.clone()));
            current = target;
            continue;
        }

        let (v4, v6) = tokio::join!(
            bounded(
                async {
                    resolver
                        .ipv4_lookup(current.clone())
                        .await
                        .map(|lookup| lookup.iter().map(|a| a.to_string()).collect::<Vec<_>>())
                },
                Vec::new(),
            ),
            bounded(
                async {
                    resolver
                        .ipv6_lookup(current.clone())
                        .await
                        .map(|lookup| lookup.iter().map(|a| a.to_string()).collect::<Vec<_>>())
                },
                Vec::new(),
            ),
        );

        for ip in v4 {
            records.push(DnsRecord::new(&current, "A", ip));
        }
        for ip in v6 {
            records.push(DnsRecord::new(&current, "AAAA", ip));
        }
        return;
    }
}

async fn query_cname(resolver: &TokioAsyncResolver, host: &str) -> Option<String> {
    let lookup = match timeout(DNS_TIMEOUT, resolver.lookup(host, RecordType::CNAME)).await {
        Ok(Ok(lookup)) => lookup,
        _ => return None,
    };

    lookup.iter().find_map(cname_target)
}

fn cname_target(rdata: &RData) -> Option<String> {
    match rdata {
        RData::CNAME(name) => Some(name.to_utf8().trim_end_matches('.').to_string()),
        _ => None,
    }
}

/// Cheap pre-filter the orchestrators apply before any DNS traffic: obvious
/// garbage is rejected without a query.
pub fn looks_resolvable(host: &str) -> bool {
    if host.len() < 4 {
        return false;
    }
    if host.len() < 10 && !host.contains('.') {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_hostnames_rejected() {
        assert!(!looks_resolvable(""));
        assert!(!looks_resolvable("abc"));
        assert!(!looks_resolvable("localhost"));
        assert!(!looks_resolvable("a.b"));
    }

    #[test]
    fn plausible_hostnames_accepted() {
        assert!(looks_resolvable("mc.example.com"));
        assert!(looks_resolvable("a.bc"));
        assert!(looks_resolvable("tenchars10"));
    }

    #[test]
    fn cname_target_trims_trailing_dot() {
        use trust_dns_resolver::proto::rr::rdata::CNAME;
        use trust_dns_resolver::proto::rr::Name;

        let name: Name = "mc01.example.net.".parse().unwrap();
        assert_eq!(
            cname_target(&RData::CNAME(CNAME(name))).as_deref(),
            Some("mc01.example.net")
        );
    }

    #[test]
    fn srv_record_serializes_target_and_port() {
        let srv = SrvRecord {
            target: "mc01.example.net".to_string(),
            port: 25580,
        };
        let json = serde_json::to_value(&srv).unwrap();
        assert_eq!(json["target"], "mc01.example.net");
        assert_eq!(json["port"], 25580);
    }
}
