//! Structured DNS client seam.
//!
//! `DnsClient` is the injected abstraction the orchestrator and health cache
//! query through: one authoritative lookup against a specific upstream, or a
//! system-default lookup used as a last-resort fallback.

use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use tokio::time::{sleep, timeout};

use crate::config::{QUERY_BACKOFF_BASE_MS, QUERY_TIMEOUT_SECS};
use crate::error::ProbeError;

#[async_trait]
pub trait DnsClient: Send + Sync {
    /// Single A/AAAA query against a specific upstream resolver.
    async fn query(&self, server: &str, domain: &str) -> Result<IpAddr, ProbeError>;

    /// Lookup through the system-default resolver.
    async fn lookup_system(&self, domain: &str) -> Result<Vec<IpAddr>, ProbeError>;
}

/// One resolver query outcome, before it is attributed to a location.
#[derive(Debug, Clone)]
pub struct DnsQueryResult {
    pub ip: Option<IpAddr>,
    pub time_ms: u64,
    pub success: bool,
    pub error: Option<String>,
}

/// Query `domain` against `server` with up to `max_retries` sequential tries.
///
/// Each try carries its own timeout; retries back off linearly. The failure
/// result carries the last error observed.
pub async fn query_with_retry(
    client: &dyn DnsClient,
    server: &str,
    domain: &str,
    max_retries: u32,
) -> DnsQueryResult {
    let mut last_error = String::from("no attempts made");

    for attempt in 1..=max_retries.max(1) {
        let start = Instant::now();
        match timeout(
            Duration::from_secs(QUERY_TIMEOUT_SECS),
            client.query(server, domain),
        )
        .await
        {
            Ok(Ok(ip)) => {
                return DnsQueryResult {
                    ip: Some(ip),
                    time_ms: start.elapsed().as_millis() as u64,
                    success: true,
                    error: None,
                };
            }
            Ok(Err(e)) => last_error = e.to_string(),
            Err(_) => last_error = format!("query against {} timed out", server),
        }

        if attempt < max_retries {
            sleep(Duration::from_millis(
                QUERY_BACKOFF_BASE_MS * attempt as u64,
            ))
            .await;
        }
    }

    DnsQueryResult {
        ip: None,
        time_ms: 0,
        success: false,
        error: Some(last_error),
    }
}

/// hickory-resolver backed client. Targeted queries build a one-shot UDP
/// resolver pointed at the requested upstream; system lookups go through a
/// resolver configured from the host's resolv.conf.
pub struct HickoryDnsClient {
    system: TokioAsyncResolver,
}

impl HickoryDnsClient {
    pub fn new() -> Result<Self, ProbeError> {
        let system = TokioAsyncResolver::tokio_from_system_conf()
            .map_err(|e| ProbeError::Internal(format!("system resolver unavailable: {}", e)))?;
        Ok(Self { system })
    }

    fn upstream_resolver(server: &str) -> Result<TokioAsyncResolver, ProbeError> {
        let ip: IpAddr = server
            .parse()
            .map_err(|_| ProbeError::ResolverQuery(format!("invalid resolver address: {}", server)))?;
        let socket_addr = SocketAddr::new(ip, 53);

        let mut opts = ResolverOpts::default();
        opts.timeout = Duration::from_secs(QUERY_TIMEOUT_SECS);
        opts.attempts = 1;

        let config = ResolverConfig::from_parts(
            None,
            vec![],
            vec![NameServerConfig::new(socket_addr, Protocol::Udp)],
        );

        Ok(TokioAsyncResolver::tokio(config, opts))
    }
}

#[async_trait]
impl DnsClient for HickoryDnsClient {
    async fn query(&self, server: &str, domain: &str) -> Result<IpAddr, ProbeError> {
        let resolver = Self::upstream_resolver(server)?;
        let lookup = resolver
            .lookup_ip(domain)
            .await
            .map_err(|e| ProbeError::ResolverQuery(format!("{} via {}: {}", domain, server, e)))?;
        lookup.iter().next().ok_or_else(|| {
            ProbeError::ResolverQuery(format!("{} via {}: no address records", domain, server))
        })
    }

    async fn lookup_system(&self, domain: &str) -> Result<Vec<IpAddr>, ProbeError> {
        let lookup = self
            .system
            .lookup_ip(domain)
            .await
            .map_err(|e| ProbeError::DnsResolution(e.to_string()))?;
        let ips: Vec<IpAddr> = lookup.iter().collect();
        if ips.is_empty() {
            return Err(ProbeError::DnsResolution(format!(
                "no address records for {}",
                domain
            )));
        }
        Ok(ips)
    }
}
