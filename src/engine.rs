//! Top-level domain test pipeline.
//!
//! Runs system DNS resolution, the multi-location fan-out, the timed HTTP
//! probe (HTTPS first, HTTP only on total failure), evidence fusion, and the
//! advisor. Per-step failures are recorded inside the result sections;
//! sections that succeeded before a failure are always returned.

use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use crate::advisor::{advise, OptimizationReport, PerformanceFacts};
use crate::classify::{build_cdn_report, CdnReport};
use crate::error::ProbeError;
use crate::multi_location::{resolve_from_all_locations, MultiLocationResult};
use crate::probe::{probe, HttpProbeResult};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DnsSection {
    #[serde(rename = "resolvedIPs")]
    pub resolved_ips: Vec<String>,
    pub resolution_time: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSection {
    pub total_time: u64,
    pub dns_time: u64,
    pub tcp_time: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl_time: Option<u64>,
    pub ttfb: u64,
    pub download_time: u64,
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSection {
    pub software: String,
    pub headers: std::collections::BTreeMap<String, String>,
    pub response_size: u64,
    pub response_time: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SslSection {
    pub issuer: String,
    pub valid_from: String,
    pub valid_to: String,
    pub subject_alt_name: String,
}

/// One full test run. Optional sections are `None` when the pipeline never
/// reached them; sections that were attempted and failed carry their own
/// `error` field instead.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResults {
    pub dns: DnsSection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multi_location_ping: Option<MultiLocationResult>,
    pub connection: ConnectionSection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cdn: Option<CdnReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl: Option<SslSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimization: Option<OptimizationReport>,
}

/// Normalize user input: trim, strip the scheme, drop any path suffix.
pub fn sanitize_domain(raw: &str) -> Result<String, ProbeError> {
    let trimmed = raw.trim();
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    let domain = without_scheme.split('/').next().unwrap_or("");
    if domain.is_empty() {
        return Err(ProbeError::InvalidInput(
            "domain parameter is required".to_string(),
        ));
    }
    Ok(domain.to_string())
}

pub async fn run_domain_test(state: &AppState, domain: &str) -> TestResults {
    let mut dns = DnsSection::default();
    let mut connection = ConnectionSection::default();

    // 1. System DNS resolution. Unresolvable domains end the test here; the
    // DNS section still renders with its error.
    let dns_start = Instant::now();
    match state.dns.lookup_system(domain).await {
        Ok(ips) => {
            dns.resolved_ips = ips.iter().map(|ip| ip.to_string()).collect();
            dns.resolution_time = dns_start.elapsed().as_millis() as u64;
        }
        Err(e) => {
            let message = e.to_string();
            warn!("domain test for {} aborted: {}", domain, message);
            dns.error = Some(message.clone());
            connection.error = Some(message);
            return TestResults {
                dns,
                multi_location_ping: None,
                connection,
                server: None,
                cdn: None,
                ssl: None,
                optimization: None,
            };
        }
    }

    // 2 + 3. The multi-location fan-out and the timed probe are independent
    // network operations; run them concurrently. The fan-out degrades
    // internally and is never fatal. The probe tries HTTPS first and retries
    // over plain HTTP only when the HTTPS attempt failed entirely (status
    // codes are results, not failures).
    let (multi_location, probed_scheme) = tokio::join!(
        resolve_from_all_locations(state.dns.clone(), state.health_store.clone(), domain),
        async {
            match probe(&format!("https://{}", domain)).await {
                Ok(result) => (Ok(result), true),
                Err(https_error) => match probe(&format!("http://{}", domain)).await {
                    Ok(result) => (Ok(result), false),
                    Err(http_error) => (
                        Err(format!("{}; fallback {}", https_error, http_error)),
                        false,
                    ),
                },
            }
        }
    );
    let multi_location_ping = Some(multi_location);
    let (probe_result, is_https) = probed_scheme;

    let probed: HttpProbeResult = match probe_result {
        Ok(result) => result,
        Err(message) => {
            warn!("connection probe for {} failed: {}", domain, message);
            connection.dns_time = dns.resolution_time;
            connection.error = Some(message);
            return TestResults {
                dns,
                multi_location_ping,
                connection,
                server: None,
                cdn: None,
                ssl: None,
                optimization: None,
            };
        }
    };

    connection.total_time = probed.total_time_ms;
    connection.dns_time = dns.resolution_time;
    connection.tcp_time = probed.tcp_time_ms;
    connection.ssl_time = probed.ssl_time_ms;
    connection.ttfb = probed.ttfb_ms;
    connection.download_time = probed.download_time_ms;
    connection.status_code = probed.status_code;

    let server = ServerSection {
        software: probed
            .headers
            .get("server")
            .cloned()
            .unwrap_or_else(|| "Unknown".to_string()),
        headers: probed.headers.clone(),
        response_size: probed.content_length,
        response_time: probed.total_time_ms,
    };

    // 4. Evidence fusion.
    let cdn = build_cdn_report(multi_location_ping.as_ref(), &probed.headers);

    // 5. Certificate details only count when the HTTPS attempt is the one
    // that answered.
    let ssl = if is_https {
        probed.certificate.as_ref().map(|cert| SslSection {
            issuer: cert.issuer.clone(),
            valid_from: cert.valid_from.clone(),
            valid_to: cert.valid_to.clone(),
            subject_alt_name: cert.subject_alt_name.clone(),
        })
    } else {
        None
    };

    // 6. Graded guidance.
    let optimization = advise(
        &cdn,
        &PerformanceFacts {
            response_time_ms: connection.total_time,
            dns_time_ms: dns.resolution_time,
            response_size: server.response_size,
            status_code: connection.status_code,
        },
        ssl.is_some(),
    );

    info!(
        "domain test for {} finished: {:?}/{:?}, status {}",
        domain, cdn.connection_type, cdn.confidence, connection.status_code
    );

    TestResults {
        dns,
        multi_location_ping,
        connection,
        server: Some(server),
        cdn: Some(cdn),
        ssl,
        optimization: Some(optimization),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_https_scheme() {
        assert_eq!(sanitize_domain("https://example.com").unwrap(), "example.com");
    }

    #[test]
    fn test_sanitize_strips_http_scheme_and_path() {
        assert_eq!(
            sanitize_domain("http://example.com/some/path?q=1").unwrap(),
            "example.com"
        );
    }

    #[test]
    fn test_sanitize_trims_whitespace() {
        assert_eq!(sanitize_domain("  example.com  ").unwrap(), "example.com");
    }

    #[test]
    fn test_sanitize_passes_bare_domain_through() {
        assert_eq!(sanitize_domain("example.com").unwrap(), "example.com");
    }

    #[test]
    fn test_sanitize_rejects_empty_input() {
        assert!(sanitize_domain("").is_err());
        assert!(sanitize_domain("   ").is_err());
        assert!(sanitize_domain("https://").is_err());
    }

    #[test]
    fn test_test_results_serializes_with_camel_case_contract() {
        let results = TestResults {
            dns: DnsSection {
                resolved_ips: vec!["93.184.216.34".to_string()],
                resolution_time: 12,
                error: None,
            },
            multi_location_ping: None,
            connection: ConnectionSection {
                total_time: 120,
                dns_time: 12,
                tcp_time: 30,
                ssl_time: Some(40),
                ttfb: 80,
                download_time: 10,
                status_code: 200,
                error: None,
            },
            server: None,
            cdn: None,
            ssl: None,
            optimization: None,
        };
        let json = serde_json::to_value(&results).expect("serializes");
        assert_eq!(json["dns"]["resolvedIPs"][0], "93.184.216.34");
        assert_eq!(json["connection"]["totalTime"], 120);
        assert_eq!(json["connection"]["statusCode"], 200);
        assert_eq!(json["connection"]["sslTime"], 40);
        assert!(json.get("server").is_none());
    }
}
