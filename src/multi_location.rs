//! Multi-location resolution orchestrator.
//!
//! Health-gates the whole roster, fans out queries across the healthy
//! resolvers (domestic and international batches run concurrently), and
//! aggregates the outcomes into IP-consistency statistics. The fan-out is
//! bounded by a global deadline; hitting it degrades to partial results
//! rather than failing the run.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::Serialize;
use tokio::time::sleep;
use tracing::warn;

use crate::config::{FANOUT_DEADLINE_SECS, LOW_SUCCESS_RATE_THRESHOLD, QUERY_MAX_RETRIES};
use crate::dns::{query_with_retry, DnsClient};
use crate::health::{check_resolver_health, HealthStore};
use crate::roster::{distinct_regions, is_domestic, ResolverDescriptor, VANTAGE_ROSTER};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IpConsistency {
    Consistent,
    Inconsistent,
    Mixed,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PingOutcome {
    pub location: String,
    pub region: String,
    pub ip: String,
    pub time: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeographicDistribution {
    pub regions: Vec<String>,
    pub ip_distribution: BTreeMap<String, Vec<String>>,
    pub coverage: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HealthStats {
    pub total_servers: usize,
    pub healthy_servers: usize,
    pub successful_queries: usize,
    pub average_response_time: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MultiLocationResult {
    pub locations: Vec<String>,
    pub regions: Vec<String>,
    pub ping_results: Vec<PingOutcome>,
    #[serde(rename = "uniqueIPs")]
    pub unique_ips: Vec<String>,
    pub ip_consistency: IpConsistency,
    pub analysis: String,
    pub geographic_distribution: GeographicDistribution,
    pub health_stats: HealthStats,
}

pub fn classify_consistency(unique_ip_count: usize) -> IpConsistency {
    match unique_ip_count {
        1 => IpConsistency::Consistent,
        n if n >= 3 => IpConsistency::Inconsistent,
        // 2 unique IPs, or none at all (all queries failed)
        _ => IpConsistency::Mixed,
    }
}

pub fn coverage_label(coverage_pct: u32) -> &'static str {
    if coverage_pct >= 80 {
        "global coverage"
    } else if coverage_pct >= 60 {
        "broad coverage"
    } else if coverage_pct >= 40 {
        "moderate coverage"
    } else {
        "limited coverage"
    }
}

pub async fn resolve_from_all_locations(
    client: Arc<dyn DnsClient>,
    store: Arc<dyn HealthStore>,
    domain: &str,
) -> MultiLocationResult {
    // Health gating happens-before any query fan-out: every resolver's
    // health is computed concurrently and awaited in full.
    let checks = join_all(VANTAGE_ROSTER.iter().map(|loc| {
        let client = client.clone();
        let store = store.clone();
        async move {
            let health = check_resolver_health(client.as_ref(), store.as_ref(), loc.address).await;
            (loc, health)
        }
    }))
    .await;

    let mut healthy_domestic: Vec<&'static ResolverDescriptor> = Vec::new();
    let mut healthy_international: Vec<&'static ResolverDescriptor> = Vec::new();
    let mut unhealthy = Vec::new();
    for (loc, health) in checks {
        if health.healthy {
            if is_domestic(loc.region) {
                healthy_domestic.push(loc);
            } else {
                healthy_international.push(loc);
            }
        } else {
            unhealthy.push((loc, health));
        }
    }

    let healthy_servers = healthy_domestic.len() + healthy_international.len();
    if healthy_servers * 2 < VANTAGE_ROSTER.len() {
        warn!(
            "only {} of {} resolvers are healthy",
            healthy_servers,
            VANTAGE_ROSTER.len()
        );
    }

    let successes_domestic: Arc<Mutex<Vec<PingOutcome>>> = Arc::new(Mutex::new(Vec::new()));
    let successes_international: Arc<Mutex<Vec<PingOutcome>>> = Arc::new(Mutex::new(Vec::new()));
    let failures: Arc<Mutex<Vec<PingOutcome>>> = Arc::new(Mutex::new(Vec::new()));

    let mut handles = Vec::with_capacity(healthy_servers);
    for loc in healthy_domestic {
        handles.push(tokio::spawn(query_location(
            client.clone(),
            loc,
            domain.to_string(),
            successes_domestic.clone(),
            failures.clone(),
        )));
    }
    for loc in healthy_international {
        handles.push(tokio::spawn(query_location(
            client.clone(),
            loc,
            domain.to_string(),
            successes_international.clone(),
            failures.clone(),
        )));
    }

    // Global deadline over the whole fan-out. Hitting it is not an error;
    // whatever outcomes have been recorded so far are used as-is.
    tokio::select! {
        _ = join_all(handles) => {}
        _ = sleep(Duration::from_secs(FANOUT_DEADLINE_SECS)) => {
            warn!(
                "multi-location fan-out exceeded the {}s deadline, continuing with partial results",
                FANOUT_DEADLINE_SECS
            );
        }
    }

    let mut failed: Vec<PingOutcome> = failures.lock().expect("failure bucket poisoned").clone();
    for (loc, health) in unhealthy {
        failed.push(PingOutcome {
            location: loc.label.to_string(),
            region: loc.region.to_string(),
            ip: String::new(),
            time: 0,
            success: false,
            error: Some(format!(
                "resolver unhealthy: {}",
                health
                    .error
                    .unwrap_or_else(|| "unknown health check failure".to_string())
            )),
        });
    }

    let succ_domestic = successes_domestic
        .lock()
        .expect("success bucket poisoned")
        .clone();
    let succ_international = successes_international
        .lock()
        .expect("success bucket poisoned")
        .clone();

    // Fixed priority ordering: successful-domestic, successful-international,
    // failed-domestic, failed-international. Downstream weighting relies on it.
    let (failed_domestic, failed_international): (Vec<_>, Vec<_>) =
        failed.into_iter().partition(|o| is_domestic(&o.region));
    let mut ping_results =
        Vec::with_capacity(succ_domestic.len() + succ_international.len() + failed_domestic.len() + failed_international.len());
    ping_results.extend(succ_domestic);
    ping_results.extend(succ_international);
    ping_results.extend(failed_domestic);
    ping_results.extend(failed_international);

    summarize(
        ping_results,
        VANTAGE_ROSTER.len(),
        healthy_servers,
        VANTAGE_ROSTER.iter().map(|l| l.label.to_string()).collect(),
        distinct_regions().iter().map(|r| r.to_string()).collect(),
    )
}

async fn query_location(
    client: Arc<dyn DnsClient>,
    loc: &'static ResolverDescriptor,
    domain: String,
    successes: Arc<Mutex<Vec<PingOutcome>>>,
    failures: Arc<Mutex<Vec<PingOutcome>>>,
) {
    let result = query_with_retry(client.as_ref(), loc.address, &domain, QUERY_MAX_RETRIES).await;
    if result.success {
        if let Some(ip) = result.ip {
            successes.lock().expect("success bucket poisoned").push(PingOutcome {
                location: loc.label.to_string(),
                region: loc.region.to_string(),
                ip: ip.to_string(),
                time: result.time_ms,
                success: true,
                error: None,
            });
            return;
        }
    }

    // Last-resort fallback through the system resolver. The outcome is
    // recorded under this resolver's location bucket.
    let remote_error = result.error.unwrap_or_else(|| "unknown error".to_string());
    let start = Instant::now();
    match client.lookup_system(&domain).await {
        Ok(ips) if !ips.is_empty() => {
            successes.lock().expect("success bucket poisoned").push(PingOutcome {
                location: loc.label.to_string(),
                region: loc.region.to_string(),
                ip: ips[0].to_string(),
                time: start.elapsed().as_millis() as u64,
                success: true,
                error: None,
            });
        }
        Ok(_) => {
            failures.lock().expect("failure bucket poisoned").push(PingOutcome {
                location: loc.label.to_string(),
                region: loc.region.to_string(),
                ip: String::new(),
                time: 0,
                success: false,
                error: Some(format!(
                    "remote query failed: {}, local fallback returned no addresses",
                    remote_error
                )),
            });
        }
        Err(fallback_error) => {
            failures.lock().expect("failure bucket poisoned").push(PingOutcome {
                location: loc.label.to_string(),
                region: loc.region.to_string(),
                ip: String::new(),
                time: 0,
                success: false,
                error: Some(format!(
                    "remote query failed: {}, local fallback failed: {}",
                    remote_error, fallback_error
                )),
            });
        }
    }
}

/// Pure aggregation over ordered ping outcomes.
pub fn summarize(
    ping_results: Vec<PingOutcome>,
    total_servers: usize,
    healthy_servers: usize,
    locations: Vec<String>,
    regions: Vec<String>,
) -> MultiLocationResult {
    let successful: Vec<&PingOutcome> = ping_results.iter().filter(|o| o.success).collect();
    let successful_queries = successful.len();

    let average_response_time = if successful.is_empty() {
        0
    } else {
        let total: u64 = successful.iter().map(|o| o.time).sum();
        ((total as f64) / (successful.len() as f64)).round() as u64
    };

    // Unique IPs in first-seen order.
    let mut unique_ips: Vec<String> = Vec::new();
    for outcome in &successful {
        if !unique_ips.contains(&outcome.ip) {
            unique_ips.push(outcome.ip.clone());
        }
    }

    let mut ip_distribution: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for outcome in &successful {
        ip_distribution
            .entry(outcome.ip.clone())
            .or_default()
            .push(outcome.region.clone());
    }

    let mut covered_regions: Vec<&String> = Vec::new();
    for outcome in &successful {
        if !covered_regions.contains(&&outcome.region) {
            covered_regions.push(&outcome.region);
        }
    }
    let coverage_pct = if regions.is_empty() {
        0
    } else {
        ((covered_regions.len() as f64 / regions.len() as f64) * 100.0).round() as u32
    };

    let success_rate = if total_servers == 0 {
        0.0
    } else {
        successful_queries as f64 / total_servers as f64
    };
    let success_rate_pct = (success_rate * 100.0).round() as u32;

    let ip_consistency = classify_consistency(unique_ips.len());
    let mut analysis = match unique_ips.len() {
        1 => format!(
            "All locations resolved the same IP address ({}), {}% geographic coverage, {}% query success rate, likely a direct connection",
            unique_ips[0], coverage_pct, success_rate_pct
        ),
        n if n >= 5 => format!(
            "Detected {} distinct IP addresses, {}% geographic coverage, {}% query success rate, strongly indicates a global CDN",
            n, coverage_pct, success_rate_pct
        ),
        n if n >= 3 => format!(
            "Detected {} distinct IP addresses, {}% geographic coverage, {}% query success rate, very likely served by a CDN",
            n, coverage_pct, success_rate_pct
        ),
        n => format!(
            "Detected {} distinct IP addresses, {}% geographic coverage, {}% query success rate, possibly a CDN or load balancing",
            n, coverage_pct, success_rate_pct
        ),
    };
    if success_rate < LOW_SUCCESS_RATE_THRESHOLD {
        analysis.push_str(&format!(
            ". Note: query success rate is low ({}%), which may reduce detection accuracy",
            success_rate_pct
        ));
    }

    MultiLocationResult {
        locations,
        regions: regions.clone(),
        ping_results,
        unique_ips,
        ip_consistency,
        analysis,
        geographic_distribution: GeographicDistribution {
            regions,
            ip_distribution,
            coverage: coverage_label(coverage_pct).to_string(),
        },
        health_stats: HealthStats {
            total_servers,
            healthy_servers,
            successful_queries,
            average_response_time,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(location: &str, region: &str, ip: &str, time: u64, success: bool) -> PingOutcome {
        PingOutcome {
            location: location.to_string(),
            region: region.to_string(),
            ip: ip.to_string(),
            time,
            success,
            error: if success { None } else { Some("refused".to_string()) },
        }
    }

    // --- consistency classification ---

    #[test]
    fn test_single_ip_is_consistent() {
        assert_eq!(classify_consistency(1), IpConsistency::Consistent);
    }

    #[test]
    fn test_three_or_more_ips_are_inconsistent() {
        assert_eq!(classify_consistency(3), IpConsistency::Inconsistent);
        assert_eq!(classify_consistency(6), IpConsistency::Inconsistent);
    }

    #[test]
    fn test_two_ips_are_mixed() {
        assert_eq!(classify_consistency(2), IpConsistency::Mixed);
    }

    #[test]
    fn test_zero_ips_are_mixed() {
        assert_eq!(classify_consistency(0), IpConsistency::Mixed);
    }

    // --- coverage ---

    #[test]
    fn test_coverage_labels() {
        assert_eq!(coverage_label(100), "global coverage");
        assert_eq!(coverage_label(80), "global coverage");
        assert_eq!(coverage_label(79), "broad coverage");
        assert_eq!(coverage_label(60), "broad coverage");
        assert_eq!(coverage_label(59), "moderate coverage");
        assert_eq!(coverage_label(40), "moderate coverage");
        assert_eq!(coverage_label(39), "limited coverage");
        assert_eq!(coverage_label(0), "limited coverage");
    }

    #[test]
    fn test_coverage_is_monotonic_in_covered_regions() {
        // The percentage surfaces in the analysis sentence; extract it and
        // check it grows with the number of regions that saw a success and
        // stays within [0, 100].
        fn coverage_pct_of(analysis: &str) -> u32 {
            let head = analysis
                .split("% geographic coverage")
                .next()
                .expect("analysis mentions coverage");
            head.rsplit(' ')
                .next()
                .and_then(|s| s.parse().ok())
                .expect("coverage percentage parses")
        }

        let regions: Vec<String> = (0..10).map(|i| format!("region-{}", i)).collect();
        let mut last_pct = 0;
        for covered in 0..=10usize {
            let outcomes: Vec<PingOutcome> = (0..covered)
                .map(|i| outcome(&format!("loc-{}", i), &format!("region-{}", i), "1.2.3.4", 10, true))
                .collect();
            let result = summarize(outcomes, 10, 10, vec![], regions.clone());
            let pct = coverage_pct_of(&result.analysis);
            assert!(pct <= 100);
            assert!(pct >= last_pct, "coverage dropped from {} to {}", last_pct, pct);
            last_pct = pct;
        }
        assert_eq!(last_pct, 100);
    }

    // --- aggregation ---

    #[test]
    fn test_summarize_unique_ips_first_seen_order() {
        let outcomes = vec![
            outcome("Beijing", "North China", "1.1.1.1", 10, true),
            outcome("Shanghai", "East China", "2.2.2.2", 20, true),
            outcome("Tokyo", "Japan", "1.1.1.1", 30, true),
        ];
        let result = summarize(outcomes, 3, 3, vec![], vec!["North China".into(), "East China".into(), "Japan".into()]);
        assert_eq!(result.unique_ips, vec!["1.1.1.1", "2.2.2.2"]);
        assert_eq!(result.ip_consistency, IpConsistency::Mixed);
        assert_eq!(result.health_stats.successful_queries, 3);
        assert_eq!(result.health_stats.average_response_time, 20);
    }

    #[test]
    fn test_summarize_all_failed_yields_mixed_and_empty_ips() {
        let outcomes = vec![
            outcome("Beijing", "North China", "", 0, false),
            outcome("Tokyo", "Japan", "", 0, false),
        ];
        let result = summarize(outcomes, 2, 0, vec![], vec!["North China".into(), "Japan".into()]);
        assert!(result.unique_ips.is_empty());
        assert_eq!(result.ip_consistency, IpConsistency::Mixed);
        assert_eq!(result.health_stats.successful_queries, 0);
        assert_eq!(result.health_stats.average_response_time, 0);
        assert_eq!(result.geographic_distribution.coverage, "limited coverage");
    }

    #[test]
    fn test_summarize_low_success_rate_appends_caveat() {
        let outcomes = vec![
            outcome("Beijing", "North China", "1.1.1.1", 10, true),
            outcome("Tokyo", "Japan", "", 0, false),
            outcome("Paris", "France", "", 0, false),
        ];
        let result = summarize(
            outcomes,
            3,
            3,
            vec![],
            vec!["North China".into(), "Japan".into(), "France".into()],
        );
        assert!(result.analysis.contains("success rate is low"));
    }

    #[test]
    fn test_summarize_high_success_rate_omits_caveat() {
        let outcomes = vec![
            outcome("Beijing", "North China", "1.1.1.1", 10, true),
            outcome("Tokyo", "Japan", "1.1.1.1", 12, true),
        ];
        let result = summarize(outcomes, 2, 2, vec![], vec!["North China".into(), "Japan".into()]);
        assert!(!result.analysis.contains("success rate is low"));
        assert_eq!(result.ip_consistency, IpConsistency::Consistent);
        assert!(result.analysis.contains("direct connection"));
    }

    #[test]
    fn test_summarize_five_ips_notes_global_cdn() {
        let outcomes: Vec<PingOutcome> = (0..5)
            .map(|i| outcome(&format!("loc-{}", i), "Japan", &format!("10.0.0.{}", i), 10, true))
            .collect();
        let result = summarize(outcomes, 5, 5, vec![], vec!["Japan".into()]);
        assert_eq!(result.ip_consistency, IpConsistency::Inconsistent);
        assert!(result.analysis.contains("strongly indicates a global CDN"));
    }

    #[test]
    fn test_summarize_ip_distribution_groups_regions() {
        let outcomes = vec![
            outcome("Beijing", "North China", "1.1.1.1", 10, true),
            outcome("Shanghai", "East China", "1.1.1.1", 10, true),
            outcome("Tokyo", "Japan", "2.2.2.2", 10, true),
        ];
        let result = summarize(
            outcomes,
            3,
            3,
            vec![],
            vec!["North China".into(), "East China".into(), "Japan".into()],
        );
        assert_eq!(
            result.geographic_distribution.ip_distribution["1.1.1.1"],
            vec!["North China".to_string(), "East China".to_string()]
        );
        assert_eq!(
            result.geographic_distribution.ip_distribution["2.2.2.2"],
            vec!["Japan".to_string()]
        );
    }
}
