//! Evidence fusion: merges multi-location DNS evidence with response-header
//! evidence into a connection-type verdict.
//!
//! The decision procedure is priority-ordered and deliberately not
//! simplified; the relative order of the rules changes the outcome for
//! ambiguous inputs. `build_cdn_report` is a pure function of its inputs.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::multi_location::{IpConsistency, MultiLocationResult};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    Direct,
    Cdn,
    Proxy,
    Mixed,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MultiLocationAnalysis {
    #[serde(rename = "isCDNByIP")]
    pub is_cdn_by_ip: bool,
    pub confidence: Confidence,
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdvancedMetrics {
    pub cdn_score: u32,
    pub detection_methods: Vec<String>,
    pub ip_analysis_score: u32,
    pub header_analysis_score: u32,
    pub server_analysis_score: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CdnReport {
    #[serde(rename = "isThroughCDN")]
    pub is_through_cdn: bool,
    pub has_proxy_headers: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    pub headers: BTreeMap<String, Option<String>>,
    pub proxy_headers: BTreeMap<String, Option<String>>,
    pub connection_type: ConnectionType,
    pub confidence: Confidence,
    pub analysis: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multi_location_analysis: Option<MultiLocationAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advanced_metrics: Option<AdvancedMetrics>,
}

/// Vendor-specific headers whose presence alone marks CDN involvement.
pub const CDN_HEADER_NAMES: &[&str] = &[
    "cf-connecting-ip",
    "cf-ray",
    "cf-visitor",
    "x-azure-ref",
    "x-amz-cf-id",
    "x-edge-location",
    "ali-cdn-real-ip",
    "x-cdn-request-id",
    "x-cdn-log-id",
    "x-cdn-src-ip",
];

/// Headers typically injected by proxies and load balancers.
pub const PROXY_HEADER_NAMES: &[&str] = &[
    "x-forwarded-for",
    "x-real-ip",
    "via",
    "x-forwarded-proto",
];

/// Priority-ordered provider signatures keyed by distinctive header presence.
const PROVIDER_SIGNATURES: &[(&str, &[&str])] = &[
    ("Cloudflare", &["cf-ray", "cf-connecting-ip", "cf-visitor"]),
    ("Azure CDN", &["x-azure-ref", "x-azure-request-id"]),
    ("Amazon CloudFront", &["x-amz-cf-id", "x-amz-cf-pop"]),
    ("Google Cloud CDN", &["x-edge-location", "x-google-cache-control"]),
    ("Alibaba Cloud CDN", &["ali-cdn-real-ip", "x-cdn-request-id", "x-oss-request-id"]),
    ("Tencent Cloud CDN", &["x-cdn-log-id", "x-cdn-src-ip", "x-tencent-request-id"]),
    ("Fastly", &["x-fastly-request-id"]),
    ("Akamai", &["x-akamai-request-id", "x-akamai-cache-status"]),
    ("Cloudinary", &["x-cld-cache", "x-cld-rtt"]),
    ("KeyCDN", &["x-keycdn-cache", "x-keycdn-pop"]),
    ("StackPath", &["x-sp-cache", "x-sp-edge"]),
    ("BunnyCDN", &["x-bcdn-cache", "x-bcdn-pop"]),
    ("Imperva", &["x-iinfo", "x-cdn"]),
    ("Sucuri", &["x-sucuri-cache", "x-sucuri-id"]),
];

const VIA_SIGNATURES: &[(&str, &str)] = &[
    ("cloudflare", "Cloudflare"),
    ("fastly", "Fastly"),
    ("akamai", "Akamai"),
    ("azure", "Azure CDN"),
    ("cloudfront", "Amazon CloudFront"),
    ("google", "Google Cloud CDN"),
];

const SERVER_SIGNATURES: &[(&str, &str)] = &[
    ("cloudflare", "Cloudflare"),
    ("netlify", "Netlify"),
    ("vercel", "Vercel"),
    ("fly.io", "Fly.io"),
    ("heroku", "Heroku"),
];

const XCACHE_SIGNATURES: &[(&str, &str)] = &[
    ("cloudflare", "Cloudflare"),
    ("fastly", "Fastly"),
    ("akamai", "Akamai"),
    ("cloudfront", "Amazon CloudFront"),
];

const METHOD_IP: &str = "multi-location IP analysis";
const METHOD_HEADER: &str = "HTTP header analysis";
const METHOD_PROXY: &str = "proxy header analysis";
const METHOD_SERVER: &str = "server signature analysis";

/// Resolve a provider name from response headers. First signature match
/// wins; substring scans of via/server/x-cache are the fallback.
pub fn detect_provider(headers: &BTreeMap<String, String>) -> Option<String> {
    for (provider, names) in PROVIDER_SIGNATURES {
        if names.iter().any(|n| headers.contains_key(*n)) {
            return Some((*provider).to_string());
        }
    }

    if let Some(via) = headers.get("via") {
        let via = via.to_lowercase();
        for (needle, provider) in VIA_SIGNATURES {
            if via.contains(needle) {
                return Some((*provider).to_string());
            }
        }
    }
    if let Some(server) = headers.get("server") {
        let server = server.to_lowercase();
        for (needle, provider) in SERVER_SIGNATURES {
            if server.contains(needle) {
                return Some((*provider).to_string());
            }
        }
    }
    if let Some(cache) = headers.get("x-cache") {
        let cache = cache.to_lowercase();
        for (needle, provider) in XCACHE_SIGNATURES {
            if cache.contains(needle) {
                return Some((*provider).to_string());
            }
        }
    }

    None
}

/// Names of the proxy mechanisms visible in the headers.
pub fn detect_proxy_types(headers: &BTreeMap<String, String>) -> Vec<String> {
    const KNOWN: &[(&str, &str)] = &[
        ("x-forwarded-for", "X-Forwarded-For"),
        ("x-real-ip", "X-Real-IP"),
        ("x-forwarded-proto", "X-Forwarded-Proto"),
        ("x-forwarded-host", "X-Forwarded-Host"),
        ("x-forwarded-port", "X-Forwarded-Port"),
        ("x-forwarded-server", "X-Forwarded-Server"),
        ("via", "Via"),
        ("forwarded", "Forwarded"),
        ("x-proxy-user", "X-Proxy-User"),
        ("proxy-connection", "Proxy-Connection"),
    ];
    KNOWN
        .iter()
        .filter(|(name, _)| headers.contains_key(*name))
        .map(|(_, label)| (*label).to_string())
        .collect()
}

fn server_signature_score(headers: &BTreeMap<String, String>) -> (u32, Vec<String>) {
    let server = headers.get("server").map(|s| s.to_lowercase()).unwrap_or_default();
    let x_powered_by = headers
        .get("x-powered-by")
        .map(|s| s.to_lowercase())
        .unwrap_or_default();
    let x_cache = headers.get("x-cache").map(|s| s.to_lowercase()).unwrap_or_default();
    let via = headers.get("via").map(|s| s.to_lowercase()).unwrap_or_default();

    let mut score = 0;
    let mut indicators = Vec::new();

    for (needle, label, points) in [
        ("cloudflare", "Cloudflare", 40u32),
        ("netlify", "Netlify", 35),
        ("vercel", "Vercel", 35),
        ("fly.io", "Fly.io", 30),
        ("heroku", "Heroku", 25),
    ] {
        if server.contains(needle) {
            score += points;
            indicators.push(label.to_string());
        }
    }

    for (needle, label) in [("netlify", "Netlify"), ("vercel", "Vercel")] {
        if x_powered_by.contains(needle) {
            score += 30;
            indicators.push(label.to_string());
        }
    }

    if XCACHE_SIGNATURES.iter().any(|(needle, _)| x_cache.contains(needle)) {
        score += 25;
        indicators.push("x-cache header".to_string());
    }

    if VIA_SIGNATURES.iter().any(|(needle, _)| via.contains(needle)) {
        score += 20;
        indicators.push("via header".to_string());
    }

    (score, indicators)
}

struct Verdict {
    connection_type: ConnectionType,
    confidence: Confidence,
}

/// Fuse multi-location and header evidence into the CDN report.
///
/// Deterministic: identical inputs always produce an identical report.
pub fn build_cdn_report(
    multi: Option<&MultiLocationResult>,
    headers: &BTreeMap<String, String>,
) -> CdnReport {
    let cdn_headers: BTreeMap<String, Option<String>> = CDN_HEADER_NAMES
        .iter()
        .map(|name| ((*name).to_string(), headers.get(*name).cloned()))
        .collect();
    let proxy_headers: BTreeMap<String, Option<String>> = PROXY_HEADER_NAMES
        .iter()
        .map(|name| ((*name).to_string(), headers.get(*name).cloned()))
        .collect();

    let is_through_cdn = cdn_headers.values().any(Option::is_some);
    let has_proxy_headers = proxy_headers.values().any(Option::is_some);
    let provider = if is_through_cdn {
        detect_provider(headers)
    } else {
        None
    };

    let mut details: Vec<String> = Vec::new();
    let mut metrics = AdvancedMetrics {
        cdn_score: 0,
        detection_methods: Vec::new(),
        ip_analysis_score: 0,
        header_analysis_score: 0,
        server_analysis_score: 0,
    };
    let mut multi_location_analysis = None;

    let verdict = decide(
        multi,
        headers,
        is_through_cdn,
        has_proxy_headers,
        provider.as_deref(),
        &mut details,
        &mut metrics,
        &mut multi_location_analysis,
    );

    CdnReport {
        is_through_cdn,
        has_proxy_headers,
        provider,
        headers: cdn_headers,
        proxy_headers,
        connection_type: verdict.connection_type,
        confidence: verdict.confidence,
        analysis: details,
        multi_location_analysis,
        // Advanced multi-metric scoring is only meaningful when the
        // multi-location fan-out contributed evidence.
        advanced_metrics: multi.map(|_| metrics),
    }
}

#[allow(clippy::too_many_arguments)]
fn decide(
    multi: Option<&MultiLocationResult>,
    headers: &BTreeMap<String, String>,
    is_through_cdn: bool,
    has_proxy_headers: bool,
    provider: Option<&str>,
    details: &mut Vec<String>,
    metrics: &mut AdvancedMetrics,
    multi_location_analysis: &mut Option<MultiLocationAnalysis>,
) -> Verdict {
    // 1. Multi-location IP evidence (weight 40). Strong IP evidence
    // short-circuits regardless of what the headers say.
    if let Some(ml) = multi {
        let unique = ml.unique_ips.len();
        details.push(ml.analysis.clone());
        metrics.detection_methods.push(METHOD_IP.to_string());

        match (ml.ip_consistency, unique) {
            (IpConsistency::Inconsistent, n) if n >= 5 => {
                metrics.ip_analysis_score = 100;
                metrics.cdn_score += 40;
            }
            (IpConsistency::Inconsistent, _) => {
                metrics.ip_analysis_score = 80;
                metrics.cdn_score += 32;
            }
            (IpConsistency::Mixed, n) if n >= 2 => {
                metrics.ip_analysis_score = 60;
                metrics.cdn_score += 24;
            }
            (IpConsistency::Consistent, _) => {
                metrics.ip_analysis_score = 20;
                metrics.cdn_score += 8;
            }
            _ => {}
        }

        let total = ml.health_stats.total_servers.max(1);
        let success_rate = ml.health_stats.successful_queries as f64 / total as f64;
        if success_rate >= 0.8 {
            metrics.ip_analysis_score = (metrics.ip_analysis_score + 10).min(100);
        } else if success_rate < 0.6 {
            metrics.ip_analysis_score = metrics.ip_analysis_score.saturating_sub(20);
        }
        let success_rate_pct = (success_rate * 100.0).round() as u32;

        if ml.ip_consistency == IpConsistency::Inconsistent && unique >= 3 {
            *multi_location_analysis = Some(MultiLocationAnalysis {
                is_cdn_by_ip: true,
                confidence: Confidence::High,
                reasoning: format!(
                    "Multi-location lookups returned {} distinct IP addresses with a {}% success rate, a typical CDN signature",
                    unique, success_rate_pct
                ),
            });

            if is_through_cdn {
                metrics.detection_methods.push(METHOD_HEADER.to_string());
                match provider {
                    Some(p) => details.push(format!(
                        "Multi-location IP evidence plus HTTP headers confirm a CDN ({})",
                        p
                    )),
                    None => details.push(
                        "Multi-location IP evidence plus HTTP headers confirm a CDN, provider unknown"
                            .to_string(),
                    ),
                }
            } else {
                details.push(
                    "Multi-location IP evidence strongly indicates a CDN, but HTTP headers show no CDN markers (possibly a hidden or specially configured CDN)"
                        .to_string(),
                );
            }
            return Verdict {
                connection_type: ConnectionType::Cdn,
                confidence: Confidence::High,
            };
        }

        if ml.ip_consistency == IpConsistency::Mixed && unique >= 2 {
            *multi_location_analysis = Some(MultiLocationAnalysis {
                is_cdn_by_ip: true,
                confidence: Confidence::Medium,
                reasoning: format!(
                    "Multi-location lookups returned {} distinct IP addresses with a {}% success rate, possibly a CDN or load balancing",
                    unique, success_rate_pct
                ),
            });

            if is_through_cdn {
                metrics.detection_methods.push(METHOD_HEADER.to_string());
                let suffix = provider.map(|p| format!(" ({})", p)).unwrap_or_default();
                details.push(format!(
                    "Multi-location IP evidence plus HTTP headers suggest a CDN{}",
                    suffix
                ));
                return Verdict {
                    connection_type: ConnectionType::Cdn,
                    confidence: Confidence::Medium,
                };
            }
            details.push(
                "Multi-location IP evidence suggests a CDN or load balancing, but HTTP headers show no CDN markers"
                    .to_string(),
            );
            return Verdict {
                connection_type: ConnectionType::Mixed,
                confidence: Confidence::Medium,
            };
        }

        if ml.ip_consistency == IpConsistency::Consistent {
            *multi_location_analysis = Some(MultiLocationAnalysis {
                is_cdn_by_ip: false,
                confidence: Confidence::High,
                reasoning: format!(
                    "All locations returned the same IP address ({}% success rate), likely a direct connection",
                    success_rate_pct
                ),
            });

            if is_through_cdn {
                metrics.detection_methods.push(METHOD_HEADER.to_string());
                return match provider {
                    Some(p) => {
                        details.push(format!(
                            "Multi-location lookups returned a single IP, but HTTP headers identify a CDN ({}), possibly a single-node CDN or an unusual configuration",
                            p
                        ));
                        Verdict {
                            connection_type: ConnectionType::Mixed,
                            confidence: Confidence::Medium,
                        }
                    }
                    None => {
                        details.push(
                            "Multi-location lookups returned a single IP, but HTTP headers show CDN markers, possibly a single-node CDN or a configuration issue"
                                .to_string(),
                        );
                        Verdict {
                            connection_type: ConnectionType::Mixed,
                            confidence: Confidence::Low,
                        }
                    }
                };
            }
            // Single IP and clean headers: keep evaluating the weaker signals.
        }
    }

    // 2. CDN header evidence (weight 35).
    if is_through_cdn {
        metrics.detection_methods.push(METHOD_HEADER.to_string());
        match provider {
            Some(p) => {
                metrics.header_analysis_score = 90;
                metrics.cdn_score += 35;
                details.push(format!("HTTP headers identify a CDN: {}", p));
            }
            None => {
                metrics.header_analysis_score = 70;
                metrics.cdn_score += 25;
                details.push(
                    "HTTP headers show CDN markers, but the provider could not be identified"
                        .to_string(),
                );
            }
        }
        // Downgraded when multi-location data existed but did not corroborate.
        let confidence = if multi.is_some() {
            Confidence::Medium
        } else {
            Confidence::High
        };
        return Verdict {
            connection_type: ConnectionType::Cdn,
            confidence,
        };
    }

    // 3. Proxy header evidence (weight 15).
    if has_proxy_headers {
        let proxy_types = detect_proxy_types(headers);
        metrics.detection_methods.push(METHOD_PROXY.to_string());
        metrics.header_analysis_score = metrics.header_analysis_score.max(50);
        metrics.cdn_score += 15;
        details.push(format!("Proxy headers detected: {}", proxy_types.join(", ")));

        let server = headers.get("server").map(|s| s.to_lowercase()).unwrap_or_default();
        if ["cloudflare", "netlify", "vercel"].iter().any(|s| server.contains(s)) {
            details.push("Server header suggests a CDN or PaaS host".to_string());
            metrics.detection_methods.push(METHOD_SERVER.to_string());
            metrics.server_analysis_score = 60;
            metrics.cdn_score += 10;
            return Verdict {
                connection_type: ConnectionType::Mixed,
                confidence: Confidence::Medium,
            };
        }
        return Verdict {
            connection_type: ConnectionType::Proxy,
            confidence: Confidence::High,
        };
    }

    // 4. Server/via/x-cache signature evidence (weight 10).
    let (raw_score, indicators) = server_signature_score(headers);
    if raw_score > 0 {
        metrics.detection_methods.push(METHOD_SERVER.to_string());
        metrics.server_analysis_score = raw_score.min(100);
        metrics.cdn_score += (raw_score / 10).min(10);
        details.push(format!(
            "Server or auxiliary headers suggest a CDN: {}",
            indicators.join(", ")
        ));
        let confidence = if raw_score >= 60 {
            Confidence::Medium
        } else {
            Confidence::Low
        };
        return Verdict {
            connection_type: ConnectionType::Mixed,
            confidence,
        };
    }

    // 5. Accumulated score fallback.
    if metrics.cdn_score >= 70 {
        details.push(format!(
            "Composite CDN score {}, strongly indicates a CDN",
            metrics.cdn_score
        ));
        return Verdict {
            connection_type: ConnectionType::Cdn,
            confidence: Confidence::High,
        };
    }
    if metrics.cdn_score >= 40 {
        details.push(format!(
            "Composite CDN score {}, may be using a CDN",
            metrics.cdn_score
        ));
        return Verdict {
            connection_type: ConnectionType::Mixed,
            confidence: Confidence::Medium,
        };
    }
    if metrics.cdn_score >= 20 {
        details.push(format!(
            "Composite CDN score {}, possibly a proxy or special configuration",
            metrics.cdn_score
        ));
        return Verdict {
            connection_type: ConnectionType::Mixed,
            confidence: Confidence::Low,
        };
    }

    if let Some(ml) = multi {
        if ml.health_stats.successful_queries == 0 {
            details.push(
                "Multi-location queries produced no successful lookups, insufficient data for a confident verdict"
                    .to_string(),
            );
            return Verdict {
                connection_type: ConnectionType::Direct,
                confidence: Confidence::Low,
            };
        }
    }

    details.push("No CDN or proxy markers detected".to_string());
    Verdict {
        connection_type: ConnectionType::Direct,
        confidence: Confidence::High,
    }
}
