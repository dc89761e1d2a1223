//! Lightweight diagnostic over the inbound request itself: which CDN and
//! proxy headers reached this server. Does not probe anything outbound.

use std::collections::BTreeMap;
use std::time::Instant;

use axum::extract::OriginalUri;
use axum::http::{HeaderMap, Method};
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::classify::{CDN_HEADER_NAMES, PROXY_HEADER_NAMES};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CdnDetection {
    #[serde(rename = "isThroughCDN")]
    pub is_through_cdn: bool,
    pub has_proxy_headers: bool,
    pub headers: BTreeMap<String, Option<String>>,
    pub proxy_headers: BTreeMap<String, Option<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestInfo {
    pub method: String,
    pub url: String,
    pub user_agent: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub version: String,
    pub platform: String,
    pub arch: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CdnLatencyResponse {
    pub timestamp: String,
    pub server_processing_time: u64,
    pub cdn_detection: CdnDetection,
    pub request_info: RequestInfo,
    pub server_info: ServerInfo,
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let values: Vec<String> = headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok().map(str::to_string))
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(values.join(", "))
    }
}

/// GET/POST /cdn-latency
pub async fn cdn_latency(
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
) -> Json<CdnLatencyResponse> {
    let start = Instant::now();
    let timestamp = Utc::now().to_rfc3339();

    let cdn_headers: BTreeMap<String, Option<String>> = CDN_HEADER_NAMES
        .iter()
        .map(|name| ((*name).to_string(), header_value(&headers, name)))
        .collect();
    let proxy_headers: BTreeMap<String, Option<String>> = PROXY_HEADER_NAMES
        .iter()
        .map(|name| ((*name).to_string(), header_value(&headers, name)))
        .collect();

    let is_through_cdn = cdn_headers.values().any(Option::is_some);
    let has_proxy_headers = proxy_headers.values().any(Option::is_some);

    Json(CdnLatencyResponse {
        timestamp,
        server_processing_time: start.elapsed().as_millis() as u64,
        cdn_detection: CdnDetection {
            is_through_cdn,
            has_proxy_headers,
            headers: cdn_headers,
            proxy_headers,
        },
        request_info: RequestInfo {
            method: method.to_string(),
            url: uri.to_string(),
            user_agent: header_value(&headers, "user-agent").unwrap_or_else(|| "Unknown".to_string()),
        },
        server_info: ServerInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
            platform: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_header_value_joins_repeated_headers() {
        let mut headers = HeaderMap::new();
        headers.append("via", HeaderValue::from_static("1.1 a"));
        headers.append("via", HeaderValue::from_static("1.1 b"));
        assert_eq!(header_value(&headers, "via"), Some("1.1 a, 1.1 b".to_string()));
    }

    #[test]
    fn test_header_value_absent() {
        let headers = HeaderMap::new();
        assert_eq!(header_value(&headers, "cf-ray"), None);
    }
}
