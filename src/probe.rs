//! Timed HTTP(S) probe.
//!
//! One GET against the target, written over a raw TCP (optionally TLS)
//! stream so each phase can be timed: TCP connect, TLS handshake, first
//! response byte, and stream end. Certificate validation is intentionally
//! permissive; the probe records certificate metadata even for self-signed
//! or otherwise invalid chains.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::rustls::{self, ClientConfig, RootCertStore, ServerName};
use tokio_rustls::TlsConnector;
use url::Url;

use crate::config::{PROBE_TIMEOUT_SECS, PROBE_USER_AGENT};
use crate::error::ProbeError;

#[derive(Debug, Clone, PartialEq)]
pub struct CertificateInfo {
    pub issuer: String,
    pub valid_from: String,
    pub valid_to: String,
    pub subject_alt_name: String,
}

#[derive(Debug, Clone)]
pub struct HttpProbeResult {
    pub status_code: u16,
    /// Lowercased header names; repeated headers joined with ", ".
    pub headers: BTreeMap<String, String>,
    pub content_length: u64,
    pub total_time_ms: u64,
    pub tcp_time_ms: u64,
    pub ssl_time_ms: Option<u64>,
    pub ttfb_ms: u64,
    pub download_time_ms: u64,
    pub certificate: Option<CertificateInfo>,
}

/// Probe `url` with a single GET. Fails only on connection-level errors;
/// non-2xx statuses are results, not failures.
pub async fn probe(url: &str) -> Result<HttpProbeResult, ProbeError> {
    let parsed = Url::parse(url)
        .map_err(|e| ProbeError::HttpProbe(format!("invalid probe url {}: {}", url, e)))?;
    timeout(Duration::from_secs(PROBE_TIMEOUT_SECS), probe_inner(parsed))
        .await
        .map_err(|_| ProbeError::HttpProbe(format!("probe of {} timed out", url)))?
}

async fn probe_inner(url: Url) -> Result<HttpProbeResult, ProbeError> {
    let https = url.scheme() == "https";
    if !https && url.scheme() != "http" {
        return Err(ProbeError::HttpProbe(format!(
            "unsupported scheme: {}",
            url.scheme()
        )));
    }
    let host = url
        .host_str()
        .ok_or_else(|| ProbeError::HttpProbe("probe url has no host".to_string()))?
        .to_string();
    let port = url.port_or_known_default().unwrap_or(if https { 443 } else { 80 });

    let mut path = url.path().to_string();
    if let Some(query) = url.query() {
        path.push('?');
        path.push_str(query);
    }
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nUser-Agent: {}\r\nAccept: */*\r\nConnection: close\r\n\r\n",
        path, host, PROBE_USER_AGENT
    );

    let start = Instant::now();
    let tcp_start = Instant::now();
    let stream = TcpStream::connect((host.as_str(), port))
        .await
        .map_err(|e| ProbeError::HttpProbe(format!("tcp connect to {}:{} failed: {}", host, port, e)))?;
    let tcp_time_ms = tcp_start.elapsed().as_millis() as u64;

    if https {
        let connector = permissive_connector();
        let server_name = ServerName::try_from(host.as_str())
            .map_err(|_| ProbeError::HttpProbe(format!("invalid TLS server name: {}", host)))?;
        let tls_start = Instant::now();
        let mut tls_stream = connector
            .connect(server_name, stream)
            .await
            .map_err(|e| ProbeError::HttpProbe(format!("tls handshake with {} failed: {}", host, e)))?;
        let ssl_time_ms = tls_start.elapsed().as_millis() as u64;

        let certificate = tls_stream
            .get_ref()
            .1
            .peer_certificates()
            .and_then(|certs| certs.first())
            .and_then(|cert| parse_certificate(&cert.0));

        let exchange = exchange(&mut tls_stream, &request).await?;
        Ok(HttpProbeResult {
            status_code: exchange.status_code,
            headers: exchange.headers,
            content_length: exchange.body_len,
            total_time_ms: start.elapsed().as_millis() as u64,
            tcp_time_ms,
            ssl_time_ms: Some(ssl_time_ms),
            ttfb_ms: exchange.ttfb.as_millis() as u64,
            download_time_ms: exchange.download.as_millis() as u64,
            certificate,
        })
    } else {
        let mut stream = stream;
        let exchange = exchange(&mut stream, &request).await?;
        Ok(HttpProbeResult {
            status_code: exchange.status_code,
            headers: exchange.headers,
            content_length: exchange.body_len,
            total_time_ms: start.elapsed().as_millis() as u64,
            tcp_time_ms,
            ssl_time_ms: None,
            ttfb_ms: exchange.ttfb.as_millis() as u64,
            download_time_ms: exchange.download.as_millis() as u64,
            certificate: None,
        })
    }
}

struct Exchange {
    status_code: u16,
    headers: BTreeMap<String, String>,
    body_len: u64,
    ttfb: Duration,
    download: Duration,
}

/// Write the request and read the response to EOF, recording time to first
/// byte and download duration. The response head is parsed incrementally as
/// bytes arrive.
async fn exchange<S>(stream: &mut S, request: &str) -> Result<Exchange, ProbeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|e| ProbeError::HttpProbe(format!("request write failed: {}", e)))?;
    let request_sent = Instant::now();

    let mut buf: Vec<u8> = Vec::with_capacity(16 * 1024);
    let mut chunk = [0u8; 8192];
    let mut first_byte: Option<Instant> = None;
    let mut head: Option<(u16, BTreeMap<String, String>, usize)> = None;

    loop {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| ProbeError::HttpProbe(format!("response read failed: {}", e)))?;
        if n == 0 {
            break;
        }
        if first_byte.is_none() {
            first_byte = Some(Instant::now());
        }
        buf.extend_from_slice(&chunk[..n]);

        if head.is_none() {
            let mut header_storage = [httparse::EMPTY_HEADER; 100];
            let mut response = httparse::Response::new(&mut header_storage);
            match response.parse(&buf) {
                Ok(httparse::Status::Complete(offset)) => {
                    let mut headers: BTreeMap<String, String> = BTreeMap::new();
                    for header in response.headers.iter() {
                        let name = header.name.to_ascii_lowercase();
                        let value = String::from_utf8_lossy(header.value).trim().to_string();
                        headers
                            .entry(name)
                            .and_modify(|existing| {
                                existing.push_str(", ");
                                existing.push_str(&value);
                            })
                            .or_insert(value);
                    }
                    head = Some((response.code.unwrap_or(0), headers, offset));
                }
                Ok(httparse::Status::Partial) => {}
                Err(e) => {
                    return Err(ProbeError::HttpProbe(format!(
                        "malformed response head: {}",
                        e
                    )))
                }
            }
        }
    }

    let end = Instant::now();
    let first_byte = first_byte.ok_or_else(|| {
        ProbeError::HttpProbe("connection closed before any response bytes".to_string())
    })?;
    let (status_code, headers, offset) = head.ok_or_else(|| {
        ProbeError::HttpProbe("connection closed before the response head completed".to_string())
    })?;

    Ok(Exchange {
        status_code,
        headers,
        body_len: (buf.len() - offset) as u64,
        ttfb: first_byte.duration_since(request_sent),
        download: end.duration_since(first_byte),
    })
}

/// TLS connector that accepts any certificate. Detection outranks strict
/// validation here; the chain is still captured for reporting.
fn permissive_connector() -> TlsConnector {
    let mut config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(RootCertStore::empty())
        .with_no_client_auth();
    config
        .dangerous()
        .set_certificate_verifier(Arc::new(AcceptAnyCert));
    TlsConnector::from(Arc::new(config))
}

struct AcceptAnyCert;

impl rustls::client::ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::Certificate,
        _intermediates: &[rustls::Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: std::time::SystemTime,
    ) -> Result<rustls::client::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::ServerCertVerified::assertion())
    }
}

fn parse_certificate(der: &[u8]) -> Option<CertificateInfo> {
    use x509_parser::prelude::*;

    let (_, cert) = X509Certificate::from_der(der).ok()?;

    let issuer = cert
        .issuer()
        .iter_organization()
        .next()
        .or_else(|| cert.issuer().iter_common_name().next())
        .and_then(|attr| attr.as_str().ok())
        .unwrap_or("Unknown")
        .to_string();

    let san = match cert.subject_alternative_name() {
        Ok(Some(ext)) => ext
            .value
            .general_names
            .iter()
            .filter_map(|name| match name {
                GeneralName::DNSName(dns) => Some(format!("DNS:{}", dns)),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(", "),
        _ => String::new(),
    };

    Some(CertificateInfo {
        issuer,
        valid_from: asn1_time_to_rfc3339(&cert.validity().not_before),
        valid_to: asn1_time_to_rfc3339(&cert.validity().not_after),
        subject_alt_name: if san.is_empty() { "N/A".to_string() } else { san },
    })
}

fn asn1_time_to_rfc3339(time: &x509_parser::time::ASN1Time) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp(time.timestamp(), 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| time.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exchange_parses_status_headers_and_body() {
        let (mut client, mut server) = tokio::io::duplex(16 * 1024);
        tokio::spawn(async move {
            let mut sink = [0u8; 1024];
            let _ = server.read(&mut sink).await;
            server
                .write_all(
                    b"HTTP/1.1 200 OK\r\n\
                      Server: nginx\r\n\
                      Set-Cookie: a=1\r\n\
                      Set-Cookie: b=2\r\n\
                      Content-Length: 5\r\n\r\nhello",
                )
                .await
                .unwrap();
            // dropping the server half closes the stream
        });

        let exchange = exchange(&mut client, "GET / HTTP/1.1\r\nHost: t\r\n\r\n")
            .await
            .expect("exchange succeeds");
        assert_eq!(exchange.status_code, 200);
        assert_eq!(exchange.headers["server"], "nginx");
        assert_eq!(exchange.headers["set-cookie"], "a=1, b=2");
        assert_eq!(exchange.body_len, 5);
    }

    #[tokio::test]
    async fn test_exchange_rejects_non_http_response() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        tokio::spawn(async move {
            let mut sink = [0u8; 1024];
            let _ = server.read(&mut sink).await;
            server.write_all(b"\x00\x01garbage").await.unwrap();
        });

        let result = exchange(&mut client, "GET / HTTP/1.1\r\n\r\n").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_exchange_reports_empty_response() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        tokio::spawn(async move {
            let mut sink = [0u8; 1024];
            let _ = server.read(&mut sink).await;
            // close without writing anything
        });

        let err = exchange(&mut client, "GET / HTTP/1.1\r\n\r\n")
            .await
            .expect_err("empty response is an error");
        assert!(err.to_string().contains("before any response bytes"));
    }

    #[tokio::test]
    async fn test_probe_rejects_unsupported_scheme() {
        let err = probe("ftp://example.com").await.expect_err("ftp rejected");
        assert!(err.to_string().contains("unsupported scheme"));
    }

}
