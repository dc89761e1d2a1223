use domainprobe::probe::probe;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_probe_captures_status_headers_and_body_size() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Server", "TestOrigin/1.0")
                .insert_header("X-Cache", "HIT from edge")
                .set_body_string("hello world"),
        )
        .mount(&server)
        .await;

    let result = probe(&server.uri()).await.expect("probe succeeds");

    assert_eq!(result.status_code, 200);
    assert_eq!(result.headers["server"], "TestOrigin/1.0");
    assert_eq!(result.headers["x-cache"], "HIT from edge");
    assert_eq!(result.content_length, 11);
    assert!(result.ssl_time_ms.is_none());
    assert!(result.certificate.is_none());
    assert!(result.total_time_ms >= result.ttfb_ms);
}

#[tokio::test]
async fn test_probe_lowercases_header_names() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).insert_header("X-Custom-Header", "VaLuE"))
        .mount(&server)
        .await;

    let result = probe(&server.uri()).await.expect("probe succeeds");
    assert_eq!(result.headers["x-custom-header"], "VaLuE");
    assert!(!result.headers.contains_key("X-Custom-Header"));
}

#[tokio::test]
async fn test_probe_treats_error_status_as_result_not_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let result = probe(&server.uri()).await.expect("503 is still a result");
    assert_eq!(result.status_code, 503);
    assert_eq!(result.content_length, 11);
}

#[tokio::test]
async fn test_probe_fails_on_connection_refused() {
    // Grab a free port, then close the listener so nothing accepts.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let err = probe(&format!("http://127.0.0.1:{}/", port))
        .await
        .expect_err("connection refused");
    assert!(err.to_string().contains("tcp connect"));
}

#[tokio::test]
async fn test_probe_preserves_query_string() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(wiremock::matchers::query_param("q", "probe"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let result = probe(&format!("{}/search?q=probe", server.uri()))
        .await
        .expect("probe succeeds");
    assert_eq!(result.status_code, 200);
}
