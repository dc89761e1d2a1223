use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::{run_domain_test, sanitize_domain, TestResults};
use crate::error::ProbeError;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct TestDomainQuery {
    pub domain: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TestDomainBody {
    pub domain: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainTestResponse {
    pub timestamp: String,
    pub domain: String,
    pub test_results: TestResults,
}

/// GET /test-domain?domain=<d>
pub async fn test_domain_get(
    State(state): State<SharedState>,
    Query(query): Query<TestDomainQuery>,
) -> Result<Json<DomainTestResponse>, ProbeError> {
    run(state, query.domain).await
}

/// POST /test-domain {"domain": "<d>"}
pub async fn test_domain_post(
    State(state): State<SharedState>,
    Json(body): Json<TestDomainBody>,
) -> Result<Json<DomainTestResponse>, ProbeError> {
    run(state, body.domain).await
}

async fn run(
    state: SharedState,
    domain: Option<String>,
) -> Result<Json<DomainTestResponse>, ProbeError> {
    let raw = domain
        .ok_or_else(|| ProbeError::InvalidInput("domain parameter is required".to_string()))?;
    let domain = sanitize_domain(&raw)?;

    info!("running domain test for {}", domain);
    let test_results = run_domain_test(&state, &domain).await;

    Ok(Json(DomainTestResponse {
        timestamp: Utc::now().to_rfc3339(),
        domain,
        test_results,
    }))
}
