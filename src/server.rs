use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Service health
        .route("/health", get(crate::routes::health::health))
        // Full domain test pipeline
        .route(
            "/test-domain",
            get(crate::routes::test_domain::test_domain_get)
                .post(crate::routes::test_domain::test_domain_post),
        )
        // Inbound-request header diagnostic
        .route(
            "/cdn-latency",
            get(crate::routes::cdn_latency::cdn_latency)
                .post(crate::routes::cdn_latency::cdn_latency),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
