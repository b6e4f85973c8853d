use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::cache_policy::CacheBucket;
use crate::orchestrator::{BundleOrchestrator, BundleRequest, BundleState};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: BundleOrchestrator,
    /// Used when the request has no `bucket` parameter.
    pub default_bucket: CacheBucket,
}

impl AppState {
    pub fn new(orchestrator: BundleOrchestrator) -> Self {
        Self {
            orchestrator,
            default_bucket: CacheBucket::PromptSearch,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/bundle", get(get_bundle))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

fn bad_request(message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "status": "error", "message": message })),
    )
        .into_response()
}

async fn get_bundle(
    State(state): State<AppState>,
    Query(mut q): Query<HashMap<String, String>>,
) -> Response {
    let bucket = match q.remove("bucket") {
        Some(raw) => match raw.parse::<CacheBucket>() {
            Ok(b) => b,
            Err(e) => return bad_request(e.to_string()),
        },
        None => state.default_bucket,
    };
    let page = match q.remove("page") {
        Some(raw) => match raw.trim().parse::<u32>() {
            Ok(p) => p,
            Err(_) => return bad_request(format!("invalid page `{raw}`")),
        },
        None => 0,
    };

    let mut req = BundleRequest::new(q.remove("prompt").unwrap_or_default(), bucket);
    req.locale = q.remove("locale").filter(|s| !s.trim().is_empty());
    req.geo = q.remove("geo").filter(|s| !s.trim().is_empty());
    req.page = page;
    // Whatever is left over is a filter.
    req.filters = q.into_iter().collect();

    let out = state.orchestrator.resolve(&req).await;
    let status = match &out {
        BundleState::Ready(_) => StatusCode::OK,
        BundleState::Loading => StatusCode::ACCEPTED,
        BundleState::Error { .. } => StatusCode::BAD_GATEWAY,
    };
    (status, Json(out)).into_response()
}
