//! HTTP surface: report endpoints and health check.

mod middleware;

use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::get,
};

use crate::{
    application::{
        error::HttpError,
        reports::{ReportParams, ReportService},
    },
    cache::ResponseCodec,
};

pub use middleware::{REQUEST_ID_HEADER, RequestContext};

#[derive(Clone)]
pub struct HttpState {
    pub reports: Arc<ReportService>,
    pub codec: ResponseCodec,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/cache/{report}", get(cached_report))
        .route("/healthz", get(health))
        .fallback(not_found)
        .with_state(state)
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
}

async fn cached_report(
    State(state): State<HttpState>,
    Path(report): Path<String>,
    Query(params): Query<ReportParams>,
    headers: HeaderMap,
) -> Response {
    match state.reports.load(&report, &params).await {
        Ok(served) => state
            .codec
            .respond(&headers, &served.payload, Some(served.status)),
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn not_found() -> Response {
    HttpError::new(
        "infra::http::not_found",
        StatusCode::NOT_FOUND,
        "not found",
        "no route matched the request",
    )
    .into_response()
}
