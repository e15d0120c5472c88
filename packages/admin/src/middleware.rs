//! Request pipeline: correlation binding, timeout guard, metrics, auth.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::time::Instant;
use uuid::Uuid;

use crate::error::{ApiError, CORRELATION_HEADER};
use crate::state::AppState;

/// Correlation id bound to the request, available via `Extension`.
#[derive(Debug, Clone)]
pub struct CorrelationId(pub String);

/// Bind (or generate) the correlation id and echo it on the response.
pub async fn correlation_middleware(mut request: Request, next: Next) -> Response {
    let correlation_id = request
        .headers()
        .get(&CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request
        .extensions_mut()
        .insert(CorrelationId(correlation_id.clone()));

    let mut response = next.run(request).await;
    if !response.headers().contains_key(&CORRELATION_HEADER) {
        if let Ok(value) = correlation_id.parse() {
            response.headers_mut().insert(CORRELATION_HEADER.clone(), value);
        }
    }
    response
}

fn correlation_of(request: &Request) -> String {
    request
        .extensions()
        .get::<CorrelationId>()
        .map(|id| id.0.clone())
        .unwrap_or_default()
}

/// Cancel handlers that outlive the request deadline.
pub async fn timeout_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let correlation_id = correlation_of(&request);
    match tokio::time::timeout(state.config.request_timeout, next.run(request)).await {
        Ok(response) => response,
        Err(_) => ApiError::timeout(correlation_id).into_response(),
    }
}

/// Replace UUID/ULID path segments with `:id` so metric labels stay
/// low-cardinality.
pub fn normalize_route(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if is_uuid(segment) || is_ulid(segment) {
                ":id"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn is_uuid(segment: &str) -> bool {
    Uuid::parse_str(segment).is_ok()
}

fn is_ulid(segment: &str) -> bool {
    segment.len() == 26
        && segment
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='Z').contains(&c.to_ascii_uppercase()))
        && segment.chars().any(|c| c.is_ascii_alphabetic())
}

/// Request counter and duration histogram, labelled by method, normalized
/// route and status.
pub async fn metrics_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let route = normalize_route(request.uri().path());
    let started = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    state.metrics.inc_counter(
        "http_requests_total",
        &[("method", &method), ("route", &route), ("status", &status)],
    );
    if response.status() == axum::http::StatusCode::BAD_REQUEST {
        state
            .metrics
            .inc_counter("validation_errors_total", &[("route", &route)]);
    }
    state.metrics.observe(
        "http_request_duration_ms",
        &[("method", &method), ("route", &route)],
        started.elapsed().as_secs_f64() * 1000.0,
    );
    response
}

/// Bearer-token authentication. Attaches `AuthContext` on success.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let correlation_id = correlation_of(&request);

    let token = match request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
    {
        Some(token) => token.to_string(),
        None => {
            state
                .metrics
                .inc_counter("auth_failures_total", &[("reason", "missing_token")]);
            return ApiError::unauthorized("missing bearer token", correlation_id).into_response();
        }
    };

    match state.auth.verify_access(&token, &correlation_id) {
        Ok(context) => {
            request.extensions_mut().insert(context);
            next.run(request).await
        }
        Err(error) => {
            state
                .metrics
                .inc_counter("auth_failures_total", &[("reason", "invalid_token")]);
            error.into_response()
        }
    }
}
