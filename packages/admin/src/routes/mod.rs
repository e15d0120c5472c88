//! Route assembly and shared handler helpers.

pub mod arbitrations;
pub mod audit;
pub mod auth;
pub mod preferences;
pub mod suggestions;
pub mod system;

use axum::http::{HeaderMap, StatusCode};
use axum::middleware::from_fn_with_state;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::idempotency::StoredResponse;
use crate::middleware::{
    auth_middleware, correlation_middleware, metrics_middleware, timeout_middleware,
};
use crate::state::AppState;

/// The full admin application: public system routes, auth routes, and the
/// guarded `/admin` surface.
pub fn build_router(state: AppState) -> Router {
    let guarded = Router::new()
        .route("/preferences", get(preferences::list_preferences))
        .route("/preferences/rollback", post(preferences::rollback_preference))
        .route("/suggestions", get(suggestions::list_suggestions))
        .route("/suggestions/{id}/approve", post(suggestions::approve_suggestion))
        .route("/suggestions/{id}/reject", post(suggestions::reject_suggestion))
        .route("/arbitrations", get(arbitrations::list_arbitrations))
        .route("/arbitrations/{id}/rollback", post(arbitrations::rollback_arbitration))
        .route("/escalations/pending", get(arbitrations::pending_escalations))
        .route("/escalations/{id}/approve", post(arbitrations::approve_escalation))
        .route("/escalations/{id}/reject", post(arbitrations::reject_escalation))
        .route("/audit", get(audit::audit_timeline))
        .route("/explanations/{id}", get(audit::explanation))
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    let admin = Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/logout", post(auth::logout))
        .merge(guarded);

    Router::new()
        .route("/health", get(system::health))
        .route("/metrics", get(system::metrics))
        .nest("/admin", admin)
        .layer(from_fn_with_state(state.clone(), metrics_middleware))
        .layer(from_fn_with_state(state.clone(), timeout_middleware))
        .layer(axum::middleware::from_fn(correlation_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Mutation routes require an `Idempotency-Key` header.
pub(crate) fn require_idempotency_key(
    headers: &HeaderMap,
    correlation_id: &str,
) -> Result<String, ApiError> {
    headers
        .get("idempotency-key")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty() && value.len() <= 128)
        .map(String::from)
        .ok_or_else(|| {
            ApiError::validation(
                "Idempotency-Key header is required on mutation routes",
                correlation_id,
            )
        })
}

/// Parse a request body strictly; unknown fields and type errors become
/// `VALIDATION_ERROR` envelopes.
pub(crate) fn parse_body<T: DeserializeOwned>(
    body: Value,
    correlation_id: &str,
) -> Result<T, ApiError> {
    serde_json::from_value(body)
        .map_err(|error| ApiError::validation(format!("invalid request body: {error}"), correlation_id))
}

/// Replay a stored idempotent response byte-for-byte.
pub(crate) fn replay_response(stored: StoredResponse) -> Response {
    (stored.status, Json(stored.body)).into_response()
}

pub(crate) fn ok_json(body: Value) -> (StatusCode, Value) {
    (StatusCode::OK, body)
}

/// Field checks shared across DTOs.
pub(crate) mod validate {
    use crate::error::ApiError;

    pub fn agent_name(value: &str, correlation_id: &str) -> Result<(), ApiError> {
        if value.is_empty() || value.len() > 64 {
            return Err(ApiError::validation(
                "agentType must be 1-64 characters",
                correlation_id,
            ));
        }
        if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(ApiError::validation(
                "agentType may only contain letters, digits, '-' and '_'",
                correlation_id,
            ));
        }
        Ok(())
    }

    pub fn reason(value: &str, correlation_id: &str) -> Result<(), ApiError> {
        if value.is_empty() || value.len() > 500 {
            return Err(ApiError::validation(
                "reason must be 1-500 characters",
                correlation_id,
            ));
        }
        Ok(())
    }

    pub fn preference_key(value: &str, correlation_id: &str) -> Result<(), ApiError> {
        if concord_registry::PreferenceKey::parse(value).is_none() {
            return Err(ApiError::validation(
                "preferenceKey must have the form 'category.key'",
                correlation_id,
            ));
        }
        Ok(())
    }
}
