//! Login, refresh and logout. These routes bypass the bearer guard.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::Value;

use crate::error::ApiError;
use crate::middleware::CorrelationId;
use crate::routes::parse_body;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct LoginRequest {
    username: String,
    password: String,
}

pub async fn login(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let request: LoginRequest = parse_body(body, &correlation.0)?;
    if request.username.is_empty() || request.password.is_empty() {
        return Err(ApiError::validation(
            "username and password are required",
            &correlation.0,
        ));
    }

    let pair = state
        .auth
        .login(&request.username, &request.password, &correlation.0)?;
    Ok(Json(pair))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct RefreshRequest {
    refresh_token: String,
}

pub async fn refresh(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let request: RefreshRequest = parse_body(body, &correlation.0)?;
    let pair = state.auth.refresh(&request.refresh_token, &correlation.0)?;
    Ok(Json(pair))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct LogoutRequest {
    refresh_token: String,
    #[serde(default)]
    all_sessions: bool,
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let request: LogoutRequest = parse_body(body, &correlation.0)?;
    state
        .auth
        .logout(&request.refresh_token, request.all_sessions, &correlation.0)?;
    Ok(Json(serde_json::json!({"loggedOut": true})))
}
