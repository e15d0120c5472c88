//! Preference listing and rollback.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::{Action, AuthContext};
use crate::error::ApiError;
use crate::idempotency::IdempotencyGate;
use crate::middleware::CorrelationId;
use crate::pagination::{PageQuery, Paginated};
use crate::routes::{ok_json, parse_body, replay_response, require_idempotency_key, validate};
use crate::state::AppState;
use concord_adaptation::RollbackOutcome;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesQuery {
    pub agent: Option<String>,
}

pub async fn list_preferences(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Extension(ctx): Extension<AuthContext>,
    Query(query): Query<PreferencesQuery>,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    ctx.authorize(Action::Read, &correlation.0)?;

    let params = page.normalize(state.config.default_page_size);
    let views = state
        .projections
        .preferences_view(query.agent.as_deref())
        .await;
    Ok(Json(Paginated::slice(views, params)))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct RollbackPreferenceRequest {
    agent_type: String,
    preference_key: String,
    reason: String,
}

pub async fn rollback_preference(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    ctx.authorize(Action::Rollback, &correlation.0)?;
    let request: RollbackPreferenceRequest = parse_body(body, &correlation.0)?;
    validate::agent_name(&request.agent_type, &correlation.0)?;
    validate::preference_key(&request.preference_key, &correlation.0)?;
    validate::reason(&request.reason, &correlation.0)?;

    let key = require_idempotency_key(&headers, &correlation.0)?;
    let ticket = match state
        .idempotency
        .begin(&ctx.user_id, &key, &correlation.0, &state.metrics)?
    {
        IdempotencyGate::Replay(stored) => return Ok(replay_response(stored)),
        IdempotencyGate::Proceed(ticket) => ticket,
    };

    let outcome = state
        .rollback
        .rollback_by_preference(&request.agent_type, &request.preference_key, &request.reason)
        .await;

    match outcome {
        Ok(outcome) => {
            state
                .metrics
                .inc_counter("rollbacks_total", &[("type", "preference")]);
            let body = match outcome {
                RollbackOutcome::AttemptRolledBack(attempt) => json!({
                    "rolledBack": true,
                    "attemptId": attempt.id,
                    "restoredValue": attempt.previous_value,
                }),
                RollbackOutcome::ResetToDefault(change) => json!({
                    "rolledBack": true,
                    "resetToDefault": true,
                    "value": change.new_value,
                }),
                RollbackOutcome::NothingToRollBack => json!({"rolledBack": false}),
            };
            let (status, body) = ok_json(body);
            state.idempotency.complete(ticket, status, body.clone());
            Ok((status, Json(body)).into_response())
        }
        Err(error) => {
            state.idempotency.abandon(ticket);
            Err(ApiError::from_adaptation(error, &correlation.0))
        }
    }
}
