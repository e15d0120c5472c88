//! Suggestion listing and approval.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::{Action, AuthContext};
use crate::error::ApiError;
use crate::idempotency::IdempotencyGate;
use crate::middleware::CorrelationId;
use crate::pagination::{PageQuery, Paginated};
use crate::routes::{ok_json, parse_body, replay_response, require_idempotency_key, validate};
use crate::state::AppState;
use concord_learning::SuggestionStatus;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionsQuery {
    pub status: Option<String>,
    pub agent: Option<String>,
}

fn parse_status(value: &str, correlation_id: &str) -> Result<SuggestionStatus, ApiError> {
    match value {
        "pending" => Ok(SuggestionStatus::Pending),
        "approved" => Ok(SuggestionStatus::Approved),
        "rejected" => Ok(SuggestionStatus::Rejected),
        other => Err(ApiError::validation(
            format!("unknown suggestion status '{other}'"),
            correlation_id,
        )),
    }
}

pub async fn list_suggestions(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Extension(ctx): Extension<AuthContext>,
    Query(query): Query<SuggestionsQuery>,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    ctx.authorize(Action::Read, &correlation.0)?;

    let status = query
        .status
        .as_deref()
        .map(|value| parse_status(value, &correlation.0))
        .transpose()?;
    let params = page.normalize(state.config.default_page_size);
    let views = state
        .projections
        .suggestions_view(status, query.agent.as_deref())
        .await;
    Ok(Json(Paginated::slice(views, params)))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct ApproveSuggestionRequest {
    agent_type: String,
}

pub async fn approve_suggestion(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    ctx.authorize(Action::Approve, &correlation.0)?;
    let request: ApproveSuggestionRequest = parse_body(body, &correlation.0)?;
    validate::agent_name(&request.agent_type, &correlation.0)?;

    let key = require_idempotency_key(&headers, &correlation.0)?;
    let ticket = match state
        .idempotency
        .begin(&ctx.user_id, &key, &correlation.0, &state.metrics)?
    {
        IdempotencyGate::Replay(stored) => return Ok(replay_response(stored)),
        IdempotencyGate::Proceed(ticket) => ticket,
    };

    match state
        .suggestion_approval
        .approve(&request.agent_type, id, Some(&correlation.0))
        .await
    {
        Ok(suggestion) => {
            state
                .metrics
                .inc_counter("mutation_actions_total", &[("action", "suggestion_approve")]);
            let (status, body) = ok_json(json!({
                "suggestionId": suggestion.suggestion_id,
                "status": suggestion.status,
                "appliedValue": suggestion.suggested_value,
            }));
            state.idempotency.complete(ticket, status, body.clone());
            Ok((status, Json(body)).into_response())
        }
        Err(error) => {
            state.idempotency.abandon(ticket);
            Err(ApiError::from_learning(error, &correlation.0))
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct RejectSuggestionRequest {
    agent_type: String,
    reason: String,
}

pub async fn reject_suggestion(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    ctx.authorize(Action::Approve, &correlation.0)?;
    let request: RejectSuggestionRequest = parse_body(body, &correlation.0)?;
    validate::agent_name(&request.agent_type, &correlation.0)?;
    validate::reason(&request.reason, &correlation.0)?;

    let key = require_idempotency_key(&headers, &correlation.0)?;
    let ticket = match state
        .idempotency
        .begin(&ctx.user_id, &key, &correlation.0, &state.metrics)?
    {
        IdempotencyGate::Replay(stored) => return Ok(replay_response(stored)),
        IdempotencyGate::Proceed(ticket) => ticket,
    };

    match state
        .suggestion_approval
        .reject(&request.agent_type, id, &request.reason, Some(&correlation.0))
        .await
    {
        Ok(suggestion) => {
            state
                .metrics
                .inc_counter("mutation_actions_total", &[("action", "suggestion_reject")]);
            let (status, body) = ok_json(json!({
                "suggestionId": suggestion.suggestion_id,
                "status": suggestion.status,
            }));
            state.idempotency.complete(ticket, status, body.clone());
            Ok((status, Json(body)).into_response())
        }
        Err(error) => {
            state.idempotency.abandon(ticket);
            Err(ApiError::from_learning(error, &correlation.0))
        }
    }
}
