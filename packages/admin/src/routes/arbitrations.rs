//! Arbitration listing, escalation approval, decision rollback.

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

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArbitrationsQuery {
    pub escalated: Option<bool>,
}

pub async fn list_arbitrations(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Extension(ctx): Extension<AuthContext>,
    Query(query): Query<ArbitrationsQuery>,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    ctx.authorize(Action::Read, &correlation.0)?;
    let params = page.normalize(state.config.default_page_size);
    let views = state
        .projections
        .arbitrations_view(query.escalated.unwrap_or(false))
        .await;
    Ok(Json(Paginated::slice(views, params)))
}

pub async fn pending_escalations(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Extension(ctx): Extension<AuthContext>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    ctx.authorize(Action::Read, &correlation.0)?;
    let params = query.normalize(state.config.default_page_size);
    let views = state.projections.pending_escalations_view().await;
    Ok(Json(Paginated::slice(views, params)))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct ApproveEscalationRequest {
    #[serde(default)]
    approved_by: Option<String>,
    #[serde(default)]
    selected_proposal_id: Option<Uuid>,
}

pub async fn approve_escalation(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    ctx.authorize(Action::Approve, &correlation.0)?;
    let request: ApproveEscalationRequest = parse_body(body, &correlation.0)?;
    let approved_by = request.approved_by.unwrap_or_else(|| ctx.user_id.clone());

    let key = require_idempotency_key(&headers, &correlation.0)?;
    let ticket = match state
        .idempotency
        .begin(&ctx.user_id, &key, &correlation.0, &state.metrics)?
    {
        IdempotencyGate::Replay(stored) => return Ok(replay_response(stored)),
        IdempotencyGate::Proceed(ticket) => ticket,
    };

    match state
        .escalation_approval
        .approve_escalated_decision(
            id,
            &approved_by,
            request.selected_proposal_id,
            Some(&correlation.0),
        )
        .await
    {
        Ok(decision) => {
            state
                .metrics
                .inc_counter("mutation_actions_total", &[("action", "escalation_approve")]);
            let (status, body) = ok_json(json!({
                "decisionId": decision.id,
                "executed": decision.executed,
                "winningProposalId": decision.winning_proposal_id,
            }));
            state.idempotency.complete(ticket, status, body.clone());
            Ok((status, Json(body)).into_response())
        }
        Err(error) => {
            state.idempotency.abandon(ticket);
            Err(ApiError::from_arbiter(error, &correlation.0))
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct RejectEscalationRequest {
    reason: String,
    #[serde(default)]
    rejected_by: Option<String>,
}

pub async fn reject_escalation(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    ctx.authorize(Action::Approve, &correlation.0)?;
    let request: RejectEscalationRequest = parse_body(body, &correlation.0)?;
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
        .escalation_approval
        .reject_escalated_decision(
            id,
            &request.reason,
            request.rejected_by.as_deref().or(Some(ctx.user_id.as_str())),
            Some(&correlation.0),
        )
        .await
    {
        Ok(decision) => {
            state
                .metrics
                .inc_counter("mutation_actions_total", &[("action", "escalation_reject")]);
            let (status, body) = ok_json(json!({
                "decisionId": decision.id,
                "executed": decision.executed,
                "suppressedProposalIds": decision.suppressed_proposal_ids,
            }));
            state.idempotency.complete(ticket, status, body.clone());
            Ok((status, Json(body)).into_response())
        }
        Err(error) => {
            state.idempotency.abandon(ticket);
            Err(ApiError::from_arbiter(error, &correlation.0))
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct RollbackArbitrationRequest {
    reason: String,
}

pub async fn rollback_arbitration(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    ctx.authorize(Action::Rollback, &correlation.0)?;
    let request: RollbackArbitrationRequest = parse_body(body, &correlation.0)?;
    validate::reason(&request.reason, &correlation.0)?;

    let key = require_idempotency_key(&headers, &correlation.0)?;
    let ticket = match state
        .idempotency
        .begin(&ctx.user_id, &key, &correlation.0, &state.metrics)?
    {
        IdempotencyGate::Replay(stored) => return Ok(replay_response(stored)),
        IdempotencyGate::Proceed(ticket) => ticket,
    };

    match state.rollback.rollback_by_decision(id, &request.reason).await {
        Ok(rolled) => {
            state
                .metrics
                .inc_counter("rollbacks_total", &[("type", "arbitration")]);
            let (status, body) = ok_json(json!({
                "decisionId": id,
                "rolledBackAttempts": rolled.iter().map(|a| a.id).collect::<Vec<_>>(),
            }));
            state.idempotency.complete(ticket, status, body.clone());
            Ok((status, Json(body)).into_response())
        }
        Err(error) => {
            state.idempotency.abandon(ticket);
            Err(ApiError::from_adaptation(error, &correlation.0))
        }
    }
}
