//! Audit timeline and unified explanations.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::{Extension, Json};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{Action, AuthContext};
use crate::error::ApiError;
use crate::middleware::CorrelationId;
use crate::pagination::{PageQuery, Paginated};
use crate::state::AppState;
use concord_insight::InsightError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQuery {
    pub since: Option<String>,
    pub until: Option<String>,
    #[serde(rename = "type")]
    pub entry_type: Option<String>,
    pub agent: Option<String>,
}

fn parse_timestamp(value: &str, field: &str, correlation_id: &str) -> Result<DateTime<Utc>, ApiError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            ApiError::validation(
                format!("{field} must be an RFC 3339 timestamp"),
                correlation_id,
            )
        })
}

pub async fn audit_timeline(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Extension(ctx): Extension<AuthContext>,
    Query(query): Query<AuditQuery>,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    ctx.authorize(Action::Read, &correlation.0)?;

    let until = match &query.until {
        Some(value) => parse_timestamp(value, "until", &correlation.0)?,
        None => Utc::now(),
    };
    // Default window: last 30 days.
    let since = match &query.since {
        Some(value) => parse_timestamp(value, "since", &correlation.0)?,
        None => until - Duration::days(30),
    };

    if since > until {
        return Err(ApiError::validation(
            "'since' must not be after 'until'",
            &correlation.0,
        ));
    }
    // Cap the window at the configured maximum.
    let max_window = Duration::days(state.config.max_audit_window_days);
    let since = if until - since > max_window {
        until - max_window
    } else {
        since
    };

    let params = page.normalize(state.config.default_page_size);
    let entries = state
        .projections
        .audit_timeline(
            since,
            until,
            query.entry_type.as_deref(),
            query.agent.as_deref(),
        )
        .await;
    Ok(Json(Paginated::slice(entries, params)))
}

pub async fn explanation(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    ctx.authorize(Action::Read, &correlation.0)?;

    match state.explanations.explain(id).await {
        Ok(explanation) => Ok(Json(explanation)),
        Err(InsightError::NotFound(_)) => Err(ApiError::not_found(
            format!("no decision found for id {id}"),
            &correlation.0,
        )),
    }
}
