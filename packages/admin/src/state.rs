//! Shared application state for the admin router.

use std::sync::Arc;

use concord_adaptation::RollbackService;
use concord_arbiter::EscalationApprovalService;
use concord_events::EventBus;
use concord_insight::{ExplanationService, ProjectionService};
use concord_learning::SuggestionApprovalService;
use concord_observability::MetricsRegistry;

use crate::auth::AuthService;
use crate::config::AdminConfig;
use crate::idempotency::IdempotencyStore;

/// Everything the routes need. Cheap to clone; all fields are shared.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AdminConfig>,
    pub metrics: Arc<MetricsRegistry>,
    pub bus: Arc<EventBus>,
    pub auth: Arc<AuthService>,
    pub idempotency: Arc<IdempotencyStore>,
    pub projections: Arc<ProjectionService>,
    pub explanations: Arc<ExplanationService>,
    pub suggestion_approval: Arc<SuggestionApprovalService>,
    pub escalation_approval: Arc<EscalationApprovalService>,
    pub rollback: Arc<RollbackService>,
}
