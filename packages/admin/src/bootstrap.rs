//! Wires the whole decision plane together.

use async_trait::async_trait;
use std::sync::Arc;

use concord_adaptation::{
    AdaptationPolicyService, AutoAdaptationEngine, InMemoryAdaptationPolicyRepository,
    InMemoryAttemptRepository, RollbackService,
};
use concord_arbiter::{
    AgentProposalService, ArbitrationPolicy, ArbitrationPolicyRepository, ArbitrationService,
    ConflictDetectionService, EscalationApprovalService, InMemoryArbitrationDecisionRepository,
    InMemoryArbitrationPolicyRepository, InMemoryConflictRepository, InMemoryProposalRepository,
    ProposalInput, ProposalRepository, ProposalStatus,
};
use concord_events::{event_types, DomainEvent, EventBus, EventHandler};
use concord_governance::{
    ActionDraft, AgentDispatcher, AgentGovernor, AgentKind, AgentPolicy, CircuitBreakerConfig,
    GovernedGenerator, GuardedLlmClient, InMemoryDecisionRecordRepository, LlmClient, ProposalSink,
};
use concord_insight::{ExplanationService, ProjectionService};
use concord_learning::{
    FeedbackCaptureConfig, FeedbackCaptureService, InMemoryLearningProfileRepository,
    LearningProfileService, PreferenceAuditService, PreferenceSuggestionService,
    SuggestionApprovalService, SuggestionConfig,
};
use concord_observability::MetricsRegistry;
use concord_registry::PreferenceRegistry;

use crate::agents::{CoachAgent, LoggerAgent, PlannerAgent};
use crate::auth::{AuthService, UserDirectory};
use crate::config::AdminConfig;
use crate::idempotency::IdempotencyStore;
use crate::state::AppState;

/// One arbitration pass: detect conflicts, resolve them, then run every
/// still-uncontested proposal through the veto/escalation gates.
#[derive(Debug, Default, Clone, Copy)]
pub struct CycleSummary {
    pub conflicts_resolved: usize,
    pub singles_resolved: usize,
}

/// The assembled plane: the HTTP state plus the runtime pieces the server
/// binary and tests drive directly.
pub struct DecisionPlane {
    pub state: AppState,
    pub registry: Arc<PreferenceRegistry>,
    pub governor: Arc<AgentGovernor>,
    pub generator: Arc<GovernedGenerator>,
    pub dispatcher: Arc<AgentDispatcher>,
    pub profiles: Arc<LearningProfileService>,
    pub suggestions: Arc<PreferenceSuggestionService>,
    pub audit: Arc<PreferenceAuditService>,
    pub feedback: Arc<FeedbackCaptureService>,
    pub adaptation_policies: Arc<AdaptationPolicyService>,
    pub adaptation_engine: Arc<AutoAdaptationEngine>,
    pub proposals: Arc<AgentProposalService>,
    pub conflict_detection: Arc<ConflictDetectionService>,
    pub arbitration: Arc<ArbitrationService>,
    pub proposal_repo: Arc<InMemoryProposalRepository>,
    pub decision_repo: Arc<InMemoryArbitrationDecisionRepository>,
    pub arbitration_policy_repo: Arc<InMemoryArbitrationPolicyRepository>,
    pub attempt_repo: Arc<InMemoryAttemptRepository>,
    pub decision_record_repo: Arc<InMemoryDecisionRecordRepository>,
}

impl DecisionPlane {
    /// Detect and resolve everything currently pending.
    pub async fn run_arbitration_cycle(&self) -> CycleSummary {
        let mut summary = CycleSummary::default();
        let detected = self.conflict_detection.detect_conflicts().await;
        for conflict in &detected.conflicts {
            if self.arbitration.resolve_conflict(conflict.id).await.is_ok() {
                summary.conflicts_resolved += 1;
            }
        }
        for proposal in &detected.unconflicted {
            if self.arbitration.resolve_proposal(proposal.id).await.is_ok() {
                summary.singles_resolved += 1;
            }
        }
        summary
    }
}

/// Forwards accepted agent drafts into the proposal pipeline.
struct DraftSink {
    proposals: Arc<AgentProposalService>,
}

#[async_trait]
impl ProposalSink for DraftSink {
    async fn submit(&self, agent: &str, originating_event: &DomainEvent, draft: ActionDraft) {
        let mut target = concord_arbiter::TargetRef::new(draft.target_kind, draft.target_id);
        if let Some(key) = draft.target_key {
            target = target.with_key(key);
        }
        self.proposals
            .submit_proposal(ProposalInput {
                agent_name: agent.to_string(),
                action_type: draft.action_type,
                target,
                proposed_value: draft.proposed_value,
                confidence_score: draft.confidence,
                cost_estimate: draft.cost_estimate,
                risk_level: draft.risk_level,
                originating_event_id: Some(originating_event.id.to_string()),
                suggestion_id: draft.suggestion_id,
            })
            .await;
    }
}

/// Downstream application: when arbitration approves a preference-change
/// proposal, enact it through the adaptation engine.
struct ArbitrationOutcomeHandler {
    proposals: Arc<dyn ProposalRepository>,
    engine: Arc<AutoAdaptationEngine>,
}

impl ArbitrationOutcomeHandler {
    async fn apply_winner(&self, proposal_id: uuid::Uuid) {
        let proposal = match self.proposals.get(proposal_id).await {
            Some(proposal) => proposal,
            None => return,
        };
        if proposal.status != ProposalStatus::Approved
            || proposal.action_type != "preference_change"
        {
            return;
        }
        if let Err(error) = self.engine.apply_approved_proposal(&proposal).await {
            tracing::warn!(
                proposal_id = %proposal.id,
                error = %error,
                "failed to apply arbitrated preference change"
            );
        }
    }
}

#[async_trait]
impl EventHandler for ArbitrationOutcomeHandler {
    async fn handle(&self, event: &DomainEvent) {
        match event.event_type.as_str() {
            event_types::ARBITRATION_RESOLVED => {
                if let Some(id) = event.payload["winning_proposal_id"]
                    .as_str()
                    .and_then(|s| uuid::Uuid::parse_str(s).ok())
                {
                    self.apply_winner(id).await;
                }
            }
            event_types::ESCALATION_APPROVED => {
                if let Some(id) = event.payload["selected_proposal_id"]
                    .as_str()
                    .and_then(|s| uuid::Uuid::parse_str(s).ok())
                {
                    self.apply_winner(id).await;
                }
            }
            _ => {}
        }
    }
}

/// Build the full plane with in-memory repositories.
pub async fn build_plane(
    config: AdminConfig,
    users: UserDirectory,
    llm: Arc<dyn LlmClient>,
) -> DecisionPlane {
    let config = Arc::new(config);
    let metrics = Arc::new(MetricsRegistry::new());
    let bus = Arc::new(EventBus::new());
    let registry = Arc::new(PreferenceRegistry::standard());
    eprintln!("DIAG: registry built");

    // Repositories.
    let profile_repo = Arc::new(InMemoryLearningProfileRepository::new());
    let decision_record_repo = Arc::new(InMemoryDecisionRecordRepository::new());
    let proposal_repo = Arc::new(InMemoryProposalRepository::new());
    let conflict_repo = Arc::new(InMemoryConflictRepository::new());
    let arbitration_policy_repo = Arc::new(InMemoryArbitrationPolicyRepository::new());
    let decision_repo = Arc::new(InMemoryArbitrationDecisionRepository::new());
    let adaptation_policy_repo = Arc::new(InMemoryAdaptationPolicyRepository::new());
    let attempt_repo = Arc::new(InMemoryAttemptRepository::new());

    // Governance.
    let governor = Arc::new(AgentGovernor::new());
    for kind in AgentKind::all() {
        governor.register_policy(AgentPolicy::for_agent(kind.name()).with_cooldown_ms(0));
    }
    let guarded_llm: Arc<dyn LlmClient> = Arc::new(GuardedLlmClient::new(
        llm,
        CircuitBreakerConfig {
            failure_threshold: config.breaker_failure_threshold,
            failure_window: chrono::Duration::seconds(60),
            reset_timeout: chrono::Duration::seconds(config.breaker_reset_secs),
        },
        metrics.clone(),
    ));
    let generator = Arc::new(GovernedGenerator::new(
        governor.clone(),
        guarded_llm,
        decision_record_repo.clone(),
        metrics.clone(),
    ));
    eprintln!("DIAG: generator built");

    // Learning.
    let profiles = Arc::new(LearningProfileService::new(
        registry.clone(),
        profile_repo.clone(),
    ));
    let suggestions = Arc::new(PreferenceSuggestionService::new(
        profiles.clone(),
        SuggestionConfig::default(),
    ));
    let suggestion_approval = Arc::new(SuggestionApprovalService::new(
        suggestions.clone(),
        bus.clone(),
    ));
    let audit = Arc::new(PreferenceAuditService::new(profiles.clone()));
    let feedback = Arc::new(FeedbackCaptureService::new(
        decision_record_repo.clone(),
        suggestions.clone(),
        metrics.clone(),
        FeedbackCaptureConfig::default(),
    ));

    // Arbitration.
    let proposals = Arc::new(AgentProposalService::new(
        proposal_repo.clone(),
        bus.clone(),
        metrics.clone(),
    ));
    let conflict_detection = Arc::new(ConflictDetectionService::new(
        proposal_repo.clone(),
        conflict_repo.clone(),
        bus.clone(),
        metrics.clone(),
    ));
    let adaptation_policies = Arc::new(AdaptationPolicyService::new(
        registry.clone(),
        adaptation_policy_repo,
    ));
    eprintln!("DIAG: before arbitration_policy_repo.save");
    arbitration_policy_repo
        .save(ArbitrationPolicy::fallback_default())
        .await;
    eprintln!("DIAG: after arbitration_policy_repo.save");
    let arbitration = Arc::new(
        ArbitrationService::new(
            proposal_repo.clone(),
            conflict_repo,
            arbitration_policy_repo.clone(),
            decision_repo.clone(),
            bus.clone(),
            metrics.clone(),
        )
        .with_lock_probe(adaptation_policies.clone()),
    );
    let escalation_approval = Arc::new(EscalationApprovalService::new(
        decision_repo.clone(),
        proposal_repo.clone(),
        bus.clone(),
        metrics.clone(),
    ));

    // Adaptation.
    let adaptation_engine = Arc::new(
        AutoAdaptationEngine::new(
            registry.clone(),
            profiles.clone(),
            adaptation_policies.clone(),
            attempt_repo.clone(),
            bus.clone(),
            metrics.clone(),
        )
        .with_proposal_service(proposals.clone()),
    );
    let rollback = Arc::new(RollbackService::new(
        adaptation_engine.clone(),
        attempt_repo.clone(),
        profiles.clone(),
        decision_repo.clone(),
        proposal_repo.clone(),
    ));

    // Downstream application of arbitrated preference changes.
    let outcome_handler = Arc::new(ArbitrationOutcomeHandler {
        proposals: proposal_repo.clone(),
        engine: adaptation_engine.clone(),
    });
    eprintln!("DIAG: before subscribe ARBITRATION_RESOLVED");
    bus.subscribe(event_types::ARBITRATION_RESOLVED, outcome_handler.clone())
        .await;
    eprintln!("DIAG: before subscribe ESCALATION_APPROVED");
    bus.subscribe(event_types::ESCALATION_APPROVED, outcome_handler)
        .await;
    eprintln!("DIAG: after subscribes");

    // Agent dispatch for incoming domain events.
    let dispatcher = Arc::new(AgentDispatcher::new(
        governor.clone(),
        Arc::new(DraftSink {
            proposals: proposals.clone(),
        }),
        metrics.clone(),
    ));
    dispatcher.register_agent(Arc::new(CoachAgent));
    dispatcher.register_agent(Arc::new(PlannerAgent));
    dispatcher.register_agent(Arc::new(LoggerAgent));

    // Insight.
    let projections = Arc::new(ProjectionService::new(
        registry.clone(),
        profile_repo.clone(),
        attempt_repo.clone(),
        decision_repo.clone(),
        decision_record_repo.clone(),
    ));
    let explanations = Arc::new(ExplanationService::new(
        decision_repo.clone(),
        proposal_repo.clone(),
        arbitration_policy_repo.clone(),
        attempt_repo.clone(),
        decision_record_repo.clone(),
    ));

    // Admin plane.
    let auth = Arc::new(AuthService::new(
        config.jwt_secret.clone(),
        config.access_ttl_secs,
        config.refresh_ttl_secs,
        users,
    ));
    let idempotency = Arc::new(IdempotencyStore::new(config.idempotency_ttl_secs));

    let state = AppState {
        config,
        metrics,
        bus,
        auth,
        idempotency,
        projections,
        explanations,
        suggestion_approval,
        escalation_approval,
        rollback,
    };

    DecisionPlane {
        state,
        registry,
        governor,
        generator,
        dispatcher,
        profiles,
        suggestions,
        audit,
        feedback,
        adaptation_policies,
        adaptation_engine,
        proposals,
        conflict_detection,
        arbitration,
        proposal_repo,
        decision_repo,
        arbitration_policy_repo,
        attempt_repo,
        decision_record_repo,
    }
}
