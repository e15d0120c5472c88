//! Governed generation: AI when allowed, rule fallback when not.

use serde_json::{Map, Value};
use std::sync::Arc;

use crate::decision::{
    AiMetadata, DecisionRecord, DecisionRecordRepository, ReasoningSource,
};
use crate::error::GovernanceError;
use crate::governor::AgentGovernor;
use crate::llm::{GenerateOptions, LlmClient};
use crate::template::PromptTemplate;
use concord_observability::MetricsRegistry;

/// Rule-based substitute invoked when AI output cannot be used.
pub type FallbackFn<'a> = &'a (dyn Fn(&Map<String, Value>) -> String + Send + Sync);

/// Result of a governed generation.
#[derive(Debug, Clone)]
pub struct GeneratedDecision {
    pub content: String,
    pub reasoning_source: ReasoningSource,
    /// Why the fallback was used, when it was
    pub fallback_reason: Option<String>,
    /// AI call metadata, when the LLM was consulted and answered
    pub ai: Option<AiMetadata>,
}

/// Identifies the event and aggregate a decision belongs to.
#[derive(Debug, Clone)]
pub struct TriggerInfo {
    pub event_type: String,
    pub event_id: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub decision_type: String,
}

impl TriggerInfo {
    pub fn new(
        event_type: impl Into<String>,
        event_id: impl Into<String>,
        aggregate_type: impl Into<String>,
        aggregate_id: impl Into<String>,
        decision_type: impl Into<String>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            event_id: event_id.into(),
            aggregate_type: aggregate_type.into(),
            aggregate_id: aggregate_id.into(),
            decision_type: decision_type.into(),
        }
    }
}

/// Governed generation service.
pub struct GovernedGenerator {
    governor: Arc<AgentGovernor>,
    llm: Arc<dyn LlmClient>,
    decisions: Arc<dyn DecisionRecordRepository>,
    metrics: Arc<MetricsRegistry>,
}

impl GovernedGenerator {
    pub fn new(
        governor: Arc<AgentGovernor>,
        llm: Arc<dyn LlmClient>,
        decisions: Arc<dyn DecisionRecordRepository>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            governor,
            llm,
            decisions,
            metrics,
        }
    }

    fn fallback(
        &self,
        agent: &str,
        reason: impl Into<String>,
        reason_label: &str,
        context: &Map<String, Value>,
        fallback: FallbackFn<'_>,
        ai: Option<AiMetadata>,
    ) -> GeneratedDecision {
        let reason = reason.into();
        self.metrics.inc_counter(
            "ai_fallbacks_total",
            &[("agent", agent), ("reason", reason_label)],
        );
        tracing::debug!(agent = %agent, reason = %reason, "using rule fallback");
        GeneratedDecision {
            content: fallback(context),
            reasoning_source: ReasoningSource::Fallback,
            fallback_reason: Some(reason),
            ai,
        }
    }

    /// Generate content under the agent's policy. See the module docs for
    /// the exact control flow.
    pub async fn generate_with_governance(
        &self,
        agent: &str,
        template: &PromptTemplate,
        context: &Map<String, Value>,
        fallback: FallbackFn<'_>,
    ) -> Result<GeneratedDecision, GovernanceError> {
        let policy = self.governor.policy_for(agent);

        if !policy.ai_enabled {
            return Ok(self.fallback(agent, "disabled", "disabled", context, fallback, None));
        }

        let prompt = match template.render(context) {
            Ok(prompt) => prompt,
            Err(err @ GovernanceError::TemplateValidation { .. }) => {
                if policy.fallback_to_rules {
                    return Ok(self.fallback(
                        agent,
                        format!("missing fields: {err}"),
                        "missing_fields",
                        context,
                        fallback,
                        None,
                    ));
                }
                return Err(err);
            }
            Err(other) => return Err(other),
        };

        self.metrics.inc_counter("ai_calls_total", &[("agent", agent)]);
        let response = match self.llm.generate(&prompt, &GenerateOptions::default()).await {
            Ok(response) => response,
            Err(err) => {
                self.metrics.inc_counter("ai_errors_total", &[("agent", agent)]);
                if policy.fallback_to_rules {
                    return Ok(self.fallback(
                        agent,
                        format!("AI error: {err}"),
                        "ai_error",
                        context,
                        fallback,
                        None,
                    ));
                }
                return Err(err.into());
            }
        };

        self.metrics
            .add_counter("ai_tokens_total", &[("agent", agent)], response.tokens.total as u64);
        self.metrics
            .observe("ai_cost_usd", &[("agent", agent)], response.cost_usd);
        self.metrics
            .observe("ai_latency_ms", &[("agent", agent)], response.latency_ms as f64);

        let ai = AiMetadata {
            model: response.model.clone(),
            confidence: response.confidence,
            tokens: response.tokens,
            cost_usd: response.cost_usd,
            latency_ms: response.latency_ms,
        };

        if response.confidence < policy.confidence_threshold {
            if policy.fallback_to_rules {
                return Ok(self.fallback(
                    agent,
                    format!(
                        "low confidence: {:.2} < {:.2}",
                        response.confidence, policy.confidence_threshold
                    ),
                    "low_confidence",
                    context,
                    fallback,
                    Some(ai),
                ));
            }
            return Err(GovernanceError::LowConfidence {
                confidence: response.confidence,
                threshold: policy.confidence_threshold,
            });
        }

        Ok(GeneratedDecision {
            content: response.content,
            reasoning_source: ReasoningSource::Llm,
            fallback_reason: None,
            ai: Some(ai),
        })
    }

    /// Governed generation plus a persisted decision record.
    pub async fn generate_with_decision_record(
        &self,
        agent: &str,
        template: &PromptTemplate,
        context: &Map<String, Value>,
        fallback: FallbackFn<'_>,
        trigger: TriggerInfo,
    ) -> Result<(GeneratedDecision, DecisionRecord), GovernanceError> {
        let generated = self
            .generate_with_governance(agent, template, context, fallback)
            .await?;

        let mut record = DecisionRecord::new(
            agent,
            trigger.decision_type.clone(),
            generated.reasoning_source,
            generated.content.clone(),
        )
        .with_trigger(trigger.event_type, trigger.event_id)
        .with_aggregate(trigger.aggregate_type, trigger.aggregate_id)
        .with_context(Value::Object(context.clone()));
        if let Some(ai) = &generated.ai {
            record = record.with_ai(ai.clone());
        }

        self.decisions.save(record.clone()).await;
        Ok((generated, record))
    }

    /// Record a rule/heuristic decision that never touched the LLM.
    pub async fn create_decision_record(
        &self,
        agent: &str,
        reasoning_source: ReasoningSource,
        content: impl Into<String>,
        trigger: TriggerInfo,
        context: Value,
    ) -> DecisionRecord {
        let record = DecisionRecord::new(
            agent,
            trigger.decision_type.clone(),
            reasoning_source,
            content,
        )
        .with_trigger(trigger.event_type, trigger.event_id)
        .with_aggregate(trigger.aggregate_type, trigger.aggregate_id)
        .with_context(context);

        self.decisions.save(record.clone()).await;
        record
    }
}
