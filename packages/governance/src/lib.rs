//! Concord-Governance: Policy-Bounded Agent Dispatch
//!
//! Everything an advisory agent does passes through here: per-agent
//! policies, cooldown and suggestion-rate gating, governed LLM generation
//! with rule fallback, decision-record keeping and the circuit breaker
//! around the AI provider.
//!
//! # Architecture
//!
//! ```text
//! domain event ──► AgentDispatcher ──► AdvisoryAgent::handle
//!                      │                     │
//!                  AgentGovernor         ActionDraft ──► ProposalSink
//!                  (cooldowns, caps)
//!
//! GovernedGenerator ──► CircuitBreaker ──► LlmClient
//!        │ fallback on failure / low confidence
//!        └──► DecisionRecordRepository
//! ```

pub mod breaker;
pub mod decision;
pub mod dispatch;
pub mod error;
pub mod generation;
pub mod governor;
pub mod llm;
pub mod policy;
pub mod template;

pub use breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState, GuardedLlmClient};
pub use decision::{
    AiMetadata, DecisionOutcome, DecisionRecord, DecisionRecordRepository,
    InMemoryDecisionRecordRepository, ReasoningSource,
};
pub use dispatch::{ActionDraft, AdvisoryAgent, AgentDispatcher, DispatchSummary, ProposalSink};
pub use error::GovernanceError;
pub use generation::{GeneratedDecision, GovernedGenerator, TriggerInfo};
pub use governor::AgentGovernor;
pub use llm::{GenerateOptions, LlmClient, LlmError, LlmResponse, MockLlmClient, TokenUsage};
pub use policy::{AgentKind, AgentPolicy};
pub use template::PromptTemplate;
