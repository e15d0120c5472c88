//! Concord-Arbiter: Conflict Resolution for Agent Proposals
//!
//! Agents submit proposals against targets; the detector groups pending
//! proposals by target and opens conflicts; a policy-driven arbiter selects
//! winners, suppresses losers, vetoes disallowed proposals and escalates to
//! humans when the policy demands it.
//!
//! # Pipeline
//!
//! ```text
//! submit ──► pending proposals ──► ConflictDetectionService
//!                                        │
//!                              conflicts + unconflicted
//!                                        ▼
//!                               ArbitrationService
//!                     veto check ─► escalation check ─► strategy
//!                                        │
//!                  decision persisted, statuses updated, events emitted
//! ```

pub mod arbitration;
pub mod conflict;
pub mod decision;
pub mod error;
pub mod escalation;
pub mod policy;
pub mod proposal;
pub mod repository;
pub mod types;

pub use arbitration::{ArbitrationService, PreferenceLockProbe};
pub use conflict::ConflictDetectionService;
pub use decision::{
    ArbitrationDecision, ArbitrationOutcome, DecisionFactor, FactorImpact,
};
pub use error::ArbiterError;
pub use escalation::EscalationApprovalService;
pub use policy::{
    ArbitrationPolicy, EscalationRule, PolicyScope, ResolutionStrategy, VetoCondition, VetoRule,
    Weights,
};
pub use proposal::{AgentProposalService, ProposalInput};
pub use repository::{
    ArbitrationDecisionRepository, ArbitrationPolicyRepository, ConflictRepository,
    InMemoryArbitrationDecisionRepository, InMemoryArbitrationPolicyRepository,
    InMemoryConflictRepository, InMemoryProposalRepository, ProposalRepository,
};
pub use types::{AgentActionProposal, Conflict, ConflictType, ProposalStatus, TargetRef};
