//! Concord-Adaptation: Controlled Preference Adaptation
//!
//! Converts accepted suggestions into preference changes under opt-in,
//! cooldown, rate-limit, confidence, risk-level and per-key lock
//! constraints. Every evaluation leaves an attempt record; applied
//! attempts are reversible.
//!
//! # Attempt lifecycle
//!
//! ```text
//! created ──► applied ──► (rolled back)
//!        ├──► blocked     (terminal)
//!        └──► skipped     (terminal)
//! ```

pub mod attempt;
pub mod engine;
pub mod error;
pub mod policy;
pub mod policy_service;
pub mod rollback;

pub use attempt::{
    AttemptRepository, AttemptResult, AutoAdaptationAttempt, BlockReason,
    InMemoryAttemptRepository, PolicySnapshot,
};
pub use engine::{AutoAdaptationEngine, ProcessOutcome};
pub use error::AdaptationError;
pub use policy::{AdaptationMode, AdaptationPolicy, RateLimit, ScopeRestriction};
pub use policy_service::{
    AdaptationPolicyRepository, AdaptationPolicyService, EnableOptions, EvaluationOutcome,
    InMemoryAdaptationPolicyRepository,
};
pub use rollback::{RollbackOutcome, RollbackService};
