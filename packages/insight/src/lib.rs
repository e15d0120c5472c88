//! Concord-Insight: Explanations and Read-Models
//!
//! Pure, side-effect-free views over the decision plane: a unified
//! explanation for any decision id (arbitration, adaptation attempt or
//! governance decision record) and the projections the admin plane serves.

pub mod explanation;
pub mod projections;

pub use explanation::{
    AlternativeConsidered, ContributingFactor, Explanation, ExplanationService, InsightError,
};
pub use projections::{
    AgentPreferencesView, ArbitrationView, AttemptView, AuditEntry, PreferenceView,
    ProjectionService, SuggestionView,
};
