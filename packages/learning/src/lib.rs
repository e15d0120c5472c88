//! Concord-Learning: Agent Learning Profiles
//!
//! What each agent has learned about the user: validated preferences,
//! feedback history, pending suggestions and the full change history.
//! Feedback flows in through [`FeedbackCaptureService`], suggestion
//! analysis turns it into [`SuggestedPreference`]s, and approvals write
//! preferences back through the registry-validated profile service.

pub mod approval;
pub mod audit;
pub mod error;
pub mod feedback;
pub mod profile;
pub mod repository;
pub mod service;
pub mod suggestion;

pub use approval::SuggestionApprovalService;
pub use audit::{AuditSummary, PreferenceAuditService, PreferenceComparison};
pub use error::LearningError;
pub use feedback::{FeedbackCaptureConfig, FeedbackCaptureOutcome, FeedbackCaptureService, FeedbackInput};
pub use profile::{
    AgentLearningProfile, FeedbackEntry, PreferenceChange, PreferenceSource, SuggestedPreference,
    SuggestionStatus, UserPreference,
};
pub use repository::{InMemoryLearningProfileRepository, LearningProfileRepository};
pub use service::LearningProfileService;
pub use suggestion::{PreferenceSuggestionService, SuggestionConfig};
