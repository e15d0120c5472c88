//! Learning error kinds.

use thiserror::Error;
use uuid::Uuid;

use concord_registry::RegistryError;

#[derive(Debug, Error)]
pub enum LearningError {
    #[error("invalid preference value: {0}")]
    InvalidPreferenceValue(#[from] RegistryError),

    #[error("decision record not found")]
    DecisionNotFound(Uuid),

    #[error("suggestion {id} not found for agent '{agent}'")]
    SuggestionNotFound { agent: String, id: Uuid },

    #[error("suggestion {id} is not pending")]
    IllegalStatusTransition { id: Uuid },

    #[error("agent '{agent}' has no preference '{key}'")]
    PreferenceNotFound { agent: String, key: String },

    #[error("feedback already recorded for decision {0}")]
    FeedbackAlreadyRecorded(Uuid),
}
