//! Governance error kinds.

use thiserror::Error;
use uuid::Uuid;

use crate::llm::LlmError;

#[derive(Debug, Error)]
pub enum GovernanceError {
    #[error("prompt template '{template}' missing required fields: {missing:?}")]
    TemplateValidation { template: String, missing: Vec<String> },

    #[error("decision record {0} not found")]
    DecisionNotFound(Uuid),

    #[error("outcome already recorded for decision {0}")]
    OutcomeAlreadyRecorded(Uuid),

    #[error("AI response confidence {confidence:.2} below threshold {threshold:.2}")]
    LowConfidence { confidence: f64, threshold: f64 },

    #[error(transparent)]
    Llm(#[from] LlmError),
}
