//! Adaptation error kinds.

use thiserror::Error;
use uuid::Uuid;

use concord_learning::LearningError;

#[derive(Debug, Error)]
pub enum AdaptationError {
    #[error(transparent)]
    Learning(#[from] LearningError),

    #[error("attempt {0} not found")]
    AttemptNotFound(Uuid),

    #[error("attempt {0} was not applied; nothing to roll back")]
    NotRollbackable(Uuid),

    #[error("arbitration decision {0} not found")]
    DecisionNotFound(Uuid),

    #[error("invalid preference key '{0}', expected 'category.key'")]
    InvalidPreferenceKey(String),
}
