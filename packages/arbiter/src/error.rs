//! Arbiter error kinds.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ArbiterError {
    #[error("proposal {0} not found")]
    ProposalNotFound(Uuid),

    #[error("conflict {0} not found")]
    ConflictNotFound(Uuid),

    #[error("arbitration decision {0} not found")]
    DecisionNotFound(Uuid),

    #[error("decision {0} is not an open escalation")]
    NotAnOpenEscalation(Uuid),

    #[error("proposal {proposal} was not escalated by decision {decision}")]
    ProposalNotEscalated { decision: Uuid, proposal: Uuid },

    #[error("no proposals to arbitrate")]
    NoProposals,
}
