use thiserror::Error;
use uuid::Uuid;

use crate::models::company::RoundStatus;
use crate::store::StoreError;

/// Errors raised by the reconciliation engine. Every variant carries the
/// company, and where relevant the round and student, so callers can retry or
/// report. Nothing here is retried inside the engine.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Company {0} not found")]
    CompanyNotFound(Uuid),

    #[error("Company {company_id} has no round {round_index} ({round_count} rounds configured)")]
    RoundOutOfRange {
        company_id: Uuid,
        round_index: usize,
        round_count: usize,
    },

    #[error("Round {round_index} of company {company_id} is {status}; selection is closed")]
    RoundClosed {
        company_id: Uuid,
        round_index: usize,
        status: RoundStatus,
    },

    #[error("No students selected for final round {round_index} of company {company_id}")]
    NoStudentsSelected { company_id: Uuid, round_index: usize },

    #[error("Student '{student}' is not eligible for round {round_index} of company {company_id}")]
    NotEligible {
        company_id: Uuid,
        round_index: usize,
        student: String,
    },

    #[error("Placement conflict finalizing company {company_id}: {source}")]
    PlacementConflict {
        company_id: Uuid,
        #[source]
        source: StoreError,
    },

    #[error("Store failure for company {company_id}: {source}")]
    Store {
        company_id: Uuid,
        #[source]
        source: StoreError,
    },
}

impl PipelineError {
    /// Wraps a store error with the company it concerns. Conditional-write
    /// rejections are kept distinct so callers can re-run finalization.
    pub fn store(company_id: Uuid, source: StoreError) -> Self {
        match source {
            StoreError::PlacementConflict { .. } => PipelineError::PlacementConflict {
                company_id,
                source,
            },
            other => PipelineError::Store {
                company_id,
                source: other,
            },
        }
    }
}
