//! Persistence seam for the placement pipeline.
//!
//! The engine talks to a hierarchical document store through
//! [`PlacementStore`]. `AppState` holds an `Arc<dyn PlacementStore>`:
//! [`postgres::PgStore`] in production, [`memory::MemoryStore`] for tests and
//! local runs.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::models::company::Company;
use crate::models::placement::PlacedStudentRecord;
use crate::models::student::{AuthoritativeRosterRecord, RosterUpload};
use crate::pipeline::identity::{HasIdentity, IdentityIndex};

pub mod memory;
pub mod postgres;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// The conditional placement write found an existing placement for this
    /// identity. Nothing from the batch was written.
    #[error("Student '{identity}' is already placed at college '{college}'")]
    PlacementConflict { college: String, identity: String },

    #[error("Stored {entity} is invalid: {detail}")]
    Corrupt { entity: &'static str, detail: String },
}

/// One student to be placed: the directory record plus the training-roster
/// entry to flag.
#[derive(Debug, Clone)]
pub struct PlacementEntry {
    pub roster_record_id: Uuid,
    pub record: PlacedStudentRecord,
}

/// Every write of one finalization. Applied all-or-nothing.
#[derive(Debug, Clone, Default)]
pub struct PlacementBatch {
    pub institution: String,
    pub entries: Vec<PlacementEntry>,
}

impl PlacementBatch {
    pub fn new(institution: impl Into<String>) -> Self {
        Self {
            institution: institution.into(),
            entries: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[async_trait]
pub trait PlacementStore: Send + Sync {
    async fn create_company(&self, company: &Company) -> Result<(), StoreError>;

    async fn get_company(&self, id: Uuid) -> Result<Option<Company>, StoreError>;

    /// Persists `round_status` and `round_selections` of an existing company.
    async fn save_round_state(&self, company: &Company) -> Result<(), StoreError>;

    /// Stores an upload; the returned copy carries the server timestamp.
    async fn insert_upload(&self, upload: RosterUpload) -> Result<RosterUpload, StoreError>;

    async fn list_uploads(&self, company_code: &str) -> Result<Vec<RosterUpload>, StoreError>;

    /// Inserts or refreshes training-roster rows. Placement flags are preserved.
    async fn upsert_roster(
        &self,
        institution: &str,
        records: &[AuthoritativeRosterRecord],
    ) -> Result<(), StoreError>;

    async fn list_roster(
        &self,
        institution: &str,
    ) -> Result<Vec<AuthoritativeRosterRecord>, StoreError>;

    /// Fresh read of the placed directory for one college.
    async fn list_placed(&self, college: &str) -> Result<Vec<PlacedStudentRecord>, StoreError>;

    /// Atomically appends every placement and flags the roster entries.
    /// Rejects the whole batch with [`StoreError::PlacementConflict`] if any
    /// identity is already placed at the college.
    async fn commit_placements(&self, batch: PlacementBatch) -> Result<(), StoreError>;
}

/// The conditional half of `commit_placements`, shared by every store.
///
/// `placed` must be read under the same lock or transaction the batch is
/// written in. Rejects the batch when any entry's identity matches a placed
/// student at its college, or when two entries target one identity or one
/// training-roster record.
pub fn check_placement_conflicts<'a>(
    placed: impl IntoIterator<Item = &'a PlacedStudentRecord>,
    batch: &PlacementBatch,
) -> Result<(), StoreError> {
    let placed: Vec<&PlacedStudentRecord> = placed.into_iter().collect();
    let mut by_college: HashMap<&str, IdentityIndex> = HashMap::new();
    let mut roster_ids = HashSet::new();

    for entry in &batch.entries {
        let college = entry.record.college.as_str();
        let index = by_college.entry(college).or_insert_with(|| {
            placed
                .iter()
                .copied()
                .filter(|p| p.college == college)
                .collect()
        });
        let identity = entry.record.identity();

        if index.contains(&identity) || !roster_ids.insert(entry.roster_record_id) {
            match placed
                .iter()
                .find(|p| p.college == college && p.identity().matches(&identity))
            {
                Some(existing) => warn!(
                    "{identity} already placed at {college} with {}; rejecting batch of {}",
                    existing.company_name,
                    batch.len()
                ),
                None => warn!(
                    "{identity} appears twice in a batch of {} for {college}",
                    batch.len()
                ),
            }
            return Err(StoreError::PlacementConflict {
                college: college.to_string(),
                identity: identity.key().to_string(),
            });
        }
        index.insert(&identity);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::placement::PlacementStatus;
    use chrono::NaiveDate;

    fn placed(name: &str, email: &str, college: &str) -> PlacedStudentRecord {
        PlacedStudentRecord {
            id: Uuid::new_v4(),
            student_name: name.to_string(),
            email: email.to_string(),
            college: college.to_string(),
            company_id: Uuid::new_v4(),
            company_name: "Globex".to_string(),
            job_designation: "Analyst".to_string(),
            salary: None,
            placed_date: NaiveDate::from_ymd_opt(2026, 4, 2).unwrap(),
            status: PlacementStatus::Placed,
        }
    }

    fn batch(records: Vec<PlacedStudentRecord>) -> PlacementBatch {
        PlacementBatch {
            institution: "XI".to_string(),
            entries: records
                .into_iter()
                .map(|record| PlacementEntry {
                    roster_record_id: Uuid::new_v4(),
                    record,
                })
                .collect(),
        }
    }

    #[test]
    fn test_name_keyed_placement_blocks_email_keyed_one() {
        // Keyed "asha" in the directory, "a@x.com" in the batch.
        let existing = vec![placed("Asha", "", "X")];
        let err = check_placement_conflicts(
            existing.iter(),
            &batch(vec![placed("Asha", "a@x.com", "X")]),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            StoreError::PlacementConflict { ref identity, .. } if identity == "a@x.com"
        ));
    }

    #[test]
    fn test_other_college_does_not_conflict() {
        let existing = vec![placed("Asha", "a@x.com", "Y")];
        assert!(check_placement_conflicts(
            existing.iter(),
            &batch(vec![placed("Asha", "a@x.com", "X")])
        )
        .is_ok());
    }

    #[test]
    fn test_same_roster_record_twice_in_batch_conflicts() {
        let roster_record_id = Uuid::new_v4();
        let batch = PlacementBatch {
            institution: "XI".to_string(),
            entries: vec![
                PlacementEntry {
                    roster_record_id,
                    record: placed("Asha", "a@x.com", "X"),
                },
                PlacementEntry {
                    roster_record_id,
                    record: placed("Asha R", "asha.r@x.com", "X"),
                },
            ],
        };
        let err = check_placement_conflicts(std::iter::empty(), &batch).unwrap_err();
        assert!(matches!(err, StoreError::PlacementConflict { .. }));
    }
}
