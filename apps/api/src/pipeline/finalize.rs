//! Finalization Committer — turns a final-round selection into placements.
//!
//! Every run re-reads the training roster and the placed directory right
//! before building its batch, so a retry after a failed or partial attempt
//! only ever adds students that are still unplaced. The batch itself is
//! committed by the store in one atomic write with a per-identity conditional
//! check, which closes the gap between two operators finalizing the same
//! student for different companies.

use std::collections::HashSet;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::company::Company;
use crate::models::placement::{PlacedStudentRecord, PlacementStatus};
use crate::models::student::{institution_partition, StudentRef};
use crate::pipeline::directory::PlacementDirectory;
use crate::pipeline::error::PipelineError;
use crate::pipeline::identity::{HasIdentity, IdentityIndex, IdentityMap};
use crate::store::{PlacementBatch, PlacementEntry, PlacementStore};

/// User-facing outcome of a finalization run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FinalizeSummary {
    pub company_id: Uuid,
    pub created: usize,
    pub skipped: usize,
    pub unresolved: usize,
    pub placed_students: Vec<StudentRef>,
    /// Already placed at this college, or repeated within the selection.
    pub skipped_students: Vec<StudentRef>,
    /// Not found on the training roster; nothing was written for them.
    pub unresolved_students: Vec<StudentRef>,
    pub message: String,
}

impl FinalizeSummary {
    fn describe(&self) -> String {
        let mut message = format!(
            "{} newly placed, {} skipped as already placed",
            self.created, self.skipped
        );
        if self.unresolved > 0 {
            message.push_str(&format!(
                ", {} not found on the training roster",
                self.unresolved
            ));
        }
        message
    }
}

pub struct FinalizationCommitter<'a> {
    store: &'a dyn PlacementStore,
}

impl<'a> FinalizationCommitter<'a> {
    pub fn new(store: &'a dyn PlacementStore) -> Self {
        Self { store }
    }

    pub async fn finalize(
        &self,
        company: &Company,
        selections: &[StudentRef],
    ) -> Result<FinalizeSummary, PipelineError> {
        let store_err = |e| PipelineError::store(company.id, e);
        let institution = institution_partition(&company.college);

        // 1. Fresh training roster, resolved by identity.
        let roster = self.store.list_roster(&institution).await.map_err(store_err)?;
        let mut roster_by_identity: IdentityMap<usize> = IdentityMap::new();
        for (i, record) in roster.iter().enumerate() {
            roster_by_identity.insert(&record.identity(), i);
        }

        // 2. Authoritative directory check, read immediately before the write.
        let placed = PlacementDirectory::new(self.store)
            .snapshot(&company.college)
            .await
            .map_err(store_err)?;

        let placed_date = Utc::now().date_naive();
        let mut summary = FinalizeSummary {
            company_id: company.id,
            ..Default::default()
        };
        let mut batch = PlacementBatch::new(&institution);
        let mut in_batch = IdentityIndex::new();
        let mut batched_records: HashSet<Uuid> = HashSet::new();

        for selected in selections {
            let identity = selected.identity();
            if in_batch.contains(&identity) || placed.is_already_placed(selected) {
                summary.skipped_students.push(selected.clone());
                continue;
            }

            let Some(&i) = roster_by_identity.get(&identity) else {
                summary.unresolved_students.push(selected.clone());
                continue;
            };
            let record = &roster[i];
            // Flagged on the roster without a directory entry here, or a
            // second ref resolving to a student already in this batch.
            if record.is_placed || !batched_records.insert(record.id) {
                summary.skipped_students.push(selected.clone());
                continue;
            }

            in_batch.insert(&identity);
            let email = if record.email.trim().is_empty() {
                selected.email.clone()
            } else {
                record.email.clone()
            };
            batch.entries.push(PlacementEntry {
                roster_record_id: record.id,
                record: PlacedStudentRecord {
                    id: Uuid::new_v4(),
                    student_name: record.student_name.clone(),
                    email: email.clone(),
                    college: company.college.clone(),
                    company_id: company.id,
                    company_name: company.company_name.clone(),
                    job_designation: company.job_designation.clone(),
                    salary: company.salary,
                    placed_date,
                    status: PlacementStatus::Placed,
                },
            });
            summary.placed_students.push(StudentRef {
                student_name: record.student_name.clone(),
                email,
                upload_id: selected.upload_id,
                roster_record_id: Some(record.id),
            });
        }

        // 3 + 4. One all-or-nothing write.
        debug!(
            company_id = %company.id,
            batch = batch.len(),
            "Committing placement batch"
        );
        self.store.commit_placements(batch).await.map_err(store_err)?;

        summary.created = summary.placed_students.len();
        summary.skipped = summary.skipped_students.len();
        summary.unresolved = summary.unresolved_students.len();
        summary.message = summary.describe();

        info!(
            company_id = %company.id,
            created = summary.created,
            skipped = summary.skipped,
            unresolved = summary.unresolved,
            "Finalized placements for {}",
            company.company_name
        );
        Ok(summary)
    }
}
