use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::company::{Company, RoundStatus};
use crate::models::placement::PlacedStudentRecord;
use crate::models::student::{
    institution_partition, AuthoritativeRosterRecord, RosterUpload, StudentRef,
};
use crate::notify::{EligibleListEvent, EligibleListNotifier};
use crate::pipeline::directory::PlacementDirectory;
use crate::pipeline::eligibility::{self, Recovery};
use crate::pipeline::error::PipelineError;
use crate::pipeline::finalize::{FinalizationCommitter, FinalizeSummary};
use crate::pipeline::identity::{normalize_record, normalize_upload_row};
use crate::pipeline::matcher::{match_rosters, MatchReport};
use crate::pipeline::rounds::{self, RoundCommand, SelectionOutcome, TransitionEffect};
use crate::store::{PlacementStore, StoreError};

#[derive(Debug, Clone, Serialize)]
pub struct TransitionOutcome {
    pub company_id: Uuid,
    pub round_index: usize,
    pub previous: RoundStatus,
    pub current: RoundStatus,
    /// Present when this transition completed the last round.
    pub finalization: Option<FinalizeSummary>,
    /// Size of the eligible list announced when the round opened.
    pub announced: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    pub upload_id: Uuid,
    pub rows: usize,
    /// Rows with neither a name nor an email; not stored.
    pub blank_rows: usize,
    pub report: MatchReport,
}

/// Runs the reconciliation engine against the store. Holds no state of its
/// own; every call reads what it needs fresh.
#[derive(Clone)]
pub struct PlacementPipeline {
    store: Arc<dyn PlacementStore>,
    notifier: Arc<dyn EligibleListNotifier>,
}

impl PlacementPipeline {
    pub fn new(store: Arc<dyn PlacementStore>, notifier: Arc<dyn EligibleListNotifier>) -> Self {
        Self { store, notifier }
    }

    pub async fn create_company(&self, company: Company) -> Result<Company, PipelineError> {
        self.store
            .create_company(&company)
            .await
            .map_err(|e| PipelineError::store(company.id, e))?;
        Ok(company)
    }

    pub async fn load_company(&self, company_id: Uuid) -> Result<Company, PipelineError> {
        self.store
            .get_company(company_id)
            .await
            .map_err(|e| PipelineError::store(company_id, e))?
            .ok_or(PipelineError::CompanyNotFound(company_id))
    }

    /// Normalizes already-parsed spreadsheet rows, stores them as one upload,
    /// and returns the refreshed match report for the company.
    pub async fn ingest_upload(
        &self,
        company_id: Uuid,
        rows: &[Map<String, Value>],
    ) -> Result<UploadOutcome, PipelineError> {
        let company = self.load_company(company_id).await?;
        let upload_id = Uuid::new_v4();
        let (identified, blank): (Vec<_>, Vec<_>) = rows
            .iter()
            .partition(|row| !normalize_record(row).is_empty());
        if !blank.is_empty() {
            warn!(
                company_id = %company_id,
                "Dropping {} upload rows with neither a name nor an email",
                blank.len()
            );
        }
        let students = identified
            .into_iter()
            .map(|row| normalize_upload_row(row, upload_id, &company.college))
            .collect();

        let upload = self
            .store
            .insert_upload(RosterUpload {
                id: upload_id,
                company_code: company.company_code(),
                college: company.college.clone(),
                students,
                uploaded_at: Utc::now(),
            })
            .await
            .map_err(|e| PipelineError::store(company_id, e))?;

        let report = self.match_report(&company).await?;
        info!(
            company_id = %company_id,
            upload_id = %upload.id,
            rows = upload.students.len(),
            matched = report.matched_count(),
            unmatched = report.unmatched_count(),
            "Ingested roster upload"
        );
        Ok(UploadOutcome {
            upload_id: upload.id,
            rows: upload.students.len(),
            blank_rows: blank.len(),
            report,
        })
    }

    /// Matches every upload for the company's college against the training
    /// roster. Repeated students across uploads collapse to their first row.
    pub async fn match_report(&self, company: &Company) -> Result<MatchReport, PipelineError> {
        let store_err = |e| PipelineError::store(company.id, e);

        let uploaded: Vec<_> = self
            .store
            .list_uploads(&company.company_code())
            .await
            .map_err(store_err)?
            .into_iter()
            .filter(|upload| upload.college == company.college)
            .flat_map(|upload| upload.students)
            .collect();
        let authoritative = self
            .store
            .list_roster(&institution_partition(&company.college))
            .await
            .map_err(store_err)?;

        let mut report = match_rosters(uploaded, &authoritative);
        let repeated = report.dedup_matched();
        if repeated > 0 {
            info!(
                company_id = %company.id,
                "Collapsed {repeated} students repeated across uploads"
            );
        }
        Ok(report)
    }

    pub async fn eligible_for(
        &self,
        company_id: Uuid,
        round_index: usize,
        recovery: Recovery<'_>,
    ) -> Result<Vec<StudentRef>, PipelineError> {
        let company = self.load_company(company_id).await?;
        self.eligible_for_company(&company, round_index, recovery)
            .await
    }

    async fn eligible_for_company(
        &self,
        company: &Company,
        round_index: usize,
        recovery: Recovery<'_>,
    ) -> Result<Vec<StudentRef>, PipelineError> {
        eligibility::check_round(company, round_index)?;
        let matched = self.match_report(company).await?;
        // Advisory check for the operator's list; finalization re-checks.
        let placed = PlacementDirectory::new(self.store.as_ref())
            .snapshot(&company.college)
            .await
            .map_err(|e| PipelineError::store(company.id, e))?;
        eligibility::eligible_for(company, round_index, &matched, &placed, recovery)
    }

    pub async fn record_selection(
        &self,
        company_id: Uuid,
        round_index: usize,
        selected: &[StudentRef],
    ) -> Result<SelectionOutcome, PipelineError> {
        let mut company = self.load_company(company_id).await?;
        let eligible = self
            .eligible_for_company(&company, round_index, Recovery::None)
            .await?;
        let outcome = rounds::record_selection(&mut company, round_index, selected, &eligible)?;
        self.store
            .save_round_state(&company)
            .await
            .map_err(|e| PipelineError::store(company_id, e))?;
        Ok(outcome)
    }

    /// Applies an operator command to a round.
    ///
    /// Completing the last round finalizes its persisted selection first and
    /// only then stores the new status, so a failed finalization leaves the
    /// round where it was and the command can simply be retried.
    pub async fn transition_round(
        &self,
        company_id: Uuid,
        round_index: usize,
        command: RoundCommand,
    ) -> Result<TransitionOutcome, PipelineError> {
        let mut company = self.load_company(company_id).await?;
        let plan = rounds::plan_transition(&company, round_index, command)?;

        let finalization = match &plan.effect {
            TransitionEffect::Finalize(selection) => Some(
                FinalizationCommitter::new(self.store.as_ref())
                    .finalize(&company, selection)
                    .await?,
            ),
            _ => None,
        };

        rounds::apply_status(&mut company, &plan);
        self.store
            .save_round_state(&company)
            .await
            .map_err(|e| PipelineError::store(company_id, e))?;
        info!(
            company_id = %company_id,
            round_index,
            "Round '{}' moved {} -> {}",
            company.hiring_rounds[round_index],
            plan.previous,
            plan.next
        );

        let announced = match plan.effect {
            TransitionEffect::AnnounceEligible => self.announce(&company, round_index).await,
            _ => None,
        };

        Ok(TransitionOutcome {
            company_id,
            round_index,
            previous: plan.previous,
            current: plan.next,
            finalization,
            announced,
        })
    }

    /// Re-runs finalization for the last round's persisted selection.
    /// Safe to repeat: already placed students are reported as skipped.
    pub async fn finalize(&self, company_id: Uuid) -> Result<FinalizeSummary, PipelineError> {
        let company = self.load_company(company_id).await?;
        let last = company
            .last_round_index()
            .ok_or(PipelineError::RoundOutOfRange {
                company_id,
                round_index: 0,
                round_count: 0,
            })?;
        let selection = match company.selection_for(last) {
            Some(selection) if !selection.is_empty() => selection.to_vec(),
            _ => {
                return Err(PipelineError::NoStudentsSelected {
                    company_id,
                    round_index: last,
                })
            }
        };
        FinalizationCommitter::new(self.store.as_ref())
            .finalize(&company, &selection)
            .await
    }

    pub async fn load_training_roster(
        &self,
        institution: &str,
        records: &[AuthoritativeRosterRecord],
    ) -> Result<(), StoreError> {
        self.store.upsert_roster(institution, records).await
    }

    pub async fn list_placed(&self, college: &str) -> Result<Vec<PlacedStudentRecord>, StoreError> {
        self.store.list_placed(college).await
    }

    /// Publishes the eligible list for a round that just opened. Failures are
    /// logged and swallowed; the dispatcher is not on the critical path.
    async fn announce(&self, company: &Company, round_index: usize) -> Option<usize> {
        let students = match self
            .eligible_for_company(company, round_index, Recovery::None)
            .await
        {
            Ok(students) => students,
            Err(e) => {
                warn!("Could not resolve eligible list for announcement: {e}");
                return None;
            }
        };

        let event = EligibleListEvent {
            company_id: company.id,
            company_name: company.company_name.clone(),
            college: company.college.clone(),
            round_index,
            round_name: company.hiring_rounds[round_index].clone(),
            students,
            emitted_at: Utc::now(),
        };
        match self.notifier.publish(&event).await {
            Ok(()) => Some(event.students.len()),
            Err(e) => {
                warn!(
                    company_id = %company.id,
                    round_index,
                    "Eligible list not delivered to dispatcher: {e}"
                );
                None
            }
        }
    }
}
