use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::company::Company;
use crate::models::placement::PlacedStudentRecord;
use crate::models::student::{AuthoritativeRosterRecord, RosterUpload};
use crate::pipeline::identity::HasIdentity;
use crate::store::{check_placement_conflicts, PlacementBatch, PlacementStore, StoreError};

#[derive(Debug, Default)]
struct MemoryState {
    companies: HashMap<Uuid, Company>,
    uploads: Vec<RosterUpload>,
    /// (institution, record)
    roster: Vec<(String, AuthoritativeRosterRecord)>,
    placed: Vec<PlacedStudentRecord>,
}

/// In-process store with the same atomicity as [`super::postgres::PgStore`]:
/// a placement batch is checked and applied under one write lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total placed records across all colleges.
    #[cfg(test)]
    pub async fn placed_len(&self) -> usize {
        self.state.read().await.placed.len()
    }
}

#[async_trait]
impl PlacementStore for MemoryStore {
    async fn create_company(&self, company: &Company) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.companies.insert(company.id, company.clone());
        Ok(())
    }

    async fn get_company(&self, id: Uuid) -> Result<Option<Company>, StoreError> {
        Ok(self.state.read().await.companies.get(&id).cloned())
    }

    async fn save_round_state(&self, company: &Company) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let stored = state
            .companies
            .get_mut(&company.id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "company",
                id: company.id.to_string(),
            })?;
        stored.round_status = company.round_status.clone();
        stored.round_selections = company.round_selections.clone();
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn insert_upload(&self, upload: RosterUpload) -> Result<RosterUpload, StoreError> {
        let stored = RosterUpload {
            uploaded_at: Utc::now(),
            ..upload
        };
        self.state.write().await.uploads.push(stored.clone());
        Ok(stored)
    }

    async fn list_uploads(&self, company_code: &str) -> Result<Vec<RosterUpload>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .uploads
            .iter()
            .filter(|u| u.company_code == company_code)
            .cloned()
            .collect())
    }

    async fn upsert_roster(
        &self,
        institution: &str,
        records: &[AuthoritativeRosterRecord],
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        for record in records {
            let position = state
                .roster
                .iter()
                .position(|(inst, existing)| inst == institution && existing.id == record.id);
            match position {
                Some(pos) => {
                    let existing = &mut state.roster[pos].1;
                    let (is_placed, placement) = (existing.is_placed, existing.placement.take());
                    *existing = AuthoritativeRosterRecord {
                        is_placed,
                        placement,
                        ..record.clone()
                    };
                }
                None => state.roster.push((
                    institution.to_string(),
                    AuthoritativeRosterRecord {
                        is_placed: false,
                        placement: None,
                        ..record.clone()
                    },
                )),
            }
        }
        Ok(())
    }

    async fn list_roster(
        &self,
        institution: &str,
    ) -> Result<Vec<AuthoritativeRosterRecord>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .roster
            .iter()
            .filter(|(inst, _)| inst == institution)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn list_placed(&self, college: &str) -> Result<Vec<PlacedStudentRecord>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .placed
            .iter()
            .filter(|p| p.college == college)
            .cloned()
            .collect())
    }

    async fn commit_placements(&self, batch: PlacementBatch) -> Result<(), StoreError> {
        let mut state = self.state.write().await;

        // Validate everything before touching state.
        check_placement_conflicts(state.placed.iter(), &batch)?;
        for entry in &batch.entries {
            let roster_record = state.roster.iter().find(|(inst, r)| {
                inst == &batch.institution && r.id == entry.roster_record_id
            });
            match roster_record {
                None => {
                    return Err(StoreError::NotFound {
                        entity: "training roster record",
                        id: entry.roster_record_id.to_string(),
                    })
                }
                Some((_, r)) if r.is_placed => {
                    warn!(
                        "Roster record {} is already flagged placed; rejecting batch",
                        r.id
                    );
                    return Err(StoreError::PlacementConflict {
                        college: entry.record.college.clone(),
                        identity: entry.record.identity().key().to_string(),
                    });
                }
                Some(_) => {}
            }
        }

        for entry in batch.entries.iter() {
            if let Some((_, roster_record)) = state.roster.iter_mut().find(|(inst, r)| {
                inst == &batch.institution && r.id == entry.roster_record_id
            }) {
                roster_record.is_placed = true;
                roster_record.placement = Some(entry.record.clone());
            }
            state.placed.push(entry.record.clone());
        }

        debug!(
            "Committed placement batch of {} for {}",
            batch.len(),
            batch.institution
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::placement::PlacementStatus;
    use crate::store::PlacementEntry;
    use chrono::NaiveDate;

    fn placed(name: &str, email: &str, college: &str) -> PlacedStudentRecord {
        PlacedStudentRecord {
            id: Uuid::new_v4(),
            student_name: name.to_string(),
            email: email.to_string(),
            college: college.to_string(),
            company_id: Uuid::new_v4(),
            company_name: "Acme".to_string(),
            job_designation: "Engineer".to_string(),
            salary: Some(6.5),
            placed_date: NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
            status: PlacementStatus::Placed,
        }
    }

    async fn seeded() -> (MemoryStore, AuthoritativeRosterRecord, AuthoritativeRosterRecord) {
        let store = MemoryStore::new();
        let asha = AuthoritativeRosterRecord::new("Asha", "a@x.com");
        let ravi = AuthoritativeRosterRecord::new("Ravi", "r@x.com");
        store
            .upsert_roster("X", &[asha.clone(), ravi.clone()])
            .await
            .unwrap();
        (store, asha, ravi)
    }

    #[tokio::test]
    async fn test_commit_flags_roster_and_appends_directory() {
        let (store, asha, _) = seeded().await;
        let batch = PlacementBatch {
            institution: "X".to_string(),
            entries: vec![PlacementEntry {
                roster_record_id: asha.id,
                record: placed("Asha", "a@x.com", "X"),
            }],
        };
        store.commit_placements(batch).await.unwrap();

        assert_eq!(store.list_placed("X").await.unwrap().len(), 1);
        let roster = store.list_roster("X").await.unwrap();
        let flagged = roster.iter().find(|r| r.id == asha.id).unwrap();
        assert!(flagged.is_placed);
        assert!(flagged.placement.is_some());
    }

    #[tokio::test]
    async fn test_conflict_rejects_whole_batch() {
        let (store, asha, ravi) = seeded().await;
        store
            .commit_placements(PlacementBatch {
                institution: "X".to_string(),
                entries: vec![PlacementEntry {
                    roster_record_id: asha.id,
                    record: placed("Asha", "a@x.com", "X"),
                }],
            })
            .await
            .unwrap();

        // Ravi is new, Asha conflicts: neither may be written.
        let err = store
            .commit_placements(PlacementBatch {
                institution: "X".to_string(),
                entries: vec![
                    PlacementEntry {
                        roster_record_id: ravi.id,
                        record: placed("Ravi", "r@x.com", "X"),
                    },
                    PlacementEntry {
                        roster_record_id: asha.id,
                        record: placed("Asha", " A@X.COM", "X"),
                    },
                ],
            })
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::PlacementConflict { .. }));
        assert_eq!(store.placed_len().await, 1);
        let roster = store.list_roster("X").await.unwrap();
        assert!(!roster.iter().find(|r| r.id == ravi.id).unwrap().is_placed);
    }

    #[tokio::test]
    async fn test_email_keyed_batch_conflicts_with_name_keyed_placement() {
        let store = MemoryStore::new();
        let emailless = AuthoritativeRosterRecord::new("Asha", "");
        let other_row = AuthoritativeRosterRecord::new("Asha", "a@x.com");
        store
            .upsert_roster("X", &[emailless.clone(), other_row.clone()])
            .await
            .unwrap();
        store
            .commit_placements(PlacementBatch {
                institution: "X".to_string(),
                entries: vec![PlacementEntry {
                    roster_record_id: emailless.id,
                    record: placed("Asha", "", "X"),
                }],
            })
            .await
            .unwrap();

        let err = store
            .commit_placements(PlacementBatch {
                institution: "X".to_string(),
                entries: vec![PlacementEntry {
                    roster_record_id: other_row.id,
                    record: placed("Asha", "a@x.com", "X"),
                }],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::PlacementConflict { .. }));
        assert_eq!(store.placed_len().await, 1);
    }

    #[tokio::test]
    async fn test_flagged_roster_record_cannot_be_placed_again() {
        let (store, asha, _) = seeded().await;
        let commit = |college: &str| PlacementBatch {
            institution: "X".to_string(),
            entries: vec![PlacementEntry {
                roster_record_id: asha.id,
                record: placed("Asha", "a@x.com", college),
            }],
        };
        store.commit_placements(commit("X")).await.unwrap();

        // Different college, so only the roster flag can refuse it.
        let err = store.commit_placements(commit("Y")).await.unwrap_err();
        assert!(matches!(err, StoreError::PlacementConflict { .. }));
        assert_eq!(store.placed_len().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_roster_record_rejects_whole_batch() {
        let (store, asha, _) = seeded().await;
        let err = store
            .commit_placements(PlacementBatch {
                institution: "X".to_string(),
                entries: vec![
                    PlacementEntry {
                        roster_record_id: asha.id,
                        record: placed("Asha", "a@x.com", "X"),
                    },
                    PlacementEntry {
                        roster_record_id: Uuid::new_v4(),
                        record: placed("Ghost", "g@x.com", "X"),
                    },
                ],
            })
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::NotFound { .. }));
        assert_eq!(store.placed_len().await, 0);
    }

    #[tokio::test]
    async fn test_upsert_preserves_placement_flag() {
        let (store, asha, _) = seeded().await;
        store
            .commit_placements(PlacementBatch {
                institution: "X".to_string(),
                entries: vec![PlacementEntry {
                    roster_record_id: asha.id,
                    record: placed("Asha", "a@x.com", "X"),
                }],
            })
            .await
            .unwrap();

        let renamed = AuthoritativeRosterRecord {
            student_name: "Asha Rao".to_string(),
            ..asha.clone()
        };
        store.upsert_roster("X", &[renamed]).await.unwrap();

        let roster = store.list_roster("X").await.unwrap();
        let record = roster.iter().find(|r| r.id == asha.id).unwrap();
        assert_eq!(record.student_name, "Asha Rao");
        assert!(record.is_placed);
    }

    #[tokio::test]
    async fn test_save_round_state_requires_existing_company() {
        let store = MemoryStore::new();
        let company = Company::new("Acme", "X", "Engineer", None, vec!["One".into()]);
        let err = store.save_round_state(&company).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }
}
