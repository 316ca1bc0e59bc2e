use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::company::{Company, RoundStatus};
use crate::models::placement::{PlacedStudentRecord, PlacedStudentRow};
use crate::models::student::{
    AuthoritativeRosterRecord, RosterUpload, StudentRef, UploadedStudentRecord,
};
use crate::pipeline::identity::HasIdentity;
use crate::store::{check_placement_conflicts, PlacementBatch, PlacementStore, StoreError};

/// PostgreSQL-backed document store. Each document collection maps to a table;
/// nested arrays and maps live in JSONB columns.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct CompanyRow {
    id: Uuid,
    company_name: String,
    college: String,
    job_designation: String,
    salary: Option<f64>,
    hiring_rounds: Json<Vec<String>>,
    round_status: Json<Vec<RoundStatus>>,
    round_selections: Json<BTreeMap<usize, Vec<StudentRef>>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CompanyRow> for Company {
    fn from(row: CompanyRow) -> Self {
        let mut company = Company {
            id: row.id,
            company_name: row.company_name,
            college: row.college,
            job_designation: row.job_designation,
            salary: row.salary,
            hiring_rounds: row.hiring_rounds.0,
            round_status: row.round_status.0,
            round_selections: row.round_selections.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        };
        company.align_round_status();
        company
    }
}

#[derive(Debug, FromRow)]
struct UploadRow {
    id: Uuid,
    company_code: String,
    college: String,
    students: Json<Vec<UploadedStudentRecord>>,
    uploaded_at: DateTime<Utc>,
}

impl From<UploadRow> for RosterUpload {
    fn from(row: UploadRow) -> Self {
        Self {
            id: row.id,
            company_code: row.company_code,
            college: row.college,
            students: row.students.0,
            uploaded_at: row.uploaded_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct RosterRow {
    id: Uuid,
    student_name: String,
    email: String,
    phone: String,
    course: String,
    specialization: String,
    college: String,
    is_placed: bool,
    placement: Option<Json<PlacedStudentRecord>>,
}

impl From<RosterRow> for AuthoritativeRosterRecord {
    fn from(row: RosterRow) -> Self {
        Self {
            id: row.id,
            student_name: row.student_name,
            email: row.email,
            phone: row.phone,
            course: row.course,
            specialization: row.specialization,
            college: row.college,
            is_placed: row.is_placed,
            placement: row.placement.map(|p| p.0),
        }
    }
}

fn placed_from_row(row: PlacedStudentRow) -> Result<PlacedStudentRecord, StoreError> {
    PlacedStudentRecord::try_from(row).map_err(|detail| StoreError::Corrupt {
        entity: "placed student",
        detail,
    })
}

fn conflict(record: &PlacedStudentRecord) -> StoreError {
    StoreError::PlacementConflict {
        college: record.college.clone(),
        identity: record.identity().key().to_string(),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}

#[async_trait]
impl PlacementStore for PgStore {
    async fn create_company(&self, company: &Company) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO companies
                (id, company_name, college, job_designation, salary,
                 hiring_rounds, round_status, round_selections, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(company.id)
        .bind(&company.company_name)
        .bind(&company.college)
        .bind(&company.job_designation)
        .bind(company.salary)
        .bind(Json(&company.hiring_rounds))
        .bind(Json(&company.round_status))
        .bind(Json(&company.round_selections))
        .bind(company.created_at)
        .bind(company.updated_at)
        .execute(&self.pool)
        .await?;

        info!("Created company {} ({})", company.id, company.company_name);
        Ok(())
    }

    async fn get_company(&self, id: Uuid) -> Result<Option<Company>, StoreError> {
        let row: Option<CompanyRow> = sqlx::query_as("SELECT * FROM companies WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Company::from))
    }

    async fn save_round_state(&self, company: &Company) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE companies
            SET round_status = $1, round_selections = $2, updated_at = now()
            WHERE id = $3
            "#,
        )
        .bind(Json(&company.round_status))
        .bind(Json(&company.round_selections))
        .bind(company.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "company",
                id: company.id.to_string(),
            });
        }
        Ok(())
    }

    async fn insert_upload(&self, upload: RosterUpload) -> Result<RosterUpload, StoreError> {
        // uploaded_at is the server's clock, not the caller's.
        let uploaded_at: DateTime<Utc> = sqlx::query_scalar(
            r#"
            INSERT INTO roster_uploads (id, company_code, college, students)
            VALUES ($1, $2, $3, $4)
            RETURNING uploaded_at
            "#,
        )
        .bind(upload.id)
        .bind(&upload.company_code)
        .bind(&upload.college)
        .bind(Json(&upload.students))
        .fetch_one(&self.pool)
        .await?;

        info!(
            "Stored roster upload {} for {} ({} rows)",
            upload.id,
            upload.company_code,
            upload.students.len()
        );
        Ok(RosterUpload {
            uploaded_at,
            ..upload
        })
    }

    async fn list_uploads(&self, company_code: &str) -> Result<Vec<RosterUpload>, StoreError> {
        let rows: Vec<UploadRow> = sqlx::query_as(
            "SELECT * FROM roster_uploads WHERE company_code = $1 ORDER BY uploaded_at ASC",
        )
        .bind(company_code)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(RosterUpload::from).collect())
    }

    async fn upsert_roster(
        &self,
        institution: &str,
        records: &[AuthoritativeRosterRecord],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(
                r#"
                INSERT INTO training_roster
                    (id, institution, student_name, email, phone, course, specialization, college)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (id) DO UPDATE SET
                    student_name = EXCLUDED.student_name,
                    email = EXCLUDED.email,
                    phone = EXCLUDED.phone,
                    course = EXCLUDED.course,
                    specialization = EXCLUDED.specialization,
                    college = EXCLUDED.college
                "#,
            )
            .bind(record.id)
            .bind(institution)
            .bind(&record.student_name)
            .bind(&record.email)
            .bind(&record.phone)
            .bind(&record.course)
            .bind(&record.specialization)
            .bind(&record.college)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        info!(
            "Upserted {} training roster records for {institution}",
            records.len()
        );
        Ok(())
    }

    async fn list_roster(
        &self,
        institution: &str,
    ) -> Result<Vec<AuthoritativeRosterRecord>, StoreError> {
        let rows: Vec<RosterRow> = sqlx::query_as(
            r#"
            SELECT id, student_name, email, phone, course, specialization, college,
                   is_placed, placement
            FROM training_roster
            WHERE institution = $1
            ORDER BY student_name, id
            "#,
        )
        .bind(institution)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(AuthoritativeRosterRecord::from).collect())
    }

    async fn list_placed(&self, college: &str) -> Result<Vec<PlacedStudentRecord>, StoreError> {
        let rows: Vec<PlacedStudentRow> = sqlx::query_as(
            "SELECT * FROM placed_students WHERE college = $1 ORDER BY created_at ASC",
        )
        .bind(college)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(placed_from_row).collect()
    }

    async fn commit_placements(&self, batch: PlacementBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }

        // Dropping `tx` on any early return rolls the whole batch back.
        let mut tx = self.pool.begin().await?;

        // Serialize commits per college so the check below sees every
        // placement that could conflict. Sorted to keep lock order stable.
        let colleges: Vec<String> = batch
            .entries
            .iter()
            .map(|e| e.record.college.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        for college in &colleges {
            sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
                .bind(college)
                .execute(&mut *tx)
                .await?;
        }

        let placed_rows: Vec<PlacedStudentRow> =
            sqlx::query_as("SELECT * FROM placed_students WHERE college = ANY($1)")
                .bind(&colleges)
                .fetch_all(&mut *tx)
                .await?;
        let placed = placed_rows
            .into_iter()
            .map(placed_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        check_placement_conflicts(placed.iter(), &batch)?;

        for entry in &batch.entries {
            let record = &entry.record;
            let inserted = sqlx::query(
                r#"
                INSERT INTO placed_students
                    (id, student_name, email, college, company_id, company_name,
                     job_designation, salary, placed_date, status)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(record.id)
            .bind(&record.student_name)
            .bind(&record.email)
            .bind(&record.college)
            .bind(record.company_id)
            .bind(&record.company_name)
            .bind(&record.job_designation)
            .bind(record.salary)
            .bind(record.placed_date)
            .bind(record.status.as_str())
            .execute(&mut *tx)
            .await;

            // The unique index backs up the check above.
            if let Err(e) = inserted {
                if is_unique_violation(&e) {
                    warn!(
                        "Placement conflict for {} at {}; rolling back batch of {}",
                        record.identity(),
                        record.college,
                        batch.len()
                    );
                    return Err(conflict(record));
                }
                return Err(e.into());
            }

            let flagged = sqlx::query(
                r#"
                UPDATE training_roster
                SET is_placed = TRUE, placement = $1
                WHERE id = $2 AND institution = $3 AND is_placed = FALSE
                "#,
            )
            .bind(Json(record))
            .bind(entry.roster_record_id)
            .bind(&batch.institution)
            .execute(&mut *tx)
            .await?;

            if flagged.rows_affected() == 0 {
                let exists: Option<bool> = sqlx::query_scalar(
                    "SELECT is_placed FROM training_roster WHERE id = $1 AND institution = $2",
                )
                .bind(entry.roster_record_id)
                .bind(&batch.institution)
                .fetch_optional(&mut *tx)
                .await?;

                return Err(match exists {
                    Some(_) => {
                        warn!(
                            "Roster record {} is already flagged placed; rolling back batch",
                            entry.roster_record_id
                        );
                        conflict(record)
                    }
                    None => StoreError::NotFound {
                        entity: "training roster record",
                        id: entry.roster_record_id.to_string(),
                    },
                });
            }
        }

        tx.commit().await?;
        debug!(
            "Committed placement batch of {} for {}",
            batch.len(),
            batch.institution
        );
        Ok(())
    }
}
