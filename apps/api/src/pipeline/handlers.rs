//! Axum route handlers for the placement pipeline API.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::company::{Company, RoundStatus};
use crate::models::placement::PlacedStudentRecord;
use crate::models::student::{AuthoritativeRosterRecord, StudentRef};
use crate::pipeline::eligibility::Recovery;
use crate::pipeline::finalize::FinalizeSummary;
use crate::pipeline::matcher::MatchReport;
use crate::pipeline::rounds::{RoundCommand, SelectionOutcome};
use crate::pipeline::service::{TransitionOutcome, UploadOutcome};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateCompanyRequest {
    pub company_name: String,
    pub college: String,
    #[serde(default)]
    pub job_designation: String,
    pub salary: Option<f64>,
    pub hiring_rounds: Vec<String>,
}

/// Rows as parsed from the spreadsheet: one JSON object per row, keyed by the
/// original column headers.
#[derive(Debug, Deserialize)]
pub struct UploadRosterRequest {
    pub rows: Vec<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
pub struct SelectionRequest {
    pub students: Vec<StudentRef>,
}

#[derive(Debug, Deserialize)]
pub struct RecoverEligibleRequest {
    /// The prior round's selection as last seen by the caller.
    pub prior_selection: Vec<StudentRef>,
}

#[derive(Debug, Deserialize)]
pub struct TrainingRosterRequest {
    pub students: Vec<AuthoritativeRosterRecord>,
}

#[derive(Deserialize)]
pub struct CollegeQuery {
    pub college: String,
}

#[derive(Debug, Serialize)]
pub struct EligibleListResponse {
    pub company_id: Uuid,
    pub round_index: usize,
    pub round_name: String,
    pub status: RoundStatus,
    pub students: Vec<StudentRef>,
}

#[derive(Debug, Serialize)]
pub struct RosterReportResponse {
    pub company_id: Uuid,
    pub matched_count: usize,
    pub unmatched_count: usize,
    pub report: MatchReport,
}

#[derive(Debug, Serialize)]
pub struct TrainingRosterResponse {
    pub institution: String,
    pub loaded: usize,
}

#[derive(Debug, Serialize)]
pub struct PlacedListResponse {
    pub college: String,
    pub students: Vec<PlacedStudentRecord>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/companies
pub async fn handle_create_company(
    State(state): State<AppState>,
    Json(request): Json<CreateCompanyRequest>,
) -> Result<(StatusCode, Json<Company>), AppError> {
    if request.company_name.trim().is_empty() {
        return Err(AppError::Validation("company_name cannot be empty".to_string()));
    }
    if request.college.trim().is_empty() {
        return Err(AppError::Validation("college cannot be empty".to_string()));
    }
    if request.hiring_rounds.is_empty() {
        return Err(AppError::Validation(
            "hiring_rounds must name at least one round".to_string(),
        ));
    }
    if request.hiring_rounds.iter().any(|r| r.trim().is_empty()) {
        return Err(AppError::Validation("round names cannot be empty".to_string()));
    }

    let company = Company::new(
        request.company_name.trim(),
        request.college.trim(),
        request.job_designation.trim(),
        request.salary,
        request.hiring_rounds,
    );
    let company = state.pipeline.create_company(company).await?;

    Ok((StatusCode::CREATED, Json(company)))
}

/// GET /api/v1/companies/:id
pub async fn handle_get_company(
    State(state): State<AppState>,
    Path(company_id): Path<Uuid>,
) -> Result<Json<Company>, AppError> {
    Ok(Json(state.pipeline.load_company(company_id).await?))
}

/// POST /api/v1/companies/:id/uploads
///
/// Stores one parsed spreadsheet and returns the refreshed match report.
pub async fn handle_upload_roster(
    State(state): State<AppState>,
    Path(company_id): Path<Uuid>,
    Json(request): Json<UploadRosterRequest>,
) -> Result<(StatusCode, Json<UploadOutcome>), AppError> {
    if request.rows.is_empty() {
        return Err(AppError::Validation("rows cannot be empty".to_string()));
    }

    let outcome = state
        .pipeline
        .ingest_upload(company_id, &request.rows)
        .await?;

    Ok((StatusCode::CREATED, Json(outcome)))
}

/// GET /api/v1/companies/:id/roster
pub async fn handle_roster_report(
    State(state): State<AppState>,
    Path(company_id): Path<Uuid>,
) -> Result<Json<RosterReportResponse>, AppError> {
    let company = state.pipeline.load_company(company_id).await?;
    let report = state.pipeline.match_report(&company).await?;

    Ok(Json(RosterReportResponse {
        company_id,
        matched_count: report.matched_count(),
        unmatched_count: report.unmatched_count(),
        report,
    }))
}

/// GET /api/v1/companies/:id/rounds/:index/eligible
pub async fn handle_get_eligible(
    State(state): State<AppState>,
    Path((company_id, round_index)): Path<(Uuid, usize)>,
) -> Result<Json<EligibleListResponse>, AppError> {
    eligible_response(&state, company_id, round_index, Recovery::None).await
}

/// POST /api/v1/companies/:id/rounds/:index/eligible/recover
///
/// Same as the GET, but when the prior round has no persisted selection the
/// caller's snapshot is used instead of returning an empty list.
pub async fn handle_recover_eligible(
    State(state): State<AppState>,
    Path((company_id, round_index)): Path<(Uuid, usize)>,
    Json(request): Json<RecoverEligibleRequest>,
) -> Result<Json<EligibleListResponse>, AppError> {
    eligible_response(
        &state,
        company_id,
        round_index,
        Recovery::FromSnapshot(&request.prior_selection),
    )
    .await
}

async fn eligible_response(
    state: &AppState,
    company_id: Uuid,
    round_index: usize,
    recovery: Recovery<'_>,
) -> Result<Json<EligibleListResponse>, AppError> {
    let company = state.pipeline.load_company(company_id).await?;
    let students = state
        .pipeline
        .eligible_for(company_id, round_index, recovery)
        .await?;

    Ok(Json(EligibleListResponse {
        company_id,
        round_index,
        round_name: company
            .hiring_rounds
            .get(round_index)
            .cloned()
            .unwrap_or_default(),
        status: company.status_of(round_index),
        students,
    }))
}

/// PUT /api/v1/companies/:id/rounds/:index/selection
pub async fn handle_record_selection(
    State(state): State<AppState>,
    Path((company_id, round_index)): Path<(Uuid, usize)>,
    Json(request): Json<SelectionRequest>,
) -> Result<Json<SelectionOutcome>, AppError> {
    let outcome = state
        .pipeline
        .record_selection(company_id, round_index, &request.students)
        .await?;
    Ok(Json(outcome))
}

/// POST /api/v1/companies/:id/rounds/:index/status
///
/// Body is `{"command":"advance"}` or `{"command":"set","status":"completed"}`.
pub async fn handle_round_status(
    State(state): State<AppState>,
    Path((company_id, round_index)): Path<(Uuid, usize)>,
    Json(command): Json<RoundCommand>,
) -> Result<Json<TransitionOutcome>, AppError> {
    let outcome = state
        .pipeline
        .transition_round(company_id, round_index, command)
        .await?;
    Ok(Json(outcome))
}

/// POST /api/v1/companies/:id/finalize
pub async fn handle_finalize(
    State(state): State<AppState>,
    Path(company_id): Path<Uuid>,
) -> Result<Json<FinalizeSummary>, AppError> {
    Ok(Json(state.pipeline.finalize(company_id).await?))
}

/// PUT /api/v1/training-roster/:institution
pub async fn handle_load_training_roster(
    State(state): State<AppState>,
    Path(institution): Path<String>,
    Json(request): Json<TrainingRosterRequest>,
) -> Result<Json<TrainingRosterResponse>, AppError> {
    if institution.trim().is_empty() {
        return Err(AppError::Validation("institution cannot be empty".to_string()));
    }
    if let Some(blank) = request
        .students
        .iter()
        .position(|s| s.student_name.trim().is_empty() && s.email.trim().is_empty())
    {
        return Err(AppError::UnprocessableEntity(format!(
            "Roster entry {blank} has neither a name nor an email"
        )));
    }

    state
        .pipeline
        .load_training_roster(&institution, &request.students)
        .await?;

    Ok(Json(TrainingRosterResponse {
        loaded: request.students.len(),
        institution,
    }))
}

/// GET /api/v1/placed?college=
pub async fn handle_list_placed(
    State(state): State<AppState>,
    Query(query): Query<CollegeQuery>,
) -> Result<Json<PlacedListResponse>, AppError> {
    let students = state.pipeline.list_placed(&query.college).await?;
    Ok(Json(PlacedListResponse {
        college: query.college,
        students,
    }))
}
