use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlacementStatus {
    #[default]
    Placed,
}

impl PlacementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlacementStatus::Placed => "placed",
        }
    }
}

impl FromStr for PlacementStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "placed" => Ok(PlacementStatus::Placed),
            other => Err(format!("unknown placement status '{other}'")),
        }
    }
}

/// Cross-company placement record stored under `placedStudents/{id}`.
/// Written once at finalization, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedStudentRecord {
    pub id: Uuid,
    pub student_name: String,
    pub email: String,
    pub college: String,
    pub company_id: Uuid,
    pub company_name: String,
    pub job_designation: String,
    pub salary: Option<f64>,
    pub placed_date: NaiveDate,
    #[serde(default)]
    pub status: PlacementStatus,
}

/// Row shape of the `placed_students` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PlacedStudentRow {
    pub id: Uuid,
    pub student_name: String,
    pub email: String,
    pub college: String,
    pub company_id: Uuid,
    pub company_name: String,
    pub job_designation: String,
    pub salary: Option<f64>,
    pub placed_date: NaiveDate,
    pub status: String,
}

impl TryFrom<PlacedStudentRow> for PlacedStudentRecord {
    type Error = String;

    fn try_from(row: PlacedStudentRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse()
            .map_err(|e| format!("placed student {}: {e}", row.id))?;
        Ok(Self {
            id: row.id,
            student_name: row.student_name,
            email: row.email,
            college: row.college,
            company_id: row.company_id,
            company_name: row.company_name,
            job_designation: row.job_designation,
            salary: row.salary,
            placed_date: row.placed_date,
            status,
        })
    }
}
