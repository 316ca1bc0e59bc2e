use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::student::StudentRef;

/// Status of a single hiring round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Rejected,
}

impl RoundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundStatus::Pending => "pending",
            RoundStatus::InProgress => "inprogress",
            RoundStatus::Completed => "completed",
            RoundStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RoundStatus::Completed | RoundStatus::Rejected)
    }
}

impl std::fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A company's hiring pipeline as persisted under `companies/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub id: Uuid,
    pub company_name: String,
    pub college: String,
    pub job_designation: String,
    pub salary: Option<f64>,
    pub hiring_rounds: Vec<String>,
    /// Aligned by index with `hiring_rounds`.
    pub round_status: Vec<RoundStatus>,
    /// Who was chosen in each round, keyed by round index.
    pub round_selections: BTreeMap<usize, Vec<StudentRef>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Company {
    pub fn new(
        company_name: impl Into<String>,
        college: impl Into<String>,
        job_designation: impl Into<String>,
        salary: Option<f64>,
        hiring_rounds: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        let round_status = vec![RoundStatus::Pending; hiring_rounds.len()];
        Self {
            id: Uuid::new_v4(),
            company_name: company_name.into(),
            college: college.into(),
            job_designation: job_designation.into(),
            salary,
            hiring_rounds,
            round_status,
            round_selections: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Partition key of this company's uploaded rosters (`studentRosters/{code}`).
    pub fn company_code(&self) -> String {
        company_code(&self.company_name)
    }

    pub fn round_count(&self) -> usize {
        self.hiring_rounds.len()
    }

    pub fn last_round_index(&self) -> Option<usize> {
        self.hiring_rounds.len().checked_sub(1)
    }

    pub fn status_of(&self, round_index: usize) -> RoundStatus {
        self.round_status
            .get(round_index)
            .copied()
            .unwrap_or_default()
    }

    pub fn selection_for(&self, round_index: usize) -> Option<&[StudentRef]> {
        self.round_selections.get(&round_index).map(Vec::as_slice)
    }

    /// Pads or truncates `round_status` so it lines up with `hiring_rounds`.
    pub fn align_round_status(&mut self) {
        self.round_status
            .resize(self.hiring_rounds.len(), RoundStatus::Pending);
    }
}

/// Lower-cases the name and collapses every run of non-alphanumerics into `_`.
pub fn company_code(company_name: &str) -> String {
    let mut code = String::with_capacity(company_name.len());
    let mut pending_sep = false;
    for c in company_name.trim().chars() {
        if c.is_alphanumeric() {
            if pending_sep && !code.is_empty() {
                code.push('_');
            }
            pending_sep = false;
            code.extend(c.to_lowercase());
        } else {
            pending_sep = true;
        }
    }
    code
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_company_code_collapses_punctuation() {
        assert_eq!(company_code("Acme Corp."), "acme_corp");
        assert_eq!(company_code("  Tata  Consultancy-Services "), "tata_consultancy_services");
        assert_eq!(company_code("A&B"), "a_b");
    }

    #[test]
    fn test_new_company_has_aligned_pending_rounds() {
        let company = Company::new(
            "Acme",
            "X",
            "Engineer",
            None,
            vec!["Aptitude".into(), "Interview".into()],
        );
        assert_eq!(company.round_status, vec![RoundStatus::Pending; 2]);
        assert_eq!(company.last_round_index(), Some(1));
    }

    #[test]
    fn test_align_round_status_pads_with_pending() {
        let mut company = Company::new("Acme", "X", "Engineer", None, vec!["One".into()]);
        company.hiring_rounds.push("Two".into());
        company.align_round_status();
        assert_eq!(company.round_status.len(), 2);
        assert_eq!(company.status_of(1), RoundStatus::Pending);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&RoundStatus::InProgress).unwrap();
        assert_eq!(json, "\"inprogress\"");
    }
}
