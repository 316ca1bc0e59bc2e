use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::placement::PlacedStudentRecord;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Matched,
    #[default]
    Unmatched,
}

/// One row of a company's uploaded roster, after field-name normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadedStudentRecord {
    pub student_name: String,
    pub email: String,
    pub phone: String,
    pub course: String,
    pub specialization: String,
    pub active_backlogs: String,
    pub college: String,
    pub upload_id: Option<Uuid>,
    #[serde(default)]
    pub match_status: MatchStatus,
}

/// An uploaded roster stored under `studentRosters/{company_code}/uploads/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterUpload {
    pub id: Uuid,
    pub company_code: String,
    pub college: String,
    pub students: Vec<UploadedStudentRecord>,
    pub uploaded_at: DateTime<Utc>,
}

/// One row of the training roster under `trainingRoster/{institution}/students/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthoritativeRosterRecord {
    pub id: Uuid,
    pub student_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub course: String,
    #[serde(default)]
    pub specialization: String,
    #[serde(default)]
    pub college: String,
    #[serde(default)]
    pub is_placed: bool,
    #[serde(default)]
    pub placement: Option<PlacedStudentRecord>,
}

impl AuthoritativeRosterRecord {
    #[cfg(test)]
    pub fn new(student_name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            student_name: student_name.into(),
            email: email.into(),
            phone: String::new(),
            course: String::new(),
            specialization: String::new(),
            college: String::new(),
            is_placed: false,
            placement: None,
        }
    }
}

/// Durable pointer to a selected student. Never a full snapshot of the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentRef {
    pub student_name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roster_record_id: Option<Uuid>,
}

impl StudentRef {
    pub fn new(student_name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            student_name: student_name.into(),
            email: email.into(),
            upload_id: None,
            roster_record_id: None,
        }
    }
}

impl From<&UploadedStudentRecord> for StudentRef {
    fn from(record: &UploadedStudentRecord) -> Self {
        Self {
            upload_id: record.upload_id,
            ..Self::new(&record.student_name, &record.email)
        }
    }
}

impl From<&AuthoritativeRosterRecord> for StudentRef {
    fn from(record: &AuthoritativeRosterRecord) -> Self {
        Self {
            roster_record_id: Some(record.id),
            ..Self::new(&record.student_name, &record.email)
        }
    }
}

const PARTITION_STOPWORDS: &[&str] = &["of", "and", "the", "for", "&"];

/// Institution abbreviation used to partition the training roster.
///
/// `"Indian Institute of Technology"` becomes `"IIT"`; a single-word college is
/// upper-cased whole (`"Amity"` becomes `"AMITY"`).
pub fn institution_partition(college: &str) -> String {
    let words: Vec<&str> = college
        .split(|c: char| c.is_whitespace() || c == ',' || c == '-')
        .filter(|w| !w.is_empty())
        .filter(|w| !PARTITION_STOPWORDS.contains(&w.to_lowercase().as_str()))
        .collect();

    match words.as_slice() {
        [] => String::new(),
        [single] => single.to_uppercase(),
        many => many
            .iter()
            .filter_map(|w| w.chars().next())
            .flat_map(char::to_uppercase)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_uses_initials() {
        assert_eq!(institution_partition("Indian Institute of Technology"), "IIT");
        assert_eq!(
            institution_partition("Vellore Institute of Technology, Chennai"),
            "VITC"
        );
    }

    #[test]
    fn test_partition_single_word_is_uppercased() {
        assert_eq!(institution_partition("amity"), "AMITY");
        assert_eq!(institution_partition("  "), "");
    }

    #[test]
    fn test_student_ref_from_roster_keeps_record_id() {
        let record = AuthoritativeRosterRecord::new("Asha", "a@x.com");
        let student_ref = StudentRef::from(&record);
        assert_eq!(student_ref.roster_record_id, Some(record.id));
        assert!(student_ref.upload_id.is_none());
    }
}
