//! Identity Normalizer — canonicalizes heterogeneous student records into a
//! comparison identity.
//!
//! Uploaded spreadsheets arrive with arbitrary header spellings. A single
//! declarative table (`FIELD_VARIANTS`) maps each canonical field to the header
//! variants seen in the wild; everything else in the engine compares records
//! through [`Identity`].
//!
//! Known limitation: two different students who both lack an email and share a
//! name resolve to the same identity.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::models::placement::PlacedStudentRecord;
use crate::models::student::{
    AuthoritativeRosterRecord, MatchStatus, StudentRef, UploadedStudentRecord,
};

// ────────────────────────────────────────────────────────────────────────────
// Field-name mapping table
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanonicalField {
    StudentName,
    Email,
    Phone,
    Course,
    Specialization,
    ActiveBacklogs,
    College,
}

/// Header variants per canonical field, in squashed form (lower-case, no
/// whitespace or punctuation). Order within a list is lookup priority.
const FIELD_VARIANTS: &[(CanonicalField, &[&str])] = &[
    (
        CanonicalField::StudentName,
        &[
            "studentname",
            "name",
            "fullname",
            "nameofthestudent",
            "nameofstudent",
            "candidatename",
        ],
    ),
    (
        CanonicalField::Email,
        &[
            "email",
            "emailid",
            "emailaddress",
            "studentemail",
            "studentemailid",
            "mailid",
            "mail",
        ],
    ),
    (
        CanonicalField::Phone,
        &[
            "phone",
            "phonenumber",
            "phoneno",
            "mobile",
            "mobilenumber",
            "mobileno",
            "contactnumber",
            "contact",
        ],
    ),
    (
        CanonicalField::Course,
        &["course", "degree", "program", "programme", "coursename"],
    ),
    (
        CanonicalField::Specialization,
        &[
            "specialization",
            "specialisation",
            "stream",
            "branch",
            "department",
        ],
    ),
    (
        CanonicalField::ActiveBacklogs,
        &[
            "activebacklogs",
            "backlogs",
            "noofactivebacklogs",
            "numberofactivebacklogs",
            "noofbacklogs",
        ],
    ),
    (
        CanonicalField::College,
        &["college", "collegename", "institution", "institute", "university"],
    ),
];

fn squash_header(header: &str) -> String {
    header
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

fn cell_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

/// Resolves a canonical field from a raw row. Missing fields resolve to `""`.
pub fn resolve_field(row: &Map<String, Value>, field: CanonicalField) -> String {
    let Some((_, variants)) = FIELD_VARIANTS.iter().find(|(f, _)| *f == field) else {
        return String::new();
    };

    // Squash every header once, then honor variant priority order.
    let squashed: Vec<(String, &Value)> = row.iter().map(|(k, v)| (squash_header(k), v)).collect();
    variants
        .iter()
        .find_map(|variant| {
            squashed
                .iter()
                .find(|(header, value)| header == variant && !cell_to_string(value).is_empty())
                .map(|(_, value)| cell_to_string(value))
        })
        .unwrap_or_default()
}

// ────────────────────────────────────────────────────────────────────────────
// Identity
// ────────────────────────────────────────────────────────────────────────────

/// Normalized (lower-cased, trimmed) name and email of a student.
/// Always recomputed from the source fields, never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

impl Identity {
    pub fn new(name: &str, email: &str) -> Self {
        Self {
            name: name.trim().to_lowercase(),
            email: email.trim().to_lowercase(),
        }
    }

    /// Email if present, else name.
    pub fn key(&self) -> &str {
        if self.email.is_empty() {
            &self.name
        } else {
            &self.email
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.email.is_empty()
    }

    /// Emails equal and non-empty, or names equal and non-empty when either
    /// side lacks an email.
    pub fn matches(&self, other: &Identity) -> bool {
        if !self.email.is_empty() && self.email == other.email {
            return true;
        }
        (self.email.is_empty() || other.email.is_empty())
            && !self.name.is_empty()
            && self.name == other.name
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.name.is_empty(), self.email.is_empty()) {
            (false, false) => write!(f, "{} <{}>", self.name, self.email),
            (true, false) => write!(f, "<{}>", self.email),
            _ => f.write_str(&self.name),
        }
    }
}

/// Normalizes a raw uploaded row into its identity.
pub fn normalize_record(row: &Map<String, Value>) -> Identity {
    Identity::new(
        &resolve_field(row, CanonicalField::StudentName),
        &resolve_field(row, CanonicalField::Email),
    )
}

/// Builds an [`UploadedStudentRecord`] from a raw row. A row-level college
/// overrides `default_college` only when present.
pub fn normalize_upload_row(
    row: &Map<String, Value>,
    upload_id: Uuid,
    default_college: &str,
) -> UploadedStudentRecord {
    let college = resolve_field(row, CanonicalField::College);
    UploadedStudentRecord {
        student_name: resolve_field(row, CanonicalField::StudentName),
        email: resolve_field(row, CanonicalField::Email),
        phone: resolve_field(row, CanonicalField::Phone),
        course: resolve_field(row, CanonicalField::Course),
        specialization: resolve_field(row, CanonicalField::Specialization),
        active_backlogs: resolve_field(row, CanonicalField::ActiveBacklogs),
        college: if college.is_empty() {
            default_college.to_string()
        } else {
            college
        },
        upload_id: Some(upload_id),
        match_status: MatchStatus::Unmatched,
    }
}

/// Anything that can be compared by student identity.
pub trait HasIdentity {
    fn identity(&self) -> Identity;
}

impl HasIdentity for Identity {
    fn identity(&self) -> Identity {
        self.clone()
    }
}

impl HasIdentity for UploadedStudentRecord {
    fn identity(&self) -> Identity {
        Identity::new(&self.student_name, &self.email)
    }
}

impl HasIdentity for AuthoritativeRosterRecord {
    fn identity(&self) -> Identity {
        Identity::new(&self.student_name, &self.email)
    }
}

impl HasIdentity for StudentRef {
    fn identity(&self) -> Identity {
        Identity::new(&self.student_name, &self.email)
    }
}

impl HasIdentity for PlacedStudentRecord {
    fn identity(&self) -> Identity {
        Identity::new(&self.student_name, &self.email)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// IdentityIndex
// ────────────────────────────────────────────────────────────────────────────

/// Hash index answering "does any indexed record match this identity?" with
/// the same semantics as [`Identity::matches`], in O(1) per lookup.
#[derive(Debug, Clone, Default)]
pub struct IdentityIndex {
    emails: HashSet<String>,
    names: HashSet<String>,
    /// Names of indexed entries that have no email.
    emailless_names: HashSet<String>,
}

impl IdentityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, identity: &Identity) {
        if identity.is_empty() {
            return;
        }
        if !identity.email.is_empty() {
            self.emails.insert(identity.email.clone());
        }
        if !identity.name.is_empty() {
            self.names.insert(identity.name.clone());
            if identity.email.is_empty() {
                self.emailless_names.insert(identity.name.clone());
            }
        }
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        if !identity.email.is_empty() && self.emails.contains(&identity.email) {
            return true;
        }
        if identity.name.is_empty() {
            return false;
        }
        if identity.email.is_empty() {
            self.names.contains(&identity.name)
        } else {
            self.emailless_names.contains(&identity.name)
        }
    }
}

impl<'a, T: HasIdentity + 'a> FromIterator<&'a T> for IdentityIndex {
    fn from_iter<I: IntoIterator<Item = &'a T>>(iter: I) -> Self {
        let mut index = IdentityIndex::new();
        for item in iter {
            index.insert(&item.identity());
        }
        index
    }
}

/// Identity-keyed map with [`Identity::matches`] semantics. Email lookups win
/// over name lookups; on collisions the first inserted value is kept.
#[derive(Debug, Clone)]
pub struct IdentityMap<V> {
    by_email: HashMap<String, V>,
    by_name: HashMap<String, V>,
    by_emailless_name: HashMap<String, V>,
}

impl<V> Default for IdentityMap<V> {
    fn default() -> Self {
        Self {
            by_email: HashMap::new(),
            by_name: HashMap::new(),
            by_emailless_name: HashMap::new(),
        }
    }
}

impl<V: Clone> IdentityMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, identity: &Identity, value: V) {
        if !identity.email.is_empty() {
            self.by_email
                .entry(identity.email.clone())
                .or_insert_with(|| value.clone());
        }
        if !identity.name.is_empty() {
            self.by_name
                .entry(identity.name.clone())
                .or_insert_with(|| value.clone());
            if identity.email.is_empty() {
                self.by_emailless_name
                    .entry(identity.name.clone())
                    .or_insert(value);
            }
        }
    }

    pub fn get(&self, identity: &Identity) -> Option<&V> {
        if !identity.email.is_empty() {
            if let Some(value) = self.by_email.get(&identity.email) {
                return Some(value);
            }
        }
        if identity.name.is_empty() {
            return None;
        }
        if identity.email.is_empty() {
            self.by_name.get(&identity.name)
        } else {
            self.by_emailless_name.get(&identity.name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_email_match_ignores_case_and_whitespace() {
        let a = normalize_record(&row(json!({ "email": " A@B.com " })));
        let b = normalize_record(&row(json!({ "email": "a@b.com" })));
        assert_eq!(a, b);
        assert!(a.matches(&b));
        assert!(b.matches(&a));
    }

    #[test]
    fn test_name_variants_resolve_to_same_field() {
        for header in ["studentName", "name", "Student Name", "NAME OF THE STUDENT", "student_name"] {
            let mut raw = Map::new();
            raw.insert(header.to_string(), json!("  Asha Rao "));
            assert_eq!(normalize_record(&raw).name, "asha rao", "header {header}");
        }
    }

    #[test]
    fn test_missing_fields_normalize_to_empty() {
        let identity = normalize_record(&Map::new());
        assert!(identity.is_empty());
        assert_eq!(identity.key(), "");
    }

    #[test]
    fn test_variant_priority_prefers_specific_header() {
        let raw = row(json!({ "Name": "Short", "Student Name": "Full Student" }));
        assert_eq!(normalize_record(&raw).name, "full student");
    }

    #[test]
    fn test_empty_cell_falls_through_to_next_variant() {
        let raw = row(json!({ "Student Name": "", "Name": "Ravi" }));
        assert_eq!(normalize_record(&raw).name, "ravi");
    }

    #[test]
    fn test_name_fallback_only_when_an_email_is_missing() {
        let with_email = Identity::new("Asha", "a@x.com");
        let without_email = Identity::new("asha", "");
        let other_email = Identity::new("Asha", "other@x.com");

        assert!(with_email.matches(&without_email));
        assert!(without_email.matches(&with_email));
        assert!(!with_email.matches(&other_email));
    }

    #[test]
    fn test_empty_identities_never_match() {
        let empty = Identity::default();
        assert!(!empty.matches(&Identity::default()));
    }

    #[test]
    fn test_same_name_without_email_conflates() {
        // Documented limitation: same-named email-less students are one identity.
        let a = Identity::new("Priya", "");
        let b = Identity::new("PRIYA ", "");
        assert!(a.matches(&b));
    }

    #[test]
    fn test_key_prefers_email() {
        assert_eq!(Identity::new("Asha", "A@X.com").key(), "a@x.com");
        assert_eq!(Identity::new("Asha", "").key(), "asha");
    }

    #[test]
    fn test_index_agrees_with_pairwise_matches() {
        let indexed = vec![
            Identity::new("Asha", "a@x.com"),
            Identity::new("Ravi", ""),
            Identity::new("", "only@x.com"),
        ];
        let queries = vec![
            Identity::new("asha", ""),
            Identity::new("Someone", "a@x.com"),
            Identity::new("Ravi", "r@x.com"),
            Identity::new("Ravi", ""),
            Identity::new("Asha", "other@x.com"),
            Identity::new("", "ONLY@x.com"),
            Identity::new("Nobody", ""),
        ];
        let index: IdentityIndex = indexed.iter().collect();
        for query in &queries {
            let expected = indexed.iter().any(|i| query.matches(i));
            assert_eq!(index.contains(query), expected, "query {query}");
        }
    }

    #[test]
    fn test_identity_map_prefers_email_then_first_inserted() {
        let mut map = IdentityMap::new();
        map.insert(&Identity::new("Asha", ""), 1);
        map.insert(&Identity::new("A. Rao", "a@x.com"), 2);
        map.insert(&Identity::new("Asha", ""), 3);

        assert_eq!(map.get(&Identity::new("Asha", "a@x.com")), Some(&2));
        assert_eq!(map.get(&Identity::new("asha", "")), Some(&1));
        assert_eq!(map.get(&Identity::new("Asha", "zzz@x.com")), Some(&1));
        assert_eq!(map.get(&Identity::new("Nobody", "")), None);
    }

    #[test]
    fn test_upload_row_normalizes_all_fields() {
        let upload_id = Uuid::new_v4();
        let raw = row(json!({
            "Name of the Student": "Asha",
            "Email ID": "A@X.COM",
            "Mobile No": 9876543210u64,
            "Degree": "B.Tech",
            "Branch": "CSE",
            "Active Backlogs": 0,
        }));
        let record = normalize_upload_row(&raw, upload_id, "X College");
        assert_eq!(record.student_name, "Asha");
        assert_eq!(record.email, "A@X.COM");
        assert_eq!(record.phone, "9876543210");
        assert_eq!(record.course, "B.Tech");
        assert_eq!(record.specialization, "CSE");
        assert_eq!(record.active_backlogs, "0");
        assert_eq!(record.college, "X College");
        assert_eq!(record.upload_id, Some(upload_id));
        assert_eq!(record.match_status, MatchStatus::Unmatched);
    }

    #[test]
    fn test_row_college_overrides_default() {
        let raw = row(json!({ "name": "Asha", "College Name": "Y College" }));
        let record = normalize_upload_row(&raw, Uuid::new_v4(), "X College");
        assert_eq!(record.college, "Y College");
    }
}
