//! Roster Matcher — splits an uploaded roster into matched/unmatched by
//! identity against the authoritative training roster.
//!
//! The authoritative side is indexed once, so a match run is O(U + A).

use std::collections::HashSet;

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::models::student::{
    AuthoritativeRosterRecord, MatchStatus, StudentRef, UploadedStudentRecord,
};
use crate::pipeline::identity::{HasIdentity, Identity, IdentityIndex, IdentityMap};

/// Result of matching one uploaded roster against the training roster.
/// Unmatched rows are kept for display; they only drop out of eligibility.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MatchReport {
    pub matched: Vec<MatchedStudent>,
    pub unmatched: Vec<UploadedStudentRecord>,
}

/// An uploaded row together with the training-roster entry it resolved to.
#[derive(Debug, Clone, Serialize)]
pub struct MatchedStudent {
    pub record: UploadedStudentRecord,
    pub roster_record_id: Uuid,
}

impl MatchedStudent {
    pub fn to_ref(&self) -> StudentRef {
        StudentRef {
            roster_record_id: Some(self.roster_record_id),
            ..StudentRef::from(&self.record)
        }
    }
}

impl HasIdentity for MatchedStudent {
    fn identity(&self) -> Identity {
        self.record.identity()
    }
}

impl MatchReport {
    pub fn matched_count(&self) -> usize {
        self.matched.len()
    }

    pub fn unmatched_count(&self) -> usize {
        self.unmatched.len()
    }

    /// Selection pointers for every matched student, in upload order.
    pub fn matched_refs(&self) -> Vec<StudentRef> {
        self.matched.iter().map(MatchedStudent::to_ref).collect()
    }

    /// Drops matched students repeated across merged uploads, keeping the
    /// first occurrence. Two rows are the same student when their identities
    /// match or when both resolved to the same training-roster record.
    /// Returns how many were dropped.
    pub fn dedup_matched(&mut self) -> usize {
        let before = self.matched.len();
        let mut seen = IdentityIndex::new();
        let mut roster_ids = HashSet::new();
        self.matched.retain(|student| {
            let identity = student.identity();
            if seen.contains(&identity) || !roster_ids.insert(student.roster_record_id) {
                false
            } else {
                seen.insert(&identity);
                true
            }
        });
        before - self.matched.len()
    }
}

/// Lookup from identity to training-roster record id, so a match can be
/// turned into a durable [`StudentRef`].
#[derive(Debug, Default)]
pub struct RosterLookup {
    ids: IdentityMap<Uuid>,
}

impl RosterLookup {
    pub fn build(authoritative: &[AuthoritativeRosterRecord]) -> Self {
        let mut ids = IdentityMap::new();
        for record in authoritative {
            ids.insert(&record.identity(), record.id);
        }
        Self { ids }
    }

    /// Resolves an identity to a training-roster record id. Email wins over name.
    pub fn resolve(&self, identity: &Identity) -> Option<Uuid> {
        self.ids.get(identity).copied()
    }
}

/// Tags every uploaded record with its match status and splits the roster.
/// Authoritative records are never modified.
pub fn match_rosters(
    uploaded: Vec<UploadedStudentRecord>,
    authoritative: &[AuthoritativeRosterRecord],
) -> MatchReport {
    let lookup = RosterLookup::build(authoritative);
    let mut report = MatchReport::default();

    for mut record in uploaded {
        match lookup.resolve(&record.identity()) {
            Some(roster_record_id) => {
                record.match_status = MatchStatus::Matched;
                report.matched.push(MatchedStudent {
                    record,
                    roster_record_id,
                });
            }
            None => {
                record.match_status = MatchStatus::Unmatched;
                report.unmatched.push(record);
            }
        }
    }

    debug!(
        matched = report.matched.len(),
        unmatched = report.unmatched.len(),
        authoritative = authoritative.len(),
        "Roster match complete"
    );
    report
}
