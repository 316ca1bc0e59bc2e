//! Round Eligibility Resolver — who may be considered in a given round.
//!
//! Pure function of persisted state:
//! - round 0: every matched student not already placed at the college;
//! - round i>0: the students persisted as selected in round i-1, still on the
//!   matched roster, and still not placed (a student can be placed by another
//!   company between rounds).
//!
//! A missing prior-round selection fails closed: nobody is eligible. The only
//! way around that is an explicit [`Recovery::FromSnapshot`] supplied by the
//! caller, and even then the snapshot goes through the same roster and
//! directory checks.

use tracing::{debug, warn};

use crate::models::company::Company;
use crate::models::student::StudentRef;
use crate::pipeline::directory::PlacedSnapshot;
use crate::pipeline::error::PipelineError;
use crate::pipeline::identity::{HasIdentity, IdentityIndex, IdentityMap};
use crate::pipeline::matcher::MatchReport;

/// What to do when the prior round has no persisted selection.
#[derive(Debug, Clone, Copy, Default)]
pub enum Recovery<'a> {
    /// Fail closed: nobody is eligible.
    #[default]
    None,
    /// Rebuild from a caller-held snapshot of the prior round's selection.
    FromSnapshot(&'a [StudentRef]),
}

pub fn check_round(company: &Company, round_index: usize) -> Result<(), PipelineError> {
    if round_index >= company.round_count() {
        return Err(PipelineError::RoundOutOfRange {
            company_id: company.id,
            round_index,
            round_count: company.round_count(),
        });
    }
    Ok(())
}

/// Eligible students for `round_index`, in the order of the source list
/// (upload order for round 0, prior selection order afterwards).
pub fn eligible_for(
    company: &Company,
    round_index: usize,
    matched: &MatchReport,
    placed: &PlacedSnapshot,
    recovery: Recovery<'_>,
) -> Result<Vec<StudentRef>, PipelineError> {
    check_round(company, round_index)?;

    if round_index == 0 {
        let eligible = placed.filter_available(matched.matched_refs());
        debug!(
            company_id = %company.id,
            round_index,
            eligible = eligible.len(),
            "Resolved first-round eligibility"
        );
        return Ok(eligible);
    }

    let prior_index = round_index - 1;
    let prior = match (company.selection_for(prior_index), recovery) {
        (Some(selection), _) => selection,
        (None, Recovery::FromSnapshot(snapshot)) => {
            warn!(
                company_id = %company.id,
                round_index,
                snapshot = snapshot.len(),
                "No persisted selection for round {prior_index}; recovering from caller snapshot"
            );
            snapshot
        }
        (None, Recovery::None) => {
            warn!(
                company_id = %company.id,
                round_index,
                "No persisted selection for round {prior_index}; nobody is eligible"
            );
            return Ok(Vec::new());
        }
    };

    let eligible = carry_forward(prior, matched, placed);
    debug!(
        company_id = %company.id,
        round_index,
        prior = prior.len(),
        eligible = eligible.len(),
        "Resolved carry-forward eligibility"
    );
    Ok(eligible)
}

/// Intersects `prior` with the matched roster by identity and drops placed
/// students. Returned refs keep the prior selection's name and email; missing
/// record ids are filled from the roster match.
fn carry_forward(
    prior: &[StudentRef],
    matched: &MatchReport,
    placed: &PlacedSnapshot,
) -> Vec<StudentRef> {
    let mut roster: IdentityMap<usize> = IdentityMap::new();
    for (i, student) in matched.matched.iter().enumerate() {
        roster.insert(&student.identity(), i);
    }

    let mut seen = IdentityIndex::new();
    let mut eligible = Vec::new();
    for selected in prior {
        let identity = selected.identity();
        let Some(&i) = roster.get(&identity) else {
            continue;
        };
        if seen.contains(&identity) || placed.is_already_placed(selected) {
            continue;
        }
        seen.insert(&identity);

        let current = &matched.matched[i];
        eligible.push(StudentRef {
            student_name: selected.student_name.clone(),
            email: selected.email.clone(),
            upload_id: selected.upload_id.or(current.record.upload_id),
            roster_record_id: selected.roster_record_id.or(Some(current.roster_record_id)),
        });
    }
    eligible
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::student::{AuthoritativeRosterRecord, UploadedStudentRecord};
    use crate::pipeline::identity::Identity;
    use crate::pipeline::matcher::match_rosters;
    use uuid::Uuid;

    fn uploaded(name: &str, email: &str) -> UploadedStudentRecord {
        UploadedStudentRecord {
            student_name: name.to_string(),
            email: email.to_string(),
            upload_id: Some(Uuid::new_v4()),
            ..Default::default()
        }
    }

    fn company(rounds: usize) -> Company {
        Company::new(
            "Acme",
            "X",
            "Engineer",
            Some(7.0),
            (0..rounds).map(|i| format!("Round {i}")).collect(),
        )
    }

    /// Matched roster of Asha and Ravi; Meera is uploaded but unmatched.
    fn roster() -> MatchReport {
        let auth = vec![
            AuthoritativeRosterRecord::new("Asha", "a@x.com"),
            AuthoritativeRosterRecord::new("Ravi", "r@x.com"),
        ];
        match_rosters(
            vec![
                uploaded("Asha", "a@x.com"),
                uploaded("Ravi", "r@x.com"),
                uploaded("Meera", "m@x.com"),
            ],
            &auth,
        )
    }

    fn names(refs: &[StudentRef]) -> Vec<&str> {
        refs.iter().map(|r| r.student_name.as_str()).collect()
    }

    #[test]
    fn test_round_zero_equals_available_matched() {
        let company = company(2);
        let matched = roster();
        let placed = PlacedSnapshot::default();

        let eligible = eligible_for(&company, 0, &matched, &placed, Recovery::None).unwrap();
        assert_eq!(eligible, placed.filter_available(matched.matched_refs()));
        assert_eq!(names(&eligible), vec!["Asha", "Ravi"]);
    }

    #[test]
    fn test_scenario_b_unmatched_student_is_never_eligible() {
        let company = company(1);
        let matched = match_rosters(vec![uploaded("Ravi", "r@x.com")], &[]);
        let eligible =
            eligible_for(&company, 0, &matched, &PlacedSnapshot::default(), Recovery::None)
                .unwrap();
        assert!(eligible.is_empty());
    }

    #[test]
    fn test_scenario_c_carry_forward_restricts_to_prior_selection() {
        let mut company = company(2);
        company
            .round_selections
            .insert(0, vec![StudentRef::new("Asha", "a@x.com")]);

        let eligible =
            eligible_for(&company, 1, &roster(), &PlacedSnapshot::default(), Recovery::None)
                .unwrap();
        assert_eq!(names(&eligible), vec!["Asha"]);
        assert!(eligible[0].roster_record_id.is_some());
    }

    #[test]
    fn test_scenario_d_placed_student_excluded_in_round_zero() {
        let company = company(1);
        let placed = PlacedSnapshot::from_records([Identity::new("Asha", "a@x.com")].iter());

        let eligible = eligible_for(&company, 0, &roster(), &placed, Recovery::None).unwrap();
        assert_eq!(names(&eligible), vec!["Ravi"]);
    }

    #[test]
    fn test_student_placed_between_rounds_is_dropped() {
        let mut company = company(3);
        company.round_selections.insert(
            1,
            vec![
                StudentRef::new("Asha", "a@x.com"),
                StudentRef::new("Ravi", "r@x.com"),
            ],
        );
        let placed = PlacedSnapshot::from_records([Identity::new("Ravi", "R@X.COM")].iter());

        let eligible = eligible_for(&company, 2, &roster(), &placed, Recovery::None).unwrap();
        assert_eq!(names(&eligible), vec!["Asha"]);
    }

    #[test]
    fn test_missing_prior_selection_fails_closed() {
        let company = company(2);
        let eligible =
            eligible_for(&company, 1, &roster(), &PlacedSnapshot::default(), Recovery::None)
                .unwrap();
        assert!(eligible.is_empty());
    }

    #[test]
    fn test_empty_prior_selection_yields_empty() {
        let mut company = company(2);
        company.round_selections.insert(0, vec![]);
        let eligible =
            eligible_for(&company, 1, &roster(), &PlacedSnapshot::default(), Recovery::None)
                .unwrap();
        assert!(eligible.is_empty());
    }

    #[test]
    fn test_recovery_snapshot_used_only_when_selection_missing() {
        let snapshot = vec![
            StudentRef::new("Ravi", "r@x.com"),
            StudentRef::new("Ghost", "ghost@x.com"),
        ];
        let matched = roster();
        let placed = PlacedSnapshot::default();

        let missing = company(2);
        let recovered =
            eligible_for(&missing, 1, &matched, &placed, Recovery::FromSnapshot(&snapshot))
                .unwrap();
        // Ghost is not on the matched roster, so recovery cannot promote them.
        assert_eq!(names(&recovered), vec!["Ravi"]);

        let mut persisted = company(2);
        persisted
            .round_selections
            .insert(0, vec![StudentRef::new("Asha", "a@x.com")]);
        let eligible =
            eligible_for(&persisted, 1, &matched, &placed, Recovery::FromSnapshot(&snapshot))
                .unwrap();
        assert_eq!(names(&eligible), vec!["Asha"]);
    }

    #[test]
    fn test_carry_forward_containment() {
        let matched = roster();
        let placed = PlacedSnapshot::default();
        let selections: Vec<Vec<StudentRef>> = vec![
            vec![],
            vec![StudentRef::new("Asha", "a@x.com")],
            vec![StudentRef::new("ravi", ""), StudentRef::new("Meera", "m@x.com")],
            matched.matched_refs(),
        ];

        for prior in selections {
            let mut company = company(2);
            company.round_selections.insert(0, prior.clone());
            let eligible = eligible_for(&company, 1, &matched, &placed, Recovery::None).unwrap();
            let prior_index: IdentityIndex = prior.iter().collect();
            for student in &eligible {
                assert!(prior_index.contains(&student.identity()), "{student:?}");
            }
        }
    }

    #[test]
    fn test_duplicate_prior_refs_collapse() {
        let mut company = company(2);
        company.round_selections.insert(
            0,
            vec![
                StudentRef::new("Asha", "a@x.com"),
                StudentRef::new("ASHA", " a@x.com"),
            ],
        );
        let eligible =
            eligible_for(&company, 1, &roster(), &PlacedSnapshot::default(), Recovery::None)
                .unwrap();
        assert_eq!(eligible.len(), 1);
    }

    #[test]
    fn test_round_out_of_range_is_an_error() {
        let err = eligible_for(
            &company(2),
            2,
            &roster(),
            &PlacedSnapshot::default(),
            Recovery::None,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::RoundOutOfRange {
                round_index: 2,
                round_count: 2,
                ..
            }
        ));
    }
}
