//! Round State Machine — status transitions per round and the selection log
//! that carry-forward reads.
//!
//! Transitions are planned here without I/O; `PlacementPipeline` executes the
//! side effect a plan asks for (announce eligibility, or finalize) and only
//! then persists the new status.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::models::company::{Company, RoundStatus};
use crate::models::student::StudentRef;
use crate::pipeline::eligibility::check_round;
use crate::pipeline::error::PipelineError;
use crate::pipeline::identity::{HasIdentity, IdentityIndex, IdentityMap};

/// Operator action on a round's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum RoundCommand {
    /// `pending → inprogress → completed → rejected → pending`
    Advance,
    /// Jump straight to a status.
    Set { status: RoundStatus },
}

/// Total and deterministic: every (status, command) pair has one successor.
pub fn next_status(current: RoundStatus, command: RoundCommand) -> RoundStatus {
    match command {
        RoundCommand::Set { status } => status,
        RoundCommand::Advance => match current {
            RoundStatus::Pending => RoundStatus::InProgress,
            RoundStatus::InProgress => RoundStatus::Completed,
            RoundStatus::Completed => RoundStatus::Rejected,
            RoundStatus::Rejected => RoundStatus::Pending,
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionEffect {
    None,
    /// The round just opened; publish its eligible list.
    AnnounceEligible,
    /// The last round just completed; place these students.
    Finalize(Vec<StudentRef>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionPlan {
    pub round_index: usize,
    pub previous: RoundStatus,
    pub next: RoundStatus,
    pub effect: TransitionEffect,
}

/// Works out what a command does to `round_index` without changing anything.
///
/// Entering `completed` on the last round requires a non-empty persisted
/// selection for that round; otherwise the transition is refused with
/// [`PipelineError::NoStudentsSelected`] and nothing is finalized.
pub fn plan_transition(
    company: &Company,
    round_index: usize,
    command: RoundCommand,
) -> Result<TransitionPlan, PipelineError> {
    check_round(company, round_index)?;

    let previous = company.status_of(round_index);
    let next = next_status(previous, command);
    let is_last = company.last_round_index() == Some(round_index);

    let effect = if next == RoundStatus::Completed && previous != RoundStatus::Completed && is_last
    {
        match company.selection_for(round_index) {
            Some(selection) if !selection.is_empty() => {
                TransitionEffect::Finalize(selection.to_vec())
            }
            _ => {
                return Err(PipelineError::NoStudentsSelected {
                    company_id: company.id,
                    round_index,
                })
            }
        }
    } else if next == RoundStatus::InProgress && previous != RoundStatus::InProgress {
        TransitionEffect::AnnounceEligible
    } else {
        TransitionEffect::None
    };

    debug!(
        company_id = %company.id,
        round_index,
        "Planned round transition {previous} -> {next}"
    );
    Ok(TransitionPlan {
        round_index,
        previous,
        next,
        effect,
    })
}

/// Writes a planned status into the company. Persisting is the caller's job.
pub fn apply_status(company: &mut Company, plan: &TransitionPlan) {
    company.align_round_status();
    company.round_status[plan.round_index] = plan.next;
}

#[derive(Debug, Clone, Serialize)]
pub struct SelectionOutcome {
    pub round_index: usize,
    pub recorded: Vec<StudentRef>,
    /// Students dropped from later rounds because they were deselected here.
    pub pruned_later: usize,
}

/// Records the operator's selection for `round_index`.
///
/// Every selected student must appear in `eligible` (by identity); the stored
/// refs are the eligible-list entries, so they carry the resolved record ids.
/// Later rounds are pruned so each round stays a subset of the one before.
pub fn record_selection(
    company: &mut Company,
    round_index: usize,
    selected: &[StudentRef],
    eligible: &[StudentRef],
) -> Result<SelectionOutcome, PipelineError> {
    check_round(company, round_index)?;

    let status = company.status_of(round_index);
    if status.is_terminal() {
        return Err(PipelineError::RoundClosed {
            company_id: company.id,
            round_index,
            status,
        });
    }

    let mut by_identity: IdentityMap<usize> = IdentityMap::new();
    for (i, student) in eligible.iter().enumerate() {
        by_identity.insert(&student.identity(), i);
    }

    let mut seen = IdentityIndex::new();
    let mut recorded = Vec::with_capacity(selected.len());
    for student in selected {
        let identity = student.identity();
        let Some(&i) = by_identity.get(&identity) else {
            return Err(PipelineError::NotEligible {
                company_id: company.id,
                round_index,
                student: identity.to_string(),
            });
        };
        if seen.contains(&identity) {
            continue;
        }
        seen.insert(&identity);
        recorded.push(eligible[i].clone());
    }

    company.round_selections.insert(round_index, recorded.clone());
    let pruned_later = prune_later_rounds(company, round_index);

    info!(
        company_id = %company.id,
        round_index,
        recorded = recorded.len(),
        pruned_later,
        "Recorded round selection"
    );
    Ok(SelectionOutcome {
        round_index,
        recorded,
        pruned_later,
    })
}

/// Restores `selections[j] ⊆ selections[j-1]` for every j after `from`.
fn prune_later_rounds(company: &mut Company, from: usize) -> usize {
    let mut pruned = 0;
    for j in (from + 1)..company.round_count() {
        let Some(prior) = company.round_selections.get(&(j - 1)) else {
            // Nothing upstream: a stale later selection cannot be trusted.
            if let Some(stale) = company.round_selections.remove(&j) {
                pruned += stale.len();
            }
            continue;
        };
        let prior_index: IdentityIndex = prior.iter().collect();
        if let Some(current) = company.round_selections.get_mut(&j) {
            let before = current.len();
            current.retain(|s| prior_index.contains(&s.identity()));
            pruned += before - current.len();
        }
    }
    pruned
}
