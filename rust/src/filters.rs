//! Eligibility predicates applied before scoring.

use chrono::{DateTime, TimeDelta, Utc};

use crate::models::{ExclusionReason, ProjectCandidate};

/// True iff the main branch exists and carries a pipeline definition.
pub fn is_ready(candidate: &ProjectCandidate) -> bool {
    candidate.main_branch_exists && candidate.has_pipeline_definition
}

/// True if the candidate ran a pipeline less than `cooldown` before `now`.
///
/// Never-run candidates are never in cooldown.
pub fn is_in_cooldown(
    candidate: &ProjectCandidate,
    now: DateTime<Utc>,
    cooldown: TimeDelta,
) -> bool {
    match candidate.last_pipeline_run {
        Some(last_run) => now - last_run < cooldown,
        None => false,
    }
}

/// Run both filters and report the first failing one.
///
/// Readiness is checked first; cooldown is only inspected for ready candidates.
pub fn exclusion_reason(
    candidate: &ProjectCandidate,
    now: DateTime<Utc>,
    cooldown: TimeDelta,
) -> Option<ExclusionReason> {
    if !is_ready(candidate) {
        return Some(if candidate.main_branch_exists {
            ExclusionReason::MissingPipelineDefinition
        } else {
            ExclusionReason::MissingMainBranch
        });
    }

    match candidate.last_pipeline_run {
        Some(last_run) if is_in_cooldown(candidate, now, cooldown) => {
            Some(ExclusionReason::Cooldown {
                last_run,
                eligible_at: last_run
                    .checked_add_signed(cooldown)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            })
        }
        _ => None,
    }
}
