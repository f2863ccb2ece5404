//! One scheduling cycle: workers, discovery, prioritization.

use thiserror::Error;

use crate::collaborators::{Clock, CollaboratorError, ProjectDiscovery, WorkerAvailability};
use crate::log_changes;
use crate::models::Ranking;
use crate::priority::{PriorityEngine, PriorityError};

/// Why a cycle ended without a ranking.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AbortReason {
    NoRunners,
    NoProjects,
    NoEligibleProjects,
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoRunners => write!(f, "No available runners, skipping scheduling cycle"),
            Self::NoProjects => write!(f, "No projects found in the group"),
            Self::NoEligibleProjects => write!(f, "No projects satisfy the launch conditions"),
        }
    }
}

/// Outcome of [`ScheduleOrchestrator::run_cycle`].
#[derive(Clone, Debug, PartialEq)]
pub enum CycleResult {
    Aborted(AbortReason),
    /// Eligible projects in dispatch order, plus the excluded ones.
    Ranked(Ranking),
}

impl CycleResult {
    pub fn abort_reason(&self) -> Option<AbortReason> {
        match self {
            Self::Aborted(reason) => Some(*reason),
            Self::Ranked(_) => None,
        }
    }

    pub fn ranking(&self) -> Option<&Ranking> {
        match self {
            Self::Aborted(_) => None,
            Self::Ranked(ranking) => Some(ranking),
        }
    }
}

/// Errors that fail a cycle outright.
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("Failed to list available workers")]
    Workers(#[source] CollaboratorError),
    #[error("Failed to discover projects")]
    Discovery(#[source] CollaboratorError),
    #[error(transparent)]
    Priority(#[from] PriorityError),
}

/// Drives one scheduling cycle over injected collaborators.
pub struct ScheduleOrchestrator<W, P, C> {
    workers: W,
    discovery: P,
    engine: PriorityEngine,
    clock: C,
}

impl<W, P, C> ScheduleOrchestrator<W, P, C>
where
    W: WorkerAvailability,
    P: ProjectDiscovery,
    C: Clock,
{
    pub fn new(workers: W, discovery: P, engine: PriorityEngine, clock: C) -> Self {
        Self {
            workers,
            discovery,
            engine,
            clock,
        }
    }

    pub fn engine(&self) -> &PriorityEngine {
        &self.engine
    }

    /// Run the cycle, stopping at the first step that has nothing to offer.
    ///
    /// Dispatching the ranked projects is left to the caller.
    pub fn run_cycle(&self) -> Result<CycleResult, CycleError> {
        let verbosity = self.engine.config().verbosity;
        log_changes!(verbosity, "Starting scheduling cycle");

        let workers = self.workers.list().map_err(CycleError::Workers)?;
        if workers.is_empty() {
            return Ok(self.abort(AbortReason::NoRunners));
        }
        log_changes!(verbosity, "  {} runner(s) available", workers.len());

        let candidates = self.discovery.list().map_err(CycleError::Discovery)?;
        if candidates.is_empty() {
            return Ok(self.abort(AbortReason::NoProjects));
        }
        log_changes!(verbosity, "  {} candidate project(s)", candidates.len());

        let ranking = self.engine.evaluate(&candidates, self.clock.now())?;
        if ranking.is_empty() {
            return Ok(self.abort(AbortReason::NoEligibleProjects));
        }
        log_changes!(
            verbosity,
            "  Ranked {} project(s), excluded {}",
            ranking.len(),
            ranking.excluded.len()
        );

        Ok(CycleResult::Ranked(ranking))
    }

    fn abort(&self, reason: AbortReason) -> CycleResult {
        log_changes!(self.engine.config().verbosity, "  {}", reason);
        CycleResult::Aborted(reason)
    }
}
