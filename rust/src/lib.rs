//! Prioritization engine for scheduling fuzzing pipeline runs.
//!
//! Given the projects of a fuzzing group and a limited pool of runners, the
//! engine decides which projects are eligible for a new pipeline run and in
//! which order they should be dispatched. Talking to the source-control host,
//! the defect tracker and the dispatcher is left to injected collaborators.

pub mod collaborators;
mod config;
pub mod filters;
pub mod logging;
mod models;
pub mod normalize;
mod orchestrator;
mod priority;

pub use collaborators::{
    BoundedDefectLookup, Clock, CollaboratorError, DefectLookup, DefectSource, DefectTable,
    FixedClock, NoDefectTracker, ProjectDiscovery, SystemClock, Worker, WorkerAvailability,
    ZeroOnError,
};
pub use config::{
    ConfigError, PriorityConfig, Weights, DEFAULT_COOLDOWN_SECS, DEFAULT_DEFECT_LOOKUP_TIMEOUT_MS,
};
pub use filters::{is_in_cooldown, is_ready};
pub use models::{
    Exclusion, ExclusionReason, ProjectCandidate, Ranking, ScoreBreakdown, ScoredCandidate,
};
pub use normalize::normalize;
pub use orchestrator::{AbortReason, CycleError, CycleResult, ScheduleOrchestrator};
pub use priority::{PriorityEngine, PriorityError};
