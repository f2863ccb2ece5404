//! Core data types for the prioritization engine.

use chrono::{DateTime, Utc};

/// A project considered for a pipeline run in one scheduling cycle.
///
/// Built once per cycle from discovery data and treated as read-only.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProjectCandidate {
    pub id: i64,
    /// Display name, also the key used for defect lookups.
    pub name: String,
    pub path_with_namespace: String,
    pub web_url: String,
    pub default_branch: String,
    pub archived: bool,
    pub main_branch_exists: bool,
    pub has_pipeline_definition: bool,
    /// Time of the latest commit on the main branch.
    pub last_modified: Option<DateTime<Utc>>,
    /// Update time of the most recent pipeline run on the main branch.
    pub last_pipeline_run: Option<DateTime<Utc>>,
    pub pipeline_run_count: u64,
}

impl ProjectCandidate {
    /// A candidate with only identity set: no main branch, no pipeline
    /// definition, no timestamps and no runs.
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id,
            path_with_namespace: name.clone(),
            name,
            web_url: String::new(),
            default_branch: "main".to_string(),
            archived: false,
            main_branch_exists: false,
            has_pipeline_definition: false,
            last_modified: None,
            last_pipeline_run: None,
            pipeline_run_count: 0,
        }
    }
}

/// Per-factor contributions to a candidate's score (already weighted).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScoreBreakdown {
    pub change_age: f64,
    pub runs: f64,
    pub defects: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.change_age + self.runs + self.defects
    }
}

/// An eligible candidate with its priority score.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScoredCandidate {
    pub candidate: ProjectCandidate,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
    /// Open defects reported for this candidate during the cycle.
    pub defect_count: u32,
}

/// Why a candidate was left out of the ranking.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExclusionReason {
    MissingMainBranch,
    MissingPipelineDefinition,
    Cooldown {
        last_run: DateTime<Utc>,
        eligible_at: DateTime<Utc>,
    },
}

impl std::fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingMainBranch => write!(f, "main branch does not exist"),
            Self::MissingPipelineDefinition => write!(f, "no pipeline definition on main branch"),
            Self::Cooldown {
                last_run,
                eligible_at,
            } => write!(
                f,
                "in cooldown (last run {}, eligible at {})",
                last_run, eligible_at
            ),
        }
    }
}

/// A filtered-out candidate.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Exclusion {
    pub candidate: ProjectCandidate,
    pub reason: ExclusionReason,
}

/// Output of one prioritization pass.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Ranking {
    /// Eligible candidates, highest priority first.
    pub ranked: Vec<ScoredCandidate>,
    /// Filtered candidates in discovery order.
    pub excluded: Vec<Exclusion>,
}

impl Ranking {
    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ranked.len()
    }

    /// Project ids in ranked order.
    pub fn ids(&self) -> Vec<i64> {
        self.ranked.iter().map(|s| s.candidate.id).collect()
    }

    /// The `n` highest-priority candidates (fewer if the ranking is shorter).
    pub fn top(&self, n: usize) -> &[ScoredCandidate] {
        &self.ranked[..n.min(self.ranked.len())]
    }
}
