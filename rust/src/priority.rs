//! Multi-factor prioritization of candidate projects.
//!
//! One pass per scheduling cycle:
//! 1. Drop candidates that are not ready or are still cooling down
//! 2. Extract change age, run count and defect count for the survivors
//! 3. Min-max normalize each signal independently
//! 4. Invert the run-count signal so under-tested projects score higher
//! 5. Combine with the configured weights
//! 6. Stable sort by score, highest first
//!
//! The change-age signal rewards staleness: a project whose last commit is
//! older scores higher. This is the reference behaviour and is kept as is.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::collaborators::{BoundedDefectLookup, DefectLookup};
use crate::config::{ConfigError, PriorityConfig, Weights};
use crate::filters::exclusion_reason;
use crate::models::{Exclusion, ProjectCandidate, Ranking, ScoreBreakdown, ScoredCandidate};
use crate::normalize::normalize;
use crate::{log_checks, log_debug};

/// Errors that abort a prioritization pass.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PriorityError {
    #[error("Eligible project {name} (id {id}) has no last-modified timestamp")]
    MissingLastModified { id: i64, name: String },
}

/// Compare scores for a descending sort; NaN compares equal to everything.
fn cmp_score_desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

/// Seconds elapsed between `then` and `now` (negative if `then` is later).
fn seconds_since(then: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - then).num_milliseconds() as f64 / 1000.0
}

/// Ranks candidate projects for pipeline dispatch.
pub struct PriorityEngine {
    config: PriorityConfig,
    weights: Weights,
    defects: Arc<dyn DefectLookup>,
}

impl std::fmt::Debug for PriorityEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityEngine")
            .field("config", &self.config)
            .field("weights", &self.weights)
            .finish_non_exhaustive()
    }
}

impl PriorityEngine {
    /// Build an engine around a defect lookup.
    ///
    /// When `config.defect_lookup_timeout_ms` is set, every lookup is wrapped
    /// in a [`BoundedDefectLookup`].
    pub fn new(config: PriorityConfig, defects: Arc<dyn DefectLookup>) -> Result<Self, ConfigError> {
        config.validate()?;
        let defects: Arc<dyn DefectLookup> = match config.defect_lookup_timeout() {
            Some(timeout) => Arc::new(BoundedDefectLookup::new(defects, timeout)),
            None => defects,
        };
        Ok(Self {
            weights: config.effective_weights(),
            config,
            defects,
        })
    }

    pub fn config(&self) -> &PriorityConfig {
        &self.config
    }

    /// Weights used for scoring, after optional normalization.
    pub fn weights(&self) -> Weights {
        self.weights
    }

    /// Ranked eligible candidates, highest priority first.
    pub fn rank(
        &self,
        candidates: &[ProjectCandidate],
        now: DateTime<Utc>,
    ) -> Result<Vec<ScoredCandidate>, PriorityError> {
        Ok(self.evaluate(candidates, now)?.ranked)
    }

    /// Ranked eligible candidates plus every excluded candidate and why.
    pub fn evaluate(
        &self,
        candidates: &[ProjectCandidate],
        now: DateTime<Utc>,
    ) -> Result<Ranking, PriorityError> {
        let verbosity = self.config.verbosity;
        let cooldown = self.config.cooldown();

        let mut eligible: Vec<&ProjectCandidate> = Vec::with_capacity(candidates.len());
        let mut excluded: Vec<Exclusion> = Vec::new();

        for candidate in candidates {
            match exclusion_reason(candidate, now, cooldown) {
                Some(reason) => {
                    log_checks!(
                        verbosity,
                        "  Excluding {} (id {}): {}",
                        candidate.name,
                        candidate.id,
                        reason
                    );
                    excluded.push(Exclusion {
                        candidate: candidate.clone(),
                        reason,
                    });
                }
                None => eligible.push(candidate),
            }
        }

        if eligible.is_empty() {
            return Ok(Ranking {
                ranked: Vec::new(),
                excluded,
            });
        }

        // Validate before spending any defect lookups
        let change_ages = eligible
            .iter()
            .map(|c| match c.last_modified {
                Some(modified) => Ok(seconds_since(modified, now)),
                None => Err(PriorityError::MissingLastModified {
                    id: c.id,
                    name: c.name.clone(),
                }),
            })
            .collect::<Result<Vec<f64>, _>>()?;
        let run_counts: Vec<f64> = eligible
            .iter()
            .map(|c| c.pipeline_run_count as f64)
            .collect();
        let defect_counts = self.lookup_defects(&eligible);

        log_debug!(
            verbosity,
            "  Signals: change_age={:?} runs={:?} defects={:?}",
            change_ages,
            run_counts,
            defect_counts
        );

        let norm_change = normalize(&change_ages);
        let runs_factor: Vec<f64> = normalize(&run_counts).into_iter().map(|x| 1.0 - x).collect();
        let norm_defects =
            normalize(&defect_counts.iter().map(|&d| f64::from(d)).collect::<Vec<_>>());

        let w = self.weights;
        let mut ranked: Vec<ScoredCandidate> = eligible
            .iter()
            .enumerate()
            .map(|(i, candidate)| {
                let breakdown = ScoreBreakdown {
                    change_age: norm_change[i] * w.change_age,
                    runs: runs_factor[i] * w.run_count,
                    defects: norm_defects[i] * w.defects,
                };
                log_debug!(
                    verbosity,
                    "  {}: score={:.4} ({:?})",
                    candidate.name,
                    breakdown.total(),
                    breakdown
                );
                ScoredCandidate {
                    candidate: (*candidate).clone(),
                    score: breakdown.total(),
                    breakdown,
                    defect_count: defect_counts[i],
                }
            })
            .collect();

        // sort_by is stable: equal scores keep discovery order
        ranked.sort_by(|a, b| cmp_score_desc(a.score, b.score));

        Ok(Ranking { ranked, excluded })
    }

    /// Defect counts in the same order as `eligible`.
    fn lookup_defects(&self, eligible: &[&ProjectCandidate]) -> Vec<u32> {
        #[cfg(feature = "parallel")]
        if self.config.parallel_lookups {
            use rayon::prelude::*;
            return eligible
                .par_iter()
                .map(|c| self.defects.count(&c.name))
                .collect();
        }

        eligible.iter().map(|c| self.defects.count(&c.name)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{DefectTable, NoDefectTracker};
    use chrono::{TimeDelta, TimeZone};
    use std::sync::Mutex;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
    }

    fn make_candidate(id: i64, change_age_secs: i64, runs: u64) -> ProjectCandidate {
        ProjectCandidate {
            main_branch_exists: true,
            has_pipeline_definition: true,
            last_modified: Some(now() - TimeDelta::seconds(change_age_secs)),
            last_pipeline_run: None,
            pipeline_run_count: runs,
            ..ProjectCandidate::new(id, format!("project-{}", id))
        }
    }

    fn engine_with(defects: impl DefectLookup + 'static) -> PriorityEngine {
        let config = PriorityConfig {
            defect_lookup_timeout_ms: None,
            ..PriorityConfig::default()
        };
        PriorityEngine::new(config, Arc::new(defects)).unwrap()
    }

    /// Records every name it is asked about and the thread that asked.
    #[derive(Default)]
    struct RecordingLookup {
        table: DefectTable,
        seen: Mutex<Vec<String>>,
        threads: Mutex<Vec<std::thread::ThreadId>>,
    }

    impl DefectLookup for RecordingLookup {
        fn count(&self, candidate_name: &str) -> u32 {
            self.seen.lock().unwrap().push(candidate_name.to_string());
            self.threads.lock().unwrap().push(std::thread::current().id());
            self.table.count(candidate_name)
        }
    }

    #[test]
    fn test_reference_scenario() {
        let candidates = vec![
            make_candidate(1, 100_000, 10),
            make_candidate(2, 50, 0),
            make_candidate(3, 200_000, 5),
        ];
        let defects: DefectTable = [("project-1", 2), ("project-2", 0), ("project-3", 8)]
            .into_iter()
            .collect();
        let engine = engine_with(defects);

        let ranked = engine.rank(&candidates, now()).unwrap();
        let ids: Vec<i64> = ranked.iter().map(|s| s.candidate.id).collect();
        assert_eq!(ids, vec![3, 1, 2]);

        // project-3: 0.3*1.0 + 0.2*0.5 + 0.4*1.0
        assert!((ranked[0].score - 0.8).abs() < 1e-9);
        // project-1: 0.3*(99950/199950) + 0.2*0.0 + 0.4*0.25
        let expected = 0.3 * (99_950.0 / 199_950.0) + 0.1;
        assert!((ranked[1].score - expected).abs() < 1e-9);
        // project-2: 0.3*0.0 + 0.2*1.0 + 0.4*0.0
        assert!((ranked[2].score - 0.2).abs() < 1e-9);
        assert_eq!(ranked[2].defect_count, 0);
        assert_eq!(ranked[0].defect_count, 8);
    }

    #[test]
    fn test_stale_undertested_buggy_project_wins() {
        let a = make_candidate(1, 30 * 86_400, 1);
        let b = make_candidate(2, 60, 40);
        let defects: DefectTable = [("project-1", 6)].into_iter().collect();
        let engine = engine_with(defects);

        let ranked = engine.rank(&[b, a], now()).unwrap();
        assert_eq!(ranked[0].candidate.id, 1);
        assert_eq!(ranked[1].candidate.id, 2);
        assert!(ranked[0].score > ranked[1].score);
        assert!((ranked[0].score - 0.9).abs() < 1e-9);
        assert!(ranked[1].score.abs() < 1e-9);
    }

    #[test]
    fn test_equal_scores_keep_discovery_order() {
        let candidates = vec![
            make_candidate(5, 1_000, 3),
            make_candidate(2, 1_000, 3),
            make_candidate(9, 1_000, 3),
        ];
        let ranked = engine_with(NoDefectTracker).rank(&candidates, now()).unwrap();
        let ids: Vec<i64> = ranked.iter().map(|s| s.candidate.id).collect();
        assert_eq!(ids, vec![5, 2, 9]);
        // Every signal is constant: 0.5 * each weight
        for s in &ranked {
            assert!((s.score - 0.45).abs() < 1e-9);
        }
    }

    #[test]
    fn test_ties_among_mixed_scores_are_stable() {
        let candidates = vec![
            make_candidate(1, 100, 5),
            make_candidate(2, 500, 5),
            make_candidate(3, 100, 5),
        ];
        let ranked = engine_with(NoDefectTracker).rank(&candidates, now()).unwrap();
        let ids: Vec<i64> = ranked.iter().map(|s| s.candidate.id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[test]
    fn test_missing_main_branch_never_ranked() {
        let mut buggy = make_candidate(1, 10 * 86_400, 0);
        buggy.main_branch_exists = false;
        let other = make_candidate(2, 10, 100);
        let defects: DefectTable = [("project-1", 100)].into_iter().collect();

        let ranking = engine_with(defects).evaluate(&[buggy, other], now()).unwrap();
        assert_eq!(ranking.ids(), vec![2]);
        assert_eq!(ranking.excluded.len(), 1);
        assert_eq!(ranking.excluded[0].candidate.id, 1);
        assert_eq!(
            ranking.excluded[0].reason,
            crate::models::ExclusionReason::MissingMainBranch
        );
    }

    #[test]
    fn test_cooldown_excludes_recent_runs() {
        let mut recent = make_candidate(1, 1_000, 2);
        recent.last_pipeline_run = Some(now() - TimeDelta::hours(1));
        let mut old = make_candidate(2, 1_000, 2);
        old.last_pipeline_run = Some(now() - TimeDelta::hours(25));
        let mut boundary = make_candidate(3, 1_000, 2);
        boundary.last_pipeline_run = Some(now() - TimeDelta::hours(24));

        let ranking = engine_with(NoDefectTracker)
            .evaluate(&[recent, old, boundary], now())
            .unwrap();
        assert_eq!(ranking.ids(), vec![2, 3]);
        assert_eq!(ranking.excluded.len(), 1);
        assert!(matches!(
            ranking.excluded[0].reason,
            crate::models::ExclusionReason::Cooldown { .. }
        ));
    }

    #[test]
    fn test_defect_lookup_only_for_eligible_in_order() {
        let mut not_ready = make_candidate(1, 100, 1);
        not_ready.has_pipeline_definition = false;
        let mut cooling = make_candidate(2, 100, 1);
        cooling.last_pipeline_run = Some(now() - TimeDelta::minutes(5));
        let candidates = vec![
            make_candidate(4, 100, 1),
            not_ready,
            cooling,
            make_candidate(3, 100, 1),
        ];

        let lookup = Arc::new(RecordingLookup::default());
        let config = PriorityConfig {
            defect_lookup_timeout_ms: None,
            ..PriorityConfig::default()
        };
        let engine = PriorityEngine::new(config, lookup.clone()).unwrap();
        engine.rank(&candidates, now()).unwrap();

        assert_eq!(
            *lookup.seen.lock().unwrap(),
            vec!["project-4".to_string(), "project-3".to_string()]
        );
    }

    #[test]
    fn test_missing_last_modified_is_an_error() {
        let mut broken = make_candidate(7, 0, 0);
        broken.last_modified = None;
        let result = engine_with(NoDefectTracker).rank(&[make_candidate(1, 5, 5), broken], now());
        assert_eq!(
            result,
            Err(PriorityError::MissingLastModified {
                id: 7,
                name: "project-7".to_string()
            })
        );
    }

    #[test]
    fn test_missing_last_modified_ignored_when_excluded() {
        let mut not_ready = make_candidate(7, 0, 0);
        not_ready.last_modified = None;
        not_ready.main_branch_exists = false;
        let ranked = engine_with(NoDefectTracker)
            .rank(&[not_ready, make_candidate(1, 5, 5)], now())
            .unwrap();
        assert_eq!(ranked.len(), 1);
    }

    #[test]
    fn test_empty_input_is_empty_ranking() {
        let ranking = engine_with(NoDefectTracker).evaluate(&[], now()).unwrap();
        assert!(ranking.is_empty());
        assert!(ranking.excluded.is_empty());
    }

    #[test]
    fn test_all_filtered_is_empty_ranking() {
        let mut c = make_candidate(1, 100, 1);
        c.main_branch_exists = false;
        let ranking = engine_with(NoDefectTracker).evaluate(&[c], now()).unwrap();
        assert!(ranking.is_empty());
        assert_eq!(ranking.excluded.len(), 1);
    }

    #[test]
    fn test_single_candidate_gets_neutral_score() {
        let ranked = engine_with(NoDefectTracker)
            .rank(&[make_candidate(1, 100, 1)], now())
            .unwrap();
        assert!((ranked[0].score - 0.45).abs() < 1e-9);
    }

    #[test]
    fn test_breakdown_sums_to_score() {
        let candidates = vec![make_candidate(1, 10, 4), make_candidate(2, 1_000, 1)];
        let defects: DefectTable = [("project-1", 3)].into_iter().collect();
        for s in engine_with(defects).rank(&candidates, now()).unwrap() {
            assert!((s.breakdown.total() - s.score).abs() < 1e-12);
        }
    }

    #[test]
    fn test_normalized_weights_scale_scores() {
        let config = PriorityConfig {
            normalize_weights: true,
            defect_lookup_timeout_ms: None,
            ..PriorityConfig::default()
        };
        let engine = PriorityEngine::new(config, Arc::new(NoDefectTracker)).unwrap();
        assert!((engine.weights().sum() - 1.0).abs() < 1e-12);

        let ranked = engine.rank(&[make_candidate(1, 100, 1)], now()).unwrap();
        assert!((ranked[0].score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = PriorityConfig {
            weights: Weights::new(-1.0, 0.2, 0.4),
            ..PriorityConfig::default()
        };
        assert!(PriorityEngine::new(config, Arc::new(NoDefectTracker)).is_err());
    }

    #[test]
    fn test_bounded_lookup_is_applied_from_config() {
        let defects: DefectTable = [("project-1", 4)].into_iter().collect();
        let config = PriorityConfig {
            defect_lookup_timeout_ms: Some(crate::config::DEFAULT_DEFECT_LOOKUP_TIMEOUT_MS),
            ..PriorityConfig::default()
        };
        let engine = PriorityEngine::new(config, Arc::new(defects)).unwrap();
        let ranked = engine
            .rank(&[make_candidate(1, 100, 1), make_candidate(2, 100, 1)], now())
            .unwrap();
        assert_eq!(ranked[0].candidate.id, 1);
        assert_eq!(ranked[0].defect_count, 4);
    }

    #[test]
    fn test_default_config_calls_lookup_directly() {
        let lookup = Arc::new(RecordingLookup::default());
        let engine = PriorityEngine::new(PriorityConfig::default(), lookup.clone()).unwrap();
        engine.rank(&[make_candidate(1, 100, 1)], now()).unwrap();
        // No helper thread without a configured timeout
        assert_eq!(
            *lookup.threads.lock().unwrap(),
            vec![std::thread::current().id()]
        );
    }

    #[test]
    fn test_huge_cooldown_ranks_without_panicking() {
        let config = PriorityConfig {
            cooldown_secs: 10_000_000_000_000,
            defect_lookup_timeout_ms: None,
            ..PriorityConfig::default()
        };
        let engine = PriorityEngine::new(config, Arc::new(NoDefectTracker)).unwrap();
        let mut cooling = make_candidate(1, 100, 1);
        cooling.last_pipeline_run = Some(now() - TimeDelta::hours(1));

        let ranking = engine
            .evaluate(&[cooling, make_candidate(2, 100, 1)], now())
            .unwrap();
        assert_eq!(ranking.ids(), vec![2]);
        assert_eq!(ranking.excluded.len(), 1);
    }

    #[test]
    fn test_out_of_range_cooldown_rejected() {
        let config = PriorityConfig {
            cooldown_secs: i64::MAX,
            ..PriorityConfig::default()
        };
        assert_eq!(
            PriorityEngine::new(config, Arc::new(NoDefectTracker)).unwrap_err(),
            ConfigError::CooldownTooLarge(i64::MAX)
        );
    }

    #[test]
    fn test_future_last_modified_scores_freshest() {
        let mut future = make_candidate(1, 0, 1);
        future.last_modified = Some(now() + TimeDelta::hours(1));
        let ranked = engine_with(NoDefectTracker)
            .rank(&[future, make_candidate(2, 3_600, 1)], now())
            .unwrap();
        assert_eq!(ranked[0].candidate.id, 2);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_parallel_lookups_preserve_order() {
        let candidates: Vec<ProjectCandidate> =
            (1..=32).map(|i| make_candidate(i, 100, 1)).collect();
        let defects: DefectTable = (1..=32u32)
            .map(|i| (format!("project-{}", i), i))
            .collect();
        let config = PriorityConfig {
            parallel_lookups: true,
            defect_lookup_timeout_ms: None,
            ..PriorityConfig::default()
        };
        let engine = PriorityEngine::new(config, Arc::new(defects)).unwrap();
        let ranked = engine.rank(&candidates, now()).unwrap();
        let ids: Vec<i64> = ranked.iter().map(|s| s.candidate.id).collect();
        assert_eq!(ids, (1..=32).rev().collect::<Vec<i64>>());
    }
}
