//! Configuration types for the prioritization engine.

use chrono::TimeDelta;
use thiserror::Error;

/// Default cooldown after a pipeline run: 24 hours.
pub const DEFAULT_COOLDOWN_SECS: i64 = 24 * 60 * 60;

/// Suggested time bound for a network-backed defect lookup.
pub const DEFAULT_DEFECT_LOOKUP_TIMEOUT_MS: u64 = 5_000;

/// Errors raised when a configuration cannot drive the engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Weight '{name}' must be finite and non-negative, got {value}")]
    InvalidWeight { name: &'static str, value: f64 },
    #[error("Cooldown must be non-negative, got {0}s")]
    NegativeCooldown(i64),
    #[error("Cooldown of {0}s is out of range")]
    CooldownTooLarge(i64),
    #[error("Invalid verbosity {0} (expected 0-3)")]
    InvalidVerbosity(u8),
}

/// Relative importance of each scoring factor.
///
/// The reference triple sums to 0.9. Scores stay comparable within a cycle
/// either way; use [`PriorityConfig::normalize_weights`] to rescale to 1.0.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Weights {
    /// Weight for time since the last commit on the main branch.
    pub change_age: f64,
    /// Weight for the inverted historical pipeline run count.
    pub run_count: f64,
    /// Weight for open defects reported by the defect tracker.
    pub defects: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            change_age: 0.3,
            run_count: 0.2,
            defects: 0.4,
        }
    }
}

impl Weights {
    pub fn new(change_age: f64, run_count: f64, defects: f64) -> Self {
        Self {
            change_age,
            run_count,
            defects,
        }
    }

    pub fn sum(&self) -> f64 {
        self.change_age + self.run_count + self.defects
    }

    /// Rescale so the weights sum to 1.0.
    ///
    /// All-zero weights are returned unchanged.
    pub fn normalized(&self) -> Self {
        let sum = self.sum();
        if sum > 0.0 {
            Self {
                change_age: self.change_age / sum,
                run_count: self.run_count / sum,
                defects: self.defects / sum,
            }
        } else {
            *self
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("change_age", self.change_age),
            ("run_count", self.run_count),
            ("defects", self.defects),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidWeight { name, value });
            }
        }
        Ok(())
    }
}

/// Configuration for candidate filtering and scoring.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PriorityConfig {
    /// Factor weights applied to the normalized signals.
    pub weights: Weights,
    /// Rescale `weights` to sum to 1.0 before scoring (off by default).
    pub normalize_weights: bool,
    /// Seconds after a pipeline run during which a project is not re-selected.
    pub cooldown_secs: i64,
    /// Upper bound for one defect-count lookup; `None` (default) calls the
    /// lookup directly. Set it for network-backed lookups.
    pub defect_lookup_timeout_ms: Option<u64>,
    /// Run defect lookups on the rayon pool (requires the `parallel` feature).
    pub parallel_lookups: bool,
    /// Verbosity level: 0=silent, 1=changes, 2=checks, 3=debug.
    pub verbosity: u8,
}

impl Default for PriorityConfig {
    fn default() -> Self {
        Self {
            weights: Weights::default(),
            normalize_weights: false,
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
            defect_lookup_timeout_ms: None,
            parallel_lookups: false,
            verbosity: 0,
        }
    }
}

impl PriorityConfig {
    /// Cooldown window; out-of-range values saturate (rejected by `validate`).
    pub fn cooldown(&self) -> TimeDelta {
        TimeDelta::try_seconds(self.cooldown_secs).unwrap_or(TimeDelta::MAX)
    }

    pub fn defect_lookup_timeout(&self) -> Option<std::time::Duration> {
        self.defect_lookup_timeout_ms
            .map(std::time::Duration::from_millis)
    }

    /// Weights as they enter the score, after optional normalization.
    pub fn effective_weights(&self) -> Weights {
        if self.normalize_weights {
            self.weights.normalized()
        } else {
            self.weights
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.weights.validate()?;
        if self.cooldown_secs < 0 {
            return Err(ConfigError::NegativeCooldown(self.cooldown_secs));
        }
        if TimeDelta::try_seconds(self.cooldown_secs).is_none() {
            return Err(ConfigError::CooldownTooLarge(self.cooldown_secs));
        }
        if self.verbosity > crate::logging::VERBOSITY_DEBUG {
            return Err(ConfigError::InvalidVerbosity(self.verbosity));
        }
        Ok(())
    }
}
