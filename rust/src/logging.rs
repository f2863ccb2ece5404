//! Logging macros for the prioritization engine with verbosity level control.
//!
//! The macros emit `tracing` events, so the host process decides where they go.
//! Verbosity gates them before `tracing` sees anything, which keeps a silent
//! engine free of event construction costs.
//!
//! - 0: SILENT (only warnings and errors)
//! - 1: CHANGES (cycle steps, abort reasons, ranking summaries)
//! - 2: CHECKS (per-candidate exclusions and eligibility checks)
//! - 3: DEBUG (signal vectors and per-factor scores)

/// Verbosity level constants.
pub const VERBOSITY_SILENT: u8 = 0;
pub const VERBOSITY_CHANGES: u8 = 1;
pub const VERBOSITY_CHECKS: u8 = 2;
pub const VERBOSITY_DEBUG: u8 = 3;

/// Log at CHANGES level (verbosity >= 1).
///
/// Used for: cycle start, collaborator result sizes, abort reasons.
#[macro_export]
macro_rules! log_changes {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_CHANGES {
            ::tracing::info!($($arg)*);
        }
    };
}

/// Log at CHECKS level (verbosity >= 2).
///
/// Used for: readiness and cooldown exclusions.
#[macro_export]
macro_rules! log_checks {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_CHECKS {
            ::tracing::debug!($($arg)*);
        }
    };
}

/// Log at DEBUG level (verbosity >= 3).
///
/// Used for: raw and normalized signals, score breakdowns.
#[macro_export]
macro_rules! log_debug {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_DEBUG {
            ::tracing::trace!($($arg)*);
        }
    };
}
