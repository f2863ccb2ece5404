//! Capabilities the engine consumes from the outside world.
//!
//! The engine never talks to a source-control host or a defect tracker
//! directly. Callers inject implementations of these traits; the ones in this
//! module cover clocks, in-memory defect tables and the fallback and timeout
//! policies every defect lookup must obey.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::models::ProjectCandidate;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure reported by an external collaborator.
#[derive(Error, Debug)]
#[error("{context}: {source}")]
pub struct CollaboratorError {
    pub context: String,
    #[source]
    pub source: BoxError,
}

impl CollaboratorError {
    pub fn new(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            context: context.into(),
            source: source.into(),
        }
    }
}

/// An execution worker able to pick up pipeline jobs.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Worker {
    pub id: i64,
    pub description: String,
    pub online: bool,
}

/// Lists the workers currently available to run pipelines.
pub trait WorkerAvailability {
    fn list(&self) -> Result<Vec<Worker>, CollaboratorError>;
}

/// Lists the candidate projects for a cycle, in discovery order.
pub trait ProjectDiscovery {
    fn list(&self) -> Result<Vec<ProjectCandidate>, CollaboratorError>;
}

/// Reports open defects for a project.
///
/// Implementations must not fail: an unavailable tracker reports 0.
pub trait DefectLookup: Send + Sync {
    fn count(&self, candidate_name: &str) -> u32;
}

/// Source of the current time.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

impl<T: DefectLookup + ?Sized> DefectLookup for Arc<T> {
    fn count(&self, candidate_name: &str) -> u32 {
        (**self).count(candidate_name)
    }
}

impl<T: DefectLookup + ?Sized> DefectLookup for Box<T> {
    fn count(&self, candidate_name: &str) -> u32 {
        (**self).count(candidate_name)
    }
}

impl<T: WorkerAvailability + ?Sized> WorkerAvailability for Box<T> {
    fn list(&self) -> Result<Vec<Worker>, CollaboratorError> {
        (**self).list()
    }
}

impl<T: ProjectDiscovery + ?Sized> ProjectDiscovery for Box<T> {
    fn list(&self) -> Result<Vec<ProjectCandidate>, CollaboratorError> {
        (**self).list()
    }
}

impl<T: Clock + ?Sized> Clock for Box<T> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// Wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at a given instant.
#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Used when no defect tracker is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoDefectTracker;

impl DefectLookup for NoDefectTracker {
    fn count(&self, _candidate_name: &str) -> u32 {
        0
    }
}

/// Pre-fetched defect counts keyed by project name.
#[derive(Clone, Debug, Default)]
pub struct DefectTable {
    counts: FxHashMap<String, u32>,
}

impl DefectTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, count: u32) -> Option<u32> {
        self.counts.insert(name.into(), count)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, u32)> for DefectTable {
    fn from_iter<I: IntoIterator<Item = (S, u32)>>(iter: I) -> Self {
        Self {
            counts: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl DefectLookup for DefectTable {
    fn count(&self, candidate_name: &str) -> u32 {
        self.counts.get(candidate_name).copied().unwrap_or(0)
    }
}

/// A defect tracker client whose requests can fail.
pub trait DefectSource: Send + Sync {
    fn fetch(&self, candidate_name: &str) -> Result<u32, CollaboratorError>;
}

/// Adapts a [`DefectSource`] into a [`DefectLookup`] reporting 0 on failure.
#[derive(Clone, Debug)]
pub struct ZeroOnError<S> {
    source: S,
}

impl<S: DefectSource> ZeroOnError<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

impl<S: DefectSource> DefectLookup for ZeroOnError<S> {
    fn count(&self, candidate_name: &str) -> u32 {
        match self.source.fetch(candidate_name) {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(
                    project = candidate_name,
                    error = %e,
                    "defect lookup failed, using 0"
                );
                0
            }
        }
    }
}

/// Default cap on helper threads a [`BoundedDefectLookup`] keeps alive.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;

/// Caps how long a single lookup may take.
///
/// The inner lookup runs on a helper thread; when it does not answer within
/// `timeout` the count is 0 and the late answer is discarded. A timed-out
/// helper keeps running until the inner lookup returns, so the inner lookup
/// should carry its own request timeout. At most `max_in_flight` helpers
/// exist at once; further lookups report 0 without starting a thread.
#[derive(Clone)]
pub struct BoundedDefectLookup {
    inner: Arc<dyn DefectLookup>,
    timeout: Duration,
    max_in_flight: usize,
    in_flight: Arc<AtomicUsize>,
}

/// Releases an in-flight slot when the helper thread finishes or unwinds.
struct InFlightSlot(Arc<AtomicUsize>);

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl BoundedDefectLookup {
    pub fn new(inner: Arc<dyn DefectLookup>, timeout: Duration) -> Self {
        Self {
            inner,
            timeout,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Helper threads still running, including ones that already timed out.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    fn acquire_slot(&self) -> Option<InFlightSlot> {
        let mut current = self.in_flight.load(Ordering::Acquire);
        loop {
            if current >= self.max_in_flight {
                return None;
            }
            match self.in_flight.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(InFlightSlot(Arc::clone(&self.in_flight))),
                Err(actual) => current = actual,
            }
        }
    }
}

impl std::fmt::Debug for BoundedDefectLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedDefectLookup")
            .field("timeout", &self.timeout)
            .field("max_in_flight", &self.max_in_flight)
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

impl DefectLookup for BoundedDefectLookup {
    fn count(&self, candidate_name: &str) -> u32 {
        let Some(slot) = self.acquire_slot() else {
            tracing::warn!(
                project = candidate_name,
                max_in_flight = self.max_in_flight,
                "too many stalled defect lookups, using 0"
            );
            return 0;
        };

        let (tx, rx) = mpsc::sync_channel(1);
        let inner = Arc::clone(&self.inner);
        let name = candidate_name.to_string();

        // On spawn failure the closure (and the slot) is dropped, freeing it
        let spawned = thread::Builder::new()
            .name("defect-lookup".to_string())
            .spawn(move || {
                let _slot = slot;
                // The receiver is gone if we already timed out
                let _ = tx.send(inner.count(&name));
            });
        if let Err(e) = spawned {
            tracing::warn!(project = candidate_name, error = %e, "could not start defect lookup, using 0");
            return 0;
        }

        match rx.recv_timeout(self.timeout) {
            Ok(count) => count,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    project = candidate_name,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "defect lookup timed out, using 0"
                );
                0
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                tracing::warn!(project = candidate_name, "defect lookup aborted, using 0");
                0
            }
        }
    }
}
