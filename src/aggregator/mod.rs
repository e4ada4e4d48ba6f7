//! Top-k rank aggregation over sorted lists.
//!
//! One scan serves every weight combination of a query. Sorted access is
//! round-robin: each round takes one entry from every list that is not yet
//! exhausted. Depending on the algorithm, an entity seen for the first time
//! is then random-accessed on the other lists that allow it:
//!
//! - `threshold`: on every other list (all must support random access).
//! - `partial_random_access`: on the other lists that support it.
//! - `no_random_access`: never.
//!
//! With random access on every list the partial algorithm performs exactly
//! the accesses of the threshold algorithm, so both return the same top-k.
//! Termination follows the worst/best bound rule in [`bounds`].

pub mod bounds;
pub mod stream;

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::error::{Result, SimSearchError};
use crate::provider::SortedListProvider;
use crate::types::{Algorithm, EntityId};

pub use bounds::{CombinationResult, RankedCandidate};

use bounds::{CandidateTable, CombinationTracker};
use stream::StreamPool;

/// Why a scan stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Every combination met its termination condition.
    Converged,
    /// Every list was read to the end.
    Exhausted,
    /// The sorted-access round limit was reached.
    DepthLimit,
    /// The query deadline passed.
    Deadline,
    /// A source failed mid-scan.
    SourceFailure,
}

impl Termination {
    /// Whether unconverged combinations were cut short.
    pub fn is_limit(&self) -> bool {
        matches!(
            self,
            Termination::DepthLimit | Termination::Deadline | Termination::SourceFailure
        )
    }
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Termination::Converged => "converged",
            Termination::Exhausted => "exhausted",
            Termination::DepthLimit => "depth_limit",
            Termination::Deadline => "deadline",
            Termination::SourceFailure => "source_failure",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregatorState {
    Initialized,
    Scanning,
    Terminated(Termination),
}

#[derive(Debug, Clone)]
pub struct AggregatorOptions {
    /// Maximum number of sorted-access rounds.
    pub max_depth: usize,
    pub deadline: Option<Instant>,
    /// Channel capacity per sorted stream.
    pub prefetch_capacity: usize,
}

impl Default for AggregatorOptions {
    fn default() -> Self {
        Self {
            max_depth: usize::MAX,
            deadline: None,
            prefetch_capacity: 256,
        }
    }
}

/// Per-attribute access statistics of one scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeProgress {
    pub attribute: String,
    pub sorted_accesses: u64,
    pub random_accesses: u64,
    pub exhausted: bool,
    pub failure: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationOutcome {
    pub combinations: Vec<CombinationResult>,
    pub termination: Termination,
    pub rounds: usize,
    pub attributes: Vec<AttributeProgress>,
}

/// Reject an algorithm the attributes' access capabilities cannot support.
/// `attributes` pairs each attribute name with its random-access support.
pub fn check_capabilities(algorithm: Algorithm, attributes: &[(&str, bool)]) -> Result<()> {
    match algorithm {
        Algorithm::Threshold => {
            if let Some((name, _)) = attributes.iter().find(|(_, random)| !random) {
                return Err(SimSearchError::IncompatibleAlgorithm {
                    algorithm: algorithm.to_string(),
                    attribute: name.to_string(),
                    reason: "its source supports sorted access only".to_string(),
                });
            }
        }
        Algorithm::PartialRandomAccess => {
            if !attributes.iter().any(|(_, random)| *random) {
                let name = attributes.first().map(|(n, _)| *n).unwrap_or_default();
                return Err(SimSearchError::IncompatibleAlgorithm {
                    algorithm: algorithm.to_string(),
                    attribute: name.to_string(),
                    reason: "no attribute of the query supports random access".to_string(),
                });
            }
        }
        Algorithm::NoRandomAccess => {}
    }
    Ok(())
}

/// Validate weight combinations: one weight per list, each a finite number
/// in `[0, 1]`.
pub fn validate_weights(combinations: &[Vec<f64>], lists: usize) -> Result<()> {
    if combinations.is_empty() {
        return Err(SimSearchError::Validation(
            "at least one weight combination is required".into(),
        ));
    }
    for (c, weights) in combinations.iter().enumerate() {
        if weights.len() != lists {
            return Err(SimSearchError::Validation(format!(
                "weight combination {c} has {} weights, expected {lists}",
                weights.len()
            )));
        }
        if let Some(w) = weights
            .iter()
            .find(|w| !w.is_finite() || **w < 0.0 || **w > 1.0)
        {
            return Err(SimSearchError::Validation(format!(
                "weight combination {c} has weight {w} outside [0, 1]"
            )));
        }
    }
    Ok(())
}

pub struct RankAggregator {
    algorithm: Algorithm,
    providers: Vec<Arc<dyn SortedListProvider>>,
    combinations: Vec<Vec<f64>>,
    k: usize,
    options: AggregatorOptions,
    state: AggregatorState,
}

impl RankAggregator {
    /// Validate the query against provider capabilities. Nothing is read
    /// from any provider here.
    pub fn new(
        algorithm: Algorithm,
        providers: Vec<Arc<dyn SortedListProvider>>,
        combinations: Vec<Vec<f64>>,
        k: usize,
        options: AggregatorOptions,
    ) -> Result<Self> {
        if providers.is_empty() {
            return Err(SimSearchError::Validation(
                "a query needs at least one attribute".into(),
            ));
        }
        if k == 0 {
            return Err(SimSearchError::Validation("k must be at least 1".into()));
        }
        validate_weights(&combinations, providers.len())?;
        let capabilities: Vec<(&str, bool)> = providers
            .iter()
            .map(|p| (p.attribute(), p.supports_random_access()))
            .collect();
        check_capabilities(algorithm, &capabilities)?;

        Ok(Self {
            algorithm,
            providers,
            combinations,
            k,
            options,
            state: AggregatorState::Initialized,
        })
    }

    pub fn state(&self) -> AggregatorState {
        self.state
    }

    /// Lists that are random-accessed for newly seen entities.
    fn random_lists(&self) -> Vec<usize> {
        match self.algorithm {
            Algorithm::NoRandomAccess => Vec::new(),
            Algorithm::Threshold | Algorithm::PartialRandomAccess => (0..self.providers.len())
                .filter(|&i| self.providers[i].supports_random_access())
                .collect(),
        }
    }

    #[instrument(skip(self), fields(algorithm = %self.algorithm, k = self.k, lists = self.providers.len(), combinations = self.combinations.len()))]
    pub async fn run(&mut self) -> Result<AggregationOutcome> {
        if self.state != AggregatorState::Initialized {
            return Err(SimSearchError::Internal(
                "rank aggregator can only run once".into(),
            ));
        }
        self.state = AggregatorState::Scanning;

        let result = self.scan().await;
        self.state = AggregatorState::Terminated(match &result {
            Ok(outcome) => outcome.termination,
            Err(_) => Termination::SourceFailure,
        });
        result
    }

    async fn scan(&self) -> Result<AggregationOutcome> {
        let lists = self.providers.len();
        let random_lists = self.random_lists();
        let deadline = self.options.deadline;

        let mut table = CandidateTable::new(lists);
        let mut trackers: Vec<CombinationTracker> = self
            .combinations
            .iter()
            .cloned()
            .map(CombinationTracker::new)
            .collect();
        let mut progress: Vec<AttributeProgress> = self
            .providers
            .iter()
            .map(|p| AttributeProgress {
                attribute: p.attribute().to_string(),
                ..Default::default()
            })
            .collect();

        let mut pool = StreamPool::spawn(&self.providers, self.options.prefetch_capacity);
        let mut rounds = 0usize;

        let termination = 'scan: loop {
            if rounds >= self.options.max_depth {
                break Termination::DepthLimit;
            }

            let active: Vec<usize> = (0..lists).filter(|&i| !table.is_exhausted(i)).collect();
            let Some(fetched) = within(deadline, pool.next_round(&active)).await else {
                break Termination::Deadline;
            };
            rounds += 1;

            let mut failed = false;
            for (&list, item) in active.iter().zip(fetched) {
                let entry = match item {
                    None => {
                        table.mark_exhausted(list);
                        progress[list].exhausted = true;
                        continue;
                    }
                    Some(Err(e)) => {
                        record_failure(&mut progress[list], e)?;
                        failed = true;
                        continue;
                    }
                    Some(Ok(entry)) => entry,
                };

                progress[list].sorted_accesses += 1;
                crate::metrics::SORTED_ACCESSES_TOTAL
                    .with_label_values(&[&progress[list].attribute])
                    .inc();

                let id = entry.id.clone();
                if !table.observe_sorted(list, entry) {
                    continue;
                }

                let targets: Vec<usize> = random_lists.iter().copied().filter(|&j| j != list).collect();
                if targets.is_empty() {
                    continue;
                }
                let Some(lookups) = within(deadline, self.random_access(&id, &targets)).await else {
                    break 'scan Termination::Deadline;
                };
                for (j, found) in lookups {
                    progress[j].random_accesses += 1;
                    crate::metrics::RANDOM_ACCESSES_TOTAL
                        .with_label_values(&[&progress[j].attribute])
                        .inc();
                    match found {
                        Ok(found) => table.observe_random(j, &id, found),
                        Err(e) => {
                            record_failure(&mut progress[j], e)?;
                            failed = true;
                        }
                    }
                }
            }

            let mut all_converged = true;
            for tracker in trackers.iter_mut() {
                all_converged &= tracker.check(&table, self.k);
            }
            debug!(round = rounds, candidates = table.len(), all_converged, "round complete");

            if all_converged {
                break if table.all_exhausted() {
                    Termination::Exhausted
                } else {
                    Termination::Converged
                };
            }
            if failed {
                break Termination::SourceFailure;
            }
        };
        drop(pool);

        if termination == Termination::SourceFailure && table.is_empty() {
            let failed = progress.iter().find(|p| p.failure.is_some());
            return Err(SimSearchError::SourceUnavailable {
                attribute: failed.map(|p| p.attribute.clone()).unwrap_or_default(),
                reason: failed
                    .and_then(|p| p.failure.clone())
                    .unwrap_or_else(|| "source failed before any candidate was seen".into()),
            });
        }

        let combinations: Vec<CombinationResult> = trackers
            .into_iter()
            .map(|t| t.finish(&table, self.k))
            .collect();
        let inexact = combinations.iter().filter(|c| !c.exact).count();
        if inexact > 0 {
            crate::metrics::INEXACT_RESULTS_TOTAL.inc_by(inexact as u64);
            warn!(%termination, inexact, "returning inexact results");
        }
        debug!(%termination, rounds, candidates = table.len(), "scan finished");

        Ok(AggregationOutcome {
            combinations,
            termination,
            rounds,
            attributes: progress,
        })
    }

    /// Look one entity up on several lists at once.
    async fn random_access(
        &self,
        id: &EntityId,
        targets: &[usize],
    ) -> Vec<(usize, Result<Option<crate::types::ScoredValue>>)> {
        let lookups = targets.iter().map(|&j| {
            let provider = &self.providers[j];
            async move { (j, provider.lookup(id).await) }
        });
        futures::future::join_all(lookups).await
    }
}

/// Run `fut` to completion, or give up at `deadline`.
async fn within<F: Future>(deadline: Option<Instant>, fut: F) -> Option<F::Output> {
    match deadline {
        Some(d) => tokio::time::timeout_at(d, fut).await.ok(),
        None => Some(fut.await),
    }
}

/// Note a provider error. Source failures end the scan gracefully; any other
/// error (e.g. random access on a sorted-only list) aborts the query.
fn record_failure(progress: &mut AttributeProgress, e: SimSearchError) -> Result<()> {
    if !e.is_source_failure() {
        return Err(e);
    }
    warn!(attribute = %progress.attribute, error = %e, "source failed mid-scan");
    crate::metrics::SOURCE_FAILURES_TOTAL
        .with_label_values(&[&progress.attribute])
        .inc();
    progress.failure = Some(e.to_string());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_needs_random_access_everywhere() {
        let err = check_capabilities(Algorithm::Threshold, &[("a", true), ("b", false)]);
        match err {
            Err(SimSearchError::IncompatibleAlgorithm { attribute, .. }) => assert_eq!(attribute, "b"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(check_capabilities(Algorithm::Threshold, &[("a", true)]).is_ok());
    }

    #[test]
    fn test_partial_needs_one_random_access_list() {
        assert!(check_capabilities(Algorithm::PartialRandomAccess, &[("a", false)]).is_err());
        assert!(
            check_capabilities(Algorithm::PartialRandomAccess, &[("a", false), ("b", true)]).is_ok()
        );
        assert!(check_capabilities(Algorithm::NoRandomAccess, &[("a", false)]).is_ok());
    }

    #[test]
    fn test_weight_validation() {
        assert!(validate_weights(&[vec![0.5, 1.0]], 2).is_ok());
        assert!(validate_weights(&[], 2).is_err());
        assert!(validate_weights(&[vec![0.5]], 2).is_err());
        assert!(validate_weights(&[vec![0.5, 1.5]], 2).is_err());
        assert!(validate_weights(&[vec![f64::NAN, 0.5]], 2).is_err());
        assert!(validate_weights(&[vec![-0.1, 0.5]], 2).is_err());
    }

    #[test]
    fn test_termination_limits() {
        assert!(Termination::Deadline.is_limit());
        assert!(Termination::SourceFailure.is_limit());
        assert!(!Termination::Converged.is_limit());
        assert!(!Termination::Exhausted.is_limit());
    }
}
