//! Sorted list providers.
//!
//! A provider turns one attribute's candidate rows into a stream of
//! [`SortedListEntry`] values in non-increasing score order (ties by
//! ascending id), and answers random-access lookups where its source
//! supports them.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::catalog::Attribute;
use crate::error::{Result, SimSearchError};
use crate::similarity::Scorer;
use crate::source::{SourceConnector, SourceRow};
use crate::types::{EntityId, ScoredValue, SortedListEntry};

#[async_trait]
pub trait SortedListProvider: Send + Sync {
    /// Attribute this provider serves.
    fn attribute(&self) -> &str;

    fn supports_random_access(&self) -> bool;

    /// Next-highest-scoring unseen entity, or `None` at end of stream.
    async fn next(&self) -> Result<Option<SortedListEntry>>;

    /// Score of one entity, or `None` if it is absent or filtered out.
    async fn lookup(&self, id: &str) -> Result<Option<ScoredValue>>;

    /// Similarity between two stored values of this attribute, if the
    /// provider can compare them.
    fn similarity_between(&self, _a: &str, _b: &str) -> Option<f64> {
        None
    }
}

/// Heap entry ordered by score, then by reversed id so the max-heap pops
/// the smallest id first among equal scores.
#[derive(Debug)]
struct HeapEntry(SortedListEntry);

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .score
            .total_cmp(&other.0.score)
            .then_with(|| other.0.id.cmp(&self.0.id))
    }
}

/// Limits applied when opening a provider.
#[derive(Debug, Clone, Copy)]
pub struct ProviderLimits {
    /// Largest candidate set a sorted-only source may hand over.
    pub max_buffered_rows: usize,
}

/// Provider over a [`SourceConnector`].
pub struct SourceListProvider {
    attribute: Arc<Attribute>,
    scorer: Scorer,
    connector: Arc<dyn SourceConnector>,
    filter: Option<String>,
    heap: Mutex<BinaryHeap<HeapEntry>>,
}

impl SourceListProvider {
    /// Scan the source with `filter`, score every row and prepare the sorted
    /// stream. Entries come off a heap lazily; nothing is fully sorted up
    /// front.
    #[instrument(skip_all, fields(attribute = %attribute.name, source = %connector.name()))]
    pub async fn open(
        attribute: Arc<Attribute>,
        mut scorer: Scorer,
        connector: Arc<dyn SourceConnector>,
        filter: Option<String>,
        limits: ProviderLimits,
    ) -> Result<Self> {
        let sorted_only = !connector.supports_random_access();
        let limit = sorted_only.then(|| limits.max_buffered_rows.saturating_add(1));

        let rows = connector
            .scan(&attribute.selection, filter.as_deref(), limit)
            .await
            .map_err(|e| wrap_source_error(&attribute.name, e))?;

        if sorted_only && rows.len() > limits.max_buffered_rows {
            return Err(SimSearchError::Validation(format!(
                "attribute '{}' matches more than {} rows on a sorted-only source; narrow the filter",
                attribute.name, limits.max_buffered_rows
            )));
        }

        if scorer.needs_calibration() {
            let values: Vec<String> = rows
                .iter()
                .map(|row| scorer.canonical_value(&row.values))
                .collect();
            let scale = scorer.calibrate(&values);
            debug!(?scale, "scale calibrated from candidates");
        }

        let best = best_per_entity(&scorer, rows);
        debug!(candidates = best.len(), "provider opened");
        let heap: BinaryHeap<HeapEntry> = best
            .into_iter()
            .map(|(id, (score, value))| HeapEntry(SortedListEntry { id, score, value }))
            .collect();

        Ok(Self {
            attribute,
            scorer,
            connector,
            filter,
            heap: Mutex::new(heap),
        })
    }

    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }
}

/// Score rows and keep the best-scoring row of each entity.
fn best_per_entity(scorer: &Scorer, rows: Vec<SourceRow>) -> HashMap<EntityId, (f64, String)> {
    let mut best: HashMap<EntityId, (f64, String)> = HashMap::with_capacity(rows.len());
    for row in rows {
        let value = scorer.canonical_value(&row.values);
        let score = scorer.score(&value);
        match best.get_mut(&row.id) {
            Some(existing) if existing.0 >= score => {}
            Some(existing) => *existing = (score, value),
            None => {
                best.insert(row.id, (score, value));
            }
        }
    }
    best
}

fn wrap_source_error(attribute: &str, e: SimSearchError) -> SimSearchError {
    if e.is_source_failure() {
        match e {
            SimSearchError::SourceUnavailable { reason, .. } => {
                SimSearchError::source_unavailable(attribute, reason)
            }
            other => SimSearchError::source_unavailable(attribute, other),
        }
    } else {
        e
    }
}

#[async_trait]
impl SortedListProvider for SourceListProvider {
    fn attribute(&self) -> &str {
        &self.attribute.name
    }

    fn supports_random_access(&self) -> bool {
        self.connector.supports_random_access()
    }

    async fn next(&self) -> Result<Option<SortedListEntry>> {
        Ok(self.heap.lock().await.pop().map(|e| e.0))
    }

    async fn lookup(&self, id: &str) -> Result<Option<ScoredValue>> {
        if !self.supports_random_access() {
            return Err(SimSearchError::UnsupportedAccess {
                attribute: self.attribute.name.clone(),
            });
        }
        let rows = self
            .connector
            .lookup(&self.attribute.selection, self.filter.as_deref(), id)
            .await
            .map_err(|e| wrap_source_error(&self.attribute.name, e))?;

        Ok(best_per_entity(&self.scorer, rows)
            .remove(id)
            .map(|(score, value)| ScoredValue { value, score }))
    }

    fn similarity_between(&self, a: &str, b: &str) -> Option<f64> {
        Some(self.scorer.similarity_between(a, b))
    }
}
