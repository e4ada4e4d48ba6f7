use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use simsearch::error::{Result, SimSearchError};
use simsearch::provider::SortedListProvider;
use simsearch::types::{ScoredValue, SortedListEntry};

/// Scripted provider over a fixed list of `(id, score)` pairs, counting
/// every access.
pub struct MockProvider {
    name: String,
    random_access: bool,
    queue: Mutex<VecDeque<SortedListEntry>>,
    by_id: HashMap<String, SortedListEntry>,
    fail_after: Option<usize>,
    next_delay: Option<Duration>,
    nexts: AtomicUsize,
    lookups: AtomicUsize,
}

impl MockProvider {
    pub fn new(name: &str, random_access: bool, scores: &[(&str, f64)]) -> Self {
        let mut entries: Vec<SortedListEntry> = scores
            .iter()
            .map(|(id, score)| SortedListEntry {
                id: id.to_string(),
                score: *score,
                value: format!("{score}"),
            })
            .collect();
        entries.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        let by_id = entries.iter().map(|e| (e.id.clone(), e.clone())).collect();
        Self {
            name: name.to_string(),
            random_access,
            queue: Mutex::new(entries.into()),
            by_id,
            fail_after: None,
            next_delay: None,
            nexts: AtomicUsize::new(0),
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn from_owned(name: &str, random_access: bool, scores: &[(String, f64)]) -> Self {
        let borrowed: Vec<(&str, f64)> = scores.iter().map(|(id, s)| (id.as_str(), *s)).collect();
        Self::new(name, random_access, &borrowed)
    }

    /// Fail every call after `n` successful sorted accesses.
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Sleep before each sorted access.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.next_delay = Some(delay);
        self
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn nexts(&self) -> usize {
        self.nexts.load(Ordering::SeqCst)
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn failed(&self) -> bool {
        self.fail_after
            .is_some_and(|n| self.nexts.load(Ordering::SeqCst) >= n)
    }

    fn unavailable(&self) -> SimSearchError {
        SimSearchError::source_unavailable(&self.name, "connection reset")
    }
}

#[async_trait]
impl SortedListProvider for MockProvider {
    fn attribute(&self) -> &str {
        &self.name
    }

    fn supports_random_access(&self) -> bool {
        self.random_access
    }

    async fn next(&self) -> Result<Option<SortedListEntry>> {
        if let Some(delay) = self.next_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failed() {
            return Err(self.unavailable());
        }
        let entry = self.queue.lock().unwrap().pop_front();
        if entry.is_some() {
            self.nexts.fetch_add(1, Ordering::SeqCst);
        }
        Ok(entry)
    }

    async fn lookup(&self, id: &str) -> Result<Option<ScoredValue>> {
        if !self.random_access {
            return Err(SimSearchError::UnsupportedAccess {
                attribute: self.name.clone(),
            });
        }
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.failed() {
            return Err(self.unavailable());
        }
        Ok(self.by_id.get(id).map(|e| ScoredValue {
            value: e.value.clone(),
            score: e.score,
        }))
    }

    fn similarity_between(&self, a: &str, b: &str) -> Option<f64> {
        let a: f64 = a.parse().ok()?;
        let b: f64 = b.parse().ok()?;
        Some(1.0 - (a - b).abs())
    }
}

/// Erase the concrete type for the aggregator while keeping a handle for
/// access counters.
pub fn as_dyn(providers: &[Arc<MockProvider>]) -> Vec<Arc<dyn SortedListProvider>> {
    providers
        .iter()
        .map(|p| p.clone() as Arc<dyn SortedListProvider>)
        .collect()
}
