//! Candidate bookkeeping and per-combination termination.
//!
//! All weight combinations read the same [`CandidateTable`]. Each
//! [`CombinationTracker`] keeps its own worst-bound index of the candidates,
//! refreshed from the table's change log, and the prefix of its top-k that
//! is already settled.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Serialize;

use crate::types::{EntityId, ScoredValue, SortedListEntry};

/// What is known about one entity across all lists. `None` means the
/// entity has not been observed in that list yet.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub scores: Vec<Option<f64>>,
    pub values: Vec<Option<String>>,
}

impl Candidate {
    fn new(lists: usize) -> Self {
        Self {
            scores: vec![None; lists],
            values: vec![None; lists],
        }
    }

    /// Worst bound: unseen lists contribute 0.
    pub fn worst(&self, weights: &[f64]) -> f64 {
        self.scores
            .iter()
            .zip(weights)
            .map(|(s, w)| w * s.unwrap_or(0.0))
            .sum()
    }

    /// Best bound: unseen lists contribute their last sorted-access score.
    pub fn best(&self, weights: &[f64], last: &[f64]) -> f64 {
        let unseen: f64 = self
            .scores
            .iter()
            .zip(weights)
            .zip(last)
            .filter(|((s, _), _)| s.is_none())
            .map(|((_, w), l)| w * l)
            .sum();
        self.worst(weights) + unseen
    }
}

#[derive(Debug)]
pub struct CandidateTable {
    candidates: HashMap<EntityId, Candidate>,
    /// Last score seen under sorted access per list; 1.0 before the first
    /// access, 0.0 once the list is exhausted.
    last: Vec<f64>,
    exhausted: Vec<bool>,
    /// Ids whose scores changed, in observation order.
    changes: Vec<EntityId>,
}

impl CandidateTable {
    pub fn new(lists: usize) -> Self {
        Self {
            candidates: HashMap::new(),
            last: vec![1.0; lists],
            exhausted: vec![false; lists],
            changes: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Candidate> {
        self.candidates.get(id)
    }

    /// Record a sorted access. Returns true if the entity was not yet a
    /// candidate.
    pub fn observe_sorted(&mut self, list: usize, entry: SortedListEntry) -> bool {
        let lists = self.last.len();
        self.last[list] = entry.score;
        let mut is_new = false;
        self.changes.push(entry.id.clone());
        let candidate = self.candidates.entry(entry.id).or_insert_with(|| {
            is_new = true;
            Candidate::new(lists)
        });
        candidate.scores[list] = Some(entry.score);
        candidate.values[list] = Some(entry.value);
        is_new
    }

    /// Record a random access. An entity missing from the list scores 0.
    pub fn observe_random(&mut self, list: usize, id: &str, found: Option<ScoredValue>) {
        if let Some(candidate) = self.candidates.get_mut(id) {
            self.changes.push(id.to_string());
            match found {
                Some(sv) => {
                    candidate.scores[list] = Some(sv.score);
                    candidate.values[list] = Some(sv.value);
                }
                None => candidate.scores[list] = Some(0.0),
            }
        }
    }

    pub fn mark_exhausted(&mut self, list: usize) {
        self.exhausted[list] = true;
        self.last[list] = 0.0;
    }

    pub fn is_exhausted(&self, list: usize) -> bool {
        self.exhausted[list]
    }

    pub fn all_exhausted(&self) -> bool {
        self.exhausted.iter().all(|&e| e)
    }

    /// Upper bound on the combined score of any entity not yet seen.
    pub fn threshold(&self, weights: &[f64]) -> f64 {
        self.last.iter().zip(weights).map(|(l, w)| w * l).sum()
    }

    pub fn changes_since(&self, cursor: usize) -> &[EntityId] {
        self.changes.get(cursor..).unwrap_or_default()
    }

    pub fn change_count(&self) -> usize {
        self.changes.len()
    }

    pub fn last(&self) -> &[f64] {
        &self.last
    }
}

/// One entry of a combination's final top-k.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCandidate {
    pub id: EntityId,
    pub score: f64,
    /// Whether both the rank and the score of this entry are proven.
    pub exact: bool,
    pub scores: Vec<Option<f64>>,
    pub values: Vec<Option<String>>,
}

/// Final state of one weight combination.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CombinationResult {
    pub weights: Vec<f64>,
    pub exact: bool,
    pub results: Vec<RankedCandidate>,
}

/// Position of a candidate in a combination's index: worst bound desc, then
/// id asc.
#[derive(Debug, Clone)]
struct RankKey {
    worst: f64,
    id: EntityId,
}

impl PartialEq for RankKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RankKey {}

impl PartialOrd for RankKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RankKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .worst
            .total_cmp(&self.worst)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Emits one combination's top-k an entry at a time.
///
/// The leading candidate is emitted once its score is fully resolved (best
/// bound equals worst bound), it reaches the threshold, and no other
/// candidate's best bound can overtake it. Emitted entries are final in
/// both rank and score.
#[derive(Debug)]
pub struct CombinationTracker {
    weights: Vec<f64>,
    index: BTreeSet<RankKey>,
    /// Worst bound each indexed candidate is filed under.
    keys: HashMap<EntityId, f64>,
    emitted: Vec<EntityId>,
    emitted_ids: HashSet<EntityId>,
    /// Position in the table's change log up to which `index` is current.
    cursor: usize,
    converged: bool,
}

impl CombinationTracker {
    pub fn new(weights: Vec<f64>) -> Self {
        Self {
            weights,
            index: BTreeSet::new(),
            keys: HashMap::new(),
            emitted: Vec::new(),
            emitted_ids: HashSet::new(),
            cursor: 0,
            converged: false,
        }
    }

    pub fn is_converged(&self) -> bool {
        self.converged
    }

    /// Entries whose rank and score are settled so far.
    pub fn emitted(&self) -> usize {
        self.emitted.len()
    }

    /// Re-file candidates whose bounds changed since the last check.
    fn sync(&mut self, table: &CandidateTable) {
        for id in table.changes_since(self.cursor) {
            if self.emitted_ids.contains(id) {
                continue;
            }
            let Some(candidate) = table.get(id) else {
                continue;
            };
            let worst = candidate.worst(&self.weights);
            if let Some(old) = self.keys.insert(id.clone(), worst) {
                self.index.remove(&RankKey {
                    worst: old,
                    id: id.clone(),
                });
            }
            self.index.insert(RankKey {
                worst,
                id: id.clone(),
            });
        }
        self.cursor = table.change_count();
    }

    /// Whether the leading candidate's rank and score are settled.
    fn leader_settled(&self, table: &CandidateTable, threshold: f64) -> bool {
        let mut ordered = self.index.iter();
        let Some(leader) = ordered.next() else {
            return false;
        };
        let Some(candidate) = table.get(&leader.id) else {
            return false;
        };
        let last = table.last();
        if candidate.best(&self.weights, last) > leader.worst || leader.worst < threshold {
            return false;
        }
        for other in ordered {
            // An unseen-list contribution never exceeds the threshold.
            if other.worst + threshold < leader.worst {
                break;
            }
            let best = table
                .get(&other.id)
                .map(|c| c.best(&self.weights, last))
                .unwrap_or(other.worst);
            if best > leader.worst || (best == leader.worst && other.id < leader.id) {
                return false;
            }
        }
        true
    }

    /// Emit every settled leader. Returns true once `k` entries are
    /// settled, or every list is exhausted and nothing is left to emit.
    pub fn check(&mut self, table: &CandidateTable, k: usize) -> bool {
        if self.converged {
            return true;
        }
        self.sync(table);
        let threshold = table.threshold(&self.weights);
        while self.emitted.len() < k && self.leader_settled(table, threshold) {
            if let Some(leader) = self.index.pop_first() {
                self.keys.remove(&leader.id);
                self.emitted_ids.insert(leader.id.clone());
                self.emitted.push(leader.id);
            }
        }
        self.converged =
            self.emitted.len() >= k || (self.index.is_empty() && table.all_exhausted());
        self.converged
    }

    /// Final result: the settled prefix, topped up to `k` from the current
    /// worst-bound ordering. Topped-up entries are not exact.
    pub fn finish(mut self, table: &CandidateTable, k: usize) -> CombinationResult {
        self.sync(table);
        let settled = self.emitted.iter().map(|id| (id, true));
        let pending = self.index.iter().map(|key| (&key.id, false));
        let results: Vec<RankedCandidate> = settled
            .chain(pending)
            .take(k)
            .filter_map(|(id, exact)| {
                let candidate = table.get(id)?;
                Some(RankedCandidate {
                    id: id.clone(),
                    score: candidate.worst(&self.weights),
                    exact,
                    scores: candidate.scores.clone(),
                    values: candidate.values.clone(),
                })
            })
            .collect();
        CombinationResult {
            exact: self.converged,
            weights: self.weights,
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, score: f64) -> SortedListEntry {
        SortedListEntry {
            id: id.to_string(),
            score,
            value: format!("{id}-v"),
        }
    }

    #[test]
    fn test_bounds() {
        let mut table = CandidateTable::new(2);
        assert!(table.observe_sorted(0, entry("a", 0.9)));
        let c = table.get("a").unwrap();
        let w = [0.5, 1.0];
        assert!((c.worst(&w) - 0.45).abs() < 1e-12);
        // List 1 not accessed yet, so its bound is 1.0.
        assert!((c.best(&w, table.last()) - 1.45).abs() < 1e-12);
        assert!((table.threshold(&w) - 1.45).abs() < 1e-12);

        assert!(table.observe_sorted(1, entry("b", 0.6)));
        let c = table.get("a").unwrap();
        assert!((c.best(&w, table.last()) - 1.05).abs() < 1e-12);
        assert!(!table.observe_sorted(1, entry("a", 0.5)));
    }

    #[test]
    fn test_random_access_miss_scores_zero() {
        let mut table = CandidateTable::new(2);
        table.observe_sorted(0, entry("a", 0.9));
        table.observe_random(1, "a", None);
        let c = table.get("a").unwrap();
        assert_eq!(c.scores[1], Some(0.0));
        assert_eq!(c.values[1], None);
        assert_eq!(c.best(&[1.0, 1.0], table.last()), c.worst(&[1.0, 1.0]));
    }

    #[test]
    fn test_not_converged_below_threshold() {
        let mut table = CandidateTable::new(2);
        table.observe_sorted(0, entry("a", 0.9));
        table.observe_sorted(1, entry("b", 0.8));
        let mut tracker = CombinationTracker::new(vec![1.0, 1.0]);
        assert!(!tracker.check(&table, 1));
    }

    #[test]
    fn test_converges_when_fully_known_beats_threshold() {
        let mut table = CandidateTable::new(2);
        table.observe_sorted(0, entry("a", 0.9));
        table.observe_sorted(1, entry("a", 0.8));
        table.observe_sorted(0, entry("b", 0.3));
        table.observe_sorted(1, entry("c", 0.2));
        // T = 0.5, W(a) = 1.7, B(b) = 0.3 + 0.2, B(c) = 0.2 + 0.3
        let mut tracker = CombinationTracker::new(vec![1.0, 1.0]);
        assert!(tracker.check(&table, 1));
        let result = tracker.finish(&table, 1);
        assert!(result.exact);
        assert_eq!(result.results[0].id, "a");
    }

    #[test]
    fn test_exhaustion_converges_with_fewer_than_k() {
        let mut table = CandidateTable::new(1);
        table.observe_sorted(0, entry("a", 0.4));
        table.mark_exhausted(0);
        let mut tracker = CombinationTracker::new(vec![1.0]);
        assert!(tracker.check(&table, 5));
        assert_eq!(tracker.finish(&table, 5).results.len(), 1);
    }

    #[test]
    fn test_unconverged_finish_is_inexact() {
        let mut table = CandidateTable::new(2);
        table.observe_sorted(0, entry("b", 0.7));
        table.observe_sorted(0, entry("a", 0.7));
        let tracker = CombinationTracker::new(vec![1.0, 1.0]);
        let result = tracker.finish(&table, 2);
        assert!(!result.exact);
        let ids: Vec<&str> = result.results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_leader_waits_for_unresolved_score() {
        let mut table = CandidateTable::new(2);
        table.observe_sorted(0, entry("c", 0.9));
        table.observe_sorted(1, entry("b", 0.4));
        table.observe_sorted(0, entry("b", 0.6));
        table.observe_sorted(1, entry("a", 0.3));
        // W(b) = 1.0 is fully known, but B(c) = 0.9 + 0.3 may still beat it.
        let mut tracker = CombinationTracker::new(vec![1.0, 1.0]);
        assert!(!tracker.check(&table, 2));
        assert_eq!(tracker.emitted(), 0);

        table.observe_sorted(0, entry("d", 0.5));
        table.observe_sorted(1, entry("c", 0.3));
        assert!(tracker.check(&table, 2));
        let result = tracker.finish(&table, 2);
        let ranked: Vec<(&str, f64)> = result
            .results
            .iter()
            .map(|r| (r.id.as_str(), r.score))
            .collect();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].0, "c");
        assert!((ranked[0].1 - 1.2).abs() < 1e-12);
        assert_eq!(ranked[1].0, "b");
        assert!(result.results.iter().all(|r| r.exact));
    }

    #[test]
    fn test_settled_prefix_survives_unconverged_finish() {
        let mut table = CandidateTable::new(2);
        table.observe_sorted(0, entry("a", 0.9));
        table.observe_sorted(1, entry("a", 0.8));
        table.observe_sorted(0, entry("b", 0.5));
        // a is settled; b's second score is still unknown.
        let mut tracker = CombinationTracker::new(vec![1.0, 1.0]);
        assert!(!tracker.check(&table, 3));
        assert_eq!(tracker.emitted(), 1);

        let result = tracker.finish(&table, 3);
        assert!(!result.exact);
        assert_eq!(result.results.len(), 2);
        assert!(result.results[0].exact);
        assert!(!result.results[1].exact);
    }

    #[test]
    fn test_changed_bounds_are_refiled() {
        let mut table = CandidateTable::new(2);
        table.observe_sorted(0, entry("a", 0.5));
        table.observe_sorted(0, entry("b", 0.4));
        let mut tracker = CombinationTracker::new(vec![1.0, 1.0]);
        tracker.check(&table, 1);
        table.observe_random(1, "b", Some(ScoredValue {
            value: "x".into(),
            score: 0.9,
        }));
        table.observe_random(1, "a", None);
        table.mark_exhausted(0);
        table.mark_exhausted(1);
        assert!(tracker.check(&table, 1));
        assert_eq!(tracker.finish(&table, 1).results[0].id, "b");
    }
}
