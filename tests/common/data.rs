use std::collections::{BTreeSet, HashMap};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// One sorted list as `(id, score)` pairs, unordered.
pub type ScoreList = Vec<(String, f64)>;

/// Generate `lists` score lists over `entities` ids. Each entity appears in
/// each list with probability `coverage`; scores are uniform in [0, 1).
pub fn random_lists(seed: u64, entities: usize, lists: usize, coverage: f64) -> Vec<ScoreList> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..lists)
        .map(|_| {
            (0..entities)
                .filter_map(|e| {
                    let present = rng.gen_bool(coverage);
                    let score: f64 = rng.gen_range(0.0..1.0);
                    present.then(|| (entity_id(e), score))
                })
                .collect()
        })
        .collect()
}

pub fn entity_id(i: usize) -> String {
    format!("e{i:04}")
}

/// Random weight combinations, each weight uniform in [0, 1].
pub fn random_weights(seed: u64, combinations: usize, lists: usize) -> Vec<Vec<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..combinations)
        .map(|_| (0..lists).map(|_| rng.gen_range(0.0..=1.0)).collect())
        .collect()
}

/// True combined score of every entity present in any list; absent scores
/// count as 0.
pub fn combined_scores(lists: &[ScoreList], weights: &[f64]) -> HashMap<String, f64> {
    let ids: BTreeSet<&String> = lists.iter().flatten().map(|(id, _)| id).collect();
    let lookup: Vec<HashMap<&String, f64>> = lists
        .iter()
        .map(|l| l.iter().map(|(id, s)| (id, *s)).collect())
        .collect();
    ids.into_iter()
        .map(|id| {
            let score = lookup
                .iter()
                .zip(weights)
                .map(|(l, w)| w * l.get(id).copied().unwrap_or(0.0))
                .sum();
            (id.clone(), score)
        })
        .collect()
}

/// Exhaustive top-k, ordered by score desc then id asc.
pub fn brute_force_top_k(lists: &[ScoreList], weights: &[f64], k: usize) -> Vec<(String, f64)> {
    let mut all: Vec<(String, f64)> = combined_scores(lists, weights).into_iter().collect();
    all.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    all.truncate(k);
    all
}
