use simsearch::aggregator::{CombinationResult, RankedCandidate};

use super::data::{brute_force_top_k, ScoreList};

const EPS: f64 = 1e-9;

/// Assert results are ordered by score desc, ties by ascending id.
pub fn assert_sorted_with_id_ties(results: &[RankedCandidate]) {
    for pair in results.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        assert!(
            a.score > b.score || (a.score == b.score && a.id < b.id),
            "results out of order: {} ({}) before {} ({})",
            a.id,
            a.score,
            b.id,
            b.score
        );
    }
}

/// Assert an exact result against exhaustive computation: the same ids in
/// the same order as the brute-force top-k, each with its true score.
pub fn assert_exact_top_k(result: &CombinationResult, lists: &[ScoreList], k: usize) {
    assert!(result.exact, "expected an exact result");
    let expected = brute_force_top_k(lists, &result.weights, k);
    let expected_ids: Vec<&str> = expected.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids(&result.results), expected_ids, "weights {:?}", result.weights);

    for (r, (_, score)) in result.results.iter().zip(&expected) {
        assert!(r.exact, "{} is not marked exact", r.id);
        assert!(
            (r.score - score).abs() <= EPS,
            "reported score {} for {} differs from true score {score}",
            r.score,
            r.id
        );
    }
}

pub fn ids(results: &[RankedCandidate]) -> Vec<&str> {
    results.iter().map(|r| r.id.as_str()).collect()
}
