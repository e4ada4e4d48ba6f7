//! Turns an aggregation outcome into the caller-facing response.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregator::{AggregationOutcome, AttributeProgress, CombinationResult, Termination};
use crate::provider::SortedListProvider;
use crate::types::{Algorithm, EntityId};

/// One attribute's contribution to a result. `value` and `score` are null
/// when the algorithm never observed the attribute for this entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeScore {
    pub attribute: String,
    pub value: Option<String>,
    pub score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedResult {
    /// 1-based.
    pub rank: usize,
    pub id: EntityId,
    pub score: f64,
    pub exact: bool,
    pub attributes: Vec<AttributeScore>,
}

/// The top-k of one weight combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedList {
    pub weights: Vec<f64>,
    pub exact: bool,
    pub results: Vec<CombinedResult>,
    /// Weighted pairwise similarity among `results`, in result order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_matrix: Option<Vec<Vec<f64>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query_id: Uuid,
    pub algorithm: Algorithm,
    pub k: usize,
    pub termination: Termination,
    pub rounds: usize,
    pub elapsed_secs: f64,
    pub lists: Vec<RankedList>,
    pub access: Vec<AttributeProgress>,
}

/// Everything the assembler needs besides the outcome itself.
pub struct AssemblyContext<'a> {
    pub query_id: Uuid,
    pub algorithm: Algorithm,
    pub k: usize,
    /// Reported name of each list, in list order.
    pub attribute_names: &'a [String],
    /// Providers used for the similarity matrix; `None` skips it.
    pub similarity: Option<&'a [Arc<dyn SortedListProvider>]>,
    pub elapsed_secs: f64,
}

pub fn assemble(ctx: &AssemblyContext<'_>, outcome: AggregationOutcome) -> SearchResponse {
    let lists = outcome
        .combinations
        .into_iter()
        .map(|c| ranked_list(ctx, c))
        .collect();

    SearchResponse {
        query_id: ctx.query_id,
        algorithm: ctx.algorithm,
        k: ctx.k,
        termination: outcome.termination,
        rounds: outcome.rounds,
        elapsed_secs: ctx.elapsed_secs,
        lists,
        access: outcome.attributes,
    }
}

fn ranked_list(ctx: &AssemblyContext<'_>, combination: CombinationResult) -> RankedList {
    let similarity_matrix = ctx
        .similarity
        .map(|providers| similarity_matrix(providers, &combination));

    let results = combination
        .results
        .into_iter()
        .enumerate()
        .map(|(pos, r)| CombinedResult {
            rank: pos + 1,
            id: r.id,
            score: r.score,
            exact: r.exact,
            attributes: ctx
                .attribute_names
                .iter()
                .zip(r.scores)
                .zip(r.values)
                .map(|((name, score), value)| AttributeScore {
                    attribute: name.clone(),
                    value,
                    score,
                })
                .collect(),
        })
        .collect();

    RankedList {
        weights: combination.weights,
        exact: combination.exact,
        results,
        similarity_matrix,
    }
}

/// Σ wᵢ · simᵢ(a, b) for every pair of results; unknown values contribute 0.
fn similarity_matrix(
    providers: &[Arc<dyn SortedListProvider>],
    combination: &CombinationResult,
) -> Vec<Vec<f64>> {
    let results = &combination.results;
    let n = results.len();
    let mut matrix = vec![vec![0.0; n]; n];
    for a in 0..n {
        for b in a..n {
            let sim: f64 = providers
                .iter()
                .enumerate()
                .map(|(i, provider)| {
                    let pair = (results[a].values[i].as_deref(), results[b].values[i].as_deref());
                    match pair {
                        (Some(va), Some(vb)) => {
                            combination.weights[i] * provider.similarity_between(va, vb).unwrap_or(0.0)
                        }
                        _ => 0.0,
                    }
                })
                .sum();
            matrix[a][b] = sim;
            matrix[b][a] = sim;
        }
    }
    matrix
}

impl SearchResponse {
    /// Whether every list carries an exactness guarantee.
    pub fn is_exact(&self) -> bool {
        self.lists.iter().all(|l| l.exact)
    }

    pub fn termination_was_limit(&self) -> bool {
        self.termination.is_limit()
    }
}
