//! Search orchestration: validate, resolve, open providers, aggregate,
//! assemble.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::aggregator::{check_capabilities, AggregatorOptions, RankAggregator};
use crate::assembler::{assemble, AssemblyContext, SearchResponse};
use crate::catalog::{Attribute, Catalog};
use crate::config::SearchConfig;
use crate::error::{Result, SimSearchError};
use crate::provider::{ProviderLimits, SortedListProvider, SourceListProvider};
use crate::similarity::{ScoringParams, Scorer};
use crate::source::SourceConnector;
use crate::types::Algorithm;

/// One attribute of a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchClause {
    pub attribute: String,
    /// Query value; its shape depends on the attribute's operation.
    pub value: Value,
    /// One weight per combination.
    pub weights: Vec<f64>,
    /// Source-dialect filter handed to the connector.
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub decay: Option<f64>,
    #[serde(default)]
    pub scale: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub clauses: Vec<SearchClause>,
    #[serde(default)]
    pub algorithm: Option<Algorithm>,
    pub k: usize,
    #[serde(default)]
    pub similarity_matrix: bool,
    /// Overrides the configured query deadline.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl SearchRequest {
    /// Weight vectors per combination, transposed from the per-clause lists.
    pub fn combinations(&self) -> Vec<Vec<f64>> {
        let count = self.clauses.first().map(|c| c.weights.len()).unwrap_or(0);
        (0..count)
            .map(|w| self.clauses.iter().map(|c| c.weights[w]).collect())
            .collect()
    }

    fn validate(&self, config: &SearchConfig) -> Result<()> {
        if self.clauses.is_empty() {
            return Err(SimSearchError::Validation(
                "a query needs at least one clause".into(),
            ));
        }
        if self.k == 0 || self.k > config.max_top_k {
            return Err(SimSearchError::Validation(format!(
                "k must be between 1 and {}, got {}",
                config.max_top_k, self.k
            )));
        }
        let mut seen = HashSet::new();
        for clause in &self.clauses {
            if !seen.insert(clause.attribute.as_str()) {
                return Err(SimSearchError::Validation(format!(
                    "attribute '{}' appears in more than one clause",
                    clause.attribute
                )));
            }
        }
        let count = self.clauses[0].weights.len();
        if count == 0 {
            return Err(SimSearchError::Validation(
                "each clause needs at least one weight".into(),
            ));
        }
        if let Some(c) = self.clauses.iter().find(|c| c.weights.len() != count) {
            return Err(SimSearchError::Validation(format!(
                "clause '{}' has {} weights, expected {count}",
                c.attribute,
                c.weights.len()
            )));
        }
        Ok(())
    }
}

/// A clause resolved against the catalog, ready to open.
struct ResolvedClause {
    attribute: Arc<Attribute>,
    connector: Arc<dyn SourceConnector>,
    scorer: Scorer,
    filter: Option<String>,
}

fn resolve(catalog: &Catalog, clause: &SearchClause) -> Result<ResolvedClause> {
    let (attribute, connector) = catalog.resolve(&clause.attribute)?;
    let params = ScoringParams {
        decay: clause.decay.unwrap_or(attribute.params.decay),
        scale: clause.scale.or(attribute.params.scale),
        ..attribute.params.clone()
    };
    let scorer = Scorer::build(attribute.operation, &clause.value, &params).map_err(|e| match e {
        SimSearchError::Validation(msg) => {
            SimSearchError::Validation(format!("clause '{}': {msg}", clause.attribute))
        }
        other => other,
    })?;
    Ok(ResolvedClause {
        attribute,
        connector,
        scorer,
        filter: clause.filter.clone(),
    })
}

/// Open every provider concurrently, preserving clause order.
async fn open_providers(
    clauses: Vec<ResolvedClause>,
    limits: ProviderLimits,
    deadline: Instant,
) -> Result<Vec<Arc<dyn SortedListProvider>>> {
    let names: Vec<String> = clauses.iter().map(|c| c.attribute.name.clone()).collect();
    let handles: Vec<_> = clauses
        .into_iter()
        .map(|c| {
            tokio::spawn(SourceListProvider::open(
                c.attribute,
                c.scorer,
                c.connector,
                c.filter,
                limits,
            ))
        })
        .collect();
    let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();

    let joined = match tokio::time::timeout_at(deadline, futures::future::join_all(handles)).await {
        Ok(joined) => joined,
        Err(_) => {
            aborts.iter().for_each(|a| a.abort());
            return Err(SimSearchError::SourceUnavailable {
                attribute: names.join(","),
                reason: "deadline passed while opening sources".into(),
            });
        }
    };

    let mut providers: Vec<Arc<dyn SortedListProvider>> = Vec::with_capacity(joined.len());
    for (name, result) in names.iter().zip(joined) {
        let provider = result
            .map_err(|e| SimSearchError::Internal(format!("opening '{name}' panicked: {e}")))??;
        providers.push(Arc::new(provider));
    }
    Ok(providers)
}

/// Run one search request end to end.
#[instrument(skip_all, fields(clauses = request.clauses.len(), k = request.k))]
pub async fn execute_search(
    catalog: &Catalog,
    config: &SearchConfig,
    request: SearchRequest,
) -> Result<SearchResponse> {
    let start = std::time::Instant::now();
    let algorithm = request.algorithm.unwrap_or(config.default_algorithm);
    let algo_label = algorithm.to_string();

    let result = run(catalog, config, &request, algorithm).await;

    let elapsed = start.elapsed();
    crate::metrics::QUERY_DURATION
        .with_label_values(&[&algo_label])
        .observe(elapsed.as_secs_f64());
    let status = if result.is_ok() { "ok" } else { "error" };
    crate::metrics::QUERIES_TOTAL
        .with_label_values(&[&algo_label, status])
        .inc();

    let mut response = result?;
    response.elapsed_secs = elapsed.as_secs_f64();
    info!(
        query_id = %response.query_id,
        algorithm = %algorithm,
        termination = %response.termination,
        rounds = response.rounds,
        exact = response.is_exact(),
        elapsed_ms = elapsed.as_millis() as u64,
        "search complete"
    );
    Ok(response)
}

async fn run(
    catalog: &Catalog,
    config: &SearchConfig,
    request: &SearchRequest,
    algorithm: Algorithm,
) -> Result<SearchResponse> {
    request.validate(config)?;

    let resolved = request
        .clauses
        .iter()
        .map(|c| resolve(catalog, c))
        .collect::<Result<Vec<_>>>()?;

    // Reject before any source is touched.
    let capabilities: Vec<(&str, bool)> = resolved
        .iter()
        .map(|c| (c.attribute.name.as_str(), c.connector.supports_random_access()))
        .collect();
    check_capabilities(algorithm, &capabilities)?;
    crate::aggregator::validate_weights(&request.combinations(), resolved.len())?;

    let attribute_names: Vec<String> = resolved
        .iter()
        .map(|c| c.attribute.display_name().to_string())
        .collect();

    let timeout = Duration::from_millis(request.timeout_ms.unwrap_or(config.query_timeout_ms));
    let deadline = Instant::now() + timeout;

    let providers = open_providers(
        resolved,
        ProviderLimits {
            max_buffered_rows: config.max_buffered_rows,
        },
        deadline,
    )
    .await?;

    let mut aggregator = RankAggregator::new(
        algorithm,
        providers.clone(),
        request.combinations(),
        request.k,
        AggregatorOptions {
            max_depth: request.k.saturating_mul(config.max_depth_factor),
            deadline: Some(deadline),
            prefetch_capacity: config.prefetch_capacity,
        },
    )?;
    let outcome = aggregator.run().await?;

    let ctx = AssemblyContext {
        query_id: Uuid::new_v4(),
        algorithm,
        k: request.k,
        attribute_names: &attribute_names,
        similarity: request.similarity_matrix.then_some(providers.as_slice()),
        elapsed_secs: 0.0,
    };
    Ok(assemble(&ctx, outcome))
}
