use std::collections::HashSet;

use serde_json::Value;

use super::ScoringParams;
use crate::error::{Result, SimSearchError};

/// Jaccard overlap between a query token set and stored token sets.
#[derive(Debug, Clone)]
pub struct CategoricalScorer {
    tokens: HashSet<String>,
    delimiter: String,
}

impl CategoricalScorer {
    pub fn new(tokens: HashSet<String>, delimiter: impl Into<String>) -> Self {
        Self {
            tokens,
            delimiter: delimiter.into(),
        }
    }

    /// The query is either a delimited string or an array of strings.
    pub fn from_query(query: &Value, params: &ScoringParams) -> Result<Self> {
        let delimiter = params.token_delimiter.as_str();
        let tokens: HashSet<String> = match query {
            Value::String(s) => tokenize(s, delimiter),
            Value::Array(items) => {
                let mut set = HashSet::new();
                for item in items {
                    let s = item.as_str().ok_or_else(|| {
                        SimSearchError::Validation(format!(
                            "categorical query tokens must be strings, got {item}"
                        ))
                    })?;
                    set.extend(tokenize(s, delimiter));
                }
                set
            }
            _ => {
                return Err(SimSearchError::Validation(format!(
                    "categorical query value must be a string or an array of strings, got {query}"
                )))
            }
        };
        if tokens.is_empty() {
            return Err(SimSearchError::Validation(
                "categorical query value has no tokens".into(),
            ));
        }
        Ok(Self::new(tokens, delimiter))
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    pub fn score(&self, raw: &str) -> Option<f64> {
        let stored = tokenize(raw, &self.delimiter);
        Some(jaccard(&self.tokens, &stored))
    }

    pub fn similarity_between(&self, a: &str, b: &str) -> Option<f64> {
        Some(jaccard(
            &tokenize(a, &self.delimiter),
            &tokenize(b, &self.delimiter),
        ))
    }
}

/// Split on the delimiter, trim, case-fold and drop empty tokens.
pub fn tokenize(raw: &str, delimiter: &str) -> HashSet<String> {
    raw.split(delimiter)
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}
