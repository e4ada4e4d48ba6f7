//! Per-attribute similarity scoring.
//!
//! Every scorer maps a raw stored value to a score in `[0, 1]` relative to a
//! fixed query value, where 1 means identical. Metric kinds (numerical,
//! spatial, temporal) use an exponentially decayed, scaled distance; the
//! categorical kind uses Jaccard overlap of token sets.
//!
//! A stored value that cannot be parsed scores 0 instead of failing, so one
//! corrupt row never stops a scan. A query value that cannot be parsed is a
//! validation error.

pub mod categorical;
pub mod numerical;
pub mod spatial;
pub mod temporal;

use serde_json::Value;
use tracing::debug;

use crate::error::{Result, SimSearchError};
use crate::types::{OperationKind, SpatialMetric};

pub use categorical::CategoricalScorer;
pub use numerical::{ColumnStats, NumericalScorer, Normalizer};
pub use spatial::{Point, SpatialScorer};
pub use temporal::TemporalScorer;

/// Default exponential decay constant.
pub const DEFAULT_DECAY: f64 = 0.01;

/// Default token delimiter for categorical values.
pub const DEFAULT_TOKEN_DELIMITER: &str = ",";

/// Parameters that shape a scorer, resolved from attribute defaults and
/// per-clause overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringParams {
    pub decay: f64,
    /// `None` calibrates the scale from the candidates (numerical only).
    pub scale: Option<f64>,
    pub token_delimiter: String,
    pub spatial_metric: SpatialMetric,
    pub normalizer: Normalizer,
}

impl ScoringParams {
    /// Defaults for an operation kind. Temporal distances are measured in
    /// seconds, so the default scale is one day. Numerical attributes start
    /// without a scale.
    pub fn for_kind(kind: OperationKind) -> Self {
        let scale = match kind {
            OperationKind::NumericalTopk => None,
            OperationKind::TemporalTopk => Some(86_400.0),
            _ => Some(1.0),
        };
        Self {
            decay: DEFAULT_DECAY,
            scale,
            token_delimiter: DEFAULT_TOKEN_DELIMITER.to_string(),
            spatial_metric: SpatialMetric::default(),
            normalizer: Normalizer::Identity,
        }
    }

    /// Scale for measures that are never calibrated.
    pub fn fixed_scale(&self) -> f64 {
        self.scale.unwrap_or(1.0)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.decay.is_finite() && self.decay > 0.0) {
            return Err(SimSearchError::Validation(format!(
                "decay must be a positive number, got {}",
                self.decay
            )));
        }
        if let Some(scale) = self.scale.filter(|s| !(s.is_finite() && *s > 0.0)) {
            return Err(SimSearchError::Validation(format!(
                "scale must be a positive number, got {scale}"
            )));
        }
        if self.token_delimiter.is_empty() {
            return Err(SimSearchError::Validation(
                "token delimiter must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Turn a non-negative distance into a similarity in `[0, 1]`.
pub fn decayed_similarity(distance: f64, decay: f64, scale: f64) -> f64 {
    if !distance.is_finite() || distance < 0.0 {
        return 0.0;
    }
    (-decay * distance / scale).exp().clamp(0.0, 1.0)
}

/// A scorer bound to one query value.
#[derive(Debug, Clone)]
pub enum Scorer {
    Numerical(NumericalScorer),
    Categorical(CategoricalScorer),
    Spatial(SpatialScorer),
    Temporal(TemporalScorer),
}

impl Scorer {
    /// Build a scorer for `kind` from a JSON query value.
    pub fn build(kind: OperationKind, query: &Value, params: &ScoringParams) -> Result<Self> {
        params.validate()?;
        let scorer = match kind {
            OperationKind::NumericalTopk => {
                Scorer::Numerical(NumericalScorer::from_query(query, params)?)
            }
            OperationKind::CategoricalTopk => {
                Scorer::Categorical(CategoricalScorer::from_query(query, params)?)
            }
            OperationKind::SpatialKnn => Scorer::Spatial(SpatialScorer::from_query(query, params)?),
            OperationKind::TemporalTopk => {
                Scorer::Temporal(TemporalScorer::from_query(query, params)?)
            }
        };
        Ok(scorer)
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Scorer::Numerical(_) => OperationKind::NumericalTopk,
            Scorer::Categorical(_) => OperationKind::CategoricalTopk,
            Scorer::Spatial(_) => OperationKind::SpatialKnn,
            Scorer::Temporal(_) => OperationKind::TemporalTopk,
        }
    }

    /// Combine the raw search columns of one row into the single stored value
    /// the scorer understands. Two spatial columns become a WKT point, so the
    /// (lon, lat) and geometry-column layouts score identically.
    pub fn canonical_value(&self, columns: &[String]) -> String {
        match self {
            Scorer::Spatial(_) if columns.len() >= 2 => {
                format!("POINT ({} {})", columns[0].trim(), columns[1].trim())
            }
            Scorer::Categorical(c) => columns.join(c.delimiter()),
            _ => columns.first().cloned().unwrap_or_default(),
        }
    }

    /// Whether the scale still has to be derived from candidate values.
    pub fn needs_calibration(&self) -> bool {
        matches!(self, Scorer::Numerical(s) if s.needs_calibration())
    }

    /// Derive a missing scale from the stored values of the candidates.
    pub fn calibrate(&mut self, values: &[String]) -> Option<f64> {
        match self {
            Scorer::Numerical(s) => s.calibrate(values.iter().map(String::as_str)),
            _ => None,
        }
    }

    /// Similarity of a stored value to the query value.
    pub fn score(&self, raw: &str) -> f64 {
        let score = match self {
            Scorer::Numerical(s) => s.score(raw),
            Scorer::Categorical(s) => s.score(raw),
            Scorer::Spatial(s) => s.score(raw),
            Scorer::Temporal(s) => s.score(raw),
        };
        match score {
            Some(s) => s,
            None => {
                debug!(kind = %self.kind(), value = raw, "unparsable stored value, scoring 0");
                crate::metrics::SCORING_ERRORS_TOTAL
                    .with_label_values(&[&self.kind().to_string()])
                    .inc();
                0.0
            }
        }
    }

    /// Similarity between two stored values under the same measure.
    pub fn similarity_between(&self, a: &str, b: &str) -> f64 {
        let score = match self {
            Scorer::Numerical(s) => s.similarity_between(a, b),
            Scorer::Categorical(s) => s.similarity_between(a, b),
            Scorer::Spatial(s) => s.similarity_between(a, b),
            Scorer::Temporal(s) => s.similarity_between(a, b),
        };
        score.unwrap_or(0.0)
    }
}
