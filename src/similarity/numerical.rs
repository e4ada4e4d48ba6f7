use serde_json::Value;

use super::{decayed_similarity, ScoringParams};
use crate::error::{Result, SimSearchError};
use crate::types::Normalization;

/// Summary of the parsable numbers in one column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnStats {
    pub count: usize,
    pub mean: f64,
    /// Population standard deviation.
    pub stdev: f64,
    pub min: f64,
    pub max: f64,
}

impl ColumnStats {
    /// Summarize `values`, skipping anything that does not parse as a
    /// number. `None` when nothing parses.
    pub fn from_values<'a>(values: impl IntoIterator<Item = &'a str>) -> Option<Self> {
        let numbers: Vec<f64> = values.into_iter().filter_map(parse_number).collect();
        if numbers.is_empty() {
            return None;
        }
        let count = numbers.len();
        let mean = numbers.iter().sum::<f64>() / count as f64;
        let variance = numbers.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;
        let (min, max) = numbers
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        Some(Self {
            count,
            mean,
            stdev: variance.sqrt(),
            min,
            max,
        })
    }
}

/// Affine rescaling applied to stored and query values alike.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum Normalizer {
    #[default]
    Identity,
    /// Center on `mean`, divide by `spread`.
    Affine { mean: f64, spread: f64 },
}

impl Normalizer {
    /// A column with zero spread is only centered.
    pub fn from_stats(normalization: Normalization, stats: &ColumnStats) -> Self {
        let spread = match normalization {
            Normalization::None => return Normalizer::Identity,
            Normalization::Z => stats.stdev,
            Normalization::Unity => stats.max - stats.min,
        };
        Normalizer::Affine {
            mean: stats.mean,
            spread: if spread > 0.0 { spread } else { 1.0 },
        }
    }

    pub fn apply(&self, v: f64) -> f64 {
        match *self {
            Normalizer::Identity => v,
            Normalizer::Affine { mean, spread } => (v - mean) / spread,
        }
    }
}

/// Decayed absolute difference between numbers.
///
/// Without a configured scale, the scorer is calibrated from its candidate
/// values: the smallest non-zero distance to the query becomes the scale, so
/// the nearest non-identical value always lands at `exp(-decay)`.
#[derive(Debug, Clone)]
pub struct NumericalScorer {
    query: f64,
    decay: f64,
    scale: Option<f64>,
    normalizer: Normalizer,
}

impl NumericalScorer {
    pub fn new(query: f64, decay: f64, scale: f64) -> Self {
        Self {
            query,
            decay,
            scale: Some(scale),
            normalizer: Normalizer::Identity,
        }
    }

    pub fn from_query(query: &Value, params: &ScoringParams) -> Result<Self> {
        let q = match query {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => parse_number(s),
            _ => None,
        }
        .ok_or_else(|| {
            SimSearchError::Validation(format!("numerical query value must be a number, got {query}"))
        })?;
        Ok(Self {
            query: params.normalizer.apply(q),
            decay: params.decay,
            scale: params.scale,
            normalizer: params.normalizer,
        })
    }

    pub fn needs_calibration(&self) -> bool {
        self.scale.is_none()
    }

    /// Fix the scale from the first non-zero distance in ascending order.
    /// Leaves an already-set scale alone.
    pub fn calibrate<'a>(&mut self, values: impl IntoIterator<Item = &'a str>) -> Option<f64> {
        if self.scale.is_none() {
            self.scale = values
                .into_iter()
                .filter_map(|raw| self.distance(raw))
                .filter(|d| *d > 0.0)
                .min_by(f64::total_cmp);
        }
        self.scale
    }

    pub fn scale(&self) -> Option<f64> {
        self.scale
    }

    fn normalized(&self, raw: &str) -> Option<f64> {
        parse_number(raw).map(|v| self.normalizer.apply(v))
    }

    fn distance(&self, raw: &str) -> Option<f64> {
        Some((self.normalized(raw)? - self.query).abs())
    }

    fn decayed(&self, distance: f64) -> f64 {
        decayed_similarity(distance, self.decay, self.scale.unwrap_or(1.0))
    }

    pub fn score(&self, raw: &str) -> Option<f64> {
        Some(self.decayed(self.distance(raw)?))
    }

    pub fn similarity_between(&self, a: &str, b: &str) -> Option<f64> {
        let a = self.normalized(a)?;
        let b = self.normalized(b)?;
        Some(self.decayed((a - b).abs()))
    }
}

pub(crate) fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}
