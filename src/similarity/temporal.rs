use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

use super::{decayed_similarity, ScoringParams};
use crate::error::{Result, SimSearchError};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y"];

/// Parse a timestamp into (fractional) seconds since the Unix epoch.
///
/// Accepts RFC 3339, common date-time and date layouts, `YYYY-MM`, `YYYY`
/// and plain epoch seconds. Naive values are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis() as f64 / 1000.0);
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc().timestamp_millis() as f64 / 1000.0);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return date_seconds(d);
        }
    }
    // Year-month and bare year.
    if let Ok(d) = NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d") {
        return date_seconds(d);
    }
    if s.len() == 4 && s.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(d) = NaiveDate::parse_from_str(&format!("{s}-01-01"), "%Y-%m-%d") {
            return date_seconds(d);
        }
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn date_seconds(d: NaiveDate) -> Option<f64> {
    d.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp() as f64)
}

/// Decayed absolute time distance, in seconds.
#[derive(Debug, Clone)]
pub struct TemporalScorer {
    query: f64,
    decay: f64,
    scale: f64,
}

impl TemporalScorer {
    pub fn new(query_epoch_secs: f64, decay: f64, scale: f64) -> Self {
        Self {
            query: query_epoch_secs,
            decay,
            scale,
        }
    }

    pub fn from_query(query: &Value, params: &ScoringParams) -> Result<Self> {
        let q = match query {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => parse_timestamp(s),
            _ => None,
        }
        .ok_or_else(|| {
            SimSearchError::Validation(format!(
                "temporal query value must be a timestamp, got {query}"
            ))
        })?;
        Ok(Self::new(q, params.decay, params.fixed_scale()))
    }

    pub fn score(&self, raw: &str) -> Option<f64> {
        let t = parse_timestamp(raw)?;
        Some(decayed_similarity((t - self.query).abs(), self.decay, self.scale))
    }

    pub fn similarity_between(&self, a: &str, b: &str) -> Option<f64> {
        let a = parse_timestamp(a)?;
        let b = parse_timestamp(b)?;
        Some(decayed_similarity((a - b).abs(), self.decay, self.scale))
    }
}
