use serde_json::Value;

use super::{decayed_similarity, ScoringParams};
use crate::error::{Result, SimSearchError};
use crate::types::SpatialMetric;

/// Mean Earth radius in kilometres.
const EARTH_RADIUS_KM: f64 = 6371.0088;

/// 2D point; `x` is longitude and `y` latitude for geographic data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn euclidean(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    pub fn haversine_km(&self, other: &Point) -> f64 {
        let (lat1, lat2) = (self.y.to_radians(), other.y.to_radians());
        let dlat = (other.y - self.y).to_radians();
        let dlon = (other.x - self.x).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().min(1.0).asin()
    }

    /// Parse `POINT (x y)` (any case, optional space) or a bare `x,y` / `x y` pair.
    pub fn parse(raw: &str) -> Option<Point> {
        let trimmed = raw.trim();
        let keyword = trimmed
            .get(..5)
            .filter(|head| head.eq_ignore_ascii_case("point"));
        let body = match keyword {
            Some(_) => trimmed[5..].trim().strip_prefix('(')?.strip_suffix(')')?,
            None => trimmed,
        };
        let mut parts = body
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|p| !p.is_empty());
        let x = parts.next()?.parse::<f64>().ok()?;
        let y = parts.next()?.parse::<f64>().ok()?;
        if parts.next().is_some() || !x.is_finite() || !y.is_finite() {
            return None;
        }
        Some(Point::new(x, y))
    }
}

/// Decayed distance from a query point.
#[derive(Debug, Clone)]
pub struct SpatialScorer {
    query: Point,
    metric: SpatialMetric,
    decay: f64,
    scale: f64,
}

impl SpatialScorer {
    pub fn new(query: Point, metric: SpatialMetric, decay: f64, scale: f64) -> Self {
        Self {
            query,
            metric,
            decay,
            scale,
        }
    }

    /// The query is a `[x, y]` array or a point string.
    pub fn from_query(query: &Value, params: &ScoringParams) -> Result<Self> {
        let point = match query {
            Value::Array(items) if items.len() == 2 => {
                match (items[0].as_f64(), items[1].as_f64()) {
                    (Some(x), Some(y)) => Some(Point::new(x, y)),
                    _ => None,
                }
            }
            Value::String(s) => Point::parse(s),
            _ => None,
        }
        .ok_or_else(|| {
            SimSearchError::Validation(format!(
                "spatial query value must be [x, y] or 'POINT (x y)', got {query}"
            ))
        })?;
        Ok(Self::new(point, params.spatial_metric, params.decay, params.fixed_scale()))
    }

    fn distance(&self, a: &Point, b: &Point) -> f64 {
        match self.metric {
            SpatialMetric::Haversine => a.haversine_km(b),
            SpatialMetric::Euclidean => a.euclidean(b),
        }
    }

    pub fn score(&self, raw: &str) -> Option<f64> {
        let p = Point::parse(raw)?;
        Some(decayed_similarity(self.distance(&self.query, &p), self.decay, self.scale))
    }

    pub fn similarity_between(&self, a: &str, b: &str) -> Option<f64> {
        let a = Point::parse(a)?;
        let b = Point::parse(b)?;
        Some(decayed_similarity(self.distance(&a, &b), self.decay, self.scale))
    }
}
