use serde::{Deserialize, Serialize};

/// Identifier of an entity, taken from an attribute's key column.
pub type EntityId = String;

/// The kind of similarity search run over an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    NumericalTopk,
    CategoricalTopk,
    SpatialKnn,
    TemporalTopk,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::NumericalTopk => write!(f, "numerical_topk"),
            OperationKind::CategoricalTopk => write!(f, "categorical_topk"),
            OperationKind::SpatialKnn => write!(f, "spatial_knn"),
            OperationKind::TemporalTopk => write!(f, "temporal_topk"),
        }
    }
}

/// The kind of data source backing an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Csv,
    Jdbc,
    #[serde(rename = "restapi")]
    RestApi,
}

impl SourceKind {
    /// Local files and databases can be looked up per id; remote search
    /// services only hand out ranked pages.
    pub fn supports_random_access(&self) -> bool {
        match self {
            SourceKind::Csv | SourceKind::Jdbc => true,
            SourceKind::RestApi => false,
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Csv => write!(f, "csv"),
            SourceKind::Jdbc => write!(f, "jdbc"),
            SourceKind::RestApi => write!(f, "restapi"),
        }
    }
}

/// Rank aggregation algorithm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Sorted access plus random access on every other attribute.
    #[default]
    Threshold,
    /// Sorted access only, with worst/best score bounds.
    NoRandomAccess,
    /// Sorted access everywhere, random access where the source allows it.
    PartialRandomAccess,
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Algorithm::Threshold => write!(f, "threshold"),
            Algorithm::NoRandomAccess => write!(f, "no_random_access"),
            Algorithm::PartialRandomAccess => write!(f, "partial_random_access"),
        }
    }
}

impl std::str::FromStr for Algorithm {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "threshold" => Ok(Algorithm::Threshold),
            "no_random_access" => Ok(Algorithm::NoRandomAccess),
            "partial_random_access" => Ok(Algorithm::PartialRandomAccess),
            other => Err(format!("unknown ranking algorithm '{other}'")),
        }
    }
}

/// Distance used by spatial attributes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpatialMetric {
    /// Great-circle distance in kilometres over (lon, lat) degrees.
    #[default]
    Haversine,
    /// Planar distance in the coordinate units.
    Euclidean,
}

/// Rescaling applied to numerical values before distances are taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    #[default]
    None,
    /// `(v - mean) / stdev`
    Z,
    /// `(v - mean) / (max - min)`
    Unity,
}

impl std::fmt::Display for Normalization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Normalization::None => write!(f, "none"),
            Normalization::Z => write!(f, "z"),
            Normalization::Unity => write!(f, "unity"),
        }
    }
}

/// One element of a sorted list: an entity, its similarity score and the raw
/// stored value the score was computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortedListEntry {
    pub id: EntityId,
    pub score: f64,
    pub value: String,
}

/// Result of a random-access lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredValue {
    pub value: String,
    pub score: f64,
}
