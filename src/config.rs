use serde::{Deserialize, Serialize};

use crate::error::{Result, SimSearchError};
use crate::types::{Algorithm, Normalization, OperationKind, SourceKind, SpatialMetric};

/// Top-level service configuration, loaded from TOML with env overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub search: SearchConfig,
    pub sources: Vec<SourceConfig>,
    pub attributes: Vec<AttributeConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8090,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is not set.
    pub level: String,
    /// `text` or `json`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

/// Knobs for query execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Algorithm used when a request does not name one.
    pub default_algorithm: Algorithm,
    /// Largest `k` a request may ask for.
    pub max_top_k: usize,
    /// Per-query deadline for the whole scan.
    pub query_timeout_ms: u64,
    /// Sorted-access rounds are capped at `k * max_depth_factor`.
    pub max_depth_factor: usize,
    /// Entries buffered ahead of the aggregator per sorted stream.
    pub prefetch_capacity: usize,
    /// Largest candidate set a sorted-only source may return for buffering.
    pub max_buffered_rows: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_algorithm: Algorithm::Threshold,
            max_top_k: 1000,
            query_timeout_ms: 60_000,
            max_depth_factor: 1000,
            prefetch_capacity: 256,
            max_buffered_rows: 100_000,
        }
    }
}

/// A data source declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub kind: SourceKind,
    /// Path of a delimited file (csv sources).
    #[serde(default)]
    pub path: Option<String>,
    /// Column separator (csv sources).
    #[serde(default = "default_column_delimiter")]
    pub delimiter: char,
    /// Whether the first line names the columns (csv sources).
    #[serde(default = "default_header")]
    pub header: bool,
    /// Endpoint URL (restapi sources).
    #[serde(default)]
    pub url: Option<String>,
    /// Optional API key sent as `X-API-Key` (restapi sources).
    #[serde(default)]
    pub api_key: Option<String>,
    /// Rows requested per page (restapi sources).
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Per-request timeout (restapi sources).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_column_delimiter() -> char {
    ';'
}

fn default_header() -> bool {
    true
}

fn default_page_size() -> usize {
    1000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

/// An attribute declaration: which columns of which source to search, and how.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeConfig {
    pub name: String,
    pub source: String,
    pub operation: OperationKind,
    pub key_column: String,
    pub search_columns: Vec<String>,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub decay: Option<f64>,
    #[serde(default)]
    pub scale: Option<f64>,
    #[serde(default)]
    pub token_delimiter: Option<String>,
    #[serde(default)]
    pub spatial_metric: SpatialMetric,
    #[serde(default)]
    pub normalization: Normalization,
}

impl Config {
    /// Load configuration from a TOML file, then apply environment overrides.
    ///
    /// The file is `path` if given, else `$SIMSEARCH_CONFIG` if set; with
    /// neither, defaults are used.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let path = path
            .map(str::to_string)
            .or_else(|| std::env::var("SIMSEARCH_CONFIG").ok());

        let mut config = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(&p)
                    .map_err(|e| SimSearchError::Config(format!("cannot read {p}: {e}")))?;
                Self::from_toml(&raw)?
            }
            None => Self::default(),
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string without env overrides.
    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| SimSearchError::Config(e.to_string()))
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(host) = std::env::var("SIMSEARCH_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_parse::<u16>("SIMSEARCH_PORT")? {
            self.server.port = port;
        }
        if let Ok(level) = std::env::var("SIMSEARCH_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("SIMSEARCH_LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Some(timeout) = env_parse::<u64>("SIMSEARCH_QUERY_TIMEOUT_MS")? {
            self.search.query_timeout_ms = timeout;
        }
        if let Some(max_k) = env_parse::<usize>("SIMSEARCH_MAX_TOP_K")? {
            self.search.max_top_k = max_k;
        }
        Ok(())
    }

    /// Check cross-references and numeric ranges.
    pub fn validate(&self) -> Result<()> {
        if self.search.max_top_k == 0 {
            return Err(SimSearchError::Config("search.max_top_k must be > 0".into()));
        }
        if self.search.max_depth_factor == 0 {
            return Err(SimSearchError::Config(
                "search.max_depth_factor must be > 0".into(),
            ));
        }
        if self.search.prefetch_capacity == 0 {
            return Err(SimSearchError::Config(
                "search.prefetch_capacity must be > 0".into(),
            ));
        }

        for source in &self.sources {
            match source.kind {
                SourceKind::Csv if source.path.is_none() => {
                    return Err(SimSearchError::Config(format!(
                        "csv source '{}' needs a path",
                        source.name
                    )));
                }
                SourceKind::RestApi => {
                    let raw = source.url.as_deref().ok_or_else(|| {
                        SimSearchError::Config(format!(
                            "restapi source '{}' needs a url",
                            source.name
                        ))
                    })?;
                    url::Url::parse(raw).map_err(|e| {
                        SimSearchError::Config(format!(
                            "restapi source '{}' has an invalid url: {e}",
                            source.name
                        ))
                    })?;
                }
                _ => {}
            }
        }

        for attr in &self.attributes {
            if !self.sources.iter().any(|s| s.name == attr.source) {
                return Err(SimSearchError::Config(format!(
                    "attribute '{}' refers to unknown source '{}'",
                    attr.name, attr.source
                )));
            }
            if attr.search_columns.is_empty() {
                return Err(SimSearchError::Config(format!(
                    "attribute '{}' has no search columns",
                    attr.name
                )));
            }
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| SimSearchError::Config(format!("{key} has an invalid value: {raw}"))),
        Err(_) => Ok(None),
    }
}
