//! Read-only attribute and source registry.
//!
//! Built once from configuration; extra connectors (e.g. database-backed
//! ones) can be registered programmatically before serving.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{info, warn};

use crate::config::{AttributeConfig, Config};
use crate::error::{Result, SimSearchError};
use crate::similarity::{Normalizer, ScoringParams};
use crate::source::{ColumnSelection, RestSource, SourceConnector, TableSource};
use crate::types::{Normalization, OperationKind, SourceKind};

/// An immutable attribute definition.
#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: String,
    pub source: String,
    pub operation: OperationKind,
    pub selection: ColumnSelection,
    pub alias: Option<String>,
    /// Resolved into `params.normalizer` on registration.
    pub normalization: Normalization,
    pub params: ScoringParams,
}

impl Attribute {
    pub fn from_config(config: &AttributeConfig) -> Result<Self> {
        let mut params = ScoringParams::for_kind(config.operation);
        if let Some(decay) = config.decay {
            params.decay = decay;
        }
        if let Some(scale) = config.scale {
            params.scale = Some(scale);
        }
        if let Some(delim) = &config.token_delimiter {
            params.token_delimiter = delim.clone();
        }
        params.spatial_metric = config.spatial_metric;
        params
            .validate()
            .map_err(|e| SimSearchError::Config(format!("attribute '{}': {e}", config.name)))?;

        if config.normalization != Normalization::None
            && config.operation != OperationKind::NumericalTopk
        {
            return Err(SimSearchError::Config(format!(
                "attribute '{}': {} normalization only applies to numerical_topk",
                config.name, config.normalization
            )));
        }

        if config.search_columns.is_empty() {
            return Err(SimSearchError::Config(format!(
                "attribute '{}' has no search columns",
                config.name
            )));
        }

        Ok(Self {
            name: config.name.clone(),
            source: config.source.clone(),
            operation: config.operation,
            selection: ColumnSelection {
                key_column: config.key_column.clone(),
                columns: config.search_columns.clone(),
            },
            alias: config.alias.clone(),
            normalization: config.normalization,
            params,
        })
    }

    /// Name reported in results.
    pub fn display_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Default)]
pub struct Catalog {
    sources: DashMap<String, Arc<dyn SourceConnector>>,
    attributes: DashMap<String, Arc<Attribute>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build connectors and attributes from configuration. `jdbc` sources
    /// have no built-in connector; their attributes resolve once a connector
    /// with the same name is registered.
    pub fn from_config(config: &Config) -> Result<Self> {
        let catalog = Self::new();
        for source in &config.sources {
            let connector: Arc<dyn SourceConnector> = match source.kind {
                SourceKind::Csv => {
                    let path = source.path.as_deref().ok_or_else(|| {
                        SimSearchError::Config(format!("csv source '{}' needs a path", source.name))
                    })?;
                    Arc::new(TableSource::load(
                        &source.name,
                        path,
                        source.delimiter,
                        source.header,
                    )?)
                }
                SourceKind::RestApi => Arc::new(RestSource::from_config(source)?),
                SourceKind::Jdbc => {
                    warn!(source = %source.name, "jdbc sources must be registered programmatically");
                    continue;
                }
            };
            catalog.register_source(connector);
        }
        for attr in &config.attributes {
            catalog.register_attribute(Attribute::from_config(attr)?)?;
        }
        info!(
            sources = catalog.sources.len(),
            attributes = catalog.attributes.len(),
            "catalog ready"
        );
        Ok(catalog)
    }

    pub fn register_source(&self, connector: Arc<dyn SourceConnector>) {
        self.sources.insert(connector.name().to_string(), connector);
    }

    /// Register an attribute. Its name must be unique. A normalized attribute
    /// needs its source registered first, since the column statistics are
    /// taken from it here.
    pub fn register_attribute(&self, mut attribute: Attribute) -> Result<()> {
        if self.attributes.contains_key(&attribute.name) {
            return Err(SimSearchError::Config(format!(
                "attribute '{}' is declared twice",
                attribute.name
            )));
        }
        if attribute.normalization != Normalization::None {
            attribute.params.normalizer = self.normalizer_for(&attribute)?;
        }
        self.attributes
            .insert(attribute.name.clone(), Arc::new(attribute));
        Ok(())
    }

    fn normalizer_for(&self, attribute: &Attribute) -> Result<Normalizer> {
        let source = self.source(&attribute.source).map_err(|_| {
            SimSearchError::Config(format!(
                "attribute '{}' is normalized but source '{}' is not registered",
                attribute.name, attribute.source
            ))
        })?;
        let column = &attribute.selection.columns[0];
        let stats = source.column_stats(column)?.ok_or_else(|| {
            SimSearchError::Config(format!(
                "attribute '{}': source '{}' has no numeric statistics for column '{column}'",
                attribute.name, attribute.source
            ))
        })?;
        info!(
            attribute = %attribute.name,
            normalization = %attribute.normalization,
            count = stats.count,
            mean = stats.mean,
            stdev = stats.stdev,
            min = stats.min,
            max = stats.max,
            "column statistics computed"
        );
        Ok(Normalizer::from_stats(attribute.normalization, &stats))
    }

    pub fn attribute(&self, name: &str) -> Result<Arc<Attribute>> {
        self.attributes
            .get(name)
            .map(|a| a.clone())
            .ok_or_else(|| SimSearchError::UnknownAttribute {
                attribute: name.to_string(),
            })
    }

    pub fn source(&self, name: &str) -> Result<Arc<dyn SourceConnector>> {
        self.sources
            .get(name)
            .map(|s| s.clone())
            .ok_or_else(|| SimSearchError::UnknownSource {
                source_name: name.to_string(),
            })
    }

    /// Resolve an attribute together with the connector behind it.
    pub fn resolve(&self, name: &str) -> Result<(Arc<Attribute>, Arc<dyn SourceConnector>)> {
        let attribute = self.attribute(name)?;
        let source = self.source(&attribute.source)?;
        Ok((attribute, source))
    }

    pub fn attribute_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.attributes.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}
