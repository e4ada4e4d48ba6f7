//! Source connectors.
//!
//! A connector exposes the two operations a sorted list provider needs from a
//! data source: a filtered candidate scan and, where the source allows it, a
//! point lookup by entity id. Access capability is fixed per source kind.

pub mod filter;
pub mod rest;
pub mod table;

use async_trait::async_trait;

use crate::error::Result;
use crate::similarity::ColumnStats;
use crate::types::{EntityId, SourceKind};

pub use rest::RestSource;
pub use table::TableSource;

/// Which columns of a source an attribute reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSelection {
    pub key_column: String,
    pub columns: Vec<String>,
}

/// One row of a scan: the entity id plus the selected column values, in
/// selection order.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    pub id: EntityId,
    pub values: Vec<String>,
}

#[async_trait]
pub trait SourceConnector: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> SourceKind;

    fn supports_random_access(&self) -> bool {
        self.kind().supports_random_access()
    }

    /// Return the rows matching `filter`, at most `limit` of them.
    async fn scan(
        &self,
        selection: &ColumnSelection,
        filter: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<SourceRow>>;

    /// Numeric summary of one column over the whole source, for sources
    /// that hold their data locally.
    fn column_stats(&self, _column: &str) -> Result<Option<ColumnStats>> {
        Ok(None)
    }

    /// Return every row for `id` that matches `filter`.
    ///
    /// Sources without random access fail with `UnsupportedAccess`.
    async fn lookup(
        &self,
        selection: &ColumnSelection,
        filter: Option<&str>,
        id: &str,
    ) -> Result<Vec<SourceRow>>;
}
