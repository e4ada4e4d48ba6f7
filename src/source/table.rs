//! In-memory delimited-file table.
//!
//! The whole file is loaded once; scans evaluate the filter row by row and
//! lookups go through a per-key-column id index built on first use.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, info};

use super::filter::RowFilter;
use super::{ColumnSelection, SourceConnector, SourceRow};
use crate::error::{Result, SimSearchError};
use crate::similarity::ColumnStats;
use crate::types::SourceKind;

pub struct TableSource {
    name: String,
    kind: SourceKind,
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
    /// key column -> entity id -> row positions
    id_index: DashMap<String, Arc<HashMap<String, Vec<usize>>>>,
}

impl TableSource {
    /// Build a table from already-split rows. Short rows are padded with
    /// empty values.
    pub fn from_rows(name: impl Into<String>, columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut r| {
                r.resize(width, String::new());
                r
            })
            .collect();
        Self {
            name: name.into(),
            kind: SourceKind::Csv,
            columns,
            rows,
            id_index: DashMap::new(),
        }
    }

    /// Report a different source kind, for tables standing in for a
    /// database connection.
    pub fn with_kind(mut self, kind: SourceKind) -> Self {
        self.kind = kind;
        self
    }

    /// Parse delimited text. Without a header, columns are named by their
    /// zero-based position. Quoted fields may span lines.
    pub fn parse(name: impl Into<String>, text: &str, delimiter: char, header: bool) -> Result<Self> {
        let name = name.into();
        let mut lines = split_lines(text).into_iter().filter(|l| !l.trim().is_empty());

        let mut rows: Vec<Vec<String>> = Vec::new();
        let columns = if header {
            let first = lines.next().ok_or_else(|| {
                SimSearchError::Config(format!("source '{name}' is empty, expected a header line"))
            })?;
            split_record(first, delimiter)
                .into_iter()
                .map(|c| c.trim().to_string())
                .collect()
        } else {
            let first: Vec<String> = match lines.next() {
                Some(l) => split_record(l, delimiter),
                None => Vec::new(),
            };
            let names = (0..first.len()).map(|i| i.to_string()).collect();
            if !first.is_empty() {
                rows.push(first);
            }
            names
        };

        rows.extend(lines.map(|l| split_record(l, delimiter)));
        Ok(Self::from_rows(name, columns, rows))
    }

    pub fn load(name: impl Into<String>, path: impl AsRef<Path>, delimiter: char, header: bool) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let table = Self::parse(name, &text, delimiter, header)?;
        info!(
            source = %table.name,
            path = %path.display(),
            rows = table.rows.len(),
            columns = table.columns.len(),
            "loaded table source"
        );
        Ok(table)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn column_position(&self, column: &str) -> Result<usize> {
        self.columns.iter().position(|c| c == column).ok_or_else(|| {
            SimSearchError::Validation(format!(
                "source '{}' has no column '{column}'",
                self.name
            ))
        })
    }

    fn positions(&self, selection: &ColumnSelection) -> Result<(usize, Vec<usize>)> {
        let key = self.column_position(&selection.key_column)?;
        let cols = selection
            .columns
            .iter()
            .map(|c| self.column_position(c))
            .collect::<Result<Vec<_>>>()?;
        Ok((key, cols))
    }

    fn compile_filter(&self, filter: Option<&str>) -> Result<Option<(RowFilter, HashMap<String, usize>)>> {
        let Some(raw) = filter else {
            return Ok(None);
        };
        let parsed = RowFilter::parse(raw)?;
        let mut positions = HashMap::new();
        for column in parsed.columns() {
            positions.insert(column.to_string(), self.column_position(column)?);
        }
        Ok(Some((parsed, positions)))
    }

    fn row_matches(
        row: &[String],
        filter: &Option<(RowFilter, HashMap<String, usize>)>,
    ) -> bool {
        match filter {
            Some((f, positions)) => f.matches(|c| positions.get(c).map(|&i| row[i].as_str())),
            None => true,
        }
    }

    fn index_for(&self, key_column: &str, key: usize) -> Arc<HashMap<String, Vec<usize>>> {
        if let Some(idx) = self.id_index.get(key_column) {
            return idx.clone();
        }
        let mut idx: HashMap<String, Vec<usize>> = HashMap::new();
        for (pos, row) in self.rows.iter().enumerate() {
            idx.entry(row[key].trim().to_string()).or_default().push(pos);
        }
        debug!(source = %self.name, key_column, ids = idx.len(), "built id index");
        let idx = Arc::new(idx);
        self.id_index.insert(key_column.to_string(), idx.clone());
        idx
    }

    fn project(row: &[String], key: usize, cols: &[usize]) -> SourceRow {
        SourceRow {
            id: row[key].trim().to_string(),
            values: cols.iter().map(|&i| row[i].clone()).collect(),
        }
    }
}

#[async_trait]
impl SourceConnector for TableSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn column_stats(&self, column: &str) -> Result<Option<ColumnStats>> {
        let pos = self.column_position(column)?;
        Ok(ColumnStats::from_values(self.rows.iter().map(|r| r[pos].as_str())))
    }

    async fn scan(
        &self,
        selection: &ColumnSelection,
        filter: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<SourceRow>> {
        let (key, cols) = self.positions(selection)?;
        let filter = self.compile_filter(filter)?;
        let rows = self
            .rows
            .iter()
            .filter(|row| Self::row_matches(row, &filter))
            .filter(|row| !row[key].trim().is_empty())
            .take(limit.unwrap_or(usize::MAX))
            .map(|row| Self::project(row, key, &cols))
            .collect();
        Ok(rows)
    }

    async fn lookup(
        &self,
        selection: &ColumnSelection,
        filter: Option<&str>,
        id: &str,
    ) -> Result<Vec<SourceRow>> {
        let (key, cols) = self.positions(selection)?;
        let filter = self.compile_filter(filter)?;
        let index = self.index_for(&selection.key_column, key);
        let rows = index
            .get(id)
            .map(|positions| {
                positions
                    .iter()
                    .map(|&p| &self.rows[p])
                    .filter(|row| Self::row_matches(row, &filter))
                    .map(|row| Self::project(row, key, &cols))
                    .collect()
            })
            .unwrap_or_default();
        Ok(rows)
    }
}

/// Split text into records at line breaks outside double quotes.
fn split_lines(text: &str) -> Vec<&str> {
    let mut records = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    for (i, c) in text.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '\n' if !in_quotes => {
                records.push(trim_cr(&text[start..i]));
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < text.len() {
        records.push(trim_cr(&text[start..]));
    }
    records
}

fn trim_cr(line: &str) -> &str {
    line.strip_suffix('\r').unwrap_or(line)
}

/// Split one record on `delimiter`, honouring double-quoted fields with `""`
/// as an escaped quote.
fn split_record(line: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            c if c == delimiter && !in_quotes => fields.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    fields.push(current);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESTAURANTS: &str = "\
id;name;cuisine;price;lon;lat
r1;Da Mario;pizza,pasta;20;12.49;41.89
r2;Sakura;sushi;35;12.50;41.90
r3;\"Trattoria; Roma\";pasta;15;12.47;41.88
";

    fn table() -> TableSource {
        TableSource::parse("restaurants", RESTAURANTS, ';', true).unwrap()
    }

    fn selection(cols: &[&str]) -> ColumnSelection {
        ColumnSelection {
            key_column: "id".to_string(),
            columns: cols.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[test]
    fn test_parse_quoted_delimiter() {
        let t = table();
        assert_eq!(t.len(), 3);
        assert_eq!(t.rows[2][1], "Trattoria; Roma");
        assert_eq!(t.columns()[4], "lon");
    }

    #[test]
    fn test_parse_multiline_quoted_field() {
        let text = "id;name;note\r\nr1;\"Da Mario\";\"two\nlines; \"\"quoted\"\"\"\r\nr2;Sakura;plain\n";
        let t = TableSource::parse("t", text, ';', true).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.rows[0][2], "two\nlines; \"quoted\"");
        assert_eq!(t.rows[1], vec!["r2", "Sakura", "plain"]);
    }

    #[test]
    fn test_column_stats() {
        let t = table();
        let stats = t.column_stats("price").unwrap().unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!((stats.min, stats.max), (15.0, 35.0));
        assert!(t.column_stats("name").unwrap().is_none());
        assert!(t.column_stats("stars").is_err());
    }

    #[test]
    fn test_parse_without_header() {
        let t = TableSource::parse("t", "a,1\nb,2\n", ',', false).unwrap();
        assert_eq!(t.columns(), &["0".to_string(), "1".to_string()]);
        assert_eq!(t.len(), 2);
    }

    #[tokio::test]
    async fn test_scan_with_filter() {
        let t = table();
        let rows = t
            .scan(&selection(&["price"]), Some("price < 30"), None)
            .await
            .unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r3"]);
        assert_eq!(rows[0].values, vec!["20".to_string()]);
    }

    #[tokio::test]
    async fn test_scan_limit() {
        let t = table();
        let rows = t.scan(&selection(&["price"]), None, Some(2)).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_lookup_honours_filter() {
        let t = table();
        let sel = selection(&["lon", "lat"]);
        let rows = t.lookup(&sel, None, "r2").await.unwrap();
        assert_eq!(rows[0].values, vec!["12.50".to_string(), "41.90".to_string()]);

        let rows = t.lookup(&sel, Some("cuisine = pasta"), "r2").await.unwrap();
        assert!(rows.is_empty());
        assert!(t.lookup(&sel, None, "missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_column_is_validation_error() {
        let t = table();
        let err = t.scan(&selection(&["stars"]), None, None).await;
        assert!(matches!(err, Err(SimSearchError::Validation(_))));
        let err = t.scan(&selection(&["price"]), Some("stars > 3"), None).await;
        assert!(matches!(err, Err(SimSearchError::Validation(_))));
    }
}
