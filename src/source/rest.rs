//! Remote JSON search endpoint.
//!
//! Each page is requested with `POST {url}` and body
//! `{key_column, columns, filter, offset, limit}`; the endpoint answers
//! `{"results": [{"id": "...", "values": [...]}]}`. Paging stops at the first
//! short page. The endpoint offers no lookup by id.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{ColumnSelection, SourceConnector, SourceRow};
use crate::config::SourceConfig;
use crate::error::{Result, SimSearchError};
use crate::types::SourceKind;

pub struct RestSource {
    name: String,
    url: String,
    api_key: Option<String>,
    page_size: usize,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct PageRequest<'a> {
    key_column: &'a str,
    columns: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<&'a str>,
    offset: usize,
    limit: usize,
}

#[derive(Debug, Deserialize)]
struct PageResponse {
    #[serde(default)]
    results: Vec<RemoteRow>,
}

#[derive(Debug, Deserialize)]
struct RemoteRow {
    id: Value,
    #[serde(default)]
    values: Vec<Value>,
}

impl RestSource {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        api_key: Option<String>,
        page_size: usize,
        request_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            name: name.into(),
            url: url.into(),
            api_key,
            page_size: page_size.max(1),
            client,
        })
    }

    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        let url = config.url.clone().ok_or_else(|| {
            SimSearchError::Config(format!("restapi source '{}' needs a url", config.name))
        })?;
        Self::new(
            &config.name,
            url,
            config.api_key.clone(),
            config.page_size,
            Duration::from_millis(config.request_timeout_ms),
        )
    }

    async fn fetch_page(
        &self,
        selection: &ColumnSelection,
        filter: Option<&str>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<SourceRow>> {
        let body = PageRequest {
            key_column: &selection.key_column,
            columns: &selection.columns,
            filter,
            offset,
            limit,
        };
        let mut request = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("X-API-Key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SimSearchError::source_unavailable(&self.name, e))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SimSearchError::source_unavailable(
                &self.name,
                format!("endpoint returned {status}: {text}"),
            ));
        }
        let page: PageResponse = response
            .json()
            .await
            .map_err(|e| SimSearchError::source_unavailable(&self.name, format!("bad response body: {e}")))?;

        Ok(page
            .results
            .into_iter()
            .map(|row| SourceRow {
                id: value_to_string(&row.id),
                values: row.values.iter().map(value_to_string).collect(),
            })
            .collect())
    }
}

fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl SourceConnector for RestSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::RestApi
    }

    async fn scan(
        &self,
        selection: &ColumnSelection,
        filter: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<SourceRow>> {
        let limit = limit.unwrap_or(usize::MAX);
        let mut rows = Vec::new();
        let mut offset = 0;
        loop {
            let want = self.page_size.min(limit - rows.len());
            let page = self.fetch_page(selection, filter, offset, want).await?;
            let got = page.len();
            debug!(source = %self.name, offset, got, "fetched page");
            rows.extend(page.into_iter().take(want));
            offset += got;
            if got < want || rows.len() >= limit {
                break;
            }
        }
        Ok(rows)
    }

    async fn lookup(
        &self,
        _selection: &ColumnSelection,
        _filter: Option<&str>,
        _id: &str,
    ) -> Result<Vec<SourceRow>> {
        Err(SimSearchError::UnsupportedAccess {
            attribute: self.name.clone(),
        })
    }
}
