/// Airtable client: the Source Reader of the sync pipeline.
///
/// Reads every record of one table through the list-records endpoint,
/// following `offset` cursors until the last page. There is no retry here: a
/// failed page fails the whole fetch, and records read before the failure are
/// discarded.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::models::source::SourceRecord;

pub const DEFAULT_API_URL: &str = "https://api.airtable.com/v0";
/// Largest page the list-records endpoint will serve.
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Error)]
pub enum AirtableError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Airtable API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid Airtable URL: {0}")]
    InvalidUrl(String),
}

#[derive(Debug, Clone)]
pub struct AirtableConfig {
    pub api_url: String,
    pub api_key: String,
    pub base_id: String,
    /// Table id (`tbl...`) or table name.
    pub table: String,
    pub page_size: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct ListRecordsResponse {
    records: Vec<SourceRecord>,
    offset: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AirtableErrorEnvelope {
    error: AirtableErrorBody,
}

// Airtable reports errors either as a bare string or as {type, message}.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AirtableErrorBody {
    Detailed {
        #[serde(rename = "type")]
        kind: String,
        message: Option<String>,
    },
    Plain(String),
}

impl AirtableErrorBody {
    fn into_message(self) -> String {
        match self {
            AirtableErrorBody::Detailed {
                kind,
                message: Some(message),
            } => format!("{kind}: {message}"),
            AirtableErrorBody::Detailed { kind, message: None } => kind,
            AirtableErrorBody::Plain(s) => s,
        }
    }
}

/// Anything that can hand the orchestrator a full snapshot of source records.
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn fetch_all(&self) -> Result<Vec<SourceRecord>, AirtableError>;
}

#[derive(Clone)]
pub struct AirtableClient {
    client: Client,
    config: AirtableConfig,
}

impl AirtableClient {
    pub fn new(config: AirtableConfig) -> Result<Self, AirtableError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    fn table_url(&self) -> Result<Url, AirtableError> {
        let mut url = Url::parse(&self.config.api_url)
            .map_err(|e| AirtableError::InvalidUrl(format!("{}: {e}", self.config.api_url)))?;
        url.path_segments_mut()
            .map_err(|_| AirtableError::InvalidUrl(self.config.api_url.clone()))?
            .pop_if_empty()
            .push(&self.config.base_id)
            .push(&self.config.table);
        Ok(url)
    }

    async fn fetch_page(
        &self,
        url: &Url,
        offset: Option<&str>,
    ) -> Result<ListRecordsResponse, AirtableError> {
        let page_size = self.config.page_size.clamp(1, MAX_PAGE_SIZE).to_string();
        let mut request = self
            .client
            .get(url.clone())
            .bearer_auth(&self.config.api_key)
            .query(&[("pageSize", page_size.as_str())]);
        if let Some(offset) = offset {
            request = request.query(&[("offset", offset)]);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<AirtableErrorEnvelope>(&body)
                .map(|e| e.error.into_message())
                .unwrap_or(body);
            return Err(AirtableError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<ListRecordsResponse>().await?)
    }
}

#[async_trait]
impl RecordSource for AirtableClient {
    async fn fetch_all(&self) -> Result<Vec<SourceRecord>, AirtableError> {
        let url = self.table_url()?;
        let mut records = Vec::new();
        let mut offset: Option<String> = None;
        let mut page = 0usize;

        loop {
            let response = self.fetch_page(&url, offset.as_deref()).await?;
            page += 1;
            records.extend(response.records);
            debug!(page, fetched = records.len(), "fetched airtable page");

            match response.offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        Ok(records)
    }
}
