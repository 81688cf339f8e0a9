//! Harvest v2 time entry client.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, USER_AGENT};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::checkpoint::Watermark;
use crate::config::HarvestConfig;
use crate::error::{Result, SyncError};
use crate::models::TimeEntry;

const ACCOUNT_ID_HEADER: &str = "harvest-account-id";

/// Source of time entries.
#[async_trait]
pub trait TimeEntrySource: Send + Sync {
    /// Entries updated at or after `since`, in the order the source returns them.
    async fn updated_since(&self, since: Watermark) -> Result<Vec<TimeEntry>>;

    /// Every entry logged against the external reference `reference_id`.
    async fn for_external_reference(&self, reference_id: &str) -> Result<Vec<TimeEntry>>;
}

/// One page of `GET /time_entries`.
#[derive(Debug, Deserialize)]
struct TimeEntriesPage {
    time_entries: Vec<TimeEntry>,
    #[serde(default)]
    next_page: Option<u32>,
}

/// Harvest API client.
#[derive(Debug, Clone)]
pub struct HarvestClient {
    client: reqwest::Client,
    api_url: String,
}

impl HarvestClient {
    /// Create a client from credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if a credential is not a valid header value or the
    /// HTTP client fails to build.
    pub fn new(config: &HarvestConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            header_value(&format!("Bearer {}", config.access_token), "access token")?,
        );
        headers.insert(
            HeaderName::from_static(ACCOUNT_ID_HEADER),
            header_value(&config.account_id, "account id")?,
        );
        headers.insert(USER_AGENT, header_value(&config.user_agent, "user agent")?);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch every page of `/time_entries` for `filter`.
    async fn list(&self, filter: (&str, String)) -> Result<Vec<TimeEntry>> {
        let url = format!("{}/time_entries", self.api_url);
        let mut entries = Vec::new();
        let mut page: u32 = 1;

        loop {
            let response = self
                .client
                .get(&url)
                .query(&[(filter.0, filter.1.as_str())])
                .query(&[("page", page)])
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(SyncError::Api {
                    service: "Harvest",
                    status: status.as_u16(),
                    message: body,
                });
            }

            let body: TimeEntriesPage = response.json().await?;
            debug!(
                page,
                count = body.time_entries.len(),
                next_page = ?body.next_page,
                "Fetched Harvest time entries page"
            );
            entries.extend(body.time_entries);

            match body.next_page {
                Some(next) if next > page => page = next,
                _ => break,
            }
        }

        Ok(entries)
    }
}

fn header_value(value: &str, what: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| SyncError::Config(format!("Harvest {what} is not a valid header value")))
}

#[async_trait]
impl TimeEntrySource for HarvestClient {
    #[instrument(skip(self, since), fields(since = %since))]
    async fn updated_since(&self, since: Watermark) -> Result<Vec<TimeEntry>> {
        self.list(("updated_since", since.to_string())).await
    }

    #[instrument(skip(self))]
    async fn for_external_reference(&self, reference_id: &str) -> Result<Vec<TimeEntry>> {
        self.list(("external_reference_id", reference_id.to_string()))
            .await
    }
}
