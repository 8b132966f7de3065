use crate::config::UpstreamConfig;
use crate::metrics_defs::{UPSTREAM_FETCH_DURATION, UPSTREAM_FETCH_FAILED};
use crate::types::{Record, RecordError};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Response, StatusCode};
use shared::{counter, histogram};
use std::time::{Duration, Instant};
use url::Url;

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("upstream request failed: {0}")]
    ReqwestError(#[from] reqwest::Error),
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("invalid API token: {0}")]
    InvalidToken(#[from] reqwest::header::InvalidHeaderValue),
    #[error("upstream returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("invalid record: {0}")]
    InvalidRecord(#[from] RecordError),
}

/// Retrieves the current representation of a record from the upstream system.
#[async_trait]
pub trait RecordFetcher: Send + Sync {
    async fn fetch(&self, record_id: &str, catalog: &str) -> Result<Record, FetchError>;
}

/// Authenticated client for the upstream REST API.
///
/// Requests are not retried. Redelivery of a failed webhook is the sender's job.
#[derive(Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    base_url: Url,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, FetchError> {
        let base_url = config
            .base_url()
            .map_err(|e| FetchError::InvalidUrl(e.to_string()))?;

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.api_token))?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(UpstreamClient { client, base_url })
    }

    /// Appends path segments to the base URL, escaping each one.
    pub(crate) fn url<'a, I>(&self, segments: I) -> Result<Url, FetchError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.client
    }
}

/// Turns a non-success response into `FetchError::Status`, keeping the body
/// text for diagnosis.
pub(crate) async fn check_status(response: Response) -> Result<Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(FetchError::Status { status, body })
}

#[async_trait]
impl RecordFetcher for UpstreamClient {
    async fn fetch(&self, record_id: &str, catalog: &str) -> Result<Record, FetchError> {
        let url = self.url(["catalogs", catalog, "items", record_id])?;
        let start = Instant::now();

        let result = async {
            let response = check_status(self.client.get(url).send().await?).await?;
            let record = response.json::<Record>().await?;
            record.validate()?;
            Ok::<_, FetchError>(record)
        }
        .await;

        histogram!(UPSTREAM_FETCH_DURATION).record(start.elapsed().as_secs_f64());

        if let Err(ref e) = result {
            counter!(UPSTREAM_FETCH_FAILED).increment(1);
            tracing::warn!(record_id, catalog, error = %e, "Failed to fetch record");
        } else {
            tracing::debug!(record_id, catalog, "Fetched record");
        }

        result
    }
}
