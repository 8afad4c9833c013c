use super::types::{Cursor, FeedPage, VideoDetail};
use crate::config::Config;
use crate::util::{is_loopback_host, validate_api_base, UrlValidationError};
use futures::StreamExt;
use reqwest::redirect::Policy;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Largest JSON body accepted from the backend (5MB).
const MAX_RESPONSE_SIZE: usize = 5 * 1024 * 1024;

/// Errors from the backend API.
///
/// None of these are retried by the client; callers reset their own state
/// and let the user (or the next visibility event) trigger the retry.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Non-2xx status other than 404 on a single-video fetch
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// `GET /videos/<id>` returned 404
    #[error("Video not found: {0}")]
    VideoNotFound(String),
    /// Body exceeded the 5MB limit
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    /// Body was not the expected JSON shape
    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error(transparent)]
    InvalidUrl(#[from] UrlValidationError),
    /// The task running the request died before producing a response
    #[error("Request aborted: {0}")]
    Aborted(String),
}

impl ApiError {
    /// True for failures worth offering a manual retry for.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Network(_) | ApiError::Timeout | ApiError::Aborted(_) => true,
            ApiError::HttpStatus(status) => *status >= 500 || *status == 429,
            ApiError::VideoNotFound(_)
            | ApiError::ResponseTooLarge(_)
            | ApiError::Decode(_)
            | ApiError::InvalidUrl(_) => false,
        }
    }
}

/// Redirect policy shared by API and manifest requests: at most 3 hops,
/// loops rejected.
fn create_redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= 3 {
            return attempt.error("Too many redirects (max 3)");
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev.as_str() == url.as_str()) {
            return attempt.error("Redirect loop detected");
        }

        tracing::debug!(
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );
        attempt.follow()
    })
}

/// Build the HTTP client used for API and manifest traffic.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, ApiError> {
    let client = reqwest::Client::builder()
        .redirect(create_redirect_policy())
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(60))
        .timeout(timeout)
        .build()?;
    Ok(client)
}

/// Client for the two backend endpoints the feed and watch views consume.
///
/// Cheap to clone: the reqwest pool and token are shared.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
    token: Option<Arc<SecretString>>,
    timeout: Duration,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base", &self.base.as_str())
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ApiClient {
    /// Create a client from configuration, validating the base URL.
    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        let http = build_http_client(config.request_timeout())?;
        let token = config
            .api_token
            .as_ref()
            .map(|t| Arc::new(SecretString::from(t.expose_secret().to_owned())));
        Self::new(http, &config.api_base_url, token, config.request_timeout())
    }

    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        token: Option<Arc<SecretString>>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let base = validate_api_base(base_url)?;
        if token.is_some() && base.scheme() == "http" {
            tracing::warn!(base = %base, "Sending API token over plain HTTP (localhost only)");
        }
        Ok(Self {
            http,
            base,
            token,
            timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// The shared HTTP client, for collaborators (the HLS engine) that fetch
    /// from other hosts without the API token.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        // Base URLs always carry a path; `cannot-be-a-base` URLs were rejected
        // by validate_api_base (they have no host).
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        url
    }

    /// `GET /videos?cursor=<cursor>&limit=<limit>`
    pub async fn fetch_page(&self, cursor: &Cursor, limit: usize) -> Result<FeedPage, ApiError> {
        let mut url = self.endpoint(&["videos"]);
        url.query_pairs_mut()
            .append_pair("cursor", &cursor.to_string())
            .append_pair("limit", &limit.to_string());

        tracing::debug!(%cursor, limit, "Fetching feed page");
        let response = self.send(url).await?;
        if !response.status().is_success() {
            return Err(ApiError::HttpStatus(response.status().as_u16()));
        }

        let bytes = read_limited_bytes(response, MAX_RESPONSE_SIZE).await?;
        let page: FeedPage = serde_json::from_slice(&bytes)?;
        tracing::debug!(
            %cursor,
            items = page.items.len(),
            has_more = page.has_more,
            "Feed page received"
        );
        Ok(page)
    }

    /// `GET /videos/<id>`; a 404 maps to [`ApiError::VideoNotFound`].
    pub async fn fetch_video(&self, id: &str) -> Result<VideoDetail, ApiError> {
        let url = self.endpoint(&["videos", id]);
        let response = self.send(url).await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ApiError::VideoNotFound(id.to_string()));
        }
        if !response.status().is_success() {
            return Err(ApiError::HttpStatus(response.status().as_u16()));
        }

        let bytes = read_limited_bytes(response, MAX_RESPONSE_SIZE).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn send(&self, url: Url) -> Result<reqwest::Response, ApiError> {
        let mut request = self.http.get(url).header("Accept", "application/json");

        if let Some(token) = &self.token {
            // Token only travels over HTTPS or to a loopback dev backend.
            if self.base.scheme() == "https" || is_loopback_host(&self.base) {
                request = request.bearer_auth(token.expose_secret());
            }
        }

        tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| ApiError::Timeout)?
            .map_err(ApiError::Network)
    }
}

/// Read a response body, failing once it exceeds `limit` bytes.
pub(crate) async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, ApiError> {
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(ApiError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(ApiError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(ApiError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
