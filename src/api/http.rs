use super::{ApiError, FeedApi, Page, ReactionKind, ReactionResult};
use crate::config::Config;
use crate::store::{Comment, CommentId, PostId};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

const MAX_RESPONSE_SIZE: usize = 5 * 1024 * 1024; // 5MB
const MAX_ERROR_BODY_SIZE: usize = 64 * 1024;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// JSON-over-HTTPS client for the community backend.
///
/// Reads (`fetch_page`, `fetch_comments`) retry 5xx and 429 with
/// exponential backoff. Writes are sent once: a reaction toggle or comment
/// create is not idempotent, and the sync layer handles failure by rolling
/// back or leaving local state untouched.
pub struct HttpFeedApi {
    client: reqwest::Client,
    base_url: Url,
    token: Option<SecretString>,
    timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
}

impl std::fmt::Debug for HttpFeedApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpFeedApi")
            .field("base_url", &self.base_url.as_str())
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

#[derive(Serialize)]
struct ReactBody {
    kind: ReactionKind,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AddCommentBody<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_id: Option<&'a CommentId>,
}

#[derive(Serialize)]
struct ReportBody<'a> {
    reason: &'a str,
}

/// Comment listings arrive either bare or wrapped in an object.
#[derive(Deserialize)]
#[serde(untagged)]
enum CommentList {
    Bare(Vec<Comment>),
    Wrapped {
        #[serde(alias = "items")]
        comments: Vec<Comment>,
    },
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(alias = "error")]
    message: Option<String>,
}

impl HttpFeedApi {
    /// Create a client rooted at `base_url`.
    ///
    /// A bearer token is only ever sent over HTTPS; plain HTTP is accepted
    /// for localhost so the client can be pointed at a local mock backend.
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        token: Option<SecretString>,
    ) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url).map_err(|e| ApiError::InvalidUrl(e.to_string()))?;
        match base_url.scheme() {
            "https" => {}
            "http" => {
                let is_localhost = matches!(
                    base_url.host_str(),
                    Some("localhost") | Some("127.0.0.1") | Some("[::1]")
                );
                if token.is_some() && !is_localhost {
                    tracing::error!(
                        base_url = %base_url,
                        "Rejecting non-HTTPS base URL with a bearer token configured"
                    );
                    return Err(ApiError::InsecureBaseUrl);
                }
                tracing::warn!(base_url = %base_url, "Using non-HTTPS API base URL");
            }
            other => {
                return Err(ApiError::InvalidUrl(format!("unsupported scheme: {other}")))
            }
        }
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(base_url.to_string()));
        }

        Ok(Self {
            client,
            base_url,
            token,
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        })
    }

    /// Build a client from configuration, including the shared connection pool.
    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("feedsync/", env!("CARGO_PKG_VERSION")))
            .pool_idle_timeout(Duration::from_secs(30)) // Close idle connections promptly
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(ApiError::Network)?;

        Ok(Self::new(client, &config.api_base_url, config.api_token())?
            .with_timeout(config.request_timeout())
            .with_retries(config.max_retries, DEFAULT_RETRY_DELAY))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Retry budget for reads. Delays double from `base_delay` on each attempt.
    pub fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = base_delay;
        self
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header(reqwest::header::ACCEPT, "application/json");
        match &self.token {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        }
    }

    fn with_json<B: Serialize>(
        builder: RequestBuilder,
        body: &B,
    ) -> Result<RequestBuilder, ApiError> {
        let bytes = serde_json::to_vec(body).map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(builder
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(bytes))
    }

    /// Send once and return the body of a 2xx response.
    async fn round_trip(&self, request: RequestBuilder) -> Result<Vec<u8>, ApiError> {
        tokio::time::timeout(self.timeout, async {
            let response = request.send().await.map_err(ApiError::Network)?;
            let status = response.status();
            if status.is_success() {
                return read_limited_bytes(response, MAX_RESPONSE_SIZE).await;
            }
            Err(failure_from_response(response).await)
        })
        .await
        .map_err(|_| ApiError::Timeout)?
    }

    /// GET with retry on 5xx and 429.
    async fn get_bytes(&self, url: Url) -> Result<Vec<u8>, ApiError> {
        let mut retry_count = 0;
        loop {
            match self.round_trip(self.request(Method::GET, url.clone())).await {
                Err(e @ (ApiError::Server(_) | ApiError::RateLimited(_)))
                    if retry_count < self.max_retries =>
                {
                    let delay = self.retry_delay.saturating_mul(2u32.saturating_pow(retry_count));
                    tracing::warn!(
                        path = %url.path(),
                        error = %e,
                        retry = retry_count,
                        delay_ms = delay.as_millis() as u64,
                        "Read failed, retrying after delay"
                    );
                    tokio::time::sleep(delay).await;
                    retry_count += 1;
                }
                Err(ApiError::RateLimited(_)) => return Err(ApiError::RateLimited(retry_count)),
                other => return other,
            }
        }
    }
}

#[async_trait]
impl FeedApi for HttpFeedApi {
    async fn fetch_page(&self, cursor: Option<&str>, limit: usize) -> Result<Page, ApiError> {
        let mut url = self.endpoint(&["posts"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &limit.to_string());
            if let Some(cursor) = cursor {
                query.append_pair("cursor", cursor);
            }
        }
        let bytes = self.get_bytes(url).await?;
        decode(&bytes)
    }

    async fn react(
        &self,
        post_id: &PostId,
        kind: ReactionKind,
    ) -> Result<ReactionResult, ApiError> {
        let url = self.endpoint(&["posts", post_id.as_str(), "reactions"])?;
        let request = Self::with_json(self.request(Method::POST, url), &ReactBody { kind })?;
        let bytes = self.round_trip(request).await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(ReactionResult::default());
        }
        decode(&bytes)
    }

    async fn fetch_comments(&self, post_id: &PostId) -> Result<Vec<Comment>, ApiError> {
        let url = self.endpoint(&["posts", post_id.as_str(), "comments"])?;
        let bytes = self.get_bytes(url).await?;
        Ok(match decode::<CommentList>(&bytes)? {
            CommentList::Bare(comments) | CommentList::Wrapped { comments } => comments,
        })
    }

    async fn add_comment(
        &self,
        post_id: &PostId,
        text: &str,
        parent_id: Option<&CommentId>,
    ) -> Result<Comment, ApiError> {
        let url = self.endpoint(&["posts", post_id.as_str(), "comments"])?;
        let request = Self::with_json(
            self.request(Method::POST, url),
            &AddCommentBody { text, parent_id },
        )?;
        let bytes = self.round_trip(request).await?;
        decode(&bytes)
    }

    async fn delete_comment(
        &self,
        post_id: &PostId,
        comment_id: &CommentId,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(&["posts", post_id.as_str(), "comments", comment_id.as_str()])?;
        self.round_trip(self.request(Method::DELETE, url)).await?;
        Ok(())
    }

    async fn report(&self, post_id: &PostId, reason: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&["posts", post_id.as_str(), "reports"])?;
        let request = Self::with_json(self.request(Method::POST, url), &ReportBody { reason })?;
        self.round_trip(request).await?;
        Ok(())
    }
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(bytes).map_err(|e| ApiError::Decode(e.to_string()))
}

/// Map a non-2xx response onto the error taxonomy, keeping the backend's
/// reason text for 4xx rejections.
async fn failure_from_response(response: reqwest::Response) -> ApiError {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return ApiError::RateLimited(0);
    }
    if status.is_server_error() {
        return ApiError::Server(status.as_u16());
    }

    let message = read_limited_bytes(response, MAX_ERROR_BODY_SIZE)
        .await
        .ok()
        .and_then(|body| serde_json::from_slice::<ErrorBody>(&body).ok())
        .and_then(|body| body.message)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| format!("Request rejected (status {})", status.as_u16()));

    ApiError::Rejected {
        status: status.as_u16(),
        message,
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, ApiError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(ApiError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(ApiError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(ApiError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
