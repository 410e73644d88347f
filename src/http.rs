//! HTTP access shared by the tracker adapters.
//!
//! Adapters talk to an [`HttpTransport`] rather than to `reqwest` directly,
//! so their pagination and decoding can be tested against canned
//! responses. [`TrackerClient`] adds authentication and maps HTTP status
//! codes onto [`FetchError`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use url::Url;

use crate::sync::FetchError;

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("issuecrawl/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// Header name/value pairs; lookups are case-insensitive.
pub type HttpHeaders = Vec<(String, String)>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HttpHeaders,
    /// Credentials for HTTP basic authentication.
    pub basic_auth: Option<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: Vec::new(),
            basic_auth: None,
            body: Vec::new(),
        }
    }

    /// A POST with an `application/x-www-form-urlencoded` body.
    #[must_use]
    pub fn post_form(url: impl Into<String>, fields: &[(String, String)]) -> Self {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers: vec![(
                "Content-Type".to_string(),
                "application/x-www-form-urlencoded".to_string(),
            )],
            basic_auth: None,
            body: body.into_bytes(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HttpHeaders,
    pub body: Vec<u8>,
}

impl HttpResponse {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        header_get(&self.headers, name)
    }
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("http transport error: {0}")]
    Transport(String),

    #[error("no mock response registered for {method} {url}")]
    NoMockResponse { method: String, url: String },
}

impl From<HttpError> for FetchError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Timeout(message) => Self::Timeout(message),
            HttpError::Connect(message) => Self::Unreachable(message),
            HttpError::Transport(message) => Self::Transient(message),
            HttpError::NoMockResponse { .. } => Self::NotFound(err.to_string()),
        }
    }
}

/// Transport boundary for all HTTP I/O.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

/// First header value matching `name`, ignoring case.
#[must_use]
pub fn header_get<'a>(headers: &'a HttpHeaders, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// A real transport backed by reqwest.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a client with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::Transport` if the TLS backend cannot initialise.
    pub fn with_timeout(timeout: Duration) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| HttpError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

fn transport_error(err: &reqwest::Error) -> HttpError {
    if err.is_timeout() {
        HttpError::Timeout(err.to_string())
    } else if err.is_connect() {
        HttpError::Connect(err.to_string())
    } else {
        HttpError::Transport(err.to_string())
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
        };

        let mut builder = self.client.request(method, &request.url);
        for (k, v) in &request.headers {
            builder = builder.header(k, v);
        }
        if let Some((user, password)) = &request.basic_auth {
            builder = builder.basic_auth(user, Some(password));
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body);
        }

        let resp = builder.send().await.map_err(|e| transport_error(&e))?;

        let status = resp.status().as_u16();
        let headers: HttpHeaders = resp
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        let body = resp
            .bytes()
            .await
            .map_err(|e| transport_error(&e))?
            .to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// How a tracker expects credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Auth {
    #[default]
    Anonymous,
    /// A custom header such as `X-Redmine-API-Key`.
    Header { name: String, value: String },
    Bearer(String),
    Basic { user: String, password: String },
    /// A query parameter such as Bugzilla's `Bugzilla_api_key`.
    Query { name: String, value: String },
}

/// Authenticated HTTP client for one tracker.
#[derive(Clone)]
pub struct TrackerClient {
    transport: Arc<dyn HttpTransport>,
    auth: Auth,
}

impl TrackerClient {
    pub fn new(transport: Arc<dyn HttpTransport>, auth: Auth) -> Self {
        Self { transport, auth }
    }

    /// GET `url` with `query` appended and return the body of a 2xx response.
    ///
    /// # Errors
    ///
    /// Returns the `FetchError` matching the transport failure or status code.
    pub async fn get(&self, url: &Url, query: &[(&str, String)]) -> Result<Vec<u8>, FetchError> {
        let url = self.with_query(url, query);
        let request = self.authorize(HttpRequest::get(url.as_str()));
        self.execute(request).await
    }

    /// POST a form to `url` and return the body of a 2xx response.
    ///
    /// # Errors
    ///
    /// Returns the `FetchError` matching the transport failure or status code.
    pub async fn post_form(
        &self,
        url: &Url,
        fields: &[(String, String)],
    ) -> Result<Vec<u8>, FetchError> {
        let url = self.with_query(url, &[]);
        let request = self.authorize(HttpRequest::post_form(url.as_str(), fields));
        self.execute(request).await
    }

    async fn execute(&self, request: HttpRequest) -> Result<Vec<u8>, FetchError> {
        let method = request.method;
        let target = request.url.clone();
        tracing::trace!("{} {target}", method.as_str());
        let response = self.transport.send(request).await?;
        check_status(response, &target)
    }

    fn with_query(&self, url: &Url, query: &[(&str, String)]) -> Url {
        let mut url = url.clone();
        let auth_pair = match &self.auth {
            Auth::Query { name, value } => Some((name.as_str(), value.as_str())),
            _ => None,
        };
        if !query.is_empty() || auth_pair.is_some() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in query {
                pairs.append_pair(k, v);
            }
            if let Some((k, v)) = auth_pair {
                pairs.append_pair(k, v);
            }
        }
        url
    }

    fn authorize(&self, request: HttpRequest) -> HttpRequest {
        match &self.auth {
            Auth::Header { name, value } => request.with_header(name, value),
            Auth::Bearer(token) => request.with_header("Authorization", &format!("Bearer {token}")),
            Auth::Basic { user, password } => HttpRequest {
                basic_auth: Some((user.clone(), password.clone())),
                ..request
            },
            Auth::Anonymous | Auth::Query { .. } => request,
        }
    }
}

/// Map a response status onto the fetch error taxonomy.
///
/// # Errors
///
/// Returns a `FetchError` for every non-2xx status.
pub fn check_status(response: HttpResponse, url: &str) -> Result<Vec<u8>, FetchError> {
    let status = response.status;
    if (200..300).contains(&status) {
        return Ok(response.body);
    }

    let detail = || {
        let body = String::from_utf8_lossy(&response.body);
        let snippet: String = body.chars().take(200).collect();
        format!("HTTP {status} for {url}: {}", snippet.trim())
    };

    match status {
        401 => Err(FetchError::Auth(detail())),
        403 | 429 => match rate_limit_reset(&response.headers, Utc::now()) {
            Some(reset_at) => Err(FetchError::RateLimited { reset_at }),
            None if status == 429 => Err(FetchError::Transient(detail())),
            None => Err(FetchError::Auth(detail())),
        },
        404 | 410 => Err(FetchError::NotFound(detail())),
        408 => Err(FetchError::Timeout(detail())),
        500..=599 => Err(FetchError::Transient(detail())),
        _ => Err(FetchError::Protocol(detail())),
    }
}

/// Instant at which a rate limit lifts, from `Retry-After` (seconds or
/// HTTP date) or `X-RateLimit-Reset` (epoch seconds).
#[must_use]
pub fn rate_limit_reset(headers: &HttpHeaders, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if let Some(value) = header_get(headers, "retry-after") {
        let value = value.trim();
        if let Ok(secs) = value.parse::<i64>() {
            return Some(now + chrono::Duration::seconds(secs.max(0)));
        }
        if let Ok(at) = DateTime::parse_from_rfc2822(value) {
            return Some(at.with_timezone(&Utc));
        }
    }

    let remaining = header_get(headers, "x-ratelimit-remaining").and_then(|v| v.trim().parse::<i64>().ok());
    if remaining.is_some_and(|r| r > 0) {
        return None;
    }
    header_get(headers, "x-ratelimit-reset")
        .and_then(|v| v.trim().parse::<i64>().ok())
        .and_then(|epoch| DateTime::from_timestamp(epoch, 0))
}

// ---------- Test-only mock transport ----------

#[cfg(test)]
use std::collections::VecDeque;
#[cfg(test)]
use std::sync::Mutex;

/// In-memory transport for tests.
///
/// Responses are registered per method and URL prefix; the longest
/// matching prefix wins and queued responses are returned in FIFO order.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[cfg(test)]
#[derive(Default)]
struct MockTransportInner {
    routes: Vec<(HttpMethod, String, VecDeque<HttpResponse>)>,
    requests: Vec<HttpRequest>,
}

#[cfg(test)]
impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, method: HttpMethod, prefix: &str, status: u16, body: impl Into<Vec<u8>>) {
        self.push_response(
            method,
            prefix,
            HttpResponse {
                status,
                headers: Vec::new(),
                body: body.into(),
            },
        );
    }

    pub fn push_response(&self, method: HttpMethod, prefix: &str, response: HttpResponse) {
        let mut inner = self
            .inner
            .lock()
            .expect("mock transport lock should not be poisoned");
        match inner
            .routes
            .iter_mut()
            .find(|(m, p, _)| *m == method && p == prefix)
        {
            Some((_, _, queue)) => queue.push_back(response),
            None => inner
                .routes
                .push((method, prefix.to_string(), VecDeque::from([response]))),
        }
    }

    #[must_use]
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.inner
            .lock()
            .expect("mock transport lock should not be poisoned")
            .requests
            .clone()
    }
}

#[cfg(test)]
#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let mut inner = self
            .inner
            .lock()
            .expect("mock transport lock should not be poisoned");
        let method = request.method;
        let url = request.url.clone();
        inner.requests.push(request);

        inner
            .routes
            .iter_mut()
            .filter(|(m, p, q)| *m == method && url.starts_with(p.as_str()) && !q.is_empty())
            .max_by_key(|(_, p, _)| p.len())
            .and_then(|(_, _, q)| q.pop_front())
            .ok_or_else(|| HttpError::NoMockResponse {
                method: method.as_str().to_string(),
                url,
            })
    }
}
