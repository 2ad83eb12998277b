//! HTTP request type
//!
//! [`HttpRequest`] issues one HTTP exchange with a shared `reqwest`
//! client. The result classification is the status code, or an error
//! token when the exchange failed. Timing is split into time to first
//! byte (until response headers arrive) and content download.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, StatusCode, redirect};
use serde::Serialize;
use tracing::trace;

use crate::error::{FlowgenError, RequestError};
use crate::request::{Request, RequestMeta, RequestResult};

/// Timeout applied when a request does not set one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Creates the HTTP client shared by all requests of a run.
///
/// Redirects are not followed, so that each request measures exactly one
/// exchange with the target.
///
/// # Errors
///
/// Returns `FlowgenError::Io` if the client cannot be built (e.g. the TLS
/// backend fails to initialize).
pub fn create_http_client() -> Result<Client, FlowgenError> {
    Client::builder()
        .redirect(redirect::Policy::none())
        .user_agent(concat!("flowgen/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| FlowgenError::Io(std::io::Error::other(e.to_string())))
}

/// Request body.
#[derive(Debug, Clone, PartialEq)]
pub enum HttpBody {
    /// Sent as-is
    Text(String),
    /// Serialized as JSON with a JSON content type
    Json(serde_json::Value),
}

/// What to send.
#[derive(Debug, Clone)]
pub struct HttpRequestOptions {
    /// HTTP method
    pub method: Method,
    /// Absolute URL
    pub url: String,
    /// Headers, in send order
    pub headers: Vec<(String, String)>,
    /// Optional body
    pub body: Option<HttpBody>,
    /// Limit on the whole exchange; [`DEFAULT_TIMEOUT`] when `None`
    pub timeout: Option<Duration>,
}

impl HttpRequestOptions {
    /// A bodiless `GET` of `url`.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout: None,
        }
    }
}

/// Parameters an [`HttpRequest`] is built from.
#[derive(Debug, Clone)]
pub struct HttpParams {
    /// Shared client
    pub client: Client,
    /// What to send
    pub options: HttpRequestOptions,
}

/// Timing breakdown of one exchange.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Durations {
    /// Whole exchange
    pub total: Duration,
    /// Until response headers arrived
    pub time_to_first_byte: Option<Duration>,
    /// From response headers to the end of the body
    pub content_download: Option<Duration>,
}

/// One HTTP exchange.
#[derive(Debug)]
pub struct HttpRequest {
    client: Client,
    options: HttpRequestOptions,
    status: Option<StatusCode>,
    headers: Option<HeaderMap>,
    body: Option<Bytes>,
    durations: Option<Durations>,
}

impl HttpRequest {
    /// Response status, if a response arrived.
    #[must_use]
    pub const fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Response headers, if a response arrived.
    #[must_use]
    pub const fn headers(&self) -> Option<&HeaderMap> {
        self.headers.as_ref()
    }

    /// Response body, if it was read completely.
    #[must_use]
    pub const fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Response body as text, lossily decoded.
    #[must_use]
    pub fn text(&self) -> Option<String> {
        self.body
            .as_ref()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    /// Timing breakdown, once run.
    #[must_use]
    pub const fn durations(&self) -> Option<Durations> {
        self.durations
    }

    /// The options this request was built with.
    #[must_use]
    pub const fn options(&self) -> &HttpRequestOptions {
        &self.options
    }

    async fn exchange(&mut self, started: Instant) -> Result<StatusCode, RequestError> {
        let url = reqwest::Url::parse(&self.options.url)
            .map_err(|e| RequestError::Invalid(format!("{}: {e}", self.options.url)))?;

        let mut builder = self.client.request(self.options.method.clone(), url);
        for (name, value) in &self.options.headers {
            builder = builder.header(name, value);
        }
        builder = match &self.options.body {
            Some(HttpBody::Text(text)) => builder.body(text.clone()),
            Some(HttpBody::Json(value)) => builder.json(value),
            None => builder,
        };

        let response = builder.send().await.map_err(classify)?;
        let first_byte = started.elapsed();

        let status = response.status();
        self.status = Some(status);
        self.headers = Some(response.headers().clone());
        self.durations = Some(Durations {
            total: first_byte,
            time_to_first_byte: Some(first_byte),
            content_download: None,
        });

        let body = response.bytes().await.map_err(classify)?;
        let total = started.elapsed();
        self.body = Some(body);
        self.durations = Some(Durations {
            total,
            time_to_first_byte: Some(first_byte),
            content_download: Some(total.saturating_sub(first_byte)),
        });

        Ok(status)
    }
}

#[async_trait]
impl Request for HttpRequest {
    type Params = HttpParams;
    const KIND: &'static str = "http";

    fn build(params: HttpParams) -> Self {
        Self {
            client: params.client,
            options: params.options,
            status: None,
            headers: None,
            body: None,
            durations: None,
        }
    }

    async fn run(&mut self, meta: &RequestMeta) -> Result<RequestResult, RequestError> {
        let timeout = self.options.timeout.unwrap_or(DEFAULT_TIMEOUT);
        let started = Instant::now();

        trace!(
            request_id = meta.id,
            method = %self.options.method,
            url = %self.options.url,
            "sending request"
        );

        let outcome = tokio::time::timeout(timeout, self.exchange(started))
            .await
            .unwrap_or(Err(RequestError::Timeout));

        // Failed exchanges still report how long they took.
        let total = started.elapsed();
        let durations = self.durations.get_or_insert_with(Durations::default);
        if outcome.is_err() {
            durations.total = total;
        }

        outcome.map(|status| RequestResult::Status(status.as_u16()))
    }

    fn duration(&self) -> Option<Duration> {
        self.durations.map(|d| d.total)
    }
}

/// Maps a transport error to the request error taxonomy.
fn classify(error: reqwest::Error) -> RequestError {
    if error.is_timeout() {
        RequestError::Timeout
    } else if error.is_connect() {
        RequestError::Connect(error.to_string())
    } else if error.is_builder() {
        RequestError::Invalid(error.to_string())
    } else if error.is_body() || error.is_decode() {
        RequestError::Body(error.to_string())
    } else {
        RequestError::Other(error.to_string())
    }
}
