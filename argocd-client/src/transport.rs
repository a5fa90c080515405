//! Plain-data HTTP requests and responses, and the [`Transport`] seam that executes them.
//!
//! The client builds an [`HttpRequest`], hands it to a `Transport` and interprets the
//! [`HttpResponse`] itself, so status handling and the login fallback never depend on a
//! particular HTTP library. [`ReqwestTransport`] is the implementation used in practice.

use crate::error::{self, Error, Result};
use log::trace;
use reqwest::header::CONTENT_TYPE;
use snafu::ResultExt;
use std::fmt::{Debug, Display, Formatter};
use std::time::Duration;

/// HTTP method for a request.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl Display for Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

/// An HTTP request described as plain data. A `body`, when present, is JSON.
#[derive(Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn get<S: Into<String>>(url: S) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post<S1, S2>(url: S1, body: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            method: Method::Post,
            url: url.into(),
            headers: Vec::new(),
            body: Some(body.into()),
        }
    }

    pub fn with_header<S1, S2>(mut self, name: S1, value: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// The value of the first header named `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

// Header values and bodies carry bearer tokens and passwords.
impl Debug for HttpRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field(
                "headers",
                &self
                    .headers
                    .iter()
                    .map(|(name, _)| name.as_str())
                    .collect::<Vec<_>>(),
            )
            .field("body", &self.body.as_ref().map(|body| body.len()))
            .finish()
    }
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new<S: Into<String>>(status: u16, body: S) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// `Transport` performs one blocking HTTP round trip.
///
/// This is provided as a trait so that mock implementations can be injected into the
/// [`ArgoCdClient`](crate::ArgoCdClient) for testing purposes. In practice you will use the
/// [`ReqwestTransport`].
///
/// Implementations return `Ok` for every response the server sends, whatever its status, and
/// [`Error::Transport`] only when no response was received.
pub trait Transport: Send + Sync {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse>;

    /// Whether server certificates are verified.
    fn verifies_tls(&self) -> bool;
}

/// The default [`Transport`], a `reqwest` blocking client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
    verify_tls: bool,
}

impl ReqwestTransport {
    /// Create a transport that applies `timeout` to every request. When `verify_tls` is false,
    /// invalid and self-signed certificates are accepted.
    pub fn new(verify_tls: bool, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .danger_accept_invalid_certs(!verify_tls)
            .timeout(timeout)
            .build()
            .context(error::HttpClientSnafu)?;
        Ok(Self { client, verify_tls })
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let HttpRequest {
            method,
            url,
            headers,
            body,
        } = request;
        trace!("{} {}", method, url);

        let mut builder = match method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };
        for (name, value) in headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = body {
            builder = builder.header(CONTENT_TYPE, "application/json").body(body);
        }

        let transport_error = |e: reqwest::Error| Error::Transport {
            method,
            url: url.clone(),
            source: Box::new(e),
        };
        let response = builder.send().map_err(transport_error)?;
        let status = response.status().as_u16();
        let body = response.text().map_err(transport_error)?;
        trace!("{} {} returned {}", method, url, status);
        Ok(HttpResponse { status, body })
    }

    fn verifies_tls(&self) -> bool {
        self.verify_tls
    }
}
