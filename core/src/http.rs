//! HTTP transport types and the transport seam.
//!
//! # Design
//! Requests and responses are plain data. `Connection` builds an
//! `HttpRequest` and parses an `HttpResponse` without touching the network;
//! the only I/O happens inside a [`Transport`]. The default transport is a
//! blocking ureq agent. Tests and hosts with their own HTTP stack plug in a
//! different implementation.
//!
//! HTTP status codes are carried through untouched. The response envelope,
//! not the status line, decides whether a call succeeded.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{TransportError, TransportErrorKind};

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }

    /// Write methods carry their parameters in a form-encoded body instead
    /// of the query string.
    pub fn has_body(self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An HTTP request described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub timeout: Duration,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: body.into(),
        }
    }
}

/// Executes one HTTP round-trip.
///
/// Implementations block the calling thread until the response body has
/// been read or the request's timeout elapses.
pub trait Transport: Send + Sync + fmt::Debug {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).execute(request)
    }
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).execute(request)
    }
}

/// Blocking transport backed by a reusable ureq agent.
///
/// The agent keeps its connection pool alive between calls and is released
/// when the transport is dropped. Each request runs under its own timeout;
/// the agent timeout only applies to requests built outside this type. Compression is negotiated by ureq itself,
/// so an explicit `accept-encoding` request header is not forwarded.
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .max_redirects(0)
            .build()
            .new_agent();
        Self { agent }
    }

    fn with_headers<B>(
        builder: ureq::RequestBuilder<B>,
        request: &HttpRequest,
    ) -> ureq::RequestBuilder<B> {
        let mut builder = builder
            .config()
            .timeout_global(Some(request.timeout))
            .build();
        for (name, value) in &request.headers {
            if name.eq_ignore_ascii_case("accept-encoding") {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder
    }
}

impl fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UreqTransport")
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = request.url.as_str();
        let body = request.body.as_deref().unwrap_or("").as_bytes();

        let result = match request.method {
            HttpMethod::Get => Self::with_headers(self.agent.get(url), request).call(),
            HttpMethod::Head => Self::with_headers(self.agent.head(url), request).call(),
            HttpMethod::Options => Self::with_headers(self.agent.options(url), request).call(),
            HttpMethod::Delete => Self::with_headers(self.agent.delete(url), request).call(),
            HttpMethod::Post => Self::with_headers(self.agent.post(url), request).send(body),
            HttpMethod::Put => Self::with_headers(self.agent.put(url), request).send(body),
            HttpMethod::Patch => Self::with_headers(self.agent.patch(url), request).send(body),
        };

        let mut response = result.map_err(transport_error)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = if request.method == HttpMethod::Head {
            String::new()
        } else {
            response
                .body_mut()
                .read_to_string()
                .map_err(transport_error)?
        };

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn transport_error(err: ureq::Error) -> TransportError {
    let kind = match &err {
        ureq::Error::Timeout(_) => TransportErrorKind::Timeout,
        ureq::Error::HostNotFound => TransportErrorKind::Dns,
        ureq::Error::ConnectionFailed => TransportErrorKind::Connect,
        ureq::Error::Io(io) if io.kind() == std::io::ErrorKind::ConnectionRefused => {
            TransportErrorKind::Connect
        }
        ureq::Error::Io(io) if io.kind() == std::io::ErrorKind::TimedOut => TransportErrorKind::Timeout,
        ureq::Error::Io(_) => TransportErrorKind::Io,
        _ => TransportErrorKind::Other,
    };
    TransportError::new(kind, err.to_string())
}
