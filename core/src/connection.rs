//! Request building, transport invocation and envelope parsing.
//!
//! # Design
//! `Connection` keeps request building and response parsing apart:
//! `build_request` turns a service path and parameters into an `HttpRequest`, and
//! `parse_response` turns an `HttpResponse` into a [`Response`]. Neither
//! does I/O. `execute` glues the two around the transport and returns a
//! self-contained per-call result; it never touches shared state, so it is
//! the call to use when one connection is shared between threads.
//!
//! `send` layers the classic single-slot API on top of `execute`: the meta
//! of the last successful call and, when raising is disabled, the last call
//! failure are kept on the connection behind a lock. Exactly one of "error
//! returned to the caller" and "error stored as last error" happens for a
//! failing call.
//!
//! The transport is created lazily on first use unless one was injected,
//! then reused for every call and dropped with the connection.

use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{error, info};

use crate::config::{ConnectionConfig, Format};
use crate::error::{Error, Result};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport, UreqTransport};
use crate::params::{is_truthy, Params};

/// Envelope fields other than the payload.
pub type Meta = Map<String, Value>;

/// Business data extracted from a response.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Decoded JSON (or unwrapped JSONP) payload.
    Json(Value),
    /// Raw body of an XML response; no envelope logic applies.
    Xml(String),
}

impl Payload {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Xml(_) => None,
        }
    }

    pub fn into_json(self) -> Option<Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Xml(_) => None,
        }
    }
}

/// Outcome of one successful call.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub payload: Payload,
    pub meta: Meta,
    pub url: String,
    pub status: u16,
}

#[derive(Debug, Default)]
struct CallState {
    meta: Meta,
    last_error: Option<Arc<Error>>,
}

/// Client for one API endpoint family.
#[derive(Debug)]
pub struct Connection {
    config: ConnectionConfig,
    transport: OnceLock<Box<dyn Transport>>,
    state: Mutex<CallState>,
}

impl Connection {
    /// Creates a connection that uses a [`UreqTransport`], built on first use.
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            transport: OnceLock::new(),
            state: Mutex::new(CallState::default()),
        })
    }

    /// Creates a connection over an injected transport.
    pub fn with_transport(config: ConnectionConfig, transport: impl Transport + 'static) -> Result<Self> {
        config.validate()?;
        let boxed: Box<dyn Transport> = Box::new(transport);
        Ok(Self {
            config,
            transport: OnceLock::from(boxed),
            state: Mutex::new(CallState::default()),
        })
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn format(&self) -> Format {
        self.config.format
    }

    /// Switches the wire format; `value` is matched case-insensitively.
    pub fn set_format(&mut self, value: &str) -> Result<Format> {
        let format: Format = value.parse()?;
        self.config.format = format;
        Ok(format)
    }

    pub fn set_raise_exception(&mut self, raise: bool) {
        self.config.raise_exception = raise;
    }

    /// Meta of the most recent successful `send`; empty after a failure.
    pub fn meta(&self) -> Meta {
        self.state.lock().meta.clone()
    }

    /// Failure of the most recent `send` when raising is disabled.
    pub fn last_error(&self) -> Option<Arc<Error>> {
        self.state.lock().last_error.clone()
    }

    /// Full GET-style URL for `service`, including the query string.
    pub fn request_url(&self, service: &str, params: &Params) -> String {
        format!("{}?{}", self.service_url(service), self.wire_params(params).encode())
    }

    pub fn build_request(&self, method: HttpMethod, service: &str, params: &Params) -> HttpRequest {
        let encoded = self.wire_params(params).encode();
        let mut headers = vec![
            ("user-agent".to_string(), self.config.user_agent.clone()),
            ("accept-encoding".to_string(), "gzip, deflate".to_string()),
        ];

        let (url, body) = if method.has_body() {
            headers.push((
                "content-type".to_string(),
                "application/x-www-form-urlencoded".to_string(),
            ));
            (self.service_url(service), Some(encoded))
        } else {
            (format!("{}?{encoded}", self.service_url(service)), None)
        };

        HttpRequest {
            method,
            url,
            headers,
            body,
            timeout: self.config.timeout(),
        }
    }

    /// Decodes and validates a raw response for the request sent to `url`.
    pub fn parse_response(&self, url: &str, response: HttpResponse) -> Result<Response> {
        let status = response.status;
        if self.config.format == Format::Xml {
            return Ok(Response {
                payload: Payload::Xml(response.body),
                meta: Meta::new(),
                url: url.to_string(),
                status,
            });
        }

        let decoded = match decode_body(self.config.format, &response.body) {
            Some(value) if is_truthy(&value) => value,
            _ => return Err(self.api_error(url, None, &Value::Null)),
        };

        if let Some(code) = decoded.get(&self.config.status_field).filter(|c| !c.is_null()) {
            return Err(self.api_error(url, Some(code.clone()), &decoded));
        }

        let (payload, meta) = match (&self.config.response_envelope, decoded) {
            (Some(key), Value::Object(mut map)) => {
                let payload = map.remove(key).unwrap_or(Value::Null);
                (payload, map)
            }
            (Some(_), _) => (Value::Null, Meta::new()),
            (None, Value::Object(map)) => (Value::Object(map.clone()), map),
            (None, other) => (other, Meta::new()),
        };

        Ok(Response {
            payload: Payload::Json(payload),
            meta,
            url: url.to_string(),
            status,
        })
    }

    /// Performs one call and returns its payload and meta without touching
    /// the connection's meta / last-error slots.
    pub fn execute(&self, method: HttpMethod, service: &str, params: &Params) -> Result<Response> {
        let request = self.build_request(method, service, params);
        info!(method = %request.method, url = %request.url, "sending api request");

        let result = self
            .transport()
            .execute(&request)
            .map_err(|source| Error::Transport {
                url: request.url.clone(),
                source,
            })
            .and_then(|response| self.parse_response(&request.url, response));

        if let Err(err) = &result {
            log_failure(err);
        }
        result
    }

    /// GET `service` and return its payload.
    ///
    /// With raising disabled a transport or API failure yields `Ok(None)`
    /// and is recorded in [`Connection::last_error`].
    pub fn send(&self, service: &str, params: &Params) -> Result<Option<Payload>> {
        self.send_with(HttpMethod::Get, service, params)
    }

    pub fn send_with(&self, method: HttpMethod, service: &str, params: &Params) -> Result<Option<Payload>> {
        match self.execute(method, service, params) {
            Ok(response) => {
                if let Payload::Json(_) = response.payload {
                    let mut state = self.state.lock();
                    state.last_error = None;
                    state.meta = response.meta;
                }
                Ok(Some(response.payload))
            }
            Err(err) if err.is_call_failure() => {
                let mut state = self.state.lock();
                state.meta.clear();
                if self.config.raise_exception {
                    Err(err)
                } else {
                    state.last_error = Some(Arc::new(err));
                    Ok(None)
                }
            }
            Err(err) => Err(err),
        }
    }

    fn transport(&self) -> &dyn Transport {
        self.transport
            .get_or_init(|| Box::new(UreqTransport::new(self.config.timeout())))
            .as_ref()
    }

    fn service_url(&self, service: &str) -> String {
        let base = self.config.url.trim_end_matches('/');
        if self.config.version.is_empty() {
            format!("{base}/{service}")
        } else {
            format!("{base}/{}/{service}", self.config.version)
        }
    }

    fn wire_params(&self, params: &Params) -> Params {
        let mut wire = params.filtered();
        wire.set(self.config.format_param.as_str(), self.config.format.as_str());
        wire
    }

    fn api_error(&self, url: &str, code: Option<Value>, decoded: &Value) -> Error {
        let message = decoded
            .pointer("/error/message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Invalid response message on {url}"));
        let error_type = decoded
            .pointer("/error/type")
            .and_then(Value::as_str)
            .map(str::to_string);
        Error::Api {
            code,
            message,
            error_type,
            url: url.to_string(),
        }
    }
}

/// Decodes a JSON or JSONP body. Undecodable input yields `None`.
fn decode_body(format: Format, body: &str) -> Option<Value> {
    let json = match format {
        Format::Jsonp => strip_jsonp(body),
        _ => body,
    };
    serde_json::from_str(json).ok()
}

/// Trims a `callback(` prefix and the trailing `)` run. Parentheses inside
/// the JSON are not inspected.
fn strip_jsonp(body: &str) -> &str {
    body.trim_start_matches(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '?' || c == '(')
        .trim_end()
        .trim_end_matches(')')
}

fn log_failure(err: &Error) {
    let code = match err.code() {
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
        None => "null".to_string(),
    };
    let error_type = match err {
        Error::Api {
            error_type: Some(t), ..
        } => t.as_str(),
        _ => "",
    };
    error!(code = %code, kind = %err.kind(), error_type, url = err.url().unwrap_or(""), "{err}");
}
