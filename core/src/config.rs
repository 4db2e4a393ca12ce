//! Connection configuration.
//!
//! `ConnectionConfig` deserializes from any serde source with every field
//! optional, so a JSON or TOML fragment naming only `url` is a complete
//! configuration. Validation happens in `Connection::new`.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

/// Wire format requested from the API via the format parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Json,
    Jsonp,
    Xml,
}

impl Format {
    pub fn as_str(self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Jsonp => "jsonp",
            Format::Xml => "xml",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Format::Json),
            "jsonp" => Ok(Format::Jsonp),
            "xml" => Ok(Format::Xml),
            _ => Err(Error::Configuration(format!("Unknown format {s}"))),
        }
    }
}

impl Serialize for Format {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Format {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

pub const DEFAULT_VERSION: &str = "v1";
pub const DEFAULT_FORMAT_PARAM: &str = "_format";
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_STATUS_FIELD: &str = "code";
pub const DEFAULT_ENVELOPE_KEY: &str = "result";

fn default_user_agent() -> String {
    concat!("baseapi-core/", env!("CARGO_PKG_VERSION")).to_string()
}

/// Settings for one API endpoint family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Base URL of the API, without the version segment.
    pub url: String,
    /// Version path segment; empty omits it.
    pub version: String,
    pub format: Format,
    /// Reserved query/body parameter that carries the format.
    pub format_param: String,
    pub timeout_ms: u64,
    /// Key holding the payload inside the envelope. `None` makes the whole
    /// decoded body both payload and meta.
    pub response_envelope: Option<String>,
    /// Envelope field whose presence marks an application-level error.
    pub status_field: String,
    /// Return call failures to the caller instead of recording them as the
    /// connection's last error.
    pub raise_exception: bool,
    pub user_agent: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            version: DEFAULT_VERSION.to_string(),
            format: Format::Json,
            format_param: DEFAULT_FORMAT_PARAM.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            response_envelope: Some(DEFAULT_ENVELOPE_KEY.to_string()),
            status_field: DEFAULT_STATUS_FIELD.to_string(),
            raise_exception: true,
            user_agent: default_user_agent(),
        }
    }
}

impl ConnectionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    pub fn format_param(mut self, name: impl Into<String>) -> Self {
        self.format_param = name.into();
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn response_envelope(mut self, key: Option<&str>) -> Self {
        self.response_envelope = key.map(str::to_string);
        self
    }

    pub fn status_field(mut self, name: impl Into<String>) -> Self {
        self.status_field = name.into();
        self
    }

    pub fn raise_exception(mut self, raise: bool) -> Self {
        self.raise_exception = raise;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.url.trim().is_empty() {
            return Err(Error::Configuration("base url is required".to_string()));
        }
        if self.format_param.is_empty() {
            return Err(Error::Configuration(
                "format parameter name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
