//! Base layer for typed clients of JSON / JSONP / XML HTTP APIs.
//!
//! # Overview
//! A [`Connection`] builds request URLs and bodies, runs them through a
//! [`Transport`], decodes the response and validates its envelope, returning
//! the payload and keeping the sibling fields as meta. A [`MapperRegistry`]
//! turns payload records into typed [`Mapper`] objects, choosing the concrete
//! type by name or by a selector over the record. [`Domain`] ties the two
//! together for consumers that expose one typed method per endpoint.
//!
//! # Design
//! - Request building and response parsing are pure; only the transport
//!   does I/O, so both halves are testable without a network.
//! - Transport and API failures go through one raise/capture switch on the
//!   connection. Configuration, shape and mapping errors are always
//!   returned.
//! - Mapper types are registered explicitly with a trait bound instead of
//!   being looked up by name at runtime.

pub mod config;
pub mod connection;
pub mod domain;
pub mod error;
pub mod http;
pub mod mapper;
pub mod params;

pub use config::{ConnectionConfig, Format};
pub use connection::{Connection, Meta, Payload, Response};
pub use domain::{to_csv, Domain, DomainBase};
pub use error::{Error, ErrorKind, Result, TransportError, TransportErrorKind};
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport, UreqTransport};
pub use mapper::{key_to_field_name, Mapper, MapperRegistry, Record, TypeRef};
pub use params::Params;
