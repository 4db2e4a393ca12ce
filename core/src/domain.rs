//! Base layer for typed API clients.
//!
//! A consumer exposes strongly-typed endpoints by implementing [`Domain`]
//! (or wrapping a [`DomainBase`]) and calling `fetch_single` / `fetch_list`
//! with the mapper type each endpoint returns.

use serde_json::Value;

use crate::connection::{Connection, Meta, Payload};
use crate::error::{Error, Result};
use crate::mapper::{value_kind, Mapper, MapperRegistry, TypeRef};
use crate::params::{is_truthy, Params};

pub trait Domain {
    fn connection(&self) -> &Connection;

    fn registry(&self) -> &MapperRegistry;

    /// Fetches one object. `Ok(None)` means the call returned no payload,
    /// or failed while the connection is not raising errors.
    fn fetch_single<M: Mapper>(
        &self,
        service: &str,
        type_ref: impl Into<TypeRef>,
        params: &Params,
    ) -> Result<Option<M>> {
        let value = match self.connection().send(service, params)? {
            None | Some(Payload::Json(Value::Null)) => return Ok(None),
            Some(Payload::Json(value)) => value,
            Some(Payload::Xml(_)) => {
                return Err(Error::Shape(format!("{service}: xml payload cannot be mapped")))
            }
        };
        self.registry().map(&value, &type_ref.into()).map(Some)
    }

    /// Fetches a collection, optionally nested under `nested_key` in the
    /// payload. A missing or empty nested collection is an empty list; a
    /// scalar text payload is a [`Error::Shape`] error.
    fn fetch_list<M: Mapper>(
        &self,
        service: &str,
        type_ref: impl Into<TypeRef>,
        params: &Params,
        nested_key: Option<&str>,
    ) -> Result<Vec<M>> {
        let type_ref = type_ref.into();
        let items = list_items(self.connection().send(service, params)?, service, nested_key)?;
        items
            .iter()
            .map(|item| self.registry().map(item, &type_ref))
            .collect()
    }

    /// Like [`Domain::fetch_list`] for polymorphic collections, where a
    /// selector picks a different mapper per element.
    fn fetch_list_dyn(
        &self,
        service: &str,
        type_ref: impl Into<TypeRef>,
        params: &Params,
        nested_key: Option<&str>,
    ) -> Result<Vec<Box<dyn Mapper>>> {
        let type_ref = type_ref.into();
        let items = list_items(self.connection().send(service, params)?, service, nested_key)?;
        items
            .iter()
            .map(|item| self.registry().map_dyn(item, &type_ref))
            .collect()
    }

    fn meta(&self) -> Meta {
        self.connection().meta()
    }
}

fn list_items(payload: Option<Payload>, service: &str, nested_key: Option<&str>) -> Result<Vec<Value>> {
    let value = match payload {
        None => return Ok(Vec::new()),
        Some(Payload::Json(Value::String(_))) | Some(Payload::Xml(_)) => {
            return Err(Error::Shape(format!("{service}: can't get items for string response")))
        }
        Some(Payload::Json(value)) => value,
    };

    let value = match nested_key {
        Some(key) => match value.get(key) {
            Some(nested) if is_truthy(nested) => nested.clone(),
            _ => return Ok(Vec::new()),
        },
        None => value,
    };

    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => Ok(items),
        Value::Object(map) => Ok(map.into_iter().map(|(_, v)| v).collect()),
        other => Err(Error::Shape(format!(
            "{service}: expected a collection, got {}",
            value_kind(&other)
        ))),
    }
}

/// Joins filter values with commas. No values yields `None`, so the
/// parameter is dropped instead of being sent empty.
pub fn to_csv<I, S>(values: I) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Option<String> = None;
    for value in values {
        match out.as_mut() {
            Some(csv) => {
                csv.push(',');
                csv.push_str(value.as_ref());
            }
            None => out = Some(value.as_ref().to_string()),
        }
    }
    out
}

/// Plain [`Domain`] over an injected connection and registry.
#[derive(Debug)]
pub struct DomainBase {
    connection: Connection,
    registry: MapperRegistry,
}

impl DomainBase {
    pub fn new(connection: Connection, registry: MapperRegistry) -> Self {
        Self {
            connection,
            registry,
        }
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.connection
    }
}

impl Domain for DomainBase {
    fn connection(&self) -> &Connection {
        &self.connection
    }

    fn registry(&self) -> &MapperRegistry {
        &self.registry
    }
}
