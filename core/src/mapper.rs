//! Typed mapping of loosely-typed response records.
//!
//! # Design
//! A [`Mapper`] is a domain type that can populate itself from a JSON record.
//! Each response key is converted to a camelCase field name
//! (`first_name` → `firstName`) and offered first to the type's setter hook,
//! then to its plain field assignment. Keys neither hook recognizes are
//! ignored.
//!
//! The [`MapperRegistry`] replaces runtime class lookup with an explicit
//! registration table: concrete type names map to constructors, and a
//! logical name is turned into a concrete name through an override map or,
//! failing that, the registry's default namespace. A [`TypeRef`] is either a
//! literal logical name or a selector function that picks the name from the
//! record being mapped, which is how polymorphic payloads are handled.
//!
//! Every mapper built by a registry holds a handle to it, and so do the
//! nested mappers it reports through [`Mapper::registry_aware`]. The handle is
//! runtime plumbing only and must be kept out of the type's serialized form
//! (`#[serde(skip)]`).

use std::any::{type_name, Any};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// A raw response record.
pub type Record = Map<String, Value>;

pub const DEFAULT_NAMESPACE: &str = "mappers";

/// Object-safe access to [`Any`] for mapper trait objects.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// A typed object populated field-by-field from a raw record.
pub trait Mapper: AsAny + fmt::Debug + Send + Sync {
    /// Setter hook, consulted before [`Mapper::assign_field`]. Returns
    /// `Ok(true)` when it handled `field`. Setters do their own coercion,
    /// e.g. building nested mappers through the registry.
    fn apply_setter(&mut self, field: &str, value: &Value) -> Result<bool> {
        let _ = (field, value);
        Ok(false)
    }

    /// Plain assignment of a raw value to the field named `field`. Returns
    /// `Ok(false)` for unknown fields.
    fn assign_field(&mut self, field: &str, value: &Value) -> Result<bool>;

    /// Keep a handle to the registry that built this mapper.
    fn attach_registry(&mut self, registry: &MapperRegistry);

    /// Nested mappers that must share this mapper's registry.
    fn registry_aware(&mut self) -> Vec<&mut dyn Mapper> {
        Vec::new()
    }

    fn set_registry(&mut self, registry: &MapperRegistry) {
        self.attach_registry(registry);
        for child in self.registry_aware() {
            child.set_registry(registry);
        }
    }

    fn populate(&mut self, data: &Record) -> Result<()> {
        for (key, value) in data {
            let field = key_to_field_name(key);
            if !self.apply_setter(&field, value)? {
                self.assign_field(&field, value)?;
            }
        }
        Ok(())
    }
}

impl dyn Mapper {
    pub fn downcast_ref<M: Mapper>(&self) -> Option<&M> {
        self.as_any().downcast_ref::<M>()
    }

    pub fn is<M: Mapper>(&self) -> bool {
        self.as_any().is::<M>()
    }
}

/// Converts `some_key name` to `someKeyName`.
///
/// Underscores and spaces are word boundaries; the first letter of every
/// word is upper-cased, the words are joined and the very first letter is
/// lower-cased. Other characters are kept as they are, so an already
/// camelCase key maps to itself.
pub fn key_to_field_name(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for word in key.split(['_', ' ']).filter(|w| !w.is_empty()) {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    let mut chars = out.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => out,
    }
}

/// Deserializes `value` into `slot`, reporting failures against `field`.
pub fn assign_value<T: DeserializeOwned>(slot: &mut T, field: &str, value: &Value) -> Result<()> {
    *slot = T::deserialize(value).map_err(|source| Error::Field {
        field: field.to_string(),
        source,
    })?;
    Ok(())
}

/// Expands to an [`Mapper::assign_field`] body that assigns the listed
/// camelCase field names to struct members with [`assign_value`].
///
/// ```ignore
/// fn assign_field(&mut self, field: &str, value: &Value) -> Result<bool> {
///     assign_fields!(self, field, value, { "id" => id, "firstName" => first_name })
/// }
/// ```
#[macro_export]
macro_rules! assign_fields {
    ($target:expr, $field:expr, $value:expr, { $($name:literal => $member:ident),* $(,)? }) => {
        match $field {
            $($name => $crate::mapper::assign_value(&mut $target.$member, $name, $value).map(|()| true),)*
            _ => Ok(false),
        }
    };
}

type Selector = Arc<dyn Fn(&Value) -> String + Send + Sync>;

/// How the mapper type for a record is chosen.
#[derive(Clone)]
pub enum TypeRef {
    /// A logical type name.
    Name(String),
    /// Picks the logical type name from the record being mapped.
    Selector(Selector),
}

impl TypeRef {
    pub fn name(name: impl Into<String>) -> Self {
        TypeRef::Name(name.into())
    }

    pub fn selector<F>(f: F) -> Self
    where
        F: Fn(&Value) -> String + Send + Sync + 'static,
    {
        TypeRef::Selector(Arc::new(f))
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Name(name) => f.debug_tuple("Name").field(name).finish(),
            TypeRef::Selector(_) => f.write_str("Selector(..)"),
        }
    }
}

impl From<&str> for TypeRef {
    fn from(name: &str) -> Self {
        TypeRef::Name(name.to_string())
    }
}

impl From<String> for TypeRef {
    fn from(name: String) -> Self {
        TypeRef::Name(name)
    }
}

type Constructor = Arc<dyn Fn() -> Box<dyn Mapper> + Send + Sync>;

#[derive(Clone)]
struct RegistryInner {
    namespace: String,
    constructors: HashMap<String, Constructor>,
    type_map: HashMap<String, String>,
}

/// Resolves logical type names to registered mapper constructors.
///
/// Cloning is cheap and clones share the same table; mutating a clone
/// (registering, changing the type map) detaches it from the others.
#[derive(Clone)]
pub struct MapperRegistry {
    inner: Arc<RegistryInner>,
}

impl Default for MapperRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

impl fmt::Debug for MapperRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&str> = self.inner.constructors.keys().map(String::as_str).collect();
        types.sort_unstable();
        let type_map: BTreeMap<&String, &String> = self.inner.type_map.iter().collect();
        f.debug_struct("MapperRegistry")
            .field("namespace", &self.inner.namespace)
            .field("types", &types)
            .field("type_map", &type_map)
            .finish()
    }
}

impl MapperRegistry {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                namespace: namespace.into(),
                constructors: HashMap::new(),
                type_map: HashMap::new(),
            }),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    /// Registers `M` under the concrete type name `name`.
    pub fn register<M>(&mut self, name: impl Into<String>)
    where
        M: Mapper + Default,
    {
        let constructor: Constructor = Arc::new(|| Box::new(M::default()) as Box<dyn Mapper>);
        Arc::make_mut(&mut self.inner)
            .constructors
            .insert(name.into(), constructor);
    }

    /// Builder-style [`MapperRegistry::register`].
    pub fn with_type<M>(mut self, name: impl Into<String>) -> Self
    where
        M: Mapper + Default,
    {
        self.register::<M>(name);
        self
    }

    /// Replaces the logical-name → concrete-name override map. An empty map
    /// leaves every name to the namespace convention.
    pub fn set_type_map<I, K, V>(&mut self, map: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Arc::make_mut(&mut self.inner).type_map = map
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
    }

    pub fn with_type_map<I, K, V>(mut self, map: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.set_type_map(map);
        self
    }

    /// Default concrete name for a logical name: `<namespace>::<name>`.
    pub fn qualify(&self, name: &str) -> String {
        if self.inner.namespace.is_empty() {
            name.to_string()
        } else {
            format!("{}::{name}", self.inner.namespace)
        }
    }

    /// Resolves `type_ref` to the concrete name of a registered mapper.
    ///
    /// A selector is called once with `sample` and its result is resolved
    /// like a literal name.
    pub fn resolve(&self, type_ref: &TypeRef, sample: &Value) -> Result<String> {
        let name = match type_ref {
            TypeRef::Name(name) => name.clone(),
            TypeRef::Selector(select) => select(sample),
        };
        let concrete = match self.inner.type_map.get(&name) {
            Some(mapped) => mapped.clone(),
            None => self.qualify(&name),
        };
        if self.inner.constructors.contains_key(&concrete) {
            Ok(concrete)
        } else {
            Err(Error::UnresolvedType { name: concrete })
        }
    }

    /// Maps `data` into whichever mapper `type_ref` resolves to.
    pub fn map_dyn(&self, data: &Value, type_ref: &TypeRef) -> Result<Box<dyn Mapper>> {
        self.build(data, type_ref).map(|(_, mapper)| mapper)
    }

    /// Maps `data` into `M`. Fails with [`Error::Contract`] when `type_ref`
    /// resolves to a different mapper type.
    pub fn map<M: Mapper>(&self, data: &Value, type_ref: &TypeRef) -> Result<M> {
        let (resolved, mapper) = self.build(data, type_ref)?;
        match AsAny::into_any(mapper).downcast::<M>() {
            Ok(mapper) => Ok(*mapper),
            Err(_) => Err(Error::Contract {
                resolved,
                expected: type_name::<M>(),
            }),
        }
    }

    fn build(&self, data: &Value, type_ref: &TypeRef) -> Result<(String, Box<dyn Mapper>)> {
        let resolved = self.resolve(type_ref, data)?;
        let record = data.as_object().ok_or_else(|| {
            Error::Shape(format!("{resolved} expects an object record, got {}", value_kind(data)))
        })?;
        let constructor = self
            .inner
            .constructors
            .get(&resolved)
            .ok_or_else(|| Error::UnresolvedType {
                name: resolved.clone(),
            })?;

        let mut mapper = constructor();
        mapper.set_registry(self);
        mapper.populate(record)?;
        // Nested values assigned directly during populate still need the handle.
        mapper.set_registry(self);
        Ok((resolved, mapper))
    }
}

pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use serde_json::json;

    #[derive(Debug, Default, Serialize)]
    #[serde(rename_all = "camelCase")]
    struct Dog {
        name: String,
        good_boy: bool,
        #[serde(skip)]
        owner: Option<Box<dyn Mapper>>,
        #[serde(skip)]
        registry: Option<MapperRegistry>,
    }

    impl Mapper for Dog {
        fn apply_setter(&mut self, field: &str, value: &Value) -> Result<bool> {
            if field != "owner" {
                return Ok(false);
            }
            let registry = self.registry.clone().unwrap_or_default();
            self.owner = Some(registry.map_dyn(value, &TypeRef::name("Owner"))?);
            Ok(true)
        }

        fn assign_field(&mut self, field: &str, value: &Value) -> Result<bool> {
            assign_fields!(self, field, value, { "name" => name, "goodBoy" => good_boy })
        }

        fn attach_registry(&mut self, registry: &MapperRegistry) {
            self.registry = Some(registry.clone());
        }

        fn registry_aware(&mut self) -> Vec<&mut dyn Mapper> {
            let mut nested: Vec<&mut dyn Mapper> = Vec::new();
            if let Some(owner) = self.owner.as_mut() {
                nested.push(owner.as_mut());
            }
            nested
        }
    }

    #[derive(Debug, Default)]
    struct Cat {
        name: String,
        lives: u8,
    }

    impl Mapper for Cat {
        fn assign_field(&mut self, field: &str, value: &Value) -> Result<bool> {
            assign_fields!(self, field, value, { "name" => name, "lives" => lives })
        }

        fn attach_registry(&mut self, _registry: &MapperRegistry) {}
    }

    #[derive(Debug, Default)]
    struct Owner {
        name: String,
    }

    impl Mapper for Owner {
        fn assign_field(&mut self, field: &str, value: &Value) -> Result<bool> {
            assign_fields!(self, field, value, { "name" => name })
        }

        fn attach_registry(&mut self, _registry: &MapperRegistry) {}
    }

    #[derive(Debug, Default)]
    struct VipOwner {
        name: String,
        registry: Option<MapperRegistry>,
    }

    impl Mapper for VipOwner {
        fn apply_setter(&mut self, field: &str, value: &Value) -> Result<bool> {
            if field == "name" {
                let name: String = serde_json::from_value(value.clone()).map_err(|source| Error::Field {
                    field: field.to_string(),
                    source,
                })?;
                self.name = name.to_uppercase();
                return Ok(true);
            }
            Ok(false)
        }

        fn assign_field(&mut self, field: &str, value: &Value) -> Result<bool> {
            assign_fields!(self, field, value, { "name" => name })
        }

        fn attach_registry(&mut self, registry: &MapperRegistry) {
            self.registry = Some(registry.clone());
        }
    }

    #[derive(Debug, Default)]
    struct Kennel {
        dogs: Vec<Dog>,
        registry: Option<MapperRegistry>,
    }

    impl Mapper for Kennel {
        fn apply_setter(&mut self, field: &str, value: &Value) -> Result<bool> {
            if field != "dogs" {
                return Ok(false);
            }
            let registry = self.registry.clone().unwrap_or_default();
            let items = value.as_array().cloned().unwrap_or_default();
            self.dogs = items
                .iter()
                .map(|item| registry.map::<Dog>(item, &TypeRef::name("Dog")))
                .collect::<Result<_>>()?;
            Ok(true)
        }

        fn assign_field(&mut self, _field: &str, _value: &Value) -> Result<bool> {
            Ok(false)
        }

        fn attach_registry(&mut self, registry: &MapperRegistry) {
            self.registry = Some(registry.clone());
        }

        fn registry_aware(&mut self) -> Vec<&mut dyn Mapper> {
            self.dogs.iter_mut().map(|d| d as &mut dyn Mapper).collect()
        }
    }

    fn zoo() -> MapperRegistry {
        MapperRegistry::new("zoo")
            .with_type::<Dog>("zoo::Dog")
            .with_type::<Cat>("zoo::Cat")
            .with_type::<Owner>("zoo::Owner")
            .with_type::<Kennel>("zoo::Kennel")
            .with_type::<VipOwner>("custom::VipOwner")
    }

    #[derive(Debug, Default)]
    struct Trace {
        seen: Vec<String>,
    }

    impl Mapper for Trace {
        fn assign_field(&mut self, field: &str, _value: &Value) -> Result<bool> {
            self.seen.push(field.to_string());
            Ok(true)
        }

        fn attach_registry(&mut self, _registry: &MapperRegistry) {}
    }

    #[test]
    fn populate_visits_keys_in_record_order() {
        let registry = MapperRegistry::new("zoo").with_type::<Trace>("zoo::Trace");
        let trace: Trace = registry
            .map(&json!({"zebra": 1, "apple": 2, "mango_tree": 3}), &"Trace".into())
            .unwrap();
        assert_eq!(trace.seen, vec!["zebra", "apple", "mangoTree"]);
    }

    #[test]
    fn key_conversion() {
        assert_eq!(key_to_field_name("first_name"), "firstName");
        assert_eq!(key_to_field_name("name"), "name");
        assert_eq!(key_to_field_name("Name"), "name");
        assert_eq!(key_to_field_name("geo point_id"), "geoPointId");
        assert_eq!(key_to_field_name("firstName"), "firstName");
        assert_eq!(key_to_field_name("__private"), "private");
        assert_eq!(key_to_field_name(""), "");
    }

    #[test]
    fn resolves_through_namespace_convention() {
        let registry = zoo();
        let resolved = registry.resolve(&"Cat".into(), &Value::Null).unwrap();
        assert_eq!(resolved, "zoo::Cat");
    }

    #[test]
    fn resolve_is_idempotent() {
        let registry = zoo();
        let first = registry.resolve(&"Dog".into(), &Value::Null).unwrap();
        let second = registry.resolve(&"Dog".into(), &Value::Null).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn selector_resolves_through_override_map() {
        let registry = MapperRegistry::new("zoo")
            .with_type::<Dog>("Animal\\Dog")
            .with_type_map([("Dog", "Animal\\Dog")]);
        let record = json!({"type": "dog", "name": "Rex"});
        let selector = TypeRef::selector(|data| match data["type"].as_str() {
            Some("dog") => "Dog".to_string(),
            _ => "Cat".to_string(),
        });

        assert_eq!(registry.resolve(&selector, &record).unwrap(), "Animal\\Dog");
        let dog: Dog = registry.map(&record, &selector).unwrap();
        assert_eq!(dog.name, "Rex");
    }

    #[test]
    fn polymorphic_mapping_picks_type_per_record() {
        let registry = zoo();
        let selector = TypeRef::selector(|data| {
            let name = if data["type"] == "cat" { "Cat" } else { "Dog" };
            name.to_string()
        });

        let cat = registry
            .map_dyn(&json!({"type": "cat", "name": "Tom", "lives": 9}), &selector)
            .unwrap();
        let cat = cat.downcast_ref::<Cat>().unwrap();
        assert_eq!((cat.name.as_str(), cat.lives), ("Tom", 9));

        let dog = registry
            .map_dyn(&json!({"type": "dog", "name": "Rex"}), &selector)
            .unwrap();
        assert!(dog.is::<Dog>());
    }

    #[test]
    fn unknown_type_is_unresolved() {
        let err = zoo().resolve(&"Parrot".into(), &Value::Null).unwrap_err();
        assert!(matches!(err, Error::UnresolvedType { ref name } if name == "zoo::Parrot"));
    }

    #[test]
    fn mapping_into_the_wrong_type_is_a_contract_error() {
        let err = zoo()
            .map::<Dog>(&json!({"name": "Tom"}), &"Cat".into())
            .unwrap_err();
        assert!(matches!(err, Error::Contract { ref resolved, .. } if resolved == "zoo::Cat"));
    }

    #[test]
    fn non_object_record_is_a_shape_error() {
        let err = zoo().map::<Dog>(&json!("Rex"), &"Dog".into()).unwrap_err();
        assert!(matches!(err, Error::Shape(_)));
    }

    #[test]
    fn populate_ignores_unknown_keys() {
        let dog: Dog = zoo()
            .map(&json!({"name": "Rex", "good_boy": true, "colour": "brown"}), &"Dog".into())
            .unwrap();
        assert_eq!(dog.name, "Rex");
        assert!(dog.good_boy);
    }

    #[test]
    fn setter_takes_precedence_over_field() {
        let registry = zoo().with_type_map([("VipOwner", "custom::VipOwner")]);
        let owner: VipOwner = registry
            .map(&json!({"name": "alice"}), &"VipOwner".into())
            .unwrap();
        assert_eq!(owner.name, "ALICE");
    }

    #[test]
    fn field_type_mismatch_is_reported() {
        let err = zoo()
            .map::<Cat>(&json!({"lives": "many"}), &"Cat".into())
            .unwrap_err();
        assert!(matches!(err, Error::Field { ref field, .. } if field == "lives"));
    }

    #[test]
    fn nested_mappers_resolve_through_parents_override_map() {
        let registry = zoo().with_type_map([("Owner", "custom::VipOwner")]);
        let data = json!({
            "dogs": [
                {"name": "Rex", "owner": {"name": "alice"}},
                {"name": "Fido", "owner": {"name": "bob"}}
            ]
        });
        let kennel: Kennel = registry.map(&data, &"Kennel".into()).unwrap();

        assert_eq!(kennel.dogs.len(), 2);
        let owners: Vec<&str> = kennel
            .dogs
            .iter()
            .map(|d| d.owner.as_ref().unwrap().downcast_ref::<VipOwner>().unwrap().name.as_str())
            .collect();
        assert_eq!(owners, vec!["ALICE", "BOB"]);
    }

    #[test]
    fn set_registry_propagates_to_registry_aware_fields() {
        let registry = zoo();
        let mut kennel = Kennel {
            dogs: vec![Dog::default(), Dog::default()],
            registry: None,
        };
        kennel.set_registry(&registry);
        assert!(kennel.registry.is_some());
        assert!(kennel.dogs.iter().all(|d| d.registry.is_some()));
    }

    #[test]
    fn serialized_fields_repopulate_an_equivalent_instance() {
        let registry = zoo();
        let rex: Dog = registry
            .map(&json!({"name": "Rex", "good_boy": true}), &"Dog".into())
            .unwrap();
        let fields = serde_json::to_value(&rex).unwrap();
        assert!(fields.get("registry").is_none());

        let restored: Dog = registry.map(&fields, &"Dog".into()).unwrap();
        assert_eq!(serde_json::to_value(&restored).unwrap(), fields);
    }

    #[test]
    fn set_type_map_replaces_previous_overrides() {
        let mut registry = zoo().with_type_map([("Owner", "custom::VipOwner")]);
        registry.set_type_map(Vec::<(String, String)>::new());
        assert_eq!(registry.resolve(&"Owner".into(), &Value::Null).unwrap(), "zoo::Owner");
    }
}
