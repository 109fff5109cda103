//! Type factories and descriptor reification
//!
//! A descriptor is a sequence whose first element is a factory tag, e.g.
//! `["List", ["Integer"]]`. The [`TypeRegistry`] maps tags to factories and
//! rebuilds types from descriptors. Reification within one [`TypeDict`] is
//! memoized, so a descriptor seen twice yields the same handle.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, OnceLock, RwLock};

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::schema::Schema;
use crate::types::{FieldSignature, Type};
use crate::value::Value;

/// Named types produced by a load, keyed by type name
pub type Namespace = IndexMap<String, Type>;

// Global factory registry for extension types
static GLOBAL_REGISTRY: OnceLock<RwLock<TypeRegistry>> = OnceLock::new();

/// Get the global factory registry.
///
/// This registry is lazily initialized with the builtin factories.
/// Extension code can register additional factories here.
pub fn global_registry() -> &'static RwLock<TypeRegistry> {
    GLOBAL_REGISTRY.get_or_init(|| RwLock::new(TypeRegistry::with_builtins()))
}

/// Register a factory in the global registry.
///
/// # Arguments
/// * `factory` - The factory to register
/// * `force` - If true, overwrite any existing factory with the same tag.
///   If false, return an error if the tag is already registered.
pub fn register_global(factory: Arc<dyn TypeFactory>, force: bool) -> Result<()> {
    let mut registry = global_registry()
        .write()
        .expect("Global registry lock poisoned");
    registry.register_with_force(factory, force)
}

/// Reify a descriptor with the global registry
pub fn reify(descriptor: &Value) -> Result<Type> {
    let registry = global_registry()
        .read()
        .expect("Global registry lock poisoned");
    registry.reify(descriptor)
}

/// Reify a descriptor with the global registry and return every type it names
pub fn load(descriptor: &Value) -> Result<Namespace> {
    let registry = global_registry()
        .read()
        .expect("Global registry lock poisoned");
    registry.load(descriptor)
}

/// Validate a JSON descriptor and load it with the global registry
pub fn load_json(json: &str) -> Result<Namespace> {
    let descriptor = Value::from_json(json)?;
    Schema::descriptor().validate(&descriptor)?;
    load(&descriptor)
}

/// Validate a descriptor file (JSON or YAML by extension) and load it
pub fn load_file(path: impl AsRef<Path>) -> Result<Namespace> {
    let descriptor = read_descriptor(path)?;
    load(&descriptor)
}

/// Read and validate a descriptor file without reifying it
pub fn read_descriptor(path: impl AsRef<Path>) -> Result<Value> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::io(path.display().to_string(), e.to_string()))?;
    let descriptor = match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => Value::from_yaml(&content),
        _ => Value::from_json(&content),
    }
    .map_err(|e| e.with_path(path.display().to_string()))?;
    Schema::descriptor().validate(&descriptor)?;
    Ok(descriptor)
}

/// Trait for type factory implementations
pub trait TypeFactory: Send + Sync {
    /// The descriptor tag this factory provides
    fn tag(&self) -> &str;

    /// Build a type from the descriptor parameters that follow the tag
    ///
    /// Nested descriptors are reified through `dict` so they share its memo.
    fn create(&self, dict: &mut TypeDict<'_>, params: &[Value]) -> Result<Type>;
}

/// A simple function-based factory
pub struct FnFactory<F>
where
    F: Fn(&mut TypeDict<'_>, &[Value]) -> Result<Type> + Send + Sync,
{
    tag: String,
    func: F,
}

impl<F> FnFactory<F>
where
    F: Fn(&mut TypeDict<'_>, &[Value]) -> Result<Type> + Send + Sync,
{
    /// Create a new function-based factory
    pub fn new(tag: impl Into<String>, func: F) -> Self {
        Self {
            tag: tag.into(),
            func,
        }
    }
}

impl<F> TypeFactory for FnFactory<F>
where
    F: Fn(&mut TypeDict<'_>, &[Value]) -> Result<Type> + Send + Sync,
{
    fn tag(&self) -> &str {
        &self.tag
    }

    fn create(&self, dict: &mut TypeDict<'_>, params: &[Value]) -> Result<Type> {
        (self.func)(dict, params)
    }
}

/// Memo of the types built during one reification
pub struct TypeDict<'r> {
    registry: &'r TypeRegistry,
    memo: HashMap<Value, Type>,
    structs: HashMap<String, Type>,
    named: Namespace,
}

impl<'r> TypeDict<'r> {
    pub fn new(registry: &'r TypeRegistry) -> Self {
        Self {
            registry,
            memo: HashMap::new(),
            structs: HashMap::new(),
            named: IndexMap::new(),
        }
    }

    /// Build the type a descriptor describes, reusing earlier results
    pub fn reify(&mut self, descriptor: &Value) -> Result<Type> {
        if let Some(ty) = self.memo.get(descriptor) {
            log::debug!("reusing memoized type {}", ty);
            return Ok(ty.clone());
        }

        let parts = descriptor.as_sequence().ok_or_else(|| {
            Error::invalid_descriptor(format!("expected a sequence, got {}", descriptor))
        })?;
        let (tag, params) = match parts.split_first() {
            Some((Value::String(tag), params)) => (tag.as_str(), params),
            _ => {
                return Err(Error::invalid_descriptor(format!(
                    "descriptor must start with a factory tag: {}",
                    descriptor
                )))
            }
        };

        if let ("Struct", [Value::String(name)]) = (tag, params) {
            return self.structure(name).ok_or_else(|| {
                Error::invalid_descriptor(format!(
                    "Struct {} is referenced before it is defined",
                    name
                ))
            });
        }

        let registry = self.registry;
        let factory = registry
            .get(tag)
            .ok_or_else(|| Error::unknown_factory(tag))?;
        let ty = factory.create(self, params)?;
        log::debug!("reified {} from {} descriptor", ty, tag);

        self.memo.insert(descriptor.clone(), ty.clone());
        self.named.insert(ty.name(), ty.clone());
        Ok(ty)
    }

    /// A struct declared earlier in this reification
    pub fn structure(&self, name: &str) -> Option<Type> {
        self.structs.get(name).cloned()
    }

    /// Make a struct handle resolvable by name before its fields are built
    pub fn declare_struct(&mut self, name: impl Into<String>, handle: Type) {
        self.structs.insert(name.into(), handle);
    }

    /// Every type built so far, keyed by name
    pub fn into_namespace(self) -> Namespace {
        self.named
    }
}

/// Registry of available type factories
#[derive(Clone)]
pub struct TypeRegistry {
    factories: HashMap<String, Arc<dyn TypeFactory>>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Create a registry with the builtin factories
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_builtin_factories();
        registry
    }

    fn register_builtin_factories(&mut self) {
        self.register_fn("String", |_, params| scalar_factory("String", params, Type::string));
        self.register_fn("Integer", |_, params| scalar_factory("Integer", params, Type::integer));
        self.register_fn("Float", |_, params| scalar_factory("Float", params, Type::float));
        self.register_fn("Boolean", |_, params| scalar_factory("Boolean", params, Type::boolean));
        self.register_fn("Enum", enum_factory);
        self.register_fn("List", list_factory);
        self.register_fn("Map", map_factory);
        self.register_fn("Struct", struct_factory);
        self.register_fn("Choice", choice_factory);
    }

    /// Register a factory, replacing any factory with the same tag
    pub fn register(&mut self, factory: Arc<dyn TypeFactory>) {
        self.factories.insert(factory.tag().to_string(), factory);
    }

    /// Register a factory with optional force overwrite.
    ///
    /// # Returns
    /// * `Ok(())` on success
    /// * `Err(Error)` if force=false and a factory with the same tag exists
    pub fn register_with_force(&mut self, factory: Arc<dyn TypeFactory>, force: bool) -> Result<()> {
        let tag = factory.tag().to_string();
        if self.factories.contains_key(&tag) {
            if !force {
                return Err(Error::already_registered(&tag));
            }
            log::warn!("replacing type factory '{}'", tag);
        }
        self.factories.insert(tag, factory);
        Ok(())
    }

    /// Register a function as a factory
    pub fn register_fn<F>(&mut self, tag: impl Into<String>, func: F)
    where
        F: Fn(&mut TypeDict<'_>, &[Value]) -> Result<Type> + Send + Sync + 'static,
    {
        self.register(Arc::new(FnFactory::new(tag, func)));
    }

    /// Get a factory by tag
    pub fn get(&self, tag: &str) -> Option<&Arc<dyn TypeFactory>> {
        self.factories.get(tag)
    }

    /// Check if a factory is registered
    pub fn contains(&self, tag: &str) -> bool {
        self.factories.contains_key(tag)
    }

    /// Build the type a descriptor describes
    pub fn reify(&self, descriptor: &Value) -> Result<Type> {
        TypeDict::new(self).reify(descriptor)
    }

    /// Reify a descriptor and return every type it names
    pub fn load(&self, descriptor: &Value) -> Result<Namespace> {
        let mut dict = TypeDict::new(self);
        dict.reify(descriptor)?;
        Ok(dict.into_namespace())
    }
}

fn expect_params<'v, const N: usize>(tag: &str, params: &'v [Value]) -> Result<&'v [Value; N]> {
    params.try_into().map_err(|_| {
        Error::invalid_descriptor(format!(
            "{} takes {} parameter(s), got {}",
            tag,
            N,
            params.len()
        ))
    })
}

fn expect_str<'v>(tag: &str, value: &'v Value) -> Result<&'v str> {
    value
        .as_str()
        .ok_or_else(|| Error::invalid_descriptor(format!("{} expects a name, got {}", tag, value)))
}

fn expect_seq<'v>(tag: &str, value: &'v Value) -> Result<&'v [Value]> {
    value.as_sequence().ok_or_else(|| {
        Error::invalid_descriptor(format!("{} expects a sequence, got {}", tag, value))
    })
}

fn scalar_factory(tag: &str, params: &[Value], build: fn() -> Type) -> Result<Type> {
    expect_params::<0>(tag, params)?;
    Ok(build())
}

fn enum_factory(_: &mut TypeDict<'_>, params: &[Value]) -> Result<Type> {
    let [name, values] = expect_params::<2>("Enum", params)?;
    let values = expect_seq("Enum", values)?
        .iter()
        .map(|v| expect_str("Enum", v).map(str::to_string))
        .collect::<Result<Vec<_>>>()?;
    Ok(Type::enumeration(expect_str("Enum", name)?, values))
}

fn list_factory(dict: &mut TypeDict<'_>, params: &[Value]) -> Result<Type> {
    let [element] = expect_params::<1>("List", params)?;
    Ok(Type::list(dict.reify(element)?))
}

fn map_factory(dict: &mut TypeDict<'_>, params: &[Value]) -> Result<Type> {
    let [key, value] = expect_params::<2>("Map", params)?;
    Ok(Type::map(dict.reify(key)?, dict.reify(value)?))
}

fn struct_factory(dict: &mut TypeDict<'_>, params: &[Value]) -> Result<Type> {
    let [name, fields] = expect_params::<2>("Struct", params)?;
    let name = expect_str("Struct", name)?;
    let mut builder = Type::structure(name);
    dict.declare_struct(name, builder.handle());

    for field in expect_seq("Struct", fields)? {
        let [attr, signature] = expect_params::<2>("Struct field", expect_seq("Struct", field)?)?;
        let attr = expect_str("Struct field", attr)?;
        let [required, default, empty, ty] =
            expect_params::<4>("Struct field signature", expect_seq("Struct", signature)?)?;
        let (Some(required), Some(empty)) = (required.as_bool(), empty.as_bool()) else {
            return Err(Error::invalid_descriptor(format!(
                "field {} of {} needs boolean required/empty flags",
                attr, name
            )));
        };
        let ty = dict.reify(ty)?;
        let default = if empty {
            None
        } else {
            Some(ty.construct(default.clone()).map_err(|e| e.with_path(attr))?)
        };
        builder.push(attr, FieldSignature::from_parts(ty, required, default));
    }
    Ok(builder.build())
}

fn choice_factory(dict: &mut TypeDict<'_>, params: &[Value]) -> Result<Type> {
    let [name, alternatives] = expect_params::<2>("Choice", params)?;
    let alternatives = expect_seq("Choice", alternatives)?
        .iter()
        .map(|alt| dict.reify(alt))
        .collect::<Result<Vec<_>>>()?;
    Ok(Type::choice(expect_str("Choice", name)?, alternatives))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;

    fn yaml(s: &str) -> Value {
        Value::from_yaml(s).unwrap()
    }

    fn job() -> Type {
        Type::structure("Job")
            .field("name", FieldSignature::required(Type::string()))
            .field("instances", FieldSignature::with_default(Type::integer(), 1).unwrap())
            .field("ports", Type::map(Type::string(), Type::integer()))
            .field("role", Type::enumeration_of(["web", "batch"]))
            .field(
                "size",
                Type::choice_of(vec![Type::integer(), Type::list(Type::integer())]),
            )
            .build()
    }

    #[test]
    fn test_round_trip() {
        let registry = TypeRegistry::with_builtins();
        for ty in [
            Type::string(),
            Type::list(Type::float()),
            Type::map(Type::string(), Type::integer()),
            Type::enumeration("Color", ["Red"]),
            job(),
        ] {
            let rebuilt = registry.reify(&ty.descriptor()).unwrap();
            assert_eq!(rebuilt.descriptor(), ty.descriptor());
            assert_eq!(rebuilt, ty);
        }
    }

    #[test]
    fn test_reified_type_accepts_original_objects() {
        let registry = TypeRegistry::with_builtins();
        let ty = Type::map(Type::string(), Type::integer());
        let obj = ty.construct(yaml("a: 1")).unwrap();
        let first = registry.reify(&ty.descriptor()).unwrap();
        let second = registry.reify(&ty.descriptor()).unwrap();
        assert_eq!(first.descriptor(), second.descriptor());
        assert_eq!(second.construct(obj.clone()).unwrap(), obj);
    }

    #[test]
    fn test_memoized_within_one_dict() {
        let registry = TypeRegistry::with_builtins();
        let mut dict = TypeDict::new(&registry);
        let a = dict.reify(&yaml("[List, [Integer]]")).unwrap();
        let b = dict.reify(&yaml("[List, [Integer]]")).unwrap();
        assert!(a.ptr_eq(&b));
    }

    #[test]
    fn test_load_returns_named_types() {
        let registry = TypeRegistry::with_builtins();
        let namespace = registry.load(&job().descriptor()).unwrap();
        for name in ["Job", "String", "Integer", "StringIntegerMap", "Enum_web_batch"] {
            assert!(namespace.contains_key(name), "missing {}", name);
        }
        let job = &namespace["Job"];
        let obj = job.construct(yaml("name: x\nsize: [1, 2]")).unwrap();
        assert!(obj.check().ok());
        assert_eq!(obj.field("instances").unwrap().unwrap().to_value(), Value::Integer(1));
    }

    #[test]
    fn test_recursive_struct_round_trip() {
        let builder = Type::structure("Node");
        let node = builder.handle();
        let tree = builder
            .field("value", Type::integer())
            .field("children", Type::list(node))
            .build();
        let registry = TypeRegistry::with_builtins();
        let rebuilt = registry.reify(&tree.descriptor()).unwrap();
        assert_eq!(rebuilt.descriptor(), tree.descriptor());

        let obj = rebuilt
            .construct(yaml("value: 1\nchildren: [{value: 2, children: [{value: 3}]}]"))
            .unwrap();
        assert!(obj.check().ok());
    }

    #[test]
    fn test_short_form_before_definition() {
        let registry = TypeRegistry::with_builtins();
        let err = registry.reify(&yaml("[List, [Struct, Ghost]]")).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::InvalidDescriptor));
    }

    #[test]
    fn test_bad_descriptors() {
        let registry = TypeRegistry::with_builtins();
        let err = registry.reify(&yaml("[Tuple, [Integer]]")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnknownFactory { tag: "Tuple".into() });
        assert!(registry.reify(&yaml("[List]")).is_err());
        assert!(registry.reify(&yaml("[Integer, extra]")).is_err());
        assert!(registry.reify(&yaml("Integer")).is_err());
        assert!(registry.reify(&yaml("[Enum, E, [1]]")).is_err());
        let err = registry
            .reify(&yaml("[Struct, S, [[n, [false, abc, false, [Integer]]]]]"))
            .unwrap_err();
        assert_eq!(err.path.as_deref(), Some("n"));
    }

    #[test]
    fn test_register_with_force() {
        let mut registry = TypeRegistry::with_builtins();
        let percent = || {
            Arc::new(FnFactory::new("Percent", |_: &mut TypeDict<'_>, _: &[Value]| {
                Ok(Type::float())
            }))
        };
        registry.register_with_force(percent(), false).unwrap();
        assert!(registry.contains("Percent"));
        let err = registry.register_with_force(percent(), false).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::AlreadyRegistered { .. }));
        registry.register_with_force(percent(), true).unwrap();
        assert_eq!(registry.reify(&yaml("[Percent]")).unwrap(), Type::float());
    }

    #[test]
    fn test_global_load_json() {
        let json = serde_json::to_string(&job().descriptor()).unwrap();
        let namespace = load_json(&json).unwrap();
        assert_eq!(namespace["Job"], job());

        let err = load_json(r#"["List"]"#).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Validation));
    }

    #[test]
    fn test_load_file() {
        let path = std::env::temp_dir().join("stencil_registry_load_file.json");
        std::fs::write(&path, serde_json::to_string(&job().descriptor()).unwrap()).unwrap();
        let namespace = load_file(&path).unwrap();
        assert!(namespace.contains_key("Job"));
        std::fs::remove_file(&path).ok();

        let err = load_file(std::env::temp_dir().join("stencil_missing.json")).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Io));
    }
}
