//! Type handles
//!
//! A [`Type`] is a cheap, shareable handle describing one of the builtin
//! kinds. Types are values: two handles are equal when they are the same
//! handle or their descriptors are equal, so a type rebuilt from its
//! descriptor is interchangeable with the original.
//!
//! Struct types are built through a [`StructBuilder`], whose
//! [`handle`](StructBuilder::handle) can be used in field types before the
//! struct is finished. This is how recursive schemas are expressed.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, LazyLock, OnceLock};

use indexmap::IndexMap;

use crate::choice;
use crate::composite;
use crate::container;
use crate::error::Result;
use crate::input::Input;
use crate::naming::{Component, Ref};
use crate::object::Object;
use crate::scalar;
use crate::value::Value;

static NO_FIELDS: LazyLock<IndexMap<String, FieldSignature>> = LazyLock::new(IndexMap::new);

/// A shareable type handle
#[derive(Clone)]
pub struct Type(Arc<TypeKind>);

/// The kind behind a [`Type`]
#[derive(Debug)]
pub enum TypeKind {
    String,
    Integer,
    Float,
    Boolean,
    Enum { name: String, values: Vec<String> },
    List { element: Type },
    Map { key: Type, value: Type },
    Struct(StructType),
    Choice { name: String, alternatives: Vec<Type> },
}

/// A named record type
#[derive(Debug)]
pub struct StructType {
    name: String,
    fields: OnceLock<IndexMap<String, FieldSignature>>,
}

impl StructType {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared fields in declaration order; empty until the builder finishes
    pub fn fields(&self) -> &IndexMap<String, FieldSignature> {
        self.fields.get().unwrap_or(&NO_FIELDS)
    }

    pub fn field(&self, name: &str) -> Option<&FieldSignature> {
        self.fields().get(name)
    }
}

/// The declared shape of one struct field
#[derive(Debug, Clone)]
pub struct FieldSignature {
    ty: Type,
    required: bool,
    default: Option<Object>,
}

impl FieldSignature {
    /// A field that must be present for the struct to check
    pub fn required(ty: Type) -> Self {
        Self {
            ty,
            required: true,
            default: None,
        }
    }

    /// A field that may be left empty
    pub fn optional(ty: Type) -> Self {
        Self {
            ty,
            required: false,
            default: None,
        }
    }

    /// An optional field with a default, coerced to the field type
    pub fn with_default(ty: Type, default: impl Into<Input>) -> Result<Self> {
        let default = ty.construct(default)?;
        Ok(Self {
            ty,
            required: false,
            default: Some(default),
        })
    }

    pub(crate) fn from_parts(ty: Type, required: bool, default: Option<Object>) -> Self {
        Self {
            ty,
            required,
            default,
        }
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn default(&self) -> Option<&Object> {
        self.default.as_ref()
    }

    /// True when the field has no default
    pub fn is_empty(&self) -> bool {
        self.default.is_none()
    }
}

impl From<Type> for FieldSignature {
    fn from(ty: Type) -> Self {
        FieldSignature::optional(ty)
    }
}

/// Incremental construction of a struct type
#[derive(Debug)]
pub struct StructBuilder {
    ty: Type,
    fields: IndexMap<String, FieldSignature>,
}

impl StructBuilder {
    /// The handle of the struct being built, usable in its own field types
    pub fn handle(&self) -> Type {
        self.ty.clone()
    }

    /// Declare a field
    pub fn field(mut self, name: impl Into<String>, signature: impl Into<FieldSignature>) -> Self {
        self.push(name, signature);
        self
    }

    pub(crate) fn push(&mut self, name: impl Into<String>, signature: impl Into<FieldSignature>) {
        self.fields.insert(name.into(), signature.into());
    }

    /// Finish the struct and return its handle
    pub fn build(self) -> Type {
        if let TypeKind::Struct(st) = self.ty.kind() {
            if st.fields.set(self.fields).is_err() {
                log::warn!("struct {} was already built; keeping its first field set", st.name);
            }
        }
        self.ty
    }
}

impl Type {
    fn from_kind(kind: TypeKind) -> Self {
        Type(Arc::new(kind))
    }

    pub fn string() -> Self {
        Self::from_kind(TypeKind::String)
    }

    pub fn integer() -> Self {
        Self::from_kind(TypeKind::Integer)
    }

    pub fn float() -> Self {
        Self::from_kind(TypeKind::Float)
    }

    pub fn boolean() -> Self {
        Self::from_kind(TypeKind::Boolean)
    }

    /// A named enumeration over string members
    pub fn enumeration<S: Into<String>>(
        name: impl Into<String>,
        values: impl IntoIterator<Item = S>,
    ) -> Self {
        Self::from_kind(TypeKind::Enum {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        })
    }

    /// An enumeration named after its members, e.g. `Enum_Red_Blue`
    pub fn enumeration_of<S: Into<String>>(values: impl IntoIterator<Item = S>) -> Self {
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        let name = format!("Enum_{}", values.join("_"));
        Self::enumeration(name, values)
    }

    pub fn list(element: Type) -> Self {
        Self::from_kind(TypeKind::List { element })
    }

    pub fn map(key: Type, value: Type) -> Self {
        Self::from_kind(TypeKind::Map { key, value })
    }

    /// A named union over alternative types, tried in order
    pub fn choice(name: impl Into<String>, alternatives: Vec<Type>) -> Self {
        Self::from_kind(TypeKind::Choice {
            name: name.into(),
            alternatives,
        })
    }

    /// A union named after its alternatives, e.g. `Choice_Integer_String`
    pub fn choice_of(alternatives: Vec<Type>) -> Self {
        let names: Vec<String> = alternatives.iter().map(Type::name).collect();
        Self::choice(format!("Choice_{}", names.join("_")), alternatives)
    }

    /// Start building a struct type
    pub fn structure(name: impl Into<String>) -> StructBuilder {
        StructBuilder {
            ty: Self::from_kind(TypeKind::Struct(StructType {
                name: name.into(),
                fields: OnceLock::new(),
            })),
            fields: IndexMap::new(),
        }
    }

    pub fn kind(&self) -> &TypeKind {
        &self.0
    }

    /// The descriptor tag of this kind
    pub fn tag(&self) -> &'static str {
        match self.kind() {
            TypeKind::String => "String",
            TypeKind::Integer => "Integer",
            TypeKind::Float => "Float",
            TypeKind::Boolean => "Boolean",
            TypeKind::Enum { .. } => "Enum",
            TypeKind::List { .. } => "List",
            TypeKind::Map { .. } => "Map",
            TypeKind::Struct(_) => "Struct",
            TypeKind::Choice { .. } => "Choice",
        }
    }

    /// Display name; containers derive theirs from their parameters
    pub fn name(&self) -> String {
        match self.kind() {
            TypeKind::Enum { name, .. } | TypeKind::Choice { name, .. } => name.clone(),
            TypeKind::Struct(st) => st.name.clone(),
            TypeKind::List { element } => format!("{}List", element.name()),
            TypeKind::Map { key, value } => format!("{}{}Map", key.name(), value.name()),
            _ => self.tag().to_string(),
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(
            self.kind(),
            TypeKind::String
                | TypeKind::Integer
                | TypeKind::Float
                | TypeKind::Boolean
                | TypeKind::Enum { .. }
        )
    }

    /// Whether values of this type can be dereferenced
    pub fn is_namable(&self) -> bool {
        match self.kind() {
            TypeKind::List { .. } | TypeKind::Map { .. } | TypeKind::Struct(_) => true,
            TypeKind::Choice { alternatives, .. } => alternatives.iter().any(Type::is_namable),
            _ => false,
        }
    }

    pub fn as_struct(&self) -> Option<&StructType> {
        match self.kind() {
            TypeKind::Struct(st) => Some(st),
            _ => None,
        }
    }

    /// Declared fields of a struct type; empty for other kinds
    pub fn fields(&self) -> &IndexMap<String, FieldSignature> {
        match self.kind() {
            TypeKind::Struct(st) => st.fields(),
            _ => &NO_FIELDS,
        }
    }

    /// Whether both handles point at the same type definition
    pub fn ptr_eq(&self, other: &Type) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// The serializable descriptor of this type
    ///
    /// A struct reached again while describing itself is emitted in the
    /// short form `["Struct", name]`.
    pub fn descriptor(&self) -> Value {
        self.describe(&mut HashSet::new())
    }

    fn describe(&self, visiting: &mut HashSet<*const TypeKind>) -> Value {
        let tag = Value::from(self.tag());
        match self.kind() {
            TypeKind::String | TypeKind::Integer | TypeKind::Float | TypeKind::Boolean => {
                Value::Sequence(vec![tag])
            }
            TypeKind::Enum { name, values } => Value::Sequence(vec![
                tag,
                Value::from(name.as_str()),
                Value::Sequence(values.iter().map(|v| Value::from(v.as_str())).collect()),
            ]),
            TypeKind::List { element } => Value::Sequence(vec![tag, element.describe(visiting)]),
            TypeKind::Map { key, value } => Value::Sequence(vec![
                tag,
                key.describe(visiting),
                value.describe(visiting),
            ]),
            TypeKind::Choice { name, alternatives } => Value::Sequence(vec![
                tag,
                Value::from(name.as_str()),
                Value::Sequence(alternatives.iter().map(|a| a.describe(visiting)).collect()),
            ]),
            TypeKind::Struct(st) => {
                let id = Arc::as_ptr(&self.0);
                if !visiting.insert(id) {
                    return Value::Sequence(vec![tag, Value::from(st.name.as_str())]);
                }
                let mut names: Vec<&String> = st.fields().keys().collect();
                names.sort();
                let fields = names
                    .into_iter()
                    .filter_map(|name| {
                        let sig = st.fields().get(name)?;
                        let default = sig
                            .default
                            .as_ref()
                            .map(Object::to_value)
                            .unwrap_or_else(|| Value::Sequence(vec![]));
                        Some(Value::Sequence(vec![
                            Value::from(name.as_str()),
                            Value::Sequence(vec![
                                Value::Bool(sig.required),
                                default,
                                Value::Bool(sig.is_empty()),
                                sig.ty.describe(visiting),
                            ]),
                        ]))
                    })
                    .collect();
                visiting.remove(&id);
                Value::Sequence(vec![tag, Value::from(st.name.as_str()), Value::Sequence(fields)])
            }
        }
    }

    /// Whether a reference would be reachable inside values of this type
    ///
    /// Answered from the type alone: indexes into lists and maps are
    /// always provided, struct dereferences only for declared fields.
    pub fn provides(&self, reference: &Ref) -> bool {
        let Ok(action) = reference.action() else {
            return false;
        };
        let rest = reference.rest();
        match (self.kind(), action) {
            (TypeKind::List { element: inner }, Component::Index(_))
            | (TypeKind::Map { value: inner, .. }, Component::Index(_)) => {
                rest.is_empty() || inner.provides(&rest)
            }
            (TypeKind::Struct(st), Component::Dereference(name)) => match st.field(name) {
                Some(sig) => rest.is_empty() || sig.ty.provides(&rest),
                None => false,
            },
            (TypeKind::Choice { alternatives, .. }, _) => {
                alternatives.iter().any(|alt| alt.provides(reference))
            }
            _ => false,
        }
    }

    /// Construct a typed object of this type
    ///
    /// Objects already of this type are returned as they are, scopes
    /// included.
    pub fn construct(&self, input: impl Into<Input>) -> Result<Object> {
        let input = input.into();
        if let Input::Object(obj) = &input {
            if obj.ty() == self {
                return Ok(obj.clone());
            }
        }
        match self.kind() {
            TypeKind::String
            | TypeKind::Integer
            | TypeKind::Float
            | TypeKind::Boolean
            | TypeKind::Enum { .. } => scalar::construct(self, input),
            TypeKind::List { element } => container::construct_list(self, element, input),
            TypeKind::Map { key, value } => container::construct_map(self, key, value, input),
            TypeKind::Struct(st) => composite::construct(self, st, input),
            TypeKind::Choice { alternatives, .. } => choice::construct(self, alternatives, input),
        }
    }

    /// Construct from JSON text
    ///
    /// When `strict` is false, mapping keys a struct does not declare are
    /// dropped instead of failing construction.
    pub fn from_json(&self, text: &str, strict: bool) -> Result<Object> {
        let value = Value::from_json(text)?;
        if strict {
            self.construct(value)
        } else {
            self.construct(self.prune(&value))
        }
    }

    /// Drop undeclared struct keys, recursing through field and element types
    pub fn prune(&self, value: &Value) -> Value {
        match (self.kind(), value) {
            (TypeKind::Struct(st), Value::Mapping(map)) => Value::Mapping(
                map.iter()
                    .filter_map(|(k, v)| {
                        let sig = st.field(k)?;
                        Some((k.clone(), sig.ty.prune(v)))
                    })
                    .collect(),
            ),
            (TypeKind::List { element }, Value::Sequence(items)) => {
                Value::Sequence(items.iter().map(|v| element.prune(v)).collect())
            }
            (TypeKind::Map { value: inner, .. }, Value::Mapping(map)) => Value::Mapping(
                map.iter()
                    .map(|(k, v)| (k.clone(), inner.prune(v)))
                    .collect(),
            ),
            _ => value.clone(),
        }
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.descriptor() == other.descriptor()
    }
}

impl Eq for Type {}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Type({})", self.name())
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn r(address: &str) -> Ref {
        Ref::parse(address).unwrap()
    }

    fn yaml(s: &str) -> Value {
        Value::from_yaml(s).unwrap()
    }

    #[test]
    fn test_container_names() {
        assert_eq!(Type::list(Type::integer()).name(), "IntegerList");
        assert_eq!(Type::map(Type::string(), Type::float()).name(), "StringFloatMap");
        assert_eq!(
            Type::list(Type::map(Type::string(), Type::boolean())).name(),
            "StringBooleanMapList"
        );
        assert_eq!(Type::enumeration_of(["Red", "Blue"]).name(), "Enum_Red_Blue");
        assert_eq!(
            Type::choice_of(vec![Type::integer(), Type::string()]).name(),
            "Choice_Integer_String"
        );
    }

    #[test]
    fn test_scalar_descriptors() {
        assert_eq!(Type::string().descriptor(), yaml("[String]"));
        assert_eq!(
            Type::enumeration("Color", ["Red", "Blue"]).descriptor(),
            yaml("[Enum, Color, [Red, Blue]]")
        );
        assert_eq!(
            Type::map(Type::string(), Type::list(Type::integer())).descriptor(),
            yaml("[Map, [String], [List, [Integer]]]")
        );
    }

    #[test]
    fn test_struct_descriptor_sorted_by_field() {
        let ty = Type::structure("Job")
            .field("name", FieldSignature::required(Type::string()))
            .field(
                "instances",
                FieldSignature::with_default(Type::integer(), 1).unwrap(),
            )
            .build();
        assert_eq!(
            ty.descriptor(),
            yaml(
                "[Struct, Job, [[instances, [false, 1, false, [Integer]]], [name, [true, [], true, [String]]]]]"
            )
        );
    }

    #[test]
    fn test_recursive_struct_short_form() {
        let builder = Type::structure("Node");
        let node = builder.handle();
        let ty = builder
            .field("value", Type::integer())
            .field("children", Type::list(node))
            .build();
        assert_eq!(
            ty.descriptor(),
            yaml(
                "[Struct, Node, [[children, [false, [], true, [List, [Struct, Node]]]], [value, [false, [], true, [Integer]]]]]"
            )
        );
    }

    #[test]
    fn test_equality_by_descriptor() {
        let a = Type::map(Type::string(), Type::integer());
        let b = Type::map(Type::string(), Type::integer());
        assert!(!a.ptr_eq(&b));
        assert_eq!(a, b);
        assert_ne!(a, Type::map(Type::string(), Type::float()));
        assert_ne!(
            Type::enumeration("A", ["x"]),
            Type::enumeration("B", ["x"])
        );
    }

    #[test]
    fn test_type_level_provides() {
        let inner = Type::structure("Inner").field("x", Type::integer()).build();
        let outer = Type::structure("Outer")
            .field("items", Type::list(inner.clone()))
            .field("lookup", Type::map(Type::string(), inner))
            .build();

        assert!(outer.provides(&r("items")));
        assert!(outer.provides(&r("items[0]")));
        assert!(outer.provides(&r("items[3].x")));
        assert!(outer.provides(&r("lookup[anything].x")));
        assert!(!outer.provides(&r("items.x")));
        assert!(!outer.provides(&r("items[0].y")));
        assert!(!outer.provides(&r("missing")));
        assert!(!outer.provides(&r("[0]")));
        assert!(!Type::integer().provides(&r("a")));

        let either = Type::choice_of(vec![Type::integer(), outer]);
        assert!(either.provides(&r("items[1].x")));
    }

    #[test]
    fn test_prune_drops_undeclared_keys() {
        let inner = Type::structure("Inner").field("x", Type::integer()).build();
        let outer = Type::structure("Outer")
            .field("inner", inner.clone())
            .field("many", Type::list(inner))
            .build();
        let pruned = outer.prune(&yaml("inner: {x: 1, y: 2}\nmany: [{x: 3, z: 4}]\nextra: 5\n"));
        assert_eq!(pruned, yaml("inner: {x: 1}\nmany: [{x: 3}]\n"));
    }

    #[test]
    fn test_from_json_strictness() {
        let ty = Type::structure("Point")
            .field("x", Type::integer())
            .field("y", Type::integer())
            .build();
        let text = r#"{"x": 1, "y": 2, "z": 3}"#;
        assert!(ty.from_json(text, true).is_err());
        let point = ty.from_json(text, false).unwrap();
        assert_eq!(point.get().unwrap(), yaml("x: 1\ny: 2\n"));
    }

    #[test]
    fn test_with_default_coerces() {
        let sig = FieldSignature::with_default(Type::integer(), "5").unwrap();
        assert_eq!(sig.default().unwrap().to_value(), Value::Integer(5));
        assert!(FieldSignature::with_default(Type::integer(), "five").is_err());
    }
}
