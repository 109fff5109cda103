//! Typed objects
//!
//! An [`Object`] is an immutable typed value plus the scopes it resolves
//! placeholders against. Every transformation (binding, scoping,
//! interpolation, update) returns a new object.
//!
//! Scope order matters: the first scope that can find a reference wins.
//! [`Object::bind`] puts scopes in front of the existing ones,
//! [`Object::in_scope`] puts them behind.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use indexmap::IndexMap;

use crate::choice::{self, ChoiceValue};
use crate::composite;
use crate::container;
use crate::error::{Error, Result};
use crate::naming::{Namable, Ref, Scope};
use crate::scalar;
use crate::typecheck::TypeCheck;
use crate::types::Type;
use crate::value::Value;

/// Per-kind payload
#[derive(Debug, Clone)]
pub(crate) enum Raw {
    /// A coerced scalar
    Scalar(Value),
    /// Scalar text still containing placeholders
    Template(String),
    List(Vec<Object>),
    Map(Vec<(Object, Object)>),
    /// Fields in declaration order; `None` marks an empty field
    Struct(IndexMap<String, Option<Object>>),
    Choice(ChoiceValue),
}

/// A typed value with its scope chain
#[derive(Debug, Clone)]
pub struct Object {
    ty: Type,
    raw: Raw,
    scopes: Vec<Scope>,
    provided: Vec<Scope>,
}

impl Object {
    pub(crate) fn new(ty: Type, raw: Raw) -> Self {
        Self {
            ty,
            raw,
            scopes: Vec::new(),
            provided: Vec::new(),
        }
    }

    pub(crate) fn raw(&self) -> &Raw {
        &self.raw
    }

    /// Same value and scopes, different payload
    pub(crate) fn with_raw(&self, raw: Raw) -> Self {
        Self {
            ty: self.ty.clone(),
            raw,
            scopes: self.scopes.clone(),
            provided: self.provided.clone(),
        }
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }

    pub fn type_name(&self) -> String {
        self.ty.name()
    }

    pub fn is_instance_of(&self, ty: &Type) -> bool {
        &self.ty == ty
    }

    /// The scope chain, highest precedence first
    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    /// Bind a scope ahead of the existing ones
    pub fn bind(&self, scope: impl Into<Scope>) -> Self {
        self.bind_all([scope.into()])
    }

    /// Bind several scopes ahead of the existing ones
    ///
    /// Later arguments take precedence over earlier ones.
    pub fn bind_all(&self, scopes: impl IntoIterator<Item = Scope>) -> Self {
        let mut chain: Vec<Scope> = scopes.into_iter().collect();
        chain.reverse();
        chain.extend(self.scopes.iter().cloned());
        Self {
            scopes: chain,
            ..self.clone()
        }
    }

    /// Add a scope behind the existing ones
    pub fn in_scope(&self, scope: impl Into<Scope>) -> Self {
        self.in_scope_all([scope.into()])
    }

    /// Add several scopes behind the existing ones, in order
    pub fn in_scope_all(&self, scopes: impl IntoIterator<Item = Scope>) -> Self {
        let mut obj = self.clone();
        obj.scopes.extend(scopes);
        obj
    }

    /// Declare a scope that will satisfy references at a later stage
    ///
    /// References such a scope provides no longer fail a check, although
    /// they stay unresolved.
    pub fn provided(&self, scope: impl Into<Scope>) -> Self {
        self.provided_all([scope.into()])
    }

    pub fn provided_all(&self, scopes: impl IntoIterator<Item = Scope>) -> Self {
        let mut obj = self.clone();
        obj.provided.extend(scopes);
        obj
    }

    pub(crate) fn provided_scopes(&self) -> &[Scope] {
        &self.provided
    }

    /// A child object seen through this object's scopes and provided scopes
    pub(crate) fn child(&self, obj: &Object) -> Object {
        obj.in_scope_all(self.scopes.iter().cloned())
            .provided_all(self.provided.iter().cloned())
    }

    /// Resolve placeholders against the scope chain
    ///
    /// Returns the interpolated object, which carries no scopes, and the
    /// references that are still unbound. Unbound references are not an
    /// error; a reference that is malformed or a substitution cycle is.
    pub fn interpolate(&self) -> Result<(Object, Vec<Ref>)> {
        let (obj, refs) = match &self.raw {
            Raw::Scalar(_) => (Object::new(self.ty.clone(), self.raw.clone()), Vec::new()),
            Raw::Template(text) => scalar::interpolate(self, text)?,
            Raw::List(elements) => container::interpolate_list(self, elements)?,
            Raw::Map(pairs) => container::interpolate_map(self, pairs)?,
            Raw::Struct(fields) => composite::interpolate(self, fields)?,
            Raw::Choice(value) => choice::interpolate(self, value)?,
        };
        Ok((obj, dedup(refs)))
    }

    /// Check the object against its type
    pub fn check(&self) -> TypeCheck {
        match &self.raw {
            Raw::Scalar(_) | Raw::Template(_) => self.check_resolved(),
            Raw::List(elements) => container::check_list(self, elements),
            Raw::Map(pairs) => container::check_map(self, pairs),
            Raw::Struct(fields) => composite::check(self, fields),
            Raw::Choice(value) => choice::check(self, value),
        }
    }

    fn check_resolved(&self) -> TypeCheck {
        let unbound = match self.interpolate() {
            Ok((_, unbound)) => unbound,
            Err(e) => return TypeCheck::failure(format!("Unable to interpolate: {}", e.summary())),
        };
        let uncovered = unbound
            .iter()
            .any(|r| !self.provided.iter().any(|scope| scope.provides(r)));
        if uncovered {
            let names: Vec<String> = unbound.iter().map(Ref::placeholder).collect();
            return TypeCheck::failure(format!("Uninterpolated variables: {}", names.join(" ")));
        }
        TypeCheck::success()
    }

    /// The fully resolved native value
    pub fn get(&self) -> Result<Value> {
        let (obj, refs) = self.interpolate()?;
        if !refs.is_empty() {
            return Err(Error::unresolved(refs.iter().map(Ref::placeholder).collect()));
        }
        Ok(obj.to_value())
    }

    /// Native view of the payload as it stands, without interpolating
    ///
    /// Unresolved scalars appear as their template text.
    pub fn to_value(&self) -> Value {
        match &self.raw {
            Raw::Scalar(v) => v.clone(),
            Raw::Template(text) => Value::String(text.clone()),
            Raw::List(elements) => Value::Sequence(elements.iter().map(Object::to_value).collect()),
            Raw::Map(pairs) => Value::Mapping(
                pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_value()))
                    .collect(),
            ),
            Raw::Struct(fields) => Value::Mapping(
                fields
                    .iter()
                    .filter_map(|(name, v)| Some((name.clone(), v.as_ref()?.to_value())))
                    .collect(),
            ),
            Raw::Choice(value) => value.to_value(),
        }
    }

    /// Canonical string form after interpolation
    pub fn render(&self) -> Result<String> {
        let (obj, _) = self.interpolate()?;
        Ok(obj.to_string())
    }

    /// Find a reference inside this object
    pub fn find(&self, reference: &Ref) -> Result<Object> {
        match &self.raw {
            Raw::List(elements) => container::find_list(self, elements, reference),
            Raw::Map(pairs) => container::find_map(self, pairs, reference),
            Raw::Struct(fields) => composite::find(self, fields, reference),
            Raw::Choice(value) => choice::find(self, value, reference),
            Raw::Scalar(_) | Raw::Template(_) => Err(Error::unnamable(self.type_name())),
        }
    }

    /// Whether this object's type makes `reference` reachable
    pub fn provides(&self, reference: &Ref) -> bool {
        self.ty.provides(reference)
    }

    /// Whether this object can be dereferenced
    pub fn is_namable(&self) -> bool {
        match &self.raw {
            Raw::List(_) | Raw::Map(_) | Raw::Struct(_) => true,
            Raw::Choice(ChoiceValue::Typed(inner)) => inner.is_namable(),
            Raw::Choice(ChoiceValue::Untyped(_)) => self.ty.is_namable(),
            Raw::Scalar(_) | Raw::Template(_) => false,
        }
    }

    /// Resolved value used for equality and hashing
    fn snapshot(&self) -> Value {
        match self.interpolate() {
            Ok((obj, _)) => obj.to_value(),
            Err(_) => self.to_value(),
        }
    }
}

fn dedup(refs: Vec<Ref>) -> Vec<Ref> {
    let mut seen = Vec::with_capacity(refs.len());
    for r in refs {
        if !seen.contains(&r) {
            seen.push(r);
        }
    }
    seen
}

fn write_joined<T: fmt::Display>(
    f: &mut fmt::Formatter<'_>,
    items: impl IntoIterator<Item = T>,
) -> fmt::Result {
    for (i, item) in items.into_iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

/// Writes the payload as it stands; call on an interpolated object, or use
/// [`Object::render`], for the resolved form.
impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.raw {
            Raw::Scalar(v) => write!(f, "{}", v),
            Raw::Template(text) => write!(f, "{}", text),
            Raw::List(elements) => {
                write!(f, "{}(", self.type_name())?;
                write_joined(f, elements)?;
                write!(f, ")")
            }
            Raw::Map(pairs) => {
                write!(f, "{}(", self.type_name())?;
                write_joined(f, pairs.iter().map(|(k, v)| format!("{} => {}", k, v)))?;
                write!(f, ")")
            }
            Raw::Struct(fields) => {
                write!(f, "{}(", self.type_name())?;
                write_joined(
                    f,
                    fields
                        .iter()
                        .filter_map(|(name, v)| Some(format!("{}={}", name, v.as_ref()?))),
                )?;
                write!(f, ")")
            }
            Raw::Choice(value) => write!(f, "{}", value),
        }
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.ty == other.ty && self.snapshot() == other.snapshot()
    }
}

impl Eq for Object {}

impl Hash for Object {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ty.name().hash(state);
        self.snapshot().hash(state);
    }
}

impl Ord for Object {
    fn cmp(&self, other: &Self) -> Ordering {
        kind_rank(&self.ty)
            .cmp(&kind_rank(&other.ty))
            .then_with(|| self.ty.name().cmp(&other.ty.name()))
            .then_with(|| self.snapshot().cmp(&other.snapshot()))
            .then_with(|| self.ty.descriptor().cmp(&other.ty.descriptor()))
    }
}

impl PartialOrd for Object {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn kind_rank(ty: &Type) -> u8 {
    match ty.tag() {
        "Boolean" => 0,
        "Integer" => 1,
        "Float" => 2,
        "String" => 3,
        "Enum" => 4,
        "List" => 5,
        "Map" => 6,
        "Struct" => 7,
        _ => 8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Environment;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    fn r(address: &str) -> Ref {
        Ref::parse(address).unwrap()
    }

    fn env(yaml: &str) -> Environment {
        Environment::from_value(&Value::from_yaml(yaml).unwrap()).unwrap()
    }

    #[test]
    fn test_bind_precedence() {
        let s = Type::string().construct("{{a}}").unwrap();
        let bound = s.bind(env("a: low")).bind(env("a: high"));
        assert_eq!(bound.render().unwrap(), "high");
        let scoped = s.in_scope(env("a: first")).in_scope(env("a: second"));
        assert_eq!(scoped.render().unwrap(), "first");
        let many = s.bind_all([env("a: one").into(), env("a: two").into()]);
        assert_eq!(many.render().unwrap(), "two");
    }

    #[test]
    fn test_interpolation_is_idempotent() {
        let s = Type::string()
            .construct("{{a}} {{b}} {{a}}")
            .unwrap()
            .bind(env("a: x"));
        let (once, refs) = s.interpolate().unwrap();
        assert_eq!(refs, vec![r("b")]);
        let (twice, refs_again) = once.interpolate().unwrap();
        assert_eq!(once.to_value(), twice.to_value());
        assert_eq!(refs, refs_again);
        assert!(once.scopes().is_empty());
    }

    #[test]
    fn test_resolved_containers_interpolate_to_themselves() {
        let point = Type::structure("Point")
            .field("x", Type::integer())
            .field("y", Type::integer())
            .build();
        let obj = point
            .construct(Value::from_yaml("x: 1\ny: 2").unwrap())
            .unwrap();
        let (out, refs) = obj.interpolate().unwrap();
        assert_eq!(out, obj);
        assert!(refs.is_empty());

        let list = Type::list(Type::string()).construct(vec!["a", "b"]).unwrap();
        let (out, refs) = list.interpolate().unwrap();
        assert_eq!(out, list);
        assert!(refs.is_empty());
        assert_eq!(out.interpolate().unwrap().0, out);
    }

    #[test]
    fn test_unbound_refs_are_deduplicated() {
        let s = Type::string().construct("{{b}}{{a}}{{b}}").unwrap();
        assert_eq!(s.interpolate().unwrap().1, vec![r("b"), r("a")]);
        let check = s.check();
        assert!(!check.ok());
        assert_eq!(check.message(), "Uninterpolated variables: {{b}} {{a}}");
    }

    #[test]
    fn test_get_requires_resolution() {
        let i = Type::integer().construct("{{n}}").unwrap();
        let err = i.get().unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::Unresolved {
                refs: vec!["{{n}}".into()]
            }
        );
        assert_eq!(i.bind(env("n: 4")).get().unwrap(), Value::Integer(4));
    }

    #[test]
    fn test_provided_covers_unbound() {
        let s = Type::string().construct("{{later.x}}").unwrap();
        assert!(!s.check().ok());
        let promise = Type::structure("Later").field("x", Type::string()).build();
        let holder = Type::structure("Holder")
            .field("later", promise)
            .build()
            .construct(Value::from_yaml("{}").unwrap())
            .unwrap();
        assert!(s.provided(holder.clone()).check().ok());
        assert!(!Type::string()
            .construct("{{later.y}}")
            .unwrap()
            .provided(holder)
            .check()
            .ok());
    }

    #[test]
    fn test_equality_uses_resolved_value() {
        let a = Type::integer().construct("{{n}}").unwrap().bind(env("n: 3"));
        let b = Type::integer().construct(3).unwrap();
        assert_eq!(a, b);
        assert_ne!(b, Type::float().construct(3).unwrap());

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_ordering_across_kinds() {
        let mut objs = vec![
            Type::string().construct("b").unwrap(),
            Type::integer().construct(2).unwrap(),
            Type::string().construct("a").unwrap(),
            Type::integer().construct(1).unwrap(),
        ];
        objs.sort();
        let rendered: Vec<String> = objs.iter().map(|o| o.to_string()).collect();
        assert_eq!(rendered, vec!["1", "2", "a", "b"]);
    }

    #[test]
    fn test_scalars_are_not_namable() {
        let i = Type::integer().construct(1).unwrap();
        assert!(!i.is_namable());
        let err = i.find(&r("a")).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Unnamable { .. }));
    }
}
