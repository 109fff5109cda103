//! Struct kind
//!
//! Fields are resolved against a scope chain built from the struct itself:
//! `{{self.x}}` and bare `{{x}}` reach sibling fields, the struct's own
//! scopes come next, and `{{super.y}}` reaches those same scopes explicitly.

use indexmap::IndexMap;

use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::input::Input;
use crate::naming::{Binding, Component, Ref, Scope};
use crate::object::{Object, Raw};
use crate::typecheck::TypeCheck;
use crate::types::{StructType, Type};
use crate::value::Value;

type Fields = IndexMap<String, Option<Object>>;

pub(crate) fn construct(ty: &Type, st: &StructType, input: Input) -> Result<Object> {
    let fields = st
        .fields()
        .iter()
        .map(|(name, sig)| (name.clone(), sig.default().cloned()))
        .collect();
    let fields = assign(ty, st, fields, input)?;
    Ok(Object::new(ty.clone(), Raw::Struct(fields)))
}

/// Apply a mapping of field inputs on top of `fields`
fn assign(ty: &Type, st: &StructType, mut fields: Fields, input: Input) -> Result<Fields> {
    let shown = input.to_string();
    let is_mapping = matches!(input, Input::Mapping(_) | Input::Value(Value::Mapping(_)));
    let pairs = is_mapping.then(|| input.into_pairs()).flatten().ok_or_else(|| {
        Error::type_coercion(&shown, ty.name())
            .with_cause(format!("{} expects a mapping of field values", ty.name()))
    })?;

    for (key, value) in pairs {
        let name = match key {
            Input::Value(Value::String(name)) => name,
            other => {
                return Err(Error::invalid_value(format!(
                    "{} field names must be strings, got {}",
                    ty.name(),
                    other
                )))
            }
        };
        let sig = st
            .field(&name)
            .ok_or_else(|| Error::unknown_field(&name, ty.name()))?;
        let field = match value {
            Input::Empty => None,
            value => Some(sig.ty().construct(value).map_err(|e| e.with_path(&name))?),
        };
        fields.insert(name, field);
    }
    Ok(fields)
}

fn fields_of(obj: &Object) -> Result<&Fields> {
    match obj.raw() {
        Raw::Struct(fields) => Ok(fields),
        _ => Err(Error::invalid_value(format!("{} is not a struct", obj.type_name()))),
    }
}

fn struct_type(obj: &Object) -> Result<&StructType> {
    obj.ty()
        .as_struct()
        .ok_or_else(|| Error::invalid_value(format!("{} is not a struct", obj.type_name())))
}

/// The scope chain fields are resolved against
pub(crate) fn scopes(obj: &Object, fields: &Fields) -> Vec<Scope> {
    let mut self_scope = Environment::new();
    for (name, value) in fields {
        if let Some(value) = value {
            self_scope.insert(
                Ref::from_components(vec![Component::Dereference(name.clone())]),
                Binding::Object(value.clone()),
            );
        }
    }

    let mut named_self = Environment::new();
    named_self.absorb(&deref("self"), &self_scope);

    let mut chain = vec![Scope::from(named_self), Scope::from(self_scope)];
    chain.extend(obj.scopes().iter().cloned());
    for scope in obj.scopes() {
        let mut parent = Environment::new();
        match scope {
            Scope::Environment(env) => parent.absorb(&deref("super"), env),
            Scope::Object(o) => parent.insert(deref("super"), Binding::Object(o.clone())),
        }
        chain.push(Scope::from(parent));
    }
    chain
}

fn deref(name: &str) -> Ref {
    Ref::from_components(vec![Component::Dereference(name.to_string())])
}

/// A field value seen through the struct's scope chain
fn scoped(obj: &Object, chain: &[Scope], value: &Object) -> Object {
    value
        .in_scope_all(chain.iter().cloned())
        .provided_all(obj.provided_scopes().iter().cloned())
}

pub(crate) fn interpolate(obj: &Object, fields: &Fields) -> Result<(Object, Vec<Ref>)> {
    let chain = scopes(obj, fields);
    let mut unbound = Vec::new();
    let mut resolved = IndexMap::with_capacity(fields.len());
    for (name, value) in fields {
        let value = match value {
            Some(value) => {
                let (v, refs) = scoped(obj, &chain, value).interpolate()?;
                unbound.extend(refs);
                Some(v)
            }
            None => None,
        };
        resolved.insert(name.clone(), value);
    }
    Ok((Object::new(obj.ty().clone(), Raw::Struct(resolved)), unbound))
}

pub(crate) fn check(obj: &Object, fields: &Fields) -> TypeCheck {
    let Some(st) = obj.ty().as_struct() else {
        return TypeCheck::failure(format!("{} is not a struct", obj.type_name()));
    };
    let chain = scopes(obj, fields);
    for (name, sig) in st.fields() {
        match fields.get(name).and_then(Option::as_ref) {
            None if sig.is_required() => {
                return TypeCheck::failure(format!("{}[{}] is required.", st.name(), name));
            }
            None => {}
            Some(value) => {
                let check = scoped(obj, &chain, value).check();
                if !check.ok() {
                    return TypeCheck::failure(format!(
                        "{}[{}] failed: {}",
                        st.name(),
                        name,
                        check.message()
                    ));
                }
            }
        }
    }
    TypeCheck::success()
}

pub(crate) fn find(obj: &Object, fields: &Fields, reference: &Ref) -> Result<Object> {
    let action = reference.action()?;
    let Component::Dereference(name) = action else {
        return Err(Error::naming(action.to_string(), obj.type_name()));
    };
    let value = fields
        .get(name)
        .and_then(Option::as_ref)
        .ok_or_else(|| Error::not_found(action.to_string(), obj.type_name()))?;
    let found = value.in_scope_all(scopes(obj, fields));
    let rest = reference.rest();
    if rest.is_empty() {
        return Ok(found);
    }
    if !found.is_namable() {
        return Err(Error::unnamable(found.type_name()));
    }
    found.find(&rest)
}

impl Object {
    /// A copy with some fields replaced
    ///
    /// Keys follow construction rules; `Input::Empty` clears a field. The
    /// copy keeps this object's scopes.
    pub fn update(&self, input: impl Into<Input>) -> Result<Object> {
        let st = struct_type(self)?;
        let fields = assign(self.ty(), st, fields_of(self)?.clone(), input.into())?;
        Ok(self.with_raw(Raw::Struct(fields)))
    }

    /// A field's value interpolated against the struct's scopes
    ///
    /// Returns `None` for an empty field.
    pub fn field(&self, name: &str) -> Result<Option<Object>> {
        let fields = fields_of(self)?;
        if struct_type(self)?.field(name).is_none() {
            return Err(Error::unknown_field(name, self.type_name()));
        }
        let Some(value) = fields.get(name).and_then(Option::as_ref) else {
            return Ok(None);
        };
        let chain = scopes(self, fields);
        let (resolved, _) = scoped(self, &chain, value).interpolate()?;
        Ok(Some(resolved))
    }

    /// Whether a field holds a value
    pub fn has(&self, name: &str) -> bool {
        match self.raw() {
            Raw::Struct(fields) => fields.get(name).is_some_and(Option::is_some),
            _ => false,
        }
    }

    /// Serialize the interpolated native value as JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(&self.get()?)
            .map_err(|e| Error::parse(format!("Failed to serialize JSON: {}", e)))
    }

    /// Serialize the interpolated native value as YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(&self.get()?)
            .map_err(|e| Error::parse(format!("Failed to serialize YAML: {}", e)))
    }
}
