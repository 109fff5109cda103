//! List and Map kinds
//!
//! Elements are typed objects in their own right. They are stored without
//! the container's scopes and see them only when the container interpolates,
//! checks or hands them out through `find`.

use crate::error::{Error, Result};
use crate::input::Input;
use crate::naming::{Component, Ref};
use crate::object::{Object, Raw};
use crate::typecheck::TypeCheck;
use crate::types::{Type, TypeKind};

pub(crate) fn construct_list(ty: &Type, element: &Type, input: Input) -> Result<Object> {
    let shown = input.to_string();
    let items = input.into_sequence().ok_or_else(|| {
        Error::type_coercion(&shown, ty.name()).with_cause(format!("{} expects a sequence", ty.name()))
    })?;
    let elements = items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            element
                .construct(item)
                .map_err(|e| e.with_path(format!("[{}]", i)))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Object::new(ty.clone(), Raw::List(elements)))
}

pub(crate) fn construct_map(ty: &Type, key: &Type, value: &Type, input: Input) -> Result<Object> {
    let shown = input.to_string();
    let pairs = input.into_pairs().ok_or_else(|| {
        Error::type_coercion(&shown, ty.name())
            .with_cause(format!("{} expects a mapping or a sequence of pairs", ty.name()))
    })?;
    let entries = pairs
        .into_iter()
        .map(|(k, v)| {
            let k = key.construct(k)?;
            let v = value
                .construct(v)
                .map_err(|e| e.with_path(format!("[{}]", k)))?;
            Ok((k, v))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Object::new(ty.clone(), Raw::Map(entries)))
}

pub(crate) fn interpolate_list(obj: &Object, elements: &[Object]) -> Result<(Object, Vec<Ref>)> {
    let mut unbound = Vec::new();
    let mut resolved = Vec::with_capacity(elements.len());
    for element in elements {
        let (e, refs) = obj.child(element).interpolate()?;
        resolved.push(e);
        unbound.extend(refs);
    }
    Ok((Object::new(obj.ty().clone(), Raw::List(resolved)), unbound))
}

pub(crate) fn interpolate_map(obj: &Object, pairs: &[(Object, Object)]) -> Result<(Object, Vec<Ref>)> {
    let mut unbound = Vec::new();
    let mut resolved = Vec::with_capacity(pairs.len());
    for (k, v) in pairs {
        let (k, key_refs) = obj.child(k).interpolate()?;
        let (v, value_refs) = obj.child(v).interpolate()?;
        resolved.push((k, v));
        unbound.extend(key_refs);
        unbound.extend(value_refs);
    }
    Ok((Object::new(obj.ty().clone(), Raw::Map(resolved)), unbound))
}

pub(crate) fn check_list(obj: &Object, elements: &[Object]) -> TypeCheck {
    for element in elements {
        let check = obj.child(element).check();
        if !check.ok() {
            return TypeCheck::failure(format!(
                "Element in {} failed check: {}",
                obj.type_name(),
                check.message()
            ));
        }
    }
    TypeCheck::success()
}

pub(crate) fn check_map(obj: &Object, pairs: &[(Object, Object)]) -> TypeCheck {
    for (k, v) in pairs {
        let key_check = obj.child(k).check();
        if !key_check.ok() {
            return TypeCheck::failure(format!(
                "{} key {} failed check: {}",
                obj.type_name(),
                k,
                key_check.message()
            ));
        }
        let value_check = obj.child(v).check();
        if !value_check.ok() {
            return TypeCheck::failure(format!(
                "{}[{}] value {} failed check: {}",
                obj.type_name(),
                k,
                v,
                value_check.message()
            ));
        }
    }
    TypeCheck::success()
}

/// Descend into `found`, or return it when the reference ends here
fn descend(found: Object, rest: &Ref) -> Result<Object> {
    if rest.is_empty() {
        return Ok(found);
    }
    if !found.is_namable() {
        return Err(Error::unnamable(found.type_name()));
    }
    found.find(rest)
}

pub(crate) fn find_list(obj: &Object, elements: &[Object], reference: &Ref) -> Result<Object> {
    let action = reference.action()?;
    let Component::Index(token) = action else {
        return Err(Error::naming(action.to_string(), obj.type_name()));
    };
    let index: usize = token
        .parse()
        .map_err(|_| Error::naming(action.to_string(), obj.type_name()))?;
    let element = elements
        .get(index)
        .ok_or_else(|| Error::not_found(action.to_string(), obj.type_name()))?;
    descend(
        element.in_scope_all(obj.scopes().iter().cloned()),
        &reference.rest(),
    )
}

pub(crate) fn find_map(obj: &Object, pairs: &[(Object, Object)], reference: &Ref) -> Result<Object> {
    let action = reference.action()?;
    let Component::Index(token) = action else {
        return Err(Error::naming(action.to_string(), obj.type_name()));
    };
    let key_type = match obj.ty().kind() {
        TypeKind::Map { key, .. } => key,
        _ => return Err(Error::unnamable(obj.type_name())),
    };
    let key = key_type
        .construct(token.as_str())
        .map_err(|_| Error::naming(action.to_string(), obj.type_name()))?;
    let value = pairs
        .iter()
        .find_map(|(k, v)| (*k == key).then_some(v))
        .ok_or_else(|| Error::not_found(action.to_string(), obj.type_name()))?;
    descend(
        value.in_scope_all(obj.scopes().iter().cloned()),
        &reference.rest(),
    )
}
