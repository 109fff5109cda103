//! Choice kind: a union over alternative types
//!
//! A typed input whose type is one of the alternatives is kept as it is.
//! Anything else is held untyped until interpolation or checking tries
//! the alternatives in declaration order.

use std::fmt;

use crate::error::{Error, ErrorKind, Result};
use crate::input::Input;
use crate::naming::Ref;
use crate::object::{Object, Raw};
use crate::typecheck::TypeCheck;
use crate::types::{Type, TypeKind};
use crate::value::Value;

/// The payload of a choice object
#[derive(Debug, Clone)]
pub(crate) enum ChoiceValue {
    /// A value already committed to one alternative
    Typed(Box<Object>),
    /// A value no alternative has claimed yet
    Untyped(Box<Input>),
}

impl ChoiceValue {
    pub(crate) fn to_value(&self) -> Value {
        match self {
            ChoiceValue::Typed(inner) => inner.to_value(),
            ChoiceValue::Untyped(input) => input.to_value(),
        }
    }
}

impl fmt::Display for ChoiceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChoiceValue::Typed(inner) => write!(f, "{}", inner),
            ChoiceValue::Untyped(input) => write!(f, "{}", input),
        }
    }
}

fn alternatives(ty: &Type) -> &[Type] {
    match ty.kind() {
        TypeKind::Choice { alternatives, .. } => alternatives,
        _ => &[],
    }
}

pub(crate) fn construct(ty: &Type, alternatives: &[Type], input: Input) -> Result<Object> {
    let value = match input {
        Input::Object(obj) => {
            if !alternatives.iter().any(|alt| obj.is_instance_of(alt)) {
                return Err(Error::type_coercion(&obj, ty.name()).with_cause(format!(
                    "{} is not one of the alternatives of {}",
                    obj.type_name(),
                    ty.name()
                )));
            }
            ChoiceValue::Typed(Box::new(obj))
        }
        other => ChoiceValue::Untyped(Box::new(other)),
    };
    Ok(Object::new(ty.clone(), Raw::Choice(value)))
}

pub(crate) fn interpolate(obj: &Object, value: &ChoiceValue) -> Result<(Object, Vec<Ref>)> {
    let input = match value {
        ChoiceValue::Typed(inner) => {
            let (resolved, refs) = obj.child(inner).interpolate()?;
            let wrapped = Object::new(
                obj.ty().clone(),
                Raw::Choice(ChoiceValue::Typed(Box::new(resolved))),
            );
            return Ok((wrapped, refs));
        }
        ChoiceValue::Untyped(input) => input,
    };

    for alt in alternatives(obj.ty()) {
        let candidate = match alt.construct((**input).clone()) {
            Ok(candidate) => candidate,
            Err(e) => {
                log::trace!("{} rejected by {}: {}", input, alt, e.kind);
                continue;
            }
        };
        match obj.child(&candidate).interpolate() {
            Ok((resolved, refs)) => {
                let value = match resolved.raw() {
                    Raw::Template(text) if !refs.is_empty() => {
                        ChoiceValue::Untyped(Box::new(Input::from(text.as_str())))
                    }
                    _ => ChoiceValue::Typed(Box::new(resolved)),
                };
                return Ok((Object::new(obj.ty().clone(), Raw::Choice(value)), refs));
            }
            Err(e) if matches!(e.kind, ErrorKind::TypeCoercion { .. }) => {
                log::trace!("{} did not interpolate as {}: {}", input, alt, e.kind);
            }
            Err(e) => return Err(e),
        }
    }
    Err(Error::type_coercion(input, obj.type_name()).with_cause(format!(
        "No alternative of {} accepts the value",
        obj.type_name()
    )))
}

pub(crate) fn check(obj: &Object, value: &ChoiceValue) -> TypeCheck {
    let input = match value {
        ChoiceValue::Typed(inner) => return obj.child(inner).check(),
        ChoiceValue::Untyped(input) => input,
    };
    for alt in alternatives(obj.ty()) {
        let Ok(candidate) = alt.construct((**input).clone()) else {
            continue;
        };
        let check = obj.child(&candidate).check();
        if check.ok() {
            return check;
        }
        log::trace!("{} failed {}: {}", input, alt, check.message());
    }
    TypeCheck::failure(format!(
        "{} typecheck failed: value {} did not match any of its alternatives",
        obj.type_name(),
        input
    ))
}

pub(crate) fn find(obj: &Object, value: &ChoiceValue, reference: &Ref) -> Result<Object> {
    let input = match value {
        ChoiceValue::Typed(inner) => {
            return inner.in_scope_all(obj.scopes().iter().cloned()).find(reference);
        }
        ChoiceValue::Untyped(input) => input,
    };
    for alt in alternatives(obj.ty()).iter().filter(|alt| alt.is_namable()) {
        let Ok(candidate) = alt.construct((**input).clone()) else {
            continue;
        };
        match candidate.in_scope_all(obj.scopes().iter().cloned()).find(reference) {
            Ok(found) => return Ok(found),
            Err(e) if e.is_lookup() => continue,
            Err(e) => return Err(e),
        }
    }
    Err(Error::not_found(reference.address(), obj.type_name()))
}

impl Object {
    /// The interpolated value behind a choice, as its alternative's type
    ///
    /// Other objects are returned unchanged.
    pub fn unwrap(&self) -> Result<Object> {
        let Raw::Choice(_) = self.raw() else {
            return Ok(self.clone());
        };
        let (resolved, _) = self.interpolate()?;
        match resolved.raw() {
            Raw::Choice(ChoiceValue::Typed(inner)) => Ok((**inner).clone()),
            Raw::Choice(ChoiceValue::Untyped(input)) => alternatives(self.ty())
                .iter()
                .find_map(|alt| alt.construct((**input).clone()).ok())
                .ok_or_else(|| Error::type_coercion(input, self.type_name())),
            _ => Ok(resolved),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::environment::Environment;
    use crate::error::ErrorKind;
    use crate::naming::Ref;
    use crate::types::{FieldSignature, Type};
    use crate::value::Value;
    use pretty_assertions::assert_eq;

    fn yaml(s: &str) -> Value {
        Value::from_yaml(s).unwrap()
    }

    fn env(s: &str) -> Environment {
        Environment::from_value(&yaml(s)).unwrap()
    }

    fn int_float() -> Type {
        Type::choice("IntFloat", vec![Type::integer(), Type::float()])
    }

    #[test]
    fn test_first_matching_alternative_wins() {
        let ty = int_float();
        let obj = ty.construct("123").unwrap();
        assert!(obj.check().ok());
        assert_eq!(obj.unwrap().unwrap(), Type::integer().construct(123).unwrap());

        let obj = ty.construct(1.5).unwrap();
        assert_eq!(obj.unwrap().unwrap(), Type::float().construct(1.5).unwrap());
        assert_eq!(obj.get().unwrap(), Value::Float(1.5));
    }

    #[test]
    fn test_no_alternative_matches() {
        let obj = int_float().construct("123.abc").unwrap();
        let check = obj.check();
        assert!(!check.ok());
        assert_eq!(
            check.message(),
            "IntFloat typecheck failed: value 123.abc did not match any of its alternatives"
        );
        let err = obj.interpolate().unwrap_err();
        assert!(matches!(err.kind, ErrorKind::TypeCoercion { .. }));
    }

    #[test]
    fn test_typed_input_must_be_an_alternative() {
        let ty = int_float();
        let i = Type::integer().construct(3).unwrap();
        assert_eq!(ty.construct(i.clone()).unwrap().unwrap().unwrap(), i);
        assert!(ty.construct(Type::string().construct("x").unwrap()).is_err());
    }

    #[test]
    fn test_enum_before_string() {
        let ty = Type::choice_of(vec![
            Type::enumeration("Letter", ["A", "B"]),
            Type::string(),
        ]);
        assert_eq!(ty.name(), "Choice_Letter_String");
        assert_eq!(ty.construct("A").unwrap().unwrap().unwrap().type_name(), "Letter");
        assert_eq!(ty.construct("Q").unwrap().unwrap().unwrap().type_name(), "String");
    }

    #[test]
    fn test_container_alternative() {
        let ty = Type::choice_of(vec![Type::string(), Type::list(Type::integer())]);
        let obj = ty.construct(vec![Value::from(1), Value::from(2)]).unwrap();
        assert_eq!(obj.unwrap().unwrap().type_name(), "IntegerList");

        let partial = ty
            .construct(vec![Value::from(1), Value::from("{{x}}")])
            .unwrap();
        assert!(!partial.check().ok());
        let bound = partial.bind(env("x: 3"));
        assert!(bound.check().ok());
        assert_eq!(bound.get().unwrap(), yaml("[1, 3]"));
        assert_eq!(bound.find(&Ref::parse("[1]").unwrap()).unwrap().render().unwrap(), "3");
    }

    #[test]
    fn test_unresolved_template_stays_untyped() {
        let shape = Type::structure("Shape").field("a", int_float()).build();
        let obj = shape.construct(yaml("a: '1{{q}}2'")).unwrap();
        let (resolved, refs) = obj.interpolate().unwrap();
        assert_eq!(refs, vec![Ref::parse("q").unwrap()]);
        assert_eq!(resolved.get().unwrap_err().kind, ErrorKind::Unresolved {
            refs: vec!["{{q}}".into()]
        });

        let int = obj.bind(env("q: 34"));
        assert_eq!(
            int.field("a").unwrap().unwrap().unwrap().unwrap(),
            Type::integer().construct(1342).unwrap()
        );
        let float = obj.bind(env("q: '3.4'"));
        assert_eq!(
            float.field("a").unwrap().unwrap().unwrap().unwrap(),
            Type::float().construct(13.42).unwrap()
        );
        assert!(!obj.bind(env("q: abc")).check().ok());
    }

    #[test]
    fn test_struct_alternatives() {
        let foo = Type::structure("Foo").field("foo", Type::string()).build();
        let bar = Type::structure("Bar").field("bar", Type::string()).build();
        let ty = Type::choice_of(vec![foo, bar]);
        assert_eq!(ty.construct(yaml("foo: a")).unwrap().unwrap().unwrap().type_name(), "Foo");
        assert_eq!(ty.construct(yaml("bar: b")).unwrap().unwrap().unwrap().type_name(), "Bar");
        assert!(!ty.construct(yaml("baz: c")).unwrap().check().ok());
    }

    #[test]
    fn test_choice_default_in_struct() {
        let dumb = Type::structure("Dumb").field("x", Type::string()).build();
        let either = Type::choice_of(vec![dumb, Type::integer()]);
        let holder = Type::structure("Holder")
            .field("value", FieldSignature::with_default(either, 28).unwrap())
            .build();
        let obj = holder.construct(yaml("{}")).unwrap();
        assert!(obj.check().ok());
        assert_eq!(obj.get().unwrap(), yaml("value: 28"));
    }

    #[test]
    fn test_render_is_inner_render() {
        let obj = int_float().construct("{{n}}").unwrap().bind(env("n: 7"));
        assert_eq!(obj.render().unwrap(), "7");
    }
}
