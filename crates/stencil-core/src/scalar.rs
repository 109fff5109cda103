//! Scalar kinds: String, Integer, Float, Boolean and Enum
//!
//! Plain values are coerced when the object is constructed. Strings that
//! contain placeholders are kept as templates and coerced once
//! interpolation has resolved every reference.

use crate::error::{Error, Result};
use crate::input::Input;
use crate::interpolation::{contains_placeholder, resolve, split};
use crate::naming::Ref;
use crate::object::{Object, Raw};
use crate::types::{Type, TypeKind};
use crate::value::{format_float, Value};

pub(crate) fn construct(ty: &Type, input: Input) -> Result<Object> {
    match input {
        Input::Value(Value::String(text)) if contains_placeholder(&text) => {
            split(&text, false)?;
            Ok(Object::new(ty.clone(), Raw::Template(text)))
        }
        Input::Value(value) => Ok(Object::new(ty.clone(), Raw::Scalar(coerce(ty, &value)?))),
        other => Err(Error::type_coercion(other, ty.name())),
    }
}

pub(crate) fn interpolate(obj: &Object, text: &str) -> Result<(Object, Vec<Ref>)> {
    let (joined, unbound) = resolve(text, obj.scopes())?;
    let ty = obj.ty().clone();
    if !unbound.is_empty() {
        return Ok((Object::new(ty, Raw::Template(joined)), unbound));
    }
    let value = coerce(&ty, &Value::String(joined))?;
    Ok((Object::new(ty, Raw::Scalar(value)), Vec::new()))
}

/// Convert a plain value to the canonical value of a scalar type
pub(crate) fn coerce(ty: &Type, value: &Value) -> Result<Value> {
    let fail = || Error::type_coercion(value, ty.name());
    let coerced = match (ty.kind(), value) {
        (TypeKind::String, Value::String(s)) => Value::String(s.clone()),
        (TypeKind::String, Value::Integer(i)) => Value::String(i.to_string()),
        (TypeKind::String, Value::Float(f)) => Value::String(format_float(*f)),
        (TypeKind::String, Value::Bool(b)) => Value::String(b.to_string()),

        (TypeKind::Integer, Value::Integer(i)) => Value::Integer(*i),
        (TypeKind::Integer, Value::Float(f))
            if f.fract() == 0.0 && (i64::MIN as f64..i64::MAX as f64).contains(f) =>
        {
            Value::Integer(*f as i64)
        }
        (TypeKind::Integer, Value::String(s)) => {
            Value::Integer(s.trim().parse::<i64>().map_err(|_| fail())?)
        }
        (TypeKind::Integer, Value::Bool(b)) => Value::Integer(i64::from(*b)),

        (TypeKind::Float, Value::Integer(i)) => Value::Float(*i as f64),
        (TypeKind::Float, Value::Float(f)) => Value::Float(*f),
        (TypeKind::Float, Value::String(s)) => {
            Value::Float(s.trim().parse::<f64>().map_err(|_| fail())?)
        }
        (TypeKind::Float, Value::Bool(b)) => Value::Float(if *b { 1.0 } else { 0.0 }),

        (TypeKind::Boolean, Value::Bool(b)) => Value::Bool(*b),
        (TypeKind::Boolean, Value::Integer(i)) => Value::Bool(*i != 0),
        (TypeKind::Boolean, Value::Float(f)) => Value::Bool(*f != 0.0),
        (TypeKind::Boolean, Value::String(s)) => match s.to_ascii_lowercase().as_str() {
            "true" | "1" => Value::Bool(true),
            "false" | "0" => Value::Bool(false),
            _ => return Err(fail()),
        },

        (TypeKind::Enum { values, .. }, Value::String(s)) => {
            if !values.contains(s) {
                return Err(fail().with_cause(format!("{} is not one of {}", s, values.join(", "))));
            }
            Value::String(s.clone())
        }

        _ => return Err(fail()),
    };
    Ok(coerced)
}

#[cfg(test)]
mod tests {
    use crate::environment::Environment;
    use crate::error::ErrorKind;
    use crate::types::Type;
    use crate::value::Value;
    use pretty_assertions::assert_eq;

    fn value(ty: &Type, input: impl Into<crate::Input>) -> Value {
        ty.construct(input).unwrap().get().unwrap()
    }

    fn env(yaml: &str) -> Environment {
        Environment::from_value(&Value::from_yaml(yaml).unwrap()).unwrap()
    }

    #[test]
    fn test_string_coercion() {
        let s = Type::string();
        assert_eq!(value(&s, ""), Value::from(""));
        assert_eq!(value(&s, "a b c"), Value::from("a b c"));
        assert_eq!(value(&s, 23), Value::from("23"));
        assert_eq!(value(&s, 1.0), Value::from("1.0"));
        assert_eq!(value(&s, true), Value::from("true"));
        assert!(s.construct(vec![1]).is_err());
        assert!(s.construct(Value::Null).is_err());
    }

    #[test]
    fn test_integer_coercion() {
        let i = Type::integer();
        assert_eq!(value(&i, 1), Value::Integer(1));
        assert_eq!(value(&i, "23"), Value::Integer(23));
        assert_eq!(value(&i, " -4 "), Value::Integer(-4));
        assert_eq!(value(&i, 2.0), Value::Integer(2));
        assert_eq!(value(&i, true), Value::Integer(1));
        for bad in ["1.5", "abc", ""] {
            let err = i.construct(bad).unwrap_err();
            assert!(matches!(err.kind, ErrorKind::TypeCoercion { .. }), "{}", bad);
        }
        assert!(i.construct(1.5).is_err());
    }

    #[test]
    fn test_integer_rejects_out_of_range_floats() {
        let i = Type::integer();
        assert_eq!(value(&i, -9.0e18), Value::Integer(-9_000_000_000_000_000_000));
        for bad in [1e20, -1e20, 9.3e18, f64::INFINITY, f64::NAN] {
            let err = i.construct(bad).unwrap_err();
            assert!(matches!(err.kind, ErrorKind::TypeCoercion { .. }), "{}", bad);
        }
    }

    #[test]
    fn test_float_coercion() {
        let f = Type::float();
        assert_eq!(value(&f, 1), Value::Float(1.0));
        assert_eq!(value(&f, "1.5"), Value::Float(1.5));
        assert_eq!(value(&f, " 2 "), Value::Float(2.0));
        assert_eq!(f.construct(3).unwrap().to_string(), "3.0");
        assert!(f.construct("one").is_err());
    }

    #[test]
    fn test_boolean_coercion() {
        let b = Type::boolean();
        for truthy in [Value::from("true"), Value::from("TRUE"), Value::from("1"), Value::from(2)] {
            assert_eq!(value(&b, truthy), Value::Bool(true));
        }
        for falsy in [Value::from("false"), Value::from("False"), Value::from("0"), Value::from(0)] {
            assert_eq!(value(&b, falsy), Value::Bool(false));
        }
        assert!(b.construct(" 0").is_err());
        assert!(b.construct("yes").is_err());
        assert_eq!(b.construct(false).unwrap().to_string(), "false");
    }

    #[test]
    fn test_enum_membership() {
        let color = Type::enumeration("Color", ["Red", "Blue"]);
        assert_eq!(value(&color, "Red"), Value::from("Red"));
        let err = color.construct("Green").unwrap_err();
        assert_eq!(err.cause.as_deref(), Some("Green is not one of Red, Blue"));
        assert!(color.construct(1).is_err());
    }

    #[test]
    fn test_template_validated_at_construction() {
        let err = Type::integer().construct("{{4}}").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::InvalidRef { .. }));
        assert!(Type::integer().construct("{{x}}").is_ok());
    }

    #[test]
    fn test_template_coerced_after_resolution() {
        let i = Type::integer()
            .construct("{{a}}{{b}}")
            .unwrap()
            .bind(env("a: 1\nb: 2\n"));
        assert_eq!(i.get().unwrap(), Value::Integer(12));
        assert!(i.check().ok());

        let f = Type::float().construct("{{x}}.5").unwrap().bind(env("x: 3"));
        assert_eq!(f.get().unwrap(), Value::Float(3.5));
    }

    #[test]
    fn test_resolved_text_that_fails_coercion() {
        let i = Type::integer().construct("{{x}}").unwrap().bind(env("x: abc"));
        let err = i.interpolate().unwrap_err();
        assert!(matches!(err.kind, ErrorKind::TypeCoercion { .. }));
        let check = i.check();
        assert!(!check.ok());
        assert!(check.message().starts_with("Unable to interpolate:"));
    }

    #[test]
    fn test_escaped_placeholder_survives_as_text() {
        let s = Type::string().construct("{{&foo}}").unwrap();
        assert_eq!(s.get().unwrap(), Value::from("{{foo}}"));
        let (resolved, refs) = s.interpolate().unwrap();
        assert!(refs.is_empty());
        assert_eq!(resolved.interpolate().unwrap().0.to_value(), Value::from("{{foo}}"));
    }
}
