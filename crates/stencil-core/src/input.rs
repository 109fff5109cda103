//! Construction payloads
//!
//! An [`Input`] is what a type is constructed from: plain data, already
//! typed objects, or native containers mixing the two.

use std::fmt;

use indexmap::IndexMap;

use crate::object::Object;
use crate::value::Value;

/// Raw material for `Type::construct`
#[derive(Debug, Clone)]
pub enum Input {
    /// An unspecified struct field
    Empty,
    /// Plain data
    Value(Value),
    /// An already typed value
    Object(Object),
    /// A sequence of inputs
    Sequence(Vec<Input>),
    /// Ordered key/value pairs
    Mapping(Vec<(Input, Input)>),
}

impl Input {
    /// Build a mapping input from pairs
    pub fn mapping<K, V, I>(pairs: I) -> Self
    where
        K: Into<Input>,
        V: Into<Input>,
        I: IntoIterator<Item = (K, V)>,
    {
        Input::Mapping(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Plain-data view; objects contribute their raw values
    pub fn to_value(&self) -> Value {
        match self {
            Input::Empty => Value::Null,
            Input::Value(v) => v.clone(),
            Input::Object(o) => o.to_value(),
            Input::Sequence(items) => Value::Sequence(items.iter().map(Input::to_value).collect()),
            Input::Mapping(pairs) => Value::Mapping(
                pairs
                    .iter()
                    .map(|(k, v)| (k.to_value().to_string(), v.to_value()))
                    .collect(),
            ),
        }
    }

    pub(crate) fn into_sequence(self) -> Option<Vec<Input>> {
        match self {
            Input::Sequence(items) => Some(items),
            Input::Value(Value::Sequence(items)) => {
                Some(items.into_iter().map(Input::Value).collect())
            }
            _ => None,
        }
    }

    /// Key/value pairs from a mapping, or from a sequence of two-element sequences
    pub(crate) fn into_pairs(self) -> Option<Vec<(Input, Input)>> {
        match self {
            Input::Mapping(pairs) => Some(pairs),
            Input::Value(Value::Mapping(map)) => Some(
                map.into_iter()
                    .map(|(k, v)| (Input::Value(Value::String(k)), Input::Value(v)))
                    .collect(),
            ),
            other => other
                .into_sequence()?
                .into_iter()
                .map(|item| {
                    let mut pair = item.into_sequence()?;
                    if pair.len() != 2 {
                        return None;
                    }
                    let value = pair.pop()?;
                    let key = pair.pop()?;
                    Some((key, value))
                })
                .collect(),
        }
    }
}

impl fmt::Display for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Input::Empty => write!(f, "Empty"),
            Input::Object(o) => write!(f, "{}", o),
            other => write!(f, "{}", other.to_value()),
        }
    }
}

impl From<Value> for Input {
    fn from(v: Value) -> Self {
        Input::Value(v)
    }
}

impl From<Object> for Input {
    fn from(o: Object) -> Self {
        Input::Object(o)
    }
}

impl From<&str> for Input {
    fn from(s: &str) -> Self {
        Input::Value(s.into())
    }
}

impl From<String> for Input {
    fn from(s: String) -> Self {
        Input::Value(s.into())
    }
}

impl From<i64> for Input {
    fn from(i: i64) -> Self {
        Input::Value(i.into())
    }
}

impl From<i32> for Input {
    fn from(i: i32) -> Self {
        Input::Value(i.into())
    }
}

impl From<f64> for Input {
    fn from(f: f64) -> Self {
        Input::Value(f.into())
    }
}

impl From<bool> for Input {
    fn from(b: bool) -> Self {
        Input::Value(b.into())
    }
}

impl<T: Into<Input>> From<Vec<T>> for Input {
    fn from(items: Vec<T>) -> Self {
        Input::Sequence(items.into_iter().map(Into::into).collect())
    }
}

impl From<IndexMap<String, Value>> for Input {
    fn from(m: IndexMap<String, Value>) -> Self {
        Input::Value(Value::Mapping(m))
    }
}
