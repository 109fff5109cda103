//! Environments: flattened reference tables used as scopes
//!
//! Nested mappings are flattened into dotted keys (`{a: {b: 1}}` becomes
//! `a.b -> "1"`), nested environments are absorbed under their key, and
//! typed objects are stored as namable leaves.

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::naming::{Binding, Namable, Ref};
use crate::object::Object;
use crate::value::{format_float, Value};

/// Anything that can be placed into an environment
#[derive(Debug, Clone)]
pub enum Entry {
    /// Plain data: mappings are flattened, scalars become text
    Value(Value),
    /// A typed value
    Object(Object),
    /// Another environment, absorbed under the entry's key
    Environment(Environment),
}

impl From<Value> for Entry {
    fn from(v: Value) -> Self {
        Entry::Value(v)
    }
}

impl From<Object> for Entry {
    fn from(o: Object) -> Self {
        Entry::Object(o)
    }
}

impl From<Environment> for Entry {
    fn from(e: Environment) -> Self {
        Entry::Environment(e)
    }
}

impl From<&str> for Entry {
    fn from(s: &str) -> Self {
        Entry::Value(s.into())
    }
}

impl From<String> for Entry {
    fn from(s: String) -> Self {
        Entry::Value(s.into())
    }
}

impl From<i64> for Entry {
    fn from(i: i64) -> Self {
        Entry::Value(i.into())
    }
}

impl From<i32> for Entry {
    fn from(i: i32) -> Self {
        Entry::Value(i.into())
    }
}

impl From<f64> for Entry {
    fn from(f: f64) -> Self {
        Entry::Value(f.into())
    }
}

impl From<bool> for Entry {
    fn from(b: bool) -> Self {
        Entry::Value(b.into())
    }
}

/// A mount table of references to substitution text or typed values
#[derive(Debug, Clone, Default)]
pub struct Environment {
    table: IndexMap<Ref, Binding>,
}

impl Environment {
    /// Create an empty environment
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an environment from a mapping value
    pub fn from_value(value: &Value) -> Result<Self> {
        let map = value.as_mapping().ok_or_else(|| {
            Error::invalid_value(format!(
                "Environment expects a mapping, got {}",
                value.type_name()
            ))
        })?;
        let mut env = Self::new();
        for (key, val) in map {
            env.assimilate(&Ref::parse(key)?, Entry::Value(val.clone()))?;
        }
        Ok(env)
    }

    /// Build an environment from `(address, entry)` pairs
    ///
    /// Later pairs win when two addresses collide.
    pub fn from_entries<K, E, I>(entries: I) -> Result<Self>
    where
        K: AsRef<str>,
        E: Into<Entry>,
        I: IntoIterator<Item = (K, E)>,
    {
        let mut env = Self::new();
        for (key, entry) in entries {
            env.assimilate(&Ref::parse(key.as_ref())?, entry.into())?;
        }
        Ok(env)
    }

    /// Key-by-key union of several environments; the last writer wins
    pub fn merge<'a>(envs: impl IntoIterator<Item = &'a Environment>) -> Self {
        let mut merged = Self::new();
        for env in envs {
            for (key, val) in &env.table {
                merged.table.insert(key.clone(), val.clone());
            }
        }
        merged
    }

    fn assimilate(&mut self, key: &Ref, entry: Entry) -> Result<()> {
        match entry {
            Entry::Value(Value::Mapping(map)) => {
                for (k, v) in map {
                    self.assimilate(&key.concat(&Ref::parse(&k)?), Entry::Value(v))?;
                }
            }
            Entry::Value(Value::String(s)) => {
                self.table.insert(key.clone(), Binding::Text(s));
            }
            Entry::Value(Value::Integer(i)) => {
                self.table.insert(key.clone(), Binding::Text(i.to_string()));
            }
            Entry::Value(Value::Float(f)) => {
                self.table.insert(key.clone(), Binding::Text(format_float(f)));
            }
            Entry::Value(Value::Bool(b)) => {
                self.table.insert(key.clone(), Binding::Text(b.to_string()));
            }
            Entry::Value(other) => {
                return Err(Error::invalid_value(format!(
                    "Environment values must be strings, numbers, objects or mappings, got {}",
                    other.type_name()
                ))
                .with_path(key.address()));
            }
            Entry::Object(obj) => {
                self.table.insert(key.clone(), Binding::Object(obj));
            }
            Entry::Environment(env) => {
                for (k, v) in env.table {
                    self.table.insert(key.concat(&k), v);
                }
            }
        }
        Ok(())
    }

    /// Bind a pre-parsed key directly
    pub(crate) fn insert(&mut self, key: Ref, binding: Binding) {
        self.table.insert(key, binding);
    }

    /// Absorb every entry of `env` under `prefix`
    pub(crate) fn absorb(&mut self, prefix: &Ref, env: &Environment) {
        for (k, v) in &env.table {
            self.table.insert(prefix.concat(k), v.clone());
        }
    }

    /// Look up an exact key
    pub fn get(&self, key: &Ref) -> Option<&Binding> {
        self.table.get(key)
    }

    /// Iterate over the flattened table
    pub fn iter(&self) -> impl Iterator<Item = (&Ref, &Binding)> {
        self.table.iter()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Keys that are strict prefixes of `reference`, most specific first
    fn candidates(&self, reference: &Ref) -> Vec<(&Ref, &Object, Ref)> {
        let mut targets: Vec<_> = self
            .table
            .iter()
            .filter_map(|(key, val)| {
                let rest = Ref::subscope(key, reference)?;
                let obj = val.as_object()?;
                Some((key, obj, rest))
            })
            .collect();
        targets.sort_by(|a, b| b.0.cmp(a.0));
        targets
    }
}

impl Namable for Environment {
    fn find(&self, reference: &Ref) -> Result<Binding> {
        if let Some(val) = self.table.get(reference) {
            return Ok(val.clone());
        }
        for (key, scope, rest) in self.candidates(reference) {
            match scope.find(&rest) {
                Ok(found) => return Ok(Binding::Object(found)),
                Err(e) if e.is_lookup() => {
                    log::debug!("{} did not resolve under {}: {}", rest, key, e.kind);
                }
                Err(e) => return Err(e),
            }
        }
        Err(Error::not_found(reference.address(), "Environment"))
    }

    fn provides(&self, reference: &Ref) -> bool {
        if self.table.contains_key(reference) {
            return true;
        }
        self.candidates(reference)
            .into_iter()
            .any(|(_, scope, rest)| scope.provides(&rest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::Type;
    use pretty_assertions::assert_eq;

    fn r(address: &str) -> Ref {
        Ref::parse(address).unwrap()
    }

    fn text(env: &Environment, address: &str) -> String {
        env.find(&r(address)).unwrap().render().unwrap()
    }

    fn table(env: &Environment) -> Vec<(String, String)> {
        let mut rows: Vec<_> = env
            .iter()
            .map(|(k, v)| (k.address(), v.render().unwrap()))
            .collect();
        rows.sort();
        rows
    }

    #[test]
    fn test_flattening() {
        let env = Environment::from_value(&Value::from_yaml("a:\n  b: 1\n  c:\n    d: x\n").unwrap())
            .unwrap();
        assert_eq!(text(&env, "a.b"), "1");
        assert_eq!(text(&env, "a.c.d"), "x");
        assert_eq!(env.len(), 2);
    }

    #[test]
    fn test_merge_precedence() {
        let oe1 = Environment::from_value(&Value::from_yaml("a: 1\nb: 2\n").unwrap()).unwrap();
        let oe2 = Environment::from_value(&Value::from_yaml("a: 1\nb:\n  c: 2\n").unwrap()).unwrap();

        let expected = vec![
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "2".to_string()),
            ("b.c".to_string(), "2".to_string()),
        ];
        assert_eq!(table(&Environment::merge([&oe1, &oe2])), expected);
        assert_eq!(table(&Environment::merge([&oe2, &oe1])), expected);
    }

    #[test]
    fn test_last_writer_wins() {
        let env = Environment::from_entries([("a", "first"), ("a", "second")]).unwrap();
        assert_eq!(text(&env, "a"), "second");
    }

    #[test]
    fn test_nested_environment_absorbed() {
        let inner = Environment::from_entries([("b", 2)]).unwrap();
        let env = Environment::from_entries([("a", Entry::from(inner))]).unwrap();
        assert_eq!(text(&env, "a.b"), "2");
        assert!(env.get(&r("a")).is_none());
    }

    #[test]
    fn test_rejects_sequences_and_null() {
        let err = Environment::from_entries([("a", Value::Sequence(vec![]))]).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::InvalidValue));
        let err = Environment::from_entries([("a", Value::Null)]).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::InvalidValue));
        assert!(Environment::from_value(&Value::from("scalar")).is_err());
    }

    #[test]
    fn test_find_not_found() {
        let env = Environment::from_entries([("a", 1)]).unwrap();
        let err = env.find(&r("b")).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::NotFound { .. }));
        // Text leaves are not namable
        assert!(env.find(&r("a.b")).is_err());
    }

    #[test]
    fn test_find_descends_into_objects() {
        let list = Type::list(Type::integer()).construct(vec![1, 2, 3]).unwrap();
        let env = Environment::from_entries([("nums", list)]).unwrap();
        assert_eq!(text(&env, "nums[1]"), "2");
        assert!(env.find(&r("nums[9]")).is_err());
    }

    #[test]
    fn test_most_specific_candidate_first() {
        let shallow = Type::map(Type::string(), Type::string())
            .construct(Value::from_yaml("c: shallow").unwrap())
            .unwrap();
        let deep = Type::map(Type::string(), Type::string())
            .construct(Value::from_yaml("d: deep").unwrap())
            .unwrap();
        let env = Environment::from_entries([("a", shallow), ("a[c]", deep)]).unwrap();
        assert_eq!(text(&env, "a[c][d]"), "deep");
        assert_eq!(text(&env, "a[c]"), "StringStringMap(d => deep)");
    }

    #[test]
    fn test_provides() {
        let list = Type::list(Type::integer()).construct(vec![1]).unwrap();
        let env = Environment::from_value(&Value::from_yaml("a:\n  b: 1\n").unwrap())
            .and_then(|base| {
                let objs = Environment::from_entries([("x", list)])?;
                Ok(Environment::merge([&base, &objs]))
            })
            .unwrap();
        assert!(env.provides(&r("a.b")));
        assert!(!env.provides(&r("a")));
        assert!(!env.provides(&r("a.b.c")));
        assert!(env.provides(&r("x[0]")));
        assert!(env.provides(&r("x[7]")));
        assert!(!env.provides(&r("x.y")));
        assert!(!env.provides(&r("x[0].y")));
    }
}
