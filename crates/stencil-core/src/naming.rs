//! References and the lookup protocol
//!
//! A [`Ref`] addresses a value inside nested scopes, e.g. `a.b[c].d`.
//! Anything that can answer "find this ref inside you" implements
//! [`Namable`]; environments and container/struct objects both do.

use std::cmp::Ordering;
use std::fmt;
use std::ops::Add;
use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::object::Object;

fn component_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\.([^\d\W]\w*)|\[([\w\-\./]+)\]").expect("component pattern is valid")
    })
}

/// One step of a reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Component {
    /// Named dereference: `.name`
    Dereference(String),
    /// Bracketed index: `[token]`
    Index(String),
}

impl Component {
    /// The component's raw token
    pub fn value(&self) -> &str {
        match self {
            Component::Dereference(v) | Component::Index(v) => v,
        }
    }

    pub fn is_index(&self) -> bool {
        matches!(self, Component::Index(_))
    }

    pub fn is_dereference(&self) -> bool {
        matches!(self, Component::Dereference(_))
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Dereference(v) => write!(f, ".{}", v),
            Component::Index(v) => write!(f, "[{}]", v),
        }
    }
}

impl Ord for Component {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value()
            .cmp(other.value())
            .then_with(|| self.is_index().cmp(&other.is_index()))
    }
}

impl PartialOrd for Component {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A parsed hierarchical address
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Ref {
    components: Vec<Component>,
}

impl Ref {
    /// Parse an address such as `a.b[c].d`
    ///
    /// A bare leading identifier is read as `.identifier`.
    pub fn parse(address: &str) -> Result<Self> {
        let first = address
            .chars()
            .next()
            .ok_or_else(|| Error::invalid_ref(address))?;

        let normalized = match first {
            '[' | '.' => address.to_string(),
            c if c.is_ascii_alphabetic() || c == '_' => format!(".{}", address),
            _ => return Err(Error::invalid_ref(address)),
        };

        let mut components = Vec::new();
        let mut pos = 0;
        for caps in component_re().captures_iter(&normalized) {
            let whole = caps.get(0).ok_or_else(|| Error::invalid_ref(address))?;
            if whole.start() != pos {
                return Err(Error::invalid_ref(address)
                    .with_cause(format!("Badly formed address at offset {}", pos)));
            }
            pos = whole.end();
            match (caps.get(1), caps.get(2)) {
                (Some(name), _) => components.push(Component::Dereference(name.as_str().into())),
                (None, Some(index)) => components.push(Component::Index(index.as_str().into())),
                (None, None) => return Err(Error::invalid_ref(address)),
            }
        }
        if pos != normalized.len() || components.is_empty() {
            return Err(Error::invalid_ref(address)
                .with_cause(format!("Badly formed address at offset {}", pos)));
        }

        Ok(Self { components })
    }

    /// Build a reference from components
    pub fn from_components(components: Vec<Component>) -> Self {
        Self { components }
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// The first component
    pub fn action(&self) -> Result<&Component> {
        self.components
            .first()
            .ok_or_else(|| Error::invalid_ref("").with_cause("Empty reference has no action"))
    }

    /// Everything after the first component
    pub fn rest(&self) -> Ref {
        Ref {
            components: self.components.iter().skip(1).cloned().collect(),
        }
    }

    pub fn is_index(&self) -> bool {
        self.components.first().is_some_and(Component::is_index)
    }

    pub fn is_dereference(&self) -> bool {
        self.components.first().is_some_and(Component::is_dereference)
    }

    /// Append `other`'s components to this reference
    pub fn concat(&self, other: &Ref) -> Ref {
        let mut components = self.components.clone();
        components.extend(other.components.iter().cloned());
        Ref { components }
    }

    /// The suffix of `full` after `prefix`
    ///
    /// Returns `None` when `prefix` is not a positional prefix of `full`, and
    /// also when the two are equal: an exact match has no remaining scope.
    pub fn subscope(prefix: &Ref, full: &Ref) -> Option<Ref> {
        let n = prefix.components.len();
        if full.components.len() > n && full.components[..n] == prefix.components[..] {
            Some(Ref {
                components: full.components[n..].to_vec(),
            })
        } else {
            None
        }
    }

    /// The suffix of `other` once this reference is removed from its front
    pub fn scoped_to(&self, other: &Ref) -> Option<Ref> {
        Ref::subscope(self, other)
    }

    /// Address string without the leading `.`
    pub fn address(&self) -> String {
        let joined: String = self.components.iter().map(|c| c.to_string()).collect();
        match joined.strip_prefix('.') {
            Some(stripped) => stripped.to_string(),
            None => joined,
        }
    }

    /// The placeholder form, `{{address}}`
    pub fn placeholder(&self) -> String {
        format!("{{{{{}}}}}", self.address())
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address())
    }
}

impl std::str::FromStr for Ref {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ref::parse(s)
    }
}

impl Add for Ref {
    type Output = Ref;

    fn add(mut self, other: Ref) -> Ref {
        self.components.extend(other.components);
        self
    }
}

impl Ord for Ref {
    fn cmp(&self, other: &Self) -> Ordering {
        self.components
            .len()
            .cmp(&other.components.len())
            .then_with(|| self.components.cmp(&other.components))
    }
}

impl PartialOrd for Ref {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Capability of resolving references
pub trait Namable {
    /// Return the value addressed by `reference`
    ///
    /// Fails with `NotFound`, `Naming` or `Unnamable` lookup errors.
    fn find(&self, reference: &Ref) -> Result<Binding>;

    /// Whether `reference` would be reachable, without needing concrete data
    fn provides(&self, reference: &Ref) -> bool;
}

/// The result of a lookup
#[derive(Debug, Clone)]
pub enum Binding {
    /// Plain substitution text
    Text(String),
    /// A typed value, carrying the scopes it was found in
    Object(Object),
}

impl Binding {
    /// Canonical string form used when joining placeholders
    pub fn render(&self) -> Result<String> {
        match self {
            Binding::Text(s) => Ok(s.clone()),
            Binding::Object(o) => o.render(),
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Binding::Object(o) => Some(o),
            Binding::Text(_) => None,
        }
    }
}

/// An entry in an object's scope chain
#[derive(Debug, Clone)]
pub enum Scope {
    Environment(Arc<Environment>),
    Object(Object),
}

impl Namable for Scope {
    fn find(&self, reference: &Ref) -> Result<Binding> {
        match self {
            Scope::Environment(env) => env.find(reference),
            Scope::Object(obj) => obj.find(reference).map(Binding::Object),
        }
    }

    fn provides(&self, reference: &Ref) -> bool {
        match self {
            Scope::Environment(env) => env.provides(reference),
            Scope::Object(obj) => obj.provides(reference),
        }
    }
}

impl From<Environment> for Scope {
    fn from(env: Environment) -> Self {
        Scope::Environment(Arc::new(env))
    }
}

impl From<Arc<Environment>> for Scope {
    fn from(env: Arc<Environment>) -> Self {
        Scope::Environment(env)
    }
}

impl From<Object> for Scope {
    fn from(obj: Object) -> Self {
        Scope::Object(obj)
    }
}

impl<N: Namable + ?Sized> Namable for &N {
    fn find(&self, reference: &Ref) -> Result<Binding> {
        (**self).find(reference)
    }

    fn provides(&self, reference: &Ref) -> bool {
        (**self).provides(reference)
    }
}
