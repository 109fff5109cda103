//! Error types for stencil
//!
//! Errors are structured: a kind describing what went wrong, plus optional
//! path, cause and help context. Check-time problems are not errors; they are
//! reported through [`crate::TypeCheck`].

use std::fmt;

/// Result type alias for stencil operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for stencil operations
#[derive(Debug, Clone)]
pub struct Error {
    /// The kind of error that occurred
    pub kind: ErrorKind,
    /// Reference address or field path where the error occurred
    pub path: Option<String>,
    /// Actionable help message
    pub help: Option<String>,
    /// Underlying cause (as string for Clone compatibility)
    pub cause: Option<String>,
}

/// Categories of errors that can occur
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ErrorKind {
    /// Malformed reference address
    #[error("Invalid reference address: {address:?}")]
    InvalidRef { address: String },
    /// Malformed document or placeholder text
    #[error("Parse error")]
    Parse,
    /// No scope entry reaches the reference
    #[error("Could not find {component} in {container}")]
    NotFound { component: String, container: String },
    /// Reference shape is incompatible with the container being dereferenced
    #[error("Cannot dereference {container} by {component}")]
    Naming { component: String, container: String },
    /// Reached a leaf that cannot be dereferenced further
    #[error("Object is not indexable: {container}")]
    Unnamable { container: String },
    /// A raw value cannot be converted to its declared type
    #[error("Cannot coerce '{value}' to {target}")]
    TypeCoercion { value: String, target: String },
    /// Placeholder substitution did not reach a fixpoint
    #[error("Unable to interpolate")]
    Uninterpolatable,
    /// A native value was requested while placeholders remain
    #[error("Unresolved references: {}", .refs.join(" "))]
    Unresolved { refs: Vec<String> },
    /// A value of the wrong shape was supplied
    #[error("Invalid value")]
    InvalidValue,
    /// A struct was given a field it does not declare
    #[error("{container} has no field {field}")]
    UnknownField { field: String, container: String },
    /// A type check failure converted into an error
    #[error("Validation error")]
    Validation,
    /// No factory is registered under the descriptor tag
    #[error("Unknown type factory: {tag}")]
    UnknownFactory { tag: String },
    /// A factory with the same tag is already registered
    #[error("Type factory '{tag}' is already registered")]
    AlreadyRegistered { tag: String },
    /// A type descriptor is malformed
    #[error("Invalid type descriptor")]
    InvalidDescriptor,
    /// I/O error (file not found, etc.)
    #[error("I/O error")]
    Io,
}

impl Error {
    fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            path: None,
            help: None,
            cause: None,
        }
    }

    /// Create a new parse error
    pub fn parse(message: impl Into<String>) -> Self {
        Self {
            cause: Some(message.into()),
            ..Self::new(ErrorKind::Parse)
        }
    }

    /// Create an invalid reference error
    pub fn invalid_ref(address: impl Into<String>) -> Self {
        Self {
            help: Some(
                "References are dotted identifiers with optional [index] components, e.g. a.b[c].d"
                    .into(),
            ),
            ..Self::new(ErrorKind::InvalidRef {
                address: address.into(),
            })
        }
    }

    /// Create a not found error
    pub fn not_found(component: impl Into<String>, container: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound {
            component: component.into(),
            container: container.into(),
        })
    }

    /// Create a naming error
    pub fn naming(component: impl Into<String>, container: impl Into<String>) -> Self {
        Self::new(ErrorKind::Naming {
            component: component.into(),
            container: container.into(),
        })
    }

    /// Create an unnamable error
    pub fn unnamable(container: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unnamable {
            container: container.into(),
        })
    }

    /// Create a type coercion error
    pub fn type_coercion(value: impl fmt::Display, target: impl Into<String>) -> Self {
        let target = target.into();
        Self {
            help: Some(format!("Ensure the value can be converted to {}", target)),
            ..Self::new(ErrorKind::TypeCoercion {
                value: value.to_string(),
                target,
            })
        }
    }

    /// Create an uninterpolatable error
    pub fn uninterpolatable(message: impl Into<String>) -> Self {
        Self {
            help: Some("Break the substitution cycle by removing one of the references".into()),
            cause: Some(message.into()),
            ..Self::new(ErrorKind::Uninterpolatable)
        }
    }

    /// Create an unresolved references error
    pub fn unresolved(refs: Vec<String>) -> Self {
        Self {
            help: Some("Bind the missing references before requesting a value".into()),
            ..Self::new(ErrorKind::Unresolved { refs })
        }
    }

    /// Create an invalid value error
    pub fn invalid_value(message: impl Into<String>) -> Self {
        Self {
            cause: Some(message.into()),
            ..Self::new(ErrorKind::InvalidValue)
        }
    }

    /// Create an unknown field error
    pub fn unknown_field(field: impl Into<String>, container: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownField {
            field: field.into(),
            container: container.into(),
        })
    }

    /// Create a validation error
    pub fn validation(path: impl Into<String>, message: impl Into<String>) -> Self {
        let p = path.into();
        Self {
            path: if p.is_empty() || p == "<root>" {
                None
            } else {
                Some(p)
            },
            help: Some("Fix the value to match the schema requirements".into()),
            cause: Some(message.into()),
            ..Self::new(ErrorKind::Validation)
        }
    }

    /// Create an unknown factory error
    pub fn unknown_factory(tag: impl Into<String>) -> Self {
        let tag = tag.into();
        Self {
            help: Some(format!("Register a factory for '{}' or check for typos", tag)),
            ..Self::new(ErrorKind::UnknownFactory { tag })
        }
    }

    /// Create a factory already registered error
    pub fn already_registered(tag: impl Into<String>) -> Self {
        let tag = tag.into();
        Self {
            help: Some(format!(
                "Use register_with_force(..., true) to override the '{}' factory",
                tag
            )),
            ..Self::new(ErrorKind::AlreadyRegistered { tag })
        }
    }

    /// Create an invalid descriptor error
    pub fn invalid_descriptor(message: impl Into<String>) -> Self {
        Self {
            cause: Some(message.into()),
            ..Self::new(ErrorKind::InvalidDescriptor)
        }
    }

    /// Create an I/O error
    pub fn io(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            cause: Some(message.into()),
            ..Self::new(ErrorKind::Io)
        }
    }

    /// Add path context to the error
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Add help message to the error
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Add a cause to the error
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// True for the lookup failures a scope chain skips over
    pub fn is_lookup(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::NotFound { .. } | ErrorKind::Naming { .. } | ErrorKind::Unnamable { .. }
        )
    }

    /// Single-line summary: the kind message followed by the cause
    pub fn summary(&self) -> String {
        match &self.cause {
            Some(cause) => format!("{}: {}", self.kind, cause),
            None => self.kind.to_string(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;

        if let Some(path) = &self.path {
            write!(f, "\n  Path: {}", path)?;
        }

        if let Some(cause) = &self.cause {
            write!(f, "\n  {}", cause)?;
        }

        if let Some(help) = &self.help {
            write!(f, "\n  Help: {}", help)?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_ref_display() {
        let err = Error::invalid_ref("hork bork");
        let display = format!("{}", err);
        assert!(display.contains("Invalid reference address"));
        assert!(display.contains("hork bork"));
        assert!(display.contains("Help:"));
    }

    #[test]
    fn test_type_coercion_display() {
        let err = Error::type_coercion("abc", "Integer").with_path("port");
        let display = format!("{}", err);
        assert!(display.contains("Cannot coerce 'abc' to Integer"));
        assert!(display.contains("Path: port"));
        assert!(display.contains("Ensure the value can be converted to Integer"));
    }

    #[test]
    fn test_lookup_kinds() {
        assert!(Error::not_found("a", "Environment").is_lookup());
        assert!(Error::naming("[0]", "Person").is_lookup());
        assert!(Error::unnamable("String").is_lookup());
        assert!(!Error::uninterpolatable("loop").is_lookup());
        assert!(!Error::type_coercion("x", "Integer").is_lookup());
    }

    #[test]
    fn test_unresolved_lists_refs() {
        let err = Error::unresolved(vec!["{{a}}".into(), "{{b.c}}".into()]);
        assert_eq!(err.kind.to_string(), "Unresolved references: {{a}} {{b.c}}");
    }

    #[test]
    fn test_validation_root_path_omitted() {
        let err = Error::validation("<root>", "is not valid");
        assert!(err.path.is_none());
        let err = Error::validation("/1/0", "is not valid");
        assert_eq!(err.path.as_deref(), Some("/1/0"));
    }

    #[test]
    fn test_summary_is_single_line() {
        let err = Error::uninterpolatable("Maximum replacements reached");
        let summary = err.summary();
        assert_eq!(summary, "Unable to interpolate: Maximum replacements reached");
        assert!(!summary.contains('\n'));
    }

    #[test]
    fn test_already_registered_help() {
        let err = Error::already_registered("List");
        let display = format!("{}", err);
        assert!(display.contains("Type factory 'List' is already registered"));
        assert!(display.contains("register_with_force"));
    }
}
