//! Result of a type check pass

use std::fmt;

use crate::error::{Error, Result};

/// Success, or failure with a message describing the first problem found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeCheck {
    ok: bool,
    message: String,
}

impl TypeCheck {
    pub fn success() -> Self {
        Self {
            ok: true,
            message: String::new(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }

    pub fn ok(&self) -> bool {
        self.ok
    }

    /// Failure message; empty on success
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Convert a failure into a validation error
    pub fn into_result(self) -> Result<()> {
        if self.ok {
            Ok(())
        } else {
            Err(Error::validation("<root>", self.message))
        }
    }
}

impl fmt::Display for TypeCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ok {
            write!(f, "TypeCheck(OK)")
        } else {
            write!(f, "TypeCheck(FAILED): {}", self.message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_display() {
        assert_eq!(TypeCheck::success().to_string(), "TypeCheck(OK)");
        assert_eq!(
            TypeCheck::failure("Person[name] is required.").to_string(),
            "TypeCheck(FAILED): Person[name] is required."
        );
    }

    #[test]
    fn test_into_result() {
        assert!(TypeCheck::success().into_result().is_ok());
        let err = TypeCheck::failure("bad").into_result().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(err.cause.as_deref(), Some("bad"));
    }
}
