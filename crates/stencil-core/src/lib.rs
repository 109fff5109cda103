//! stencil-core: Typed template interpolation and schemas
//!
//! Values are constructed against a [`Type`] and may contain `{{ref}}`
//! placeholders. Binding scopes (environments or other typed values) and
//! interpolating resolves the placeholders, after which the value is coerced
//! and can be type checked.
//!
//! # Example
//!
//! ```rust
//! use stencil_core::{Environment, FieldSignature, Type, Value};
//!
//! let job = Type::structure("Job")
//!     .field("name", FieldSignature::required(Type::string()))
//!     .field("port", Type::integer())
//!     .build();
//!
//! let values = Value::from_yaml("name: web\nport: '{{base}}0'").unwrap();
//! let obj = job.construct(values).unwrap();
//! assert!(!obj.check().ok());
//!
//! let env = Environment::from_entries([("base", 808)]).unwrap();
//! let bound = obj.bind(env);
//! assert!(bound.check().ok());
//! assert_eq!(
//!     bound.get().unwrap(),
//!     Value::from_yaml("name: web\nport: 8080").unwrap()
//! );
//! ```

pub mod environment;
pub mod error;
pub mod interpolation;
pub mod naming;
pub mod registry;
pub mod schema;
pub mod typecheck;
pub mod types;
pub mod value;

mod choice;
mod composite;
mod container;
mod input;
mod object;
mod scalar;

pub use environment::{Entry, Environment};
pub use error::{Error, ErrorKind, Result};
pub use input::Input;
pub use naming::{Binding, Component, Namable, Ref, Scope};
pub use object::Object;
pub use registry::{Namespace, TypeDict, TypeFactory, TypeRegistry};
pub use schema::Schema;
pub use typecheck::TypeCheck;
pub use types::{FieldSignature, StructBuilder, Type};
pub use value::Value;
