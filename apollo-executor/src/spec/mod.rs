//! Type system support: type references, the indexed schema and input coercion.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

pub(crate) mod input;
mod schema;
mod type_ref;

pub use schema::Schema;
pub use schema::TypeId;
pub use schema::TypeKind;
pub use type_ref::TypeRef;

pub(crate) const TYPENAME: &str = "__typename";
