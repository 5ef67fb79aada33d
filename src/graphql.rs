//! Dynamic GraphQL schema generation.
//!
//! This module turns a [`DatabaseSchema`](crate::classes::DatabaseSchema) into
//! an executable GraphQL schema at runtime. Each class contributes a bundle of
//! generated types (object, create/update inputs, filter input, connection and
//! mutation payload) and a CRUD operation set, all wired to a
//! [`StorageBackend`](crate::storage::StorageBackend) through dynamic
//! resolvers.
//!
//! The submodules are layered bottom-up:
//! * [`primitives`] registers the shared scalars, inputs and interfaces every
//!   class relies on,
//! * [`types`] maps class fields to GraphQL types and builds the per-class
//!   bundle,
//! * [`cache`] memoizes bundles and generated schemas,
//! * [`resolvers`] implements field resolution (global ids, pagination,
//!   pointers and relations),
//! * [`operations`] builds the per-class query and mutation fields,
//! * [`schema`] assembles everything into an [`async_graphql::dynamic::Schema`].

pub mod cache;
pub mod operations;
pub mod primitives;
pub mod resolvers;
pub mod schema;
pub mod types;

// Re-export commonly used `async_graphql` types.
pub use async_graphql::{dynamic, Name, Value};
pub use schema::generate_schema;

// Re-export `async_graphql` directly as an escape hatch.
pub extern crate async_graphql;
