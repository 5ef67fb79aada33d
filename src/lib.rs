//! Class GraphQL generates a GraphQL API from a class-based backend schema at
//! runtime. It consists of three sections:
//!
//! * A schema model ([classes]) describing the backend's entity types: each
//!   class has a name and a set of typed fields, including references to other
//!   classes (pointers and relations).
//! * A generation engine ([graphql]) that compiles the schema model into an
//!   executable GraphQL schema. Every class gets a bundle of derived types
//!   (object, inputs, filter, connection, mutation payload) and a set of CRUD
//!   root operations, all built dynamically so the engine is completely
//!   agnostic to the specifics of the application's data model.
//! * A [storage] seam the generated resolvers call through. The engine ships
//!   with an in-memory backend, useful for lightweight testing; implement the
//!   [`StorageBackend`](storage::StorageBackend) trait to target your own
//!   store.
//!
//! Requests are authenticated through the [auth] module, which derives a
//! per-request context from client credentials and threads it into every
//! storage call.

use std::sync::Once;
use tracing_subscriber::EnvFilter;

pub mod auth;
pub mod classes;
pub mod graphql;
pub mod prelude;
pub mod storage;

/// Initialize tracing.
pub fn init_logging() {
    static ONCE: Once = Once::new();

    ONCE.call_once(|| {
        color_eyre::install().unwrap();
        tracing_subscriber::fmt()
            .with_ansi(true)
            .with_env_filter(EnvFilter::from_default_env())
            .init();
    });
}
