//! Common items that you will always want in scope when generating schemas.

pub use crate::auth::{AuthContext, Authenticator, SessionInput, SessionState};
pub use crate::classes::{ClassSchema, DatabaseSchema, FieldKind};
pub use crate::graphql::{
    async_graphql::{self, dynamic::Schema},
    cache::{SchemaCache, TypeCache},
    generate_schema,
    operations::Error,
    schema::execute,
    types::TypeBundle,
};
pub use crate::storage::{StorageBackend, StorageError, StoredObject};
