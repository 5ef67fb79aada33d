//! Interfaces provided by the storage backend consumed by the GraphQL layer.
//!
//! The entrypoint is [`StorageBackend`], the seam between generated resolvers
//! and whatever actually persists objects. The GraphQL layer interacts with
//! storage exclusively through this trait, which makes it possible to swap a
//! production REST or database client for the [in-memory](memory) double in
//! tests without touching any resolver code.

use crate::auth::AuthContext;
use async_trait::async_trait;
use serde_json::{Map, Value as Json};
use snafu::Snafu;

pub mod memory;

/// A stored object's field values, keyed by field name.
pub type Document = Map<String, Json>;

/// One object snapshot as returned by the storage backend.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredObject {
    /// The backend class this object belongs to.
    pub class_name: String,
    /// Field values, including the reserved id and timestamp fields.
    pub data: Document,
}

impl StoredObject {
    pub fn new(class_name: impl Into<String>, data: Document) -> Self {
        Self {
            class_name: class_name.into(),
            data,
        }
    }

    /// The backend-local id of this object.
    pub fn object_id(&self) -> Option<&str> {
        self.data
            .get(crate::classes::OBJECT_ID_FIELD)
            .and_then(Json::as_str)
    }

    pub fn get(&self, field: &str) -> Option<&Json> {
        self.data.get(field)
    }
}

/// A specification of a page to load from a result set.
///
/// `first`/`after` and `last`/`before` are the forward and backward pairs;
/// supplying both pairs at once is not meaningful and the window simply applies
/// the cursors first, then `first`, then `last`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PageRequest {
    /// Limit the results to the first N items.
    pub first: Option<usize>,
    /// Start the page after the item indicated by this cursor.
    pub after: Option<String>,
    /// Limit the results to the last N items.
    pub last: Option<usize>,
    /// End the page before the item indicated by this cursor.
    pub before: Option<String>,
}

/// A filtered query against one class.
#[derive(Clone, Debug, Default)]
pub struct FindQuery {
    /// Filter document: field name to condition, plus operator entries such as
    /// `$relatedTo`.
    pub filter: Document,
    /// When set, `$relatedTo` entries in the filter are evaluated under the
    /// related parent's class for this key, not the queried class.
    pub redirect_key: Option<String>,
}

impl FindQuery {
    pub fn filtered(filter: Document) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }
}

/// The outcome of a successful create.
#[derive(Clone, Debug)]
pub struct CreateReceipt {
    /// The backend-local id assigned to the new object.
    pub object_id: String,
    /// Creation timestamp, RFC 3339.
    pub created_at: String,
    /// A freshly minted session token, if the backend issued one (principal
    /// class signups).
    pub session_token: Option<String>,
}

/// Errors surfaced by a storage backend.
#[derive(Debug, Snafu)]
pub enum StorageError {
    #[snafu(display("no {class} found with id {object_id}"))]
    NotFound { class: String, object_id: String },

    #[snafu(display("validation failed: {message}"))]
    Validation { message: String },

    #[snafu(display("conflict: {message}"))]
    Conflict { message: String },

    #[snafu(display("storage error: {message}"))]
    Internal { message: String },
}

impl StorageError {
    pub fn internal(message: impl std::fmt::Display) -> Self {
        Self::Internal {
            message: message.to_string(),
        }
    }
}

/// A source of objects which can be served and mutated by the GraphQL API.
///
/// Every method takes the request's [`AuthContext`]; backends are expected to
/// enforce their own access rules with it. All methods are suspension points
/// for the enclosing resolver.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Fetch one object by its local id.
    async fn get(
        &self,
        auth: &AuthContext,
        class: &str,
        object_id: &str,
    ) -> Result<StoredObject, StorageError>;

    /// Fetch all objects of `class` matching `query`, in stable storage order.
    async fn find(
        &self,
        auth: &AuthContext,
        class: &str,
        query: FindQuery,
    ) -> Result<Vec<StoredObject>, StorageError>;

    /// Persist a new object and return its identity.
    async fn create(
        &self,
        auth: &AuthContext,
        class: &str,
        input: Document,
    ) -> Result<CreateReceipt, StorageError>;

    /// Apply a partial update to an existing object.
    async fn update(
        &self,
        auth: &AuthContext,
        class: &str,
        object_id: &str,
        patch: Document,
    ) -> Result<(), StorageError>;

    /// Delete an object by its local id.
    async fn delete(
        &self,
        auth: &AuthContext,
        class: &str,
        object_id: &str,
    ) -> Result<(), StorageError>;
}
