//! The backend data model consumed by the GraphQL layer.
//!
//! A [`DatabaseSchema`] maps class names to [`ClassSchema`]s, each of which maps
//! field names to [`FieldKind`]s. The schema is provided whole by an external
//! loader before any type generation happens and is treated as immutable for the
//! duration of a compilation pass; a schema reload produces a fresh
//! [`DatabaseSchema`] (and therefore a fresh type cache).
//!
//! Referential integrity (a `Pointer` or `Relation` target existing in the
//! schema) is the loader's responsibility; the GraphQL layer degrades gracefully
//! when it is violated, but does not validate it.

use async_graphql::dynamic::indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

/// The field name under which every object exposes its global, reversible id.
pub const GLOBAL_ID_FIELD: &str = "id";
/// The field name of the storage backend's local object id.
pub const OBJECT_ID_FIELD: &str = "objectId";
/// Reserved creation timestamp field present on every stored object.
pub const CREATED_AT_FIELD: &str = "createdAt";
/// Reserved update timestamp field present on every stored object.
pub const UPDATED_AT_FIELD: &str = "updatedAt";
/// Session token field, exposed only on the principal class's object type.
pub const SESSION_TOKEN_FIELD: &str = "sessionToken";
/// Client-supplied correlation token, echoed back unchanged by mutations.
pub const CLIENT_MUTATION_ID_FIELD: &str = "clientMutationId";

/// The principal class. Creating an object of this class may mint a session.
pub const USER_CLASS: &str = "_User";

/// Class names starting with this character are system classes; the prefix is
/// stripped when deriving type names.
const RESERVED_PREFIX: char = '_';

/// The kind of a single class field.
///
/// This is a closed set: every consumer matches exhaustively, so adding a kind
/// is a compile-time-visible change everywhere it matters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    Date,
    File,
    Object,
    Array,
    GeoPoint,
    /// A reference to exactly one object of another class.
    #[serde(rename_all = "camelCase")]
    Pointer { target_class: String },
    /// A many-to-many link, queried as a filtered list rather than stored inline.
    #[serde(rename_all = "camelCase")]
    Relation { target_class: String },
}

impl FieldKind {
    /// The class a `Pointer` or `Relation` field refers to.
    pub fn target_class(&self) -> Option<&str> {
        match self {
            Self::Pointer { target_class } | Self::Relation { target_class } => {
                Some(target_class)
            }
            _ => None,
        }
    }

    pub fn is_relation(&self) -> bool {
        matches!(self, Self::Relation { .. })
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Self::Pointer { .. })
    }
}

impl Display for FieldKind {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::String => write!(f, "String"),
            Self::Number => write!(f, "Number"),
            Self::Boolean => write!(f, "Boolean"),
            Self::Date => write!(f, "Date"),
            Self::File => write!(f, "File"),
            Self::Object => write!(f, "Object"),
            Self::Array => write!(f, "Array"),
            Self::GeoPoint => write!(f, "GeoPoint"),
            Self::Pointer { target_class } => write!(f, "Pointer[{target_class}]"),
            Self::Relation { target_class } => write!(f, "Relation[{target_class}]"),
        }
    }
}

/// The declared shape of one backend entity type.
///
/// Field order is irrelevant for correctness but preserved, so generated types
/// list their fields deterministically.
#[derive(Clone, Debug, Default)]
pub struct ClassSchema {
    name: String,
    fields: IndexMap<String, FieldKind>,
}

impl ClassSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: IndexMap::new(),
        }
    }

    /// Add a field, builder style.
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.insert(name.into(), kind);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The external name of this class: the reserved prefix, if any, is
    /// stripped. Every generated type name derives from this, so two classes
    /// must never collapse to the same display name.
    pub fn display_name(&self) -> &str {
        display_name(&self.name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldKind)> {
        self.fields.iter().map(|(name, kind)| (name.as_str(), kind))
    }

    pub fn get(&self, field: &str) -> Option<&FieldKind> {
        self.fields.get(field)
    }
}

/// Strip a single leading reserved-prefix character from a class name.
pub fn display_name(class_name: &str) -> &str {
    class_name
        .strip_prefix(RESERVED_PREFIX)
        .unwrap_or(class_name)
}

/// All classes known to the backend, in declaration order.
#[derive(Clone, Debug, Default)]
pub struct DatabaseSchema {
    classes: IndexMap<String, Arc<ClassSchema>>,
}

impl DatabaseSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a class, builder style.
    pub fn with_class(mut self, class: ClassSchema) -> Self {
        self.insert(class);
        self
    }

    pub fn insert(&mut self, class: ClassSchema) {
        self.classes.insert(class.name.clone(), Arc::new(class));
    }

    pub fn class(&self, name: &str) -> Option<&Arc<ClassSchema>> {
        self.classes.get(name)
    }

    pub fn classes(&self) -> impl Iterator<Item = &Arc<ClassSchema>> {
        self.classes.values()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }
}
