//! Memoization of generated types and schemas.
//!
//! Schema compilation walks the class graph recursively, so the same class can
//! be requested many times within one pass (and across passes, while the
//! backend schema is unchanged). [`TypeCache`] guarantees each class gets
//! exactly one [`TypeBundle`], shared by reference. [`SchemaCache`] does the
//! same one level up for fully generated schemas, keyed by a caller-chosen
//! version string, and supports invalidation when the backend schema changes.

use super::operations::Error;
use super::types::TypeBundle;
use async_graphql::dynamic::Schema;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// A memo of the type bundles built so far, one per class.
#[derive(Debug, Default)]
pub struct TypeCache {
    bundles: Mutex<HashMap<String, Arc<TypeBundle>>>,
}

impl TypeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bundle for `class`, building it with `factory` on first request.
    ///
    /// The lock is not held while `factory` runs, so a factory may itself
    /// consult the cache for other classes. If two callers race on the same
    /// class the first inserted bundle wins and both get it.
    pub fn get_or_create(&self, class: &str, factory: impl FnOnce() -> TypeBundle) -> Arc<TypeBundle> {
        if let Some(bundle) = self.lock().get(class) {
            return bundle.clone();
        }
        let bundle = Arc::new(factory());
        self.lock()
            .entry(class.to_owned())
            .or_insert(bundle)
            .clone()
    }

    /// The bundle for `class`, if one has been built.
    pub fn get(&self, class: &str) -> Option<Arc<TypeBundle>> {
        self.lock().get(class).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<TypeBundle>>> {
        self.bundles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A memo of generated schemas, keyed by a schema version string.
#[derive(Debug, Default)]
pub struct SchemaCache {
    schemas: Mutex<HashMap<String, Schema>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The schema for `version`, generating it on first request. Generation
    /// failures are not cached.
    pub fn get_or_generate(
        &self,
        version: &str,
        generate: impl FnOnce() -> Result<Schema, Error>,
    ) -> Result<Schema, Error> {
        if let Some(schema) = self.lock().get(version) {
            return Ok(schema.clone());
        }
        let schema = generate()?;
        Ok(self
            .lock()
            .entry(version.to_owned())
            .or_insert(schema)
            .clone())
    }

    /// Drop the schema for `version`, forcing regeneration on next request.
    pub fn invalidate(&self, version: &str) {
        self.lock().remove(version);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Schema>> {
        self.schemas.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::auth::StatelessAuthenticator;
    use crate::classes::{ClassSchema, DatabaseSchema, FieldKind};
    use crate::graphql::generate_schema;
    use crate::init_logging;
    use crate::storage::memory::MemoryStorage;
    use crate::storage::StorageBackend;

    #[test]
    fn test_bundles_are_built_once_and_shared() {
        init_logging();
        let cache = TypeCache::new();
        let mut calls = 0;

        let first = cache.get_or_create("Post", || {
            calls += 1;
            TypeBundle::new(Arc::new(ClassSchema::new("Post")))
        });
        let second = cache.get_or_create("Post", || {
            calls += 1;
            TypeBundle::new(Arc::new(ClassSchema::new("Post")))
        });

        assert_eq!(calls, 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_distinct_classes_get_distinct_bundles() {
        init_logging();
        let cache = TypeCache::new();
        let post = cache.get_or_create("Post", || {
            TypeBundle::new(Arc::new(ClassSchema::new("Post")))
        });
        let user = cache.get_or_create("_User", || {
            TypeBundle::new(Arc::new(ClassSchema::new("_User")))
        });
        assert!(!Arc::ptr_eq(&post, &user));
        assert_eq!(cache.get("Post").unwrap().object_type, "Post");
        assert_eq!(cache.get("_User").unwrap().object_type, "User");
    }

    #[test]
    fn test_schemas_are_memoized_until_invalidated() {
        init_logging();
        let cache = SchemaCache::new();
        let storage = Arc::new(MemoryStorage::create()) as Arc<dyn StorageBackend>;
        let db = DatabaseSchema::new()
            .with_class(ClassSchema::new("Post").field("title", FieldKind::String));
        let mut generations = 0;
        macro_rules! generate {
            () => {
                || {
                    generations += 1;
                    generate_schema(db.clone(), storage.clone(), Arc::new(StatelessAuthenticator))
                }
            };
        }

        cache.get_or_generate("v1", generate!()).unwrap();
        cache.get_or_generate("v1", generate!()).unwrap();
        assert_eq!(generations, 1);

        cache.invalidate("v1");
        cache.get_or_generate("v1", generate!()).unwrap();
        assert_eq!(generations, 2);
    }
}
