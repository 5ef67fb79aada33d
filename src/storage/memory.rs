//! In-memory instantiation of the [storage](super) interface.
//!
//! This backend keeps every class in a plain vector of JSON documents. It is
//! useful for testing the generated schema in isolation from a real backend:
//! it implements the same filter document the resolvers produce (per-field
//! constraints plus `$relatedTo`), mints object ids and session tokens, and
//! maintains the reserved timestamp fields.
#![cfg(any(test, feature = "mocks"))]

use super::{
    CreateReceipt, Document, FindQuery, StorageBackend, StorageError, StoredObject,
};
use crate::auth::AuthContext;
use crate::classes::{
    CREATED_AT_FIELD, OBJECT_ID_FIELD, SESSION_TOKEN_FIELD, UPDATED_AT_FIELD, USER_CLASS,
};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use futures::lock::Mutex;
use itertools::Itertools;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::{json, Value as Json};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

/// Length of generated object ids.
const OBJECT_ID_LEN: usize = 10;

/// The in-memory database: class name to rows, in insertion order.
#[derive(Debug, Default)]
struct Db {
    classes: HashMap<String, Vec<Document>>,
}

impl Db {
    fn rows(&self, class: &str) -> &[Document] {
        self.classes.get(class).map(Vec::as_slice).unwrap_or(&[])
    }

    fn row(&self, class: &str, object_id: &str) -> Option<&Document> {
        self.rows(class)
            .iter()
            .find(|row| row.get(OBJECT_ID_FIELD).and_then(Json::as_str) == Some(object_id))
    }
}

/// A connection to an in-memory database.
///
/// Cloning the handle yields another connection to the same database, so a
/// test can hold one copy and hand another to the schema.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage(Arc<Mutex<Db>>);

impl MemoryStorage {
    /// Create a fresh, empty database and connect to it.
    pub fn create() -> Self {
        Self::default()
    }

    /// The number of stored objects in `class`.
    pub async fn count(&self, class: &str) -> usize {
        self.0.lock().await.rows(class).len()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn get(
        &self,
        _auth: &AuthContext,
        class: &str,
        object_id: &str,
    ) -> Result<StoredObject, StorageError> {
        let db = self.0.lock().await;
        db.row(class, object_id)
            .map(|row| StoredObject::new(class, row.clone()))
            .ok_or_else(|| StorageError::NotFound {
                class: class.to_owned(),
                object_id: object_id.to_owned(),
            })
    }

    async fn find(
        &self,
        _auth: &AuthContext,
        class: &str,
        query: FindQuery,
    ) -> Result<Vec<StoredObject>, StorageError> {
        let db = self.0.lock().await;
        tracing::trace!(class, filter = ?query.filter, "memory find");

        // `$relatedTo` restricts candidates to the members of the parent's
        // relation field before the per-field conditions apply.
        let mut member_ids: Option<Vec<String>> = None;
        if let Some(related) = query.filter.get("$relatedTo") {
            member_ids = Some(related_member_ids(&db, related, query.redirect_key.as_deref())?);
        }

        let rows = db
            .rows(class)
            .iter()
            .filter(|row| {
                if let Some(ids) = &member_ids {
                    let id = row.get(OBJECT_ID_FIELD).and_then(Json::as_str);
                    if !id.is_some_and(|id| ids.iter().any(|m| m == id)) {
                        return false;
                    }
                }
                query
                    .filter
                    .iter()
                    .filter(|(key, _)| *key != "$relatedTo")
                    .all(|(field, cond)| matches_condition(row.get(field), cond))
            })
            .map(|row| StoredObject::new(class, row.clone()))
            .collect_vec();

        Ok(rows)
    }

    async fn create(
        &self,
        _auth: &AuthContext,
        class: &str,
        input: Document,
    ) -> Result<CreateReceipt, StorageError> {
        validate_keys(&input)?;

        let mut db = self.0.lock().await;

        // Principal-class usernames are unique.
        if class == USER_CLASS {
            if let Some(username) = input.get("username") {
                let taken = db
                    .rows(class)
                    .iter()
                    .any(|row| row.get("username") == Some(username));
                if taken {
                    return Err(StorageError::Conflict {
                        message: "username already taken".into(),
                    });
                }
            }
        }

        let object_id = random_token(OBJECT_ID_LEN);
        let created_at = timestamp();
        let session_token = (class == USER_CLASS).then(|| format!("r:{}", random_token(24)));

        let mut row = input;
        row.insert(OBJECT_ID_FIELD.to_owned(), json!(object_id));
        row.insert(CREATED_AT_FIELD.to_owned(), json!(created_at));
        row.insert(UPDATED_AT_FIELD.to_owned(), json!(created_at));
        if let Some(token) = &session_token {
            row.insert(SESSION_TOKEN_FIELD.to_owned(), json!(token));
        }
        db.classes.entry(class.to_owned()).or_default().push(row);

        Ok(CreateReceipt {
            object_id,
            created_at,
            session_token,
        })
    }

    async fn update(
        &self,
        _auth: &AuthContext,
        class: &str,
        object_id: &str,
        patch: Document,
    ) -> Result<(), StorageError> {
        validate_keys(&patch)?;

        let mut db = self.0.lock().await;
        let row = db
            .classes
            .get_mut(class)
            .and_then(|rows| {
                rows.iter_mut().find(|row| {
                    row.get(OBJECT_ID_FIELD).and_then(Json::as_str) == Some(object_id)
                })
            })
            .ok_or_else(|| StorageError::NotFound {
                class: class.to_owned(),
                object_id: object_id.to_owned(),
            })?;

        for (field, value) in patch {
            if value.is_null() {
                row.remove(&field);
            } else {
                row.insert(field, value);
            }
        }
        row.insert(UPDATED_AT_FIELD.to_owned(), json!(timestamp()));
        Ok(())
    }

    async fn delete(
        &self,
        _auth: &AuthContext,
        class: &str,
        object_id: &str,
    ) -> Result<(), StorageError> {
        let mut db = self.0.lock().await;
        let rows = db.classes.get_mut(class);
        let position = rows.as_ref().and_then(|rows| {
            rows.iter()
                .position(|row| row.get(OBJECT_ID_FIELD).and_then(Json::as_str) == Some(object_id))
        });
        match (rows, position) {
            (Some(rows), Some(i)) => {
                rows.remove(i);
                Ok(())
            }
            _ => Err(StorageError::NotFound {
                class: class.to_owned(),
                object_id: object_id.to_owned(),
            }),
        }
    }
}

/// Resolve a `$relatedTo` operator to the member ids of the parent's relation
/// field.
fn related_member_ids(
    db: &Db,
    related: &Json,
    redirect_key: Option<&str>,
) -> Result<Vec<String>, StorageError> {
    let object = related.get("object");
    let parent_class = object
        .and_then(|o| o.get("className"))
        .and_then(Json::as_str)
        .ok_or_else(|| StorageError::internal("$relatedTo without parent class"))?;
    let parent_id = object
        .and_then(|o| o.get("objectId"))
        .and_then(Json::as_str)
        .ok_or_else(|| StorageError::internal("$relatedTo without parent id"))?;
    let key = redirect_key
        .or_else(|| related.get("key").and_then(Json::as_str))
        .ok_or_else(|| StorageError::internal("$relatedTo without key"))?;

    let parent = db
        .row(parent_class, parent_id)
        .ok_or_else(|| StorageError::NotFound {
            class: parent_class.to_owned(),
            object_id: parent_id.to_owned(),
        })?;

    let members = parent
        .get(key)
        .and_then(|value| value.get("objectIds"))
        .and_then(Json::as_array)
        .map(|ids| {
            ids.iter()
                .filter_map(Json::as_str)
                .map(str::to_owned)
                .collect_vec()
        })
        .unwrap_or_default();
    Ok(members)
}

/// Evaluate one filter condition against one field value.
///
/// A condition is either a constraint object (`eq`/`ne`/`lt`/`lte`/`gt`/`gte`/
/// `exists`) or a literal to compare for equality.
fn matches_condition(value: Option<&Json>, cond: &Json) -> bool {
    let constraints = match cond.as_object() {
        Some(map) if is_constraint(map) => map,
        _ => return value == Some(cond),
    };

    constraints.iter().all(|(op, operand)| match op.as_str() {
        "eq" => value == Some(operand),
        "ne" => value != Some(operand),
        "exists" => operand.as_bool() == Some(value.is_some()),
        "lt" => compare(value, operand) == Some(Ordering::Less),
        "lte" => matches!(
            compare(value, operand),
            Some(Ordering::Less | Ordering::Equal)
        ),
        "gt" => compare(value, operand) == Some(Ordering::Greater),
        "gte" => matches!(
            compare(value, operand),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        _ => false,
    })
}

fn is_constraint(map: &Document) -> bool {
    !map.is_empty()
        && map
            .keys()
            .all(|key| matches!(key.as_str(), "eq" | "ne" | "lt" | "lte" | "gt" | "gte" | "exists"))
}

fn compare(value: Option<&Json>, operand: &Json) -> Option<Ordering> {
    match (value?, operand) {
        (Json::Number(a), Json::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Json::String(a), Json::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Field names with operator characters never reach storage.
fn validate_keys(doc: &Document) -> Result<(), StorageError> {
    for key in doc.keys() {
        if key.starts_with('$') || key.contains('.') {
            return Err(StorageError::Validation {
                message: format!("invalid field name {key}"),
            });
        }
    }
    Ok(())
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
