//! Field resolution for generated class types.
//!
//! The builders in [`types`](super::types) and [`operations`](super::operations)
//! attach resolvers produced here to the fields they generate. Resolution is
//! value-based: a resolved class object is a [`StoredObject`] passed down the
//! tree as an owned `FieldValue`, and connection, edge and payload fields
//! downcast their parent back to the corresponding value struct.
//!
//! Also home to the identifier codecs (global ids, offset cursors), the
//! pagination window, and the normalization of input and filter documents into
//! the form the storage backend consumes.

use super::primitives::{GeoPointValue, PageInfoValue};
use crate::auth::SessionState;
use crate::classes::{ClassSchema, DatabaseSchema, FieldKind};
use crate::storage::{Document, FindQuery, PageRequest, StorageBackend, StorageError, StoredObject};
use async_graphql::dynamic::{FieldFuture, FieldValue, ResolverContext};
use async_graphql::{Error as GraphQLError, Name, Result as GraphQLResult, Value};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value as Json};
use std::sync::Arc;

/// The hard cap on page sizes, applied regardless of what the client asks for.
pub const MAX_PAGE_SIZE: usize = 100;

/// Encode a class-qualified object id as an opaque global id.
pub fn encode_global_id(class: &str, object_id: &str) -> String {
    BASE64.encode(format!("{class}:{object_id}"))
}

/// Decode a global id back into its class and object id, or `None` if the
/// string is not a well-formed global id.
pub fn parse_global_id(id: &str) -> Option<(String, String)> {
    let decoded = String::from_utf8(BASE64.decode(id).ok()?).ok()?;
    let (class, object_id) = decoded.split_once(':')?;
    (!class.is_empty() && !object_id.is_empty())
        .then(|| (class.to_owned(), object_id.to_owned()))
}

fn encode_cursor(offset: usize) -> String {
    BASE64.encode(format!("offset:{offset}"))
}

fn decode_cursor(cursor: &str) -> Option<usize> {
    String::from_utf8(BASE64.decode(cursor).ok()?)
        .ok()?
        .strip_prefix("offset:")?
        .parse()
        .ok()
}

/// One edge of a paginated result.
#[derive(Clone, Debug)]
pub struct EdgeValue {
    pub cursor: String,
    pub node: StoredObject,
}

/// A page of results, the parent value of a generated connection type.
#[derive(Clone, Debug)]
pub struct ConnectionValue {
    pub edges: Vec<EdgeValue>,
    pub page_info: PageInfoValue,
    pub count: usize,
}

/// The parent value of a generated mutation payload type.
#[derive(Clone, Debug)]
pub struct PayloadValue {
    pub object: Option<StoredObject>,
    pub client_mutation_id: Option<String>,
}

/// Cut a page out of `objects` per the requested window.
///
/// Cursors are applied first, then the forward limit, then the backward limit,
/// with both limits clamped to [`MAX_PAGE_SIZE`]. When no limit is requested
/// the page is still capped at the maximum.
pub fn paginate(objects: Vec<StoredObject>, page: &PageRequest) -> ConnectionValue {
    let total = objects.len();
    let mut start = 0;
    let mut end = total;
    if let Some(offset) = page.after.as_deref().and_then(decode_cursor) {
        start = start.max((offset + 1).min(total));
    }
    if let Some(offset) = page.before.as_deref().and_then(decode_cursor) {
        end = end.min(offset).max(start);
    }
    if let Some(first) = page.first {
        end = end.min(start + first.min(MAX_PAGE_SIZE));
    }
    if let Some(last) = page.last {
        start = start.max(end.saturating_sub(last.min(MAX_PAGE_SIZE)));
    }
    if page.first.is_none() && page.last.is_none() {
        end = end.min(start + MAX_PAGE_SIZE);
    }

    let edges = objects
        .into_iter()
        .enumerate()
        .take(end)
        .skip(start)
        .map(|(offset, node)| EdgeValue {
            cursor: encode_cursor(offset),
            node,
        })
        .collect::<Vec<_>>();
    let page_info = PageInfoValue {
        has_previous_page: start > 0,
        has_next_page: end < total,
        start_cursor: edges.first().map(|edge| edge.cursor.clone()),
        end_cursor: edges.last().map(|edge| edge.cursor.clone()),
    };
    ConnectionValue {
        count: edges.len(),
        edges,
        page_info,
    }
}

/// Rewrite a client input document into storage form.
///
/// Pointer fields arrive as bare ids (global or local) and are re-tagged as
/// pointer objects, geographic points are tagged with their kind. Everything
/// else passes through unchanged.
pub fn normalize_input(class: &ClassSchema, input: Document) -> Document {
    input
        .into_iter()
        .map(|(field, value)| {
            let value = match class.get(&field) {
                Some(FieldKind::Pointer { target_class }) => tag_pointer(target_class, value),
                Some(FieldKind::GeoPoint) => tag_geo_point(value),
                _ => value,
            };
            (field, value)
        })
        .collect()
}

/// Rewrite a filter document so its operands match stored values. Pointer
/// constraints compare bare ids against stored pointer objects, so their
/// operands are re-tagged the same way inputs are.
pub fn normalize_filter(class: &ClassSchema, filter: Document) -> Document {
    filter
        .into_iter()
        .map(|(field, condition)| {
            let condition = match class.get(&field) {
                Some(FieldKind::Pointer { target_class }) => match condition {
                    Json::Object(constraints) => Json::Object(
                        constraints
                            .into_iter()
                            .map(|(op, operand)| {
                                let operand = if matches!(op.as_str(), "eq" | "ne") {
                                    tag_pointer(target_class, operand)
                                } else {
                                    operand
                                };
                                (op, operand)
                            })
                            .collect(),
                    ),
                    operand => tag_pointer(target_class, operand),
                },
                _ => condition,
            };
            (field, condition)
        })
        .collect()
}

fn tag_pointer(target_class: &str, value: Json) -> Json {
    let Json::String(id) = value else { return value };
    let object_id = match parse_global_id(&id) {
        Some((class, object_id)) if class == target_class => object_id,
        _ => id,
    };
    json!({
        "__type": "Pointer",
        "className": target_class,
        "objectId": object_id,
    })
}

fn tag_geo_point(value: Json) -> Json {
    match value {
        Json::Object(mut point) => {
            point.insert("__type".into(), json!("GeoPoint"));
            Json::Object(point)
        }
        value => value,
    }
}

/// Convert a GraphQL input value into a JSON document.
pub(super) fn value_to_document(value: &Value) -> GraphQLResult<Document> {
    match value.clone().into_json()? {
        Json::Object(map) => Ok(map),
        _ => Err(GraphQLError::new("expected an input object")),
    }
}

/// Extract pagination arguments from a field's argument map.
pub(super) fn page_request_from_args(
    args: &async_graphql::indexmap::IndexMap<Name, Value>,
) -> PageRequest {
    let size = |name: &str| match args.get(name) {
        Some(Value::Number(n)) => n.as_u64().map(|n| n as usize),
        _ => None,
    };
    let cursor = |name: &str| match args.get(name) {
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    };
    PageRequest {
        first: size("first"),
        after: cursor("after"),
        last: size("last"),
        before: cursor("before"),
    }
}

/// The authentication context of the current request, anonymous when the
/// request carried no session state.
pub(super) fn current_auth(ctx: &ResolverContext<'_>) -> crate::auth::AuthContext {
    ctx.data_opt::<SessionState>()
        .map(SessionState::current)
        .unwrap_or_default()
}

/// The resolver of the reserved global `id` field.
pub(super) fn global_id(ctx: ResolverContext<'_>) -> FieldFuture<'_> {
    FieldFuture::new(async move {
        let object = ctx.parent_value.try_downcast_ref::<StoredObject>()?;
        let object_id = object
            .object_id()
            .ok_or_else(|| GraphQLError::new("stored object without an objectId"))?;
        Ok(Some(FieldValue::value(encode_global_id(
            &object.class_name,
            object_id,
        ))))
    })
}

/// Build a resolver reading one plain field from the stored document.
pub(super) fn make_field_resolver(
    field_name: String,
    kind: FieldKind,
) -> impl for<'a> Fn(ResolverContext<'a>) -> FieldFuture<'a> + Send + Sync + 'static {
    move |ctx: ResolverContext| {
        let field_name = field_name.clone();
        let kind = kind.clone();
        FieldFuture::new(async move {
            let object = ctx.parent_value.try_downcast_ref::<StoredObject>()?;
            match object.get(&field_name) {
                None | Some(Json::Null) => Ok(None),
                Some(value) => stored_field_value(&kind, value),
            }
        })
    }
}

fn stored_field_value(
    kind: &FieldKind,
    value: &Json,
) -> GraphQLResult<Option<FieldValue<'static>>> {
    match kind {
        FieldKind::GeoPoint => {
            let coordinate = |axis| value.get(axis).and_then(Json::as_f64);
            let (Some(latitude), Some(longitude)) =
                (coordinate("latitude"), coordinate("longitude"))
            else {
                return Err(GraphQLError::new("malformed stored geo point"));
            };
            Ok(Some(FieldValue::owned_any(GeoPointValue {
                latitude,
                longitude,
            })))
        }
        _ => Ok(Some(FieldValue::value(Value::from_json(value.clone())?))),
    }
}

/// Build a resolver dereferencing a pointer field into the full target object.
///
/// A dangling pointer resolves to null rather than an error.
pub(super) fn make_pointer_resolver(
    field_name: String,
    target_class: String,
) -> impl for<'a> Fn(ResolverContext<'a>) -> FieldFuture<'a> + Send + Sync + 'static {
    move |ctx: ResolverContext| {
        let field_name = field_name.clone();
        let target_class = target_class.clone();
        FieldFuture::new(async move {
            let object = ctx.parent_value.try_downcast_ref::<StoredObject>()?;
            let Some(object_id) = object.get(&field_name).and_then(pointer_object_id) else {
                return Ok(None);
            };
            let storage = ctx.data::<Arc<dyn StorageBackend>>()?;
            let auth = current_auth(&ctx);
            match storage.get(&auth, &target_class, &object_id).await {
                Ok(target) => Ok(Some(FieldValue::owned_any(target))),
                Err(StorageError::NotFound { .. }) => Ok(None),
                Err(err) => Err(err.into()),
            }
        })
    }
}

fn pointer_object_id(value: &Json) -> Option<String> {
    match value {
        Json::String(id) => Some(id.clone()),
        Json::Object(pointer) => pointer
            .get("objectId")
            .and_then(Json::as_str)
            .map(str::to_owned),
        _ => None,
    }
}

/// Build a resolver turning a relation field into a paginated connection over
/// the target class.
///
/// The caller's filter, if any, is merged with a `$relatedTo` operator naming
/// the parent object and the relation key.
pub(super) fn make_relation_resolver(
    field_name: String,
    target_class: String,
) -> impl for<'a> Fn(ResolverContext<'a>) -> FieldFuture<'a> + Send + Sync + 'static {
    move |ctx: ResolverContext| {
        let field_name = field_name.clone();
        let target_class = target_class.clone();
        FieldFuture::new(async move {
            let parent = ctx.parent_value.try_downcast_ref::<StoredObject>()?;
            let parent_id = parent
                .object_id()
                .ok_or_else(|| GraphQLError::new("stored object without an objectId"))?;
            let db_schema = ctx.data::<DatabaseSchema>()?;
            let target = db_schema
                .class(&target_class)
                .ok_or_else(|| GraphQLError::new(format!("unknown class {target_class}")))?;

            let args = ctx.args.as_index_map();
            let mut filter = match args.get("where") {
                Some(value) => normalize_filter(target, value_to_document(value)?),
                None => Document::new(),
            };
            filter.insert(
                "$relatedTo".into(),
                json!({
                    "object": {
                        "__type": "Pointer",
                        "className": parent.class_name,
                        "objectId": parent_id,
                    },
                    "key": field_name,
                }),
            );

            let storage = ctx.data::<Arc<dyn StorageBackend>>()?;
            let auth = current_auth(&ctx);
            let objects = storage
                .find(
                    &auth,
                    &target_class,
                    FindQuery {
                        filter,
                        redirect_key: Some(field_name.clone()),
                    },
                )
                .await?;
            let page = page_request_from_args(args);
            Ok(Some(FieldValue::owned_any(paginate(objects, &page))))
        })
    }
}

pub(super) fn connection_edges(ctx: ResolverContext<'_>) -> FieldFuture<'_> {
    FieldFuture::new(async move {
        let connection = ctx.parent_value.try_downcast_ref::<ConnectionValue>()?;
        Ok(Some(FieldValue::list(
            connection
                .edges
                .iter()
                .map(|edge| FieldValue::borrowed_any(edge)),
        )))
    })
}

pub(super) fn connection_nodes(ctx: ResolverContext<'_>) -> FieldFuture<'_> {
    FieldFuture::new(async move {
        let connection = ctx.parent_value.try_downcast_ref::<ConnectionValue>()?;
        Ok(Some(FieldValue::list(
            connection
                .edges
                .iter()
                .map(|edge| FieldValue::borrowed_any(&edge.node)),
        )))
    })
}

pub(super) fn connection_page_info(ctx: ResolverContext<'_>) -> FieldFuture<'_> {
    FieldFuture::new(async move {
        let connection = ctx.parent_value.try_downcast_ref::<ConnectionValue>()?;
        Ok(Some(FieldValue::borrowed_any(&connection.page_info)))
    })
}

pub(super) fn connection_count(ctx: ResolverContext<'_>) -> FieldFuture<'_> {
    FieldFuture::new(async move {
        let connection = ctx.parent_value.try_downcast_ref::<ConnectionValue>()?;
        Ok(Some(FieldValue::value(connection.count as u64)))
    })
}

pub(super) fn edge_node(ctx: ResolverContext<'_>) -> FieldFuture<'_> {
    FieldFuture::new(async move {
        let edge = ctx.parent_value.try_downcast_ref::<EdgeValue>()?;
        Ok(Some(FieldValue::borrowed_any(&edge.node)))
    })
}

pub(super) fn edge_cursor(ctx: ResolverContext<'_>) -> FieldFuture<'_> {
    FieldFuture::new(async move {
        let edge = ctx.parent_value.try_downcast_ref::<EdgeValue>()?;
        Ok(Some(FieldValue::value(edge.cursor.clone())))
    })
}

pub(super) fn payload_object(ctx: ResolverContext<'_>) -> FieldFuture<'_> {
    FieldFuture::new(async move {
        let payload = ctx.parent_value.try_downcast_ref::<PayloadValue>()?;
        Ok(payload
            .object
            .as_ref()
            .map(|object| FieldValue::borrowed_any(object)))
    })
}

pub(super) fn payload_client_mutation_id(ctx: ResolverContext<'_>) -> FieldFuture<'_> {
    FieldFuture::new(async move {
        let payload = ctx.parent_value.try_downcast_ref::<PayloadValue>()?;
        Ok(payload
            .client_mutation_id
            .clone()
            .map(FieldValue::value))
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::init_logging;
    use proptest::prelude::*;

    fn objects(n: usize) -> Vec<StoredObject> {
        (0..n)
            .map(|i| {
                let mut doc = Document::new();
                doc.insert("objectId".into(), json!(format!("o{i}")));
                StoredObject::new("Post", doc)
            })
            .collect()
    }

    fn ids(connection: &ConnectionValue) -> Vec<&str> {
        connection
            .edges
            .iter()
            .filter_map(|edge| edge.node.object_id())
            .collect()
    }

    proptest! {
        #[test]
        fn test_global_id_round_trip(class in "[A-Za-z_][A-Za-z0-9_]{0,12}", id in "[A-Za-z0-9]{1,16}") {
            let encoded = encode_global_id(&class, &id);
            prop_assert_eq!(parse_global_id(&encoded), Some((class, id)));
        }
    }

    #[test]
    fn test_global_id_rejects_garbage() {
        init_logging();
        assert_eq!(parse_global_id("not base64!"), None);
        assert_eq!(parse_global_id(&BASE64.encode("no-separator")), None);
        assert_eq!(parse_global_id(&BASE64.encode(":missing")), None);
    }

    #[test]
    fn test_paginate_forward() {
        init_logging();
        let page = paginate(
            objects(5),
            &PageRequest {
                first: Some(2),
                ..Default::default()
            },
        );
        assert_eq!(ids(&page), ["o0", "o1"]);
        assert_eq!(page.count, 2);
        assert!(page.page_info.has_next_page);
        assert!(!page.page_info.has_previous_page);

        let after = page.page_info.end_cursor.clone().unwrap();
        let page = paginate(
            objects(5),
            &PageRequest {
                first: Some(2),
                after: Some(after),
                ..Default::default()
            },
        );
        assert_eq!(ids(&page), ["o2", "o3"]);
        assert!(page.page_info.has_next_page);
        assert!(page.page_info.has_previous_page);
    }

    #[test]
    fn test_paginate_backward() {
        init_logging();
        let page = paginate(
            objects(5),
            &PageRequest {
                last: Some(2),
                ..Default::default()
            },
        );
        assert_eq!(ids(&page), ["o3", "o4"]);
        assert!(!page.page_info.has_next_page);
        assert!(page.page_info.has_previous_page);

        let before = page.page_info.start_cursor.clone().unwrap();
        let page = paginate(
            objects(5),
            &PageRequest {
                last: Some(2),
                before: Some(before),
                ..Default::default()
            },
        );
        assert_eq!(ids(&page), ["o1", "o2"]);
    }

    #[test]
    fn test_paginate_caps_page_size() {
        init_logging();
        let page = paginate(
            objects(250),
            &PageRequest {
                first: Some(1000),
                ..Default::default()
            },
        );
        assert_eq!(page.count, MAX_PAGE_SIZE);
        assert!(page.page_info.has_next_page);

        // The cap applies even when no page size is requested.
        let page = paginate(objects(250), &PageRequest::default());
        assert_eq!(page.count, MAX_PAGE_SIZE);
    }

    #[test]
    fn test_normalize_input_tags_pointers_and_geo_points() {
        init_logging();
        let class = ClassSchema::new("Post")
            .field("author", FieldKind::Pointer {
                target_class: "_User".into(),
            })
            .field("location", FieldKind::GeoPoint);

        let mut input = Document::new();
        input.insert("author".into(), json!(encode_global_id("_User", "u1")));
        input.insert(
            "location".into(),
            json!({ "latitude": 1.5, "longitude": 2.5 }),
        );
        let normalized = normalize_input(&class, input);

        assert_eq!(
            normalized["author"],
            json!({ "__type": "Pointer", "className": "_User", "objectId": "u1" })
        );
        assert_eq!(normalized["location"]["__type"], json!("GeoPoint"));
    }

    #[test]
    fn test_normalize_filter_tags_pointer_operands() {
        init_logging();
        let class = ClassSchema::new("Post").field("author", FieldKind::Pointer {
            target_class: "_User".into(),
        });

        let mut filter = Document::new();
        filter.insert("author".into(), json!({ "eq": "u1", "exists": true }));
        let normalized = normalize_filter(&class, filter);

        assert_eq!(
            normalized["author"]["eq"],
            json!({ "__type": "Pointer", "className": "_User", "objectId": "u1" })
        );
        assert_eq!(normalized["author"]["exists"], json!(true));
    }
}
