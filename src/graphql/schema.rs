//! Assembling a backend schema into an executable GraphQL schema.
//!
//! [`generate_schema`] is the schema-compilation pass: it registers the shared
//! primitives, builds one type bundle per class through the
//! [`TypeCache`](super::cache::TypeCache), collects the per-class root fields
//! into `Query` and `Mutation`, and finishes the dynamic schema with the
//! storage backend, the authenticator and the backend schema injected as
//! context data. Cross-class references are resolved by name when the schema
//! is finished, so cyclic class graphs are fine.

use super::cache::TypeCache;
use super::operations::{self, Error};
use super::types::TypeBundle;
use super::{primitives, types};
use crate::auth::{AuthError, Authenticator, SessionInput, SessionState};
use crate::classes::DatabaseSchema;
use crate::storage::StorageBackend;
use async_graphql::dynamic::{Object, Schema};
use async_graphql::{Request, Response};
use std::sync::Arc;
use tracing::info;

/// Compile `db` into an executable GraphQL schema backed by `storage`.
pub fn generate_schema(
    db: DatabaseSchema,
    storage: Arc<dyn StorageBackend>,
    authenticator: Arc<dyn Authenticator>,
) -> Result<Schema, Error> {
    if db.is_empty() {
        return Err(Error::Schema {
            message: "the backend schema contains no classes".into(),
        });
    }
    info!(classes = db.len(), "generating schema");

    let cache = TypeCache::new();
    let mut registry = Vec::new();
    primitives::register(&mut registry);

    let mut query = Object::new("Query");
    let mut mutation = Object::new("Mutation");
    for class in db.classes() {
        let bundle = cache.get_or_create(class.name(), || TypeBundle::new(class.clone()));
        types::build_bundle_types(&bundle, &db, &mut registry);
        for field in operations::query_fields(&bundle) {
            query = query.field(field);
        }
        for field in operations::mutation_fields(&bundle) {
            mutation = mutation.field(field);
        }
    }

    let mut builder = Schema::build("Query", Some("Mutation"), None)
        .data(storage)
        .data(authenticator)
        .data(db);
    for ty in registry {
        builder = builder.register(ty);
    }
    builder
        .register(query)
        .register(mutation)
        .finish()
        .map_err(|err| Error::Schema {
            message: err.to_string(),
        })
}

/// Execute `request` under a session derived from `credentials`.
///
/// The derived context is shared across the whole request through a
/// [`SessionState`], so a principal created mid-request can take over the
/// remainder of it.
pub async fn execute(
    schema: &Schema,
    authenticator: &dyn Authenticator,
    credentials: SessionInput,
    request: impl Into<Request>,
) -> Result<Response, AuthError> {
    let context = authenticator.derive_context(credentials).await?;
    let request = request.into().data(SessionState::new(context));
    Ok(schema.execute(request).await)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::auth::{AuthContext, StatelessAuthenticator};
    use crate::classes::{ClassSchema, FieldKind};
    use crate::graphql::resolvers::{encode_global_id, parse_global_id};
    use crate::init_logging;
    use crate::storage::memory::MemoryStorage;
    use serde_json::{json, Value as Json};

    fn pointer(target: &str) -> FieldKind {
        FieldKind::Pointer {
            target_class: target.into(),
        }
    }

    fn sample_db() -> DatabaseSchema {
        DatabaseSchema::new()
            .with_class(ClassSchema::new("_User").field("username", FieldKind::String))
            .with_class(
                ClassSchema::new("Post")
                    .field("title", FieldKind::String)
                    .field("score", FieldKind::Number)
                    .field("author", pointer("_User"))
                    .field(
                        "likes",
                        FieldKind::Relation {
                            target_class: "_User".into(),
                        },
                    ),
            )
    }

    fn compile(db: DatabaseSchema, storage: &MemoryStorage) -> Schema {
        generate_schema(
            db,
            Arc::new(storage.clone()),
            Arc::new(StatelessAuthenticator),
        )
        .unwrap()
    }

    fn setup() -> (Schema, MemoryStorage) {
        init_logging();
        let storage = MemoryStorage::create();
        (compile(sample_db(), &storage), storage)
    }

    async fn run(schema: &Schema, session: &SessionState, query: &str) -> Json {
        let request = Request::new(query).data(session.clone());
        let response = schema.execute(request).await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);
        response.data.into_json().unwrap()
    }

    async fn run_err(schema: &Schema, query: &str) -> String {
        let request = Request::new(query).data(SessionState::default());
        let response = schema.execute(request).await;
        assert!(!response.errors.is_empty());
        response.errors[0].message.clone()
    }

    #[test]
    fn test_generated_sdl() {
        let (schema, _) = setup();
        let sdl = schema.sdl();

        for expected in [
            "type Post implements Node",
            "type User implements Node",
            "input PostInput",
            "input UpdatePostInput",
            "input PostWhereInput",
            "type PostConnection",
            "type PostEdge",
            "type PostPayload",
            "findPost(",
            "addPost(",
            "updatePost(",
            "destroyPost(",
            "scalar Date",
            "type PageInfo",
        ] {
            assert!(sdl.contains(expected), "missing {expected:?} in:\n{sdl}");
        }
    }

    #[test]
    fn test_reserved_fields_override_declared_ones() {
        init_logging();
        let db = DatabaseSchema::new().with_class(
            ClassSchema::new("Legacy")
                .field("objectId", FieldKind::String)
                .field("name", FieldKind::String),
        );
        let schema = compile(db, &MemoryStorage::create());
        let sdl = schema.sdl();
        assert!(sdl.contains("objectId: ID!"), "{sdl}");
        assert!(!sdl.contains("objectId: String"), "{sdl}");
    }

    #[test]
    fn test_mutually_recursive_classes() {
        init_logging();
        let db = DatabaseSchema::new()
            .with_class(ClassSchema::new("Alpha").field("beta", pointer("Beta")))
            .with_class(ClassSchema::new("Beta").field("alpha", pointer("Alpha")));
        let schema = compile(db, &MemoryStorage::create());
        let sdl = schema.sdl();
        assert!(sdl.contains("beta: Beta"), "{sdl}");
        assert!(sdl.contains("alpha: Alpha"), "{sdl}");
    }

    #[test]
    fn test_empty_schema_is_rejected() {
        init_logging();
        let err = generate_schema(
            DatabaseSchema::new(),
            Arc::new(MemoryStorage::create()),
            Arc::new(StatelessAuthenticator),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Schema { .. }));
    }

    #[async_std::test]
    async fn test_add_then_get_round_trip() {
        let (schema, _) = setup();
        let session = SessionState::default();

        let data = run(
            &schema,
            &session,
            r#"mutation {
                addPost(input: { title: "hello", score: 7, clientMutationId: "m1" }) {
                    object { id objectId title score createdAt }
                    clientMutationId
                }
            }"#,
        )
        .await;
        let payload = &data["addPost"];
        assert_eq!(payload["clientMutationId"], json!("m1"));
        assert_eq!(payload["object"]["title"], json!("hello"));
        assert_eq!(payload["object"]["score"], json!(7.0));
        assert!(payload["object"]["createdAt"].is_string());

        let object_id = payload["object"]["objectId"].as_str().unwrap().to_owned();
        let global_id = payload["object"]["id"].as_str().unwrap().to_owned();
        assert_eq!(
            parse_global_id(&global_id),
            Some(("Post".to_owned(), object_id.clone()))
        );

        // The same object reads back through either id form.
        for id in [object_id.as_str(), global_id.as_str()] {
            let data = run(
                &schema,
                &session,
                &format!(r#"{{ post(id: "{id}") {{ title }} }}"#),
            )
            .await;
            assert_eq!(data["post"]["title"], json!("hello"));
        }
    }

    #[async_std::test]
    async fn test_get_missing_object_fails() {
        let (schema, _) = setup();
        let message = run_err(&schema, r#"{ post(id: "nope") { title } }"#).await;
        assert!(message.contains("no Post object"), "{message}");
    }

    #[async_std::test]
    async fn test_find_filters_and_paginates() {
        let (schema, _) = setup();
        let session = SessionState::default();

        for (title, score) in [("a", 1), ("b", 2), ("c", 3)] {
            run(
                &schema,
                &session,
                &format!(r#"mutation {{ addPost(input: {{ title: "{title}", score: {score} }}) {{ object {{ objectId }} }} }}"#),
            )
            .await;
        }

        let data = run(
            &schema,
            &session,
            r#"{
                findPost(where: { score: { gt: 1 } }, first: 1) {
                    edges { node { title } cursor }
                    pageInfo { hasNextPage hasPreviousPage }
                    count
                }
            }"#,
        )
        .await;
        let connection = &data["findPost"];
        assert_eq!(connection["count"], json!(1));
        assert_eq!(connection["edges"][0]["node"]["title"], json!("b"));
        assert_eq!(connection["pageInfo"]["hasNextPage"], json!(true));
        assert_eq!(connection["pageInfo"]["hasPreviousPage"], json!(false));
    }

    #[async_std::test]
    async fn test_pointer_dereferences_to_target_object() {
        let (schema, _) = setup();
        let session = SessionState::default();

        let data = run(
            &schema,
            &session,
            r#"mutation { addUser(input: { username: "ada" }) { object { id } } }"#,
        )
        .await;
        let author_id = data["addUser"]["object"]["id"].as_str().unwrap().to_owned();

        let data = run(
            &schema,
            &session,
            &format!(r#"mutation {{ addPost(input: {{ title: "t", author: "{author_id}" }}) {{ object {{ objectId author {{ username }} }} }} }}"#),
        )
        .await;
        assert_eq!(
            data["addPost"]["object"]["author"]["username"],
            json!("ada")
        );
    }

    #[async_std::test]
    async fn test_relation_connection_lists_related_objects() {
        let (schema, storage) = setup();
        let session = SessionState::default();
        let auth = AuthContext::default();

        let mut members = vec![];
        for name in ["u1", "u2"] {
            let receipt = storage
                .create(&auth, "_User", doc(json!({ "username": name })))
                .await
                .unwrap();
            members.push(receipt.object_id);
        }
        storage
            .create(&auth, "_User", doc(json!({ "username": "bystander" })))
            .await
            .unwrap();
        let post = storage
            .create(&auth, "Post", doc(json!({ "title": "liked" })))
            .await
            .unwrap();
        storage
            .update(
                &auth,
                "Post",
                &post.object_id,
                doc(json!({
                    "likes": {
                        "__type": "Relation",
                        "className": "_User",
                        "objectIds": members,
                    },
                })),
            )
            .await
            .unwrap();

        let data = run(
            &schema,
            &session,
            &format!(
                r#"{{ post(id: "{}") {{ likes(first: 10) {{ count nodes {{ username }} edges {{ node {{ id objectId }} }} }} }} }}"#,
                post.object_id
            ),
        )
        .await;
        let likes = &data["post"]["likes"];
        assert_eq!(likes["count"], json!(2));
        assert_eq!(likes["nodes"], json!([{ "username": "u1" }, { "username": "u2" }]));
        for (edge, member) in likes["edges"].as_array().unwrap().iter().zip(&members) {
            assert_eq!(edge["node"]["objectId"], json!(member));
            assert_eq!(
                edge["node"]["id"],
                json!(encode_global_id("_User", member))
            );
        }
    }

    #[async_std::test]
    async fn test_update_requires_exactly_one_identifier() {
        let (schema, _) = setup();
        let message = run_err(
            &schema,
            r#"mutation { updatePost(input: { title: "t" }) { object { title } } }"#,
        )
        .await;
        assert!(message.contains("either id or objectId"), "{message}");
    }

    #[async_std::test]
    async fn test_destroy_returns_pre_image_then_not_found() {
        let (schema, storage) = setup();
        let session = SessionState::default();

        let data = run(
            &schema,
            &session,
            r#"mutation { addPost(input: { title: "doomed" }) { object { objectId } } }"#,
        )
        .await;
        let object_id = data["addPost"]["object"]["objectId"]
            .as_str()
            .unwrap()
            .to_owned();

        let destroy = format!(
            r#"mutation {{ destroyPost(input: {{ objectId: "{object_id}" }}) {{ object {{ title }} }} }}"#
        );
        let data = run(&schema, &session, &destroy).await;
        assert_eq!(data["destroyPost"]["object"]["title"], json!("doomed"));
        assert_eq!(storage.count("Post").await, 0);

        let message = run_err(&schema, &destroy).await;
        assert!(message.contains("no Post object"), "{message}");
    }

    #[async_std::test]
    async fn test_creating_a_principal_adopts_its_session() {
        let (schema, _) = setup();
        let session = SessionState::default();
        assert!(!session.current().is_authenticated());

        let data = run(
            &schema,
            &session,
            r#"mutation { addUser(input: { username: "ada" }) { object { sessionToken } } }"#,
        )
        .await;
        let token = data["addUser"]["object"]["sessionToken"]
            .as_str()
            .unwrap()
            .to_owned();
        assert!(token.starts_with("r:"));
        assert_eq!(session.current().session_token, Some(token));
    }

    #[async_std::test]
    async fn test_execute_rejects_bad_credentials() {
        let (schema, _) = setup();
        let err = execute(
            &schema,
            &StatelessAuthenticator,
            SessionInput::with_token("garbage"),
            "{ findPost { count } }",
        )
        .await
        .unwrap_err();
        assert_eq!(err, AuthError::InvalidSession);
    }

    fn doc(value: Json) -> crate::storage::Document {
        match value {
            Json::Object(map) => map,
            _ => Default::default(),
        }
    }
}
