//! Root query and mutation fields generated per class.
//!
//! Each class contributes a get field (named after the class), `find<Class>`,
//! `add<Class>`, `update<Class>` and `destroy<Class>`. The resolvers translate
//! GraphQL arguments into storage calls and wrap the results in the class's
//! generated types.

use super::resolvers::{
    current_auth, normalize_filter, normalize_input, page_request_from_args, parse_global_id,
    paginate, value_to_document, PayloadValue,
};
use super::types::TypeBundle;
use crate::auth::{Authenticator, SessionInput, SessionState};
use crate::classes::{CLIENT_MUTATION_ID_FIELD, GLOBAL_ID_FIELD, OBJECT_ID_FIELD};
use crate::storage::{Document, FindQuery, StorageBackend, StorageError};
use async_graphql::dynamic::{Field, FieldFuture, FieldValue, InputValue, ResolverContext, TypeRef};
use async_graphql::{Error as GraphQLError, Value};
use serde_json::Value as Json;
use snafu::Snafu;
use std::sync::Arc;
use tracing::{debug, warn};

pub use super::resolvers::MAX_PAGE_SIZE;

/// Errors raised by the generated operations.
#[derive(Clone, Debug, Snafu, PartialEq, Eq)]
pub enum Error {
    #[snafu(display("no {class} object with id {object_id}"))]
    NotFound { class: String, object_id: String },

    #[snafu(display("either id or objectId must be provided"))]
    MissingIdentifier,

    #[snafu(display("{id} is not a valid global id for {class}"))]
    InvalidGlobalId { class: String, id: String },

    #[snafu(display("invalid input: {message}"))]
    Validation { message: String },

    #[snafu(display("conflict: {message}"))]
    Conflict { message: String },

    #[snafu(display("schema inconsistency: {message}"))]
    SchemaInconsistency { message: String },

    #[snafu(display("schema generation failed: {message}"))]
    Schema { message: String },
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { class, object_id } => Self::NotFound { class, object_id },
            StorageError::Validation { message } => Self::Validation { message },
            StorageError::Conflict { message } => Self::Conflict { message },
            StorageError::Internal { message } => Self::SchemaInconsistency { message },
        }
    }
}

/// The root query fields of one class: get by id and filtered find.
pub fn query_fields(bundle: &Arc<TypeBundle>) -> Vec<Field> {
    let display = &bundle.display_name;
    let get = Field::new(
        operation_name(display),
        TypeRef::named_nn(&bundle.object_type),
        make_get_resolver(bundle.clone()),
    )
    .description(format!("Get one {display} object by id"))
    .argument(InputValue::new("id", TypeRef::named_nn(TypeRef::ID)));

    let find = Field::new(
        format!("find{display}"),
        TypeRef::named_nn(&bundle.connection_type),
        make_find_resolver(bundle.clone()),
    )
    .description(format!("Find {display} objects matching a filter"))
    .argument(InputValue::new(
        "where",
        TypeRef::named(&bundle.where_input_type),
    ))
    .argument(InputValue::new("first", TypeRef::named(TypeRef::INT)))
    .argument(InputValue::new("after", TypeRef::named(TypeRef::STRING)))
    .argument(InputValue::new("last", TypeRef::named(TypeRef::INT)))
    .argument(InputValue::new("before", TypeRef::named(TypeRef::STRING)));

    vec![get, find]
}

/// The root mutation fields of one class: add, update and destroy.
pub fn mutation_fields(bundle: &Arc<TypeBundle>) -> Vec<Field> {
    let display = &bundle.display_name;
    let add = Field::new(
        format!("add{display}"),
        TypeRef::named_nn(&bundle.payload_type),
        make_add_resolver(bundle.clone()),
    )
    .description(format!("Create a new {display} object"))
    .argument(InputValue::new(
        "input",
        TypeRef::named_nn(&bundle.input_type),
    ));

    let update = Field::new(
        format!("update{display}"),
        TypeRef::named_nn(&bundle.payload_type),
        make_update_resolver(bundle.clone()),
    )
    .description(format!("Update an existing {display} object"))
    .argument(InputValue::new(
        "input",
        TypeRef::named_nn(&bundle.update_input_type),
    ));

    let destroy = Field::new(
        format!("destroy{display}"),
        TypeRef::named_nn(&bundle.payload_type),
        make_destroy_resolver(bundle.clone()),
    )
    .description(format!("Delete a {display} object, returning its last state"))
    .argument(InputValue::new(
        "input",
        TypeRef::named_nn(&bundle.update_input_type),
    ));

    vec![add, update, destroy]
}

/// The field name of the get operation: the display name, lowercased at the
/// front.
fn operation_name(display: &str) -> String {
    let mut chars = display.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Resolve an id argument, which may be a global id or a bare object id, to a
/// local object id.
fn local_object_id(class: &str, id: &str) -> String {
    match parse_global_id(id) {
        Some((decoded_class, object_id)) if decoded_class == class => object_id,
        _ => id.to_owned(),
    }
}

/// Resolve the identifier carried by a mutation input. Exactly one of the two
/// id forms must be present.
fn resolve_identifier(class: &str, input: &Document) -> Result<String, Error> {
    let global = input.get(GLOBAL_ID_FIELD).and_then(Json::as_str);
    let local = input.get(OBJECT_ID_FIELD).and_then(Json::as_str);
    match (global, local) {
        (Some(_), Some(_)) => Err(Error::Validation {
            message: "supply only one of id and objectId".into(),
        }),
        (Some(id), None) => match parse_global_id(id) {
            Some((decoded_class, object_id)) if decoded_class == class => Ok(object_id),
            _ => Err(Error::InvalidGlobalId {
                class: class.to_owned(),
                id: id.to_owned(),
            }),
        },
        (None, Some(object_id)) => Ok(object_id.to_owned()),
        (None, None) => Err(Error::MissingIdentifier),
    }
}

/// Split a mutation input into the client correlation token and the field
/// document destined for storage.
fn split_input(ctx: &ResolverContext<'_>) -> Result<(Document, Option<String>), GraphQLError> {
    let input = ctx
        .args
        .as_index_map()
        .get("input")
        .ok_or_else(|| GraphQLError::new("missing input argument"))?;
    let mut document = value_to_document(input)?;
    let client_mutation_id = document
        .remove(CLIENT_MUTATION_ID_FIELD)
        .and_then(|value| value.as_str().map(str::to_owned));
    Ok((document, client_mutation_id))
}

fn make_get_resolver(
    bundle: Arc<TypeBundle>,
) -> impl for<'a> Fn(ResolverContext<'a>) -> FieldFuture<'a> + Send + Sync + 'static {
    move |ctx: ResolverContext| {
        let bundle = bundle.clone();
        FieldFuture::new(async move {
            let class = bundle.class.name();
            let Some(Value::String(id)) = ctx.args.as_index_map().get("id") else {
                return Err(GraphQLError::new("missing id argument"));
            };
            let object_id = local_object_id(class, id);
            debug!(class, %object_id, "get");

            let storage = ctx.data::<Arc<dyn StorageBackend>>()?;
            let object = storage
                .get(&current_auth(&ctx), class, &object_id)
                .await
                .map_err(Error::from)?;
            Ok(Some(FieldValue::owned_any(object)))
        })
    }
}

fn make_find_resolver(
    bundle: Arc<TypeBundle>,
) -> impl for<'a> Fn(ResolverContext<'a>) -> FieldFuture<'a> + Send + Sync + 'static {
    move |ctx: ResolverContext| {
        let bundle = bundle.clone();
        FieldFuture::new(async move {
            let class = bundle.class.name();
            let args = ctx.args.as_index_map();
            let filter = match args.get("where") {
                Some(value) => normalize_filter(&bundle.class, value_to_document(value)?),
                None => Document::new(),
            };
            debug!(class, ?filter, "find");

            let storage = ctx.data::<Arc<dyn StorageBackend>>()?;
            let objects = storage
                .find(&current_auth(&ctx), class, FindQuery::filtered(filter))
                .await
                .map_err(Error::from)?;
            let page = page_request_from_args(args);
            Ok(Some(FieldValue::owned_any(paginate(objects, &page))))
        })
    }
}

fn make_add_resolver(
    bundle: Arc<TypeBundle>,
) -> impl for<'a> Fn(ResolverContext<'a>) -> FieldFuture<'a> + Send + Sync + 'static {
    move |ctx: ResolverContext| {
        let bundle = bundle.clone();
        FieldFuture::new(async move {
            let class = bundle.class.name();
            let (input, client_mutation_id) = split_input(&ctx)?;
            let input = normalize_input(&bundle.class, input);
            debug!(class, "add");

            let storage = ctx.data::<Arc<dyn StorageBackend>>()?;
            let receipt = storage
                .create(&current_auth(&ctx), class, input)
                .await
                .map_err(Error::from)?;

            // Creating a principal logs the request in as the new principal
            // for the rest of the response.
            if let Some(token) = receipt.session_token.clone() {
                let authenticator = ctx.data::<Arc<dyn Authenticator>>()?;
                match authenticator
                    .derive_context(SessionInput::with_token(token))
                    .await
                {
                    Ok(context) => {
                        if let Some(session) = ctx.data_opt::<SessionState>() {
                            session.replace(context);
                        }
                    }
                    Err(err) => warn!(class, %err, "could not adopt minted session"),
                }
            }

            let object = storage
                .get(&current_auth(&ctx), class, &receipt.object_id)
                .await
                .map_err(Error::from)?;
            Ok(Some(FieldValue::owned_any(PayloadValue {
                object: Some(object),
                client_mutation_id,
            })))
        })
    }
}

fn make_update_resolver(
    bundle: Arc<TypeBundle>,
) -> impl for<'a> Fn(ResolverContext<'a>) -> FieldFuture<'a> + Send + Sync + 'static {
    move |ctx: ResolverContext| {
        let bundle = bundle.clone();
        FieldFuture::new(async move {
            let class = bundle.class.name();
            let (mut input, client_mutation_id) = split_input(&ctx)?;
            let object_id = resolve_identifier(class, &input)?;
            input.remove(GLOBAL_ID_FIELD);
            input.remove(OBJECT_ID_FIELD);
            let patch = normalize_input(&bundle.class, input);
            debug!(class, %object_id, "update");

            let storage = ctx.data::<Arc<dyn StorageBackend>>()?;
            let auth = current_auth(&ctx);
            storage
                .update(&auth, class, &object_id, patch)
                .await
                .map_err(Error::from)?;
            let object = storage
                .get(&auth, class, &object_id)
                .await
                .map_err(Error::from)?;
            Ok(Some(FieldValue::owned_any(PayloadValue {
                object: Some(object),
                client_mutation_id,
            })))
        })
    }
}

fn make_destroy_resolver(
    bundle: Arc<TypeBundle>,
) -> impl for<'a> Fn(ResolverContext<'a>) -> FieldFuture<'a> + Send + Sync + 'static {
    move |ctx: ResolverContext| {
        let bundle = bundle.clone();
        FieldFuture::new(async move {
            let class = bundle.class.name();
            let (input, client_mutation_id) = split_input(&ctx)?;
            let object_id = resolve_identifier(class, &input)?;
            debug!(class, %object_id, "destroy");

            let storage = ctx.data::<Arc<dyn StorageBackend>>()?;
            let auth = current_auth(&ctx);

            // Fetch before deleting so the payload can describe what was
            // removed.
            let object = storage
                .get(&auth, class, &object_id)
                .await
                .map_err(Error::from)?;
            storage
                .delete(&auth, class, &object_id)
                .await
                .map_err(Error::from)?;
            Ok(Some(FieldValue::owned_any(PayloadValue {
                object: Some(object),
                client_mutation_id,
            })))
        })
    }
}
