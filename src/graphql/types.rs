//! Mapping class schemas to GraphQL types.
//!
//! [`TypeBundle`] names the derived types of one class. The field mappers
//! translate a single field definition into a field descriptor for one of
//! four contexts (output, input, update input, filter), and
//! [`build_bundle_types`] assembles the full set of dynamic types for a class
//! out of them. Cross-class references are by type name only, so mutually
//! recursive classes resolve when the schema is finished rather than while
//! the bundles are built.

use super::primitives::{
    ARRAY_SCALAR, BOOLEAN_CONSTRAINT, DATE_CONSTRAINT, DATE_SCALAR, FILE_SCALAR, GEO_POINT_INPUT,
    GEO_POINT_TYPE, ID_CONSTRAINT, NODE_INTERFACE, NUMBER_CONSTRAINT, OBJECT_SCALAR,
    PAGE_INFO_TYPE, STRING_CONSTRAINT,
};
use super::{dynamic::{Field, InputObject, InputValue, Object, Type, TypeRef}, resolvers};
use crate::classes::{
    display_name, ClassSchema, DatabaseSchema, FieldKind, CLIENT_MUTATION_ID_FIELD,
    CREATED_AT_FIELD, GLOBAL_ID_FIELD, OBJECT_ID_FIELD, SESSION_TOKEN_FIELD, UPDATED_AT_FIELD,
    USER_CLASS,
};
use std::sync::Arc;
use tracing::warn;

/// Field names the builder provides itself and never maps from the class.
const RESERVED_FIELDS: [&str; 6] = [
    GLOBAL_ID_FIELD,
    OBJECT_ID_FIELD,
    CREATED_AT_FIELD,
    UPDATED_AT_FIELD,
    SESSION_TOKEN_FIELD,
    CLIENT_MUTATION_ID_FIELD,
];

/// The names of the derived GraphQL types of one class.
///
/// Bundles are memoized per class by the
/// [`TypeCache`](super::cache::TypeCache), so every part of a schema
/// compilation pass sees the same bundle for the same class.
#[derive(Clone, Debug)]
pub struct TypeBundle {
    pub class: Arc<ClassSchema>,
    pub display_name: String,
    pub object_type: String,
    pub input_type: String,
    pub update_input_type: String,
    pub where_input_type: String,
    pub connection_type: String,
    pub edge_type: String,
    pub payload_type: String,
}

impl TypeBundle {
    pub fn new(class: Arc<ClassSchema>) -> Self {
        let display = class.display_name().to_owned();
        Self {
            object_type: display.clone(),
            input_type: format!("{display}Input"),
            update_input_type: format!("Update{display}Input"),
            where_input_type: format!("{display}WhereInput"),
            connection_type: format!("{display}Connection"),
            edge_type: format!("{display}Edge"),
            payload_type: format!("{display}Payload"),
            display_name: display,
            class,
        }
    }
}

/// Names the derived types of a referenced class without building them.
fn connection_type_of(class: &str) -> String {
    format!("{}Connection", display_name(class))
}

/// Map one field definition to an output field, with its resolver. Returns
/// `None` when the field cannot be exposed (unknown target class).
pub fn output_field(class: &str, name: &str, kind: &FieldKind, db: &DatabaseSchema) -> Option<Field> {
    let description = format!("Output for {name} ({kind})");
    let field = match kind {
        FieldKind::Pointer { target_class } => {
            check_target(class, name, target_class, db)?;
            Field::new(
                name,
                TypeRef::named(display_name(target_class)),
                resolvers::make_pointer_resolver(name.to_owned(), target_class.clone()),
            )
        }
        FieldKind::Relation { target_class } => {
            check_target(class, name, target_class, db)?;
            let target = target_class.clone();
            Field::new(
                name,
                TypeRef::named_nn(connection_type_of(target_class)),
                resolvers::make_relation_resolver(name.to_owned(), target_class.clone()),
            )
            .argument(InputValue::new(
                "where",
                TypeRef::named(format!("{}WhereInput", display_name(&target))),
            ))
            .argument(InputValue::new("first", TypeRef::named(TypeRef::INT)))
            .argument(InputValue::new("after", TypeRef::named(TypeRef::STRING)))
            .argument(InputValue::new("last", TypeRef::named(TypeRef::INT)))
            .argument(InputValue::new("before", TypeRef::named(TypeRef::STRING)))
        }
        kind => Field::new(
            name,
            TypeRef::named(output_scalar(kind)),
            resolvers::make_field_resolver(name.to_owned(), kind.clone()),
        ),
    };
    Some(field.description(description))
}

/// Map one field definition to an input field. Relations are not settable
/// through inputs and map to `None`.
pub fn input_field(name: &str, kind: &FieldKind) -> Option<InputValue> {
    let type_ref = match kind {
        FieldKind::Relation { .. } => return None,
        FieldKind::Pointer { .. } => TypeRef::named(TypeRef::ID),
        FieldKind::GeoPoint => TypeRef::named(GEO_POINT_INPUT),
        kind => TypeRef::named(input_scalar(kind)),
    };
    Some(InputValue::new(name, type_ref).description(format!("Input for {name} ({kind})")))
}

/// Map one field definition to an update-input field. Same shape as
/// [`input_field`] with its own description verb.
pub fn update_input_field(name: &str, kind: &FieldKind) -> Option<InputValue> {
    let value = input_field(name, kind)?;
    Some(value.description(format!("Update input for {name} ({kind})")))
}

/// Map one field definition to a filter field. Relations, free-form values
/// and geographic points are not filterable and map to `None`.
pub fn filter_field(name: &str, kind: &FieldKind) -> Option<InputValue> {
    let constraint = match kind {
        FieldKind::String | FieldKind::File => STRING_CONSTRAINT,
        FieldKind::Number => NUMBER_CONSTRAINT,
        FieldKind::Boolean => BOOLEAN_CONSTRAINT,
        FieldKind::Date => DATE_CONSTRAINT,
        FieldKind::Pointer { .. } => ID_CONSTRAINT,
        FieldKind::Relation { .. }
        | FieldKind::Object
        | FieldKind::Array
        | FieldKind::GeoPoint => return None,
    };
    Some(
        InputValue::new(name, TypeRef::named(constraint))
            .description(format!("Filter for {name} ({kind})")),
    )
}

fn output_scalar(kind: &FieldKind) -> &'static str {
    match kind {
        FieldKind::String => TypeRef::STRING,
        FieldKind::Number => TypeRef::FLOAT,
        FieldKind::Boolean => TypeRef::BOOLEAN,
        FieldKind::Date => DATE_SCALAR,
        FieldKind::File => FILE_SCALAR,
        FieldKind::Object => OBJECT_SCALAR,
        FieldKind::Array => ARRAY_SCALAR,
        FieldKind::GeoPoint => GEO_POINT_TYPE,
        FieldKind::Pointer { .. } | FieldKind::Relation { .. } => {
            unreachable!("reference kinds are mapped by name")
        }
    }
}

fn input_scalar(kind: &FieldKind) -> &'static str {
    match kind {
        FieldKind::GeoPoint | FieldKind::Pointer { .. } | FieldKind::Relation { .. } => {
            unreachable!("reference kinds are mapped by name")
        }
        kind => output_scalar(kind),
    }
}

/// Referenced classes must exist in the schema. A dangling reference is a
/// schema-loader bug, so the field is dropped with a warning rather than
/// poisoning the whole schema.
fn check_target(class: &str, field: &str, target: &str, db: &DatabaseSchema) -> Option<()> {
    if db.class(target).is_some() {
        Some(())
    } else {
        warn!(class, field, target, "unknown target class, omitting field");
        None
    }
}

/// Build the derived dynamic types of one class and append them to `types`.
pub fn build_bundle_types(bundle: &TypeBundle, db: &DatabaseSchema, types: &mut Vec<Type>) {
    let class = &bundle.class;
    let user_fields = || {
        class
            .fields()
            .filter(|(name, _)| !RESERVED_FIELDS.contains(name))
    };

    // Object type. The reserved identifier and timestamp fields always win
    // over same-named class fields.
    let mut object = Object::new(&bundle.object_type)
        .description(format!("The {} class", bundle.display_name))
        .implement(NODE_INTERFACE)
        .field(
            Field::new(
                GLOBAL_ID_FIELD,
                TypeRef::named_nn(TypeRef::ID),
                resolvers::global_id,
            )
            .description("The globally unique id of the object"),
        )
        .field(Field::new(
            OBJECT_ID_FIELD,
            TypeRef::named_nn(TypeRef::ID),
            resolvers::make_field_resolver(OBJECT_ID_FIELD.to_owned(), FieldKind::String),
        ))
        .field(Field::new(
            CREATED_AT_FIELD,
            TypeRef::named_nn(DATE_SCALAR),
            resolvers::make_field_resolver(CREATED_AT_FIELD.to_owned(), FieldKind::Date),
        ))
        .field(Field::new(
            UPDATED_AT_FIELD,
            TypeRef::named_nn(DATE_SCALAR),
            resolvers::make_field_resolver(UPDATED_AT_FIELD.to_owned(), FieldKind::Date),
        ));
    if class.name() == USER_CLASS {
        object = object.field(Field::new(
            SESSION_TOKEN_FIELD,
            TypeRef::named(TypeRef::STRING),
            resolvers::make_field_resolver(SESSION_TOKEN_FIELD.to_owned(), FieldKind::String),
        ));
    }
    for (name, kind) in user_fields() {
        if let Some(field) = output_field(class.name(), name, kind, db) {
            object = object.field(field);
        }
    }
    types.push(object.into());

    // Filter input. The timestamp constraints keep the type non-empty even
    // for a class without filterable fields.
    let mut where_input = InputObject::new(&bundle.where_input_type)
        .description(format!("Conditions to filter {} objects", bundle.display_name))
        .field(InputValue::new(
            CREATED_AT_FIELD,
            TypeRef::named(DATE_CONSTRAINT),
        ))
        .field(InputValue::new(
            UPDATED_AT_FIELD,
            TypeRef::named(DATE_CONSTRAINT),
        ));
    for (name, kind) in user_fields() {
        if let Some(value) = filter_field(name, kind) {
            where_input = where_input.field(value);
        }
    }
    types.push(where_input.into());

    // Create and update inputs.
    let mut input = InputObject::new(&bundle.input_type)
        .description(format!("Fields of a new {} object", bundle.display_name));
    for (name, kind) in user_fields() {
        if let Some(value) = input_field(name, kind) {
            input = input.field(value);
        }
    }
    input = input.field(InputValue::new(
        CLIENT_MUTATION_ID_FIELD,
        TypeRef::named(TypeRef::STRING),
    ));
    types.push(input.into());

    let mut update_input = InputObject::new(&bundle.update_input_type)
        .description(format!("Partial update of a {} object", bundle.display_name))
        .field(InputValue::new(GLOBAL_ID_FIELD, TypeRef::named(TypeRef::ID)))
        .field(InputValue::new(OBJECT_ID_FIELD, TypeRef::named(TypeRef::ID)));
    for (name, kind) in user_fields() {
        if let Some(value) = update_input_field(name, kind) {
            update_input = update_input.field(value);
        }
    }
    update_input = update_input.field(InputValue::new(
        CLIENT_MUTATION_ID_FIELD,
        TypeRef::named(TypeRef::STRING),
    ));
    types.push(update_input.into());

    // Connection pair.
    let connection = Object::new(&bundle.connection_type)
        .description(format!("A page of {} objects", bundle.display_name))
        .field(Field::new(
            "edges",
            TypeRef::named_nn_list_nn(&bundle.edge_type),
            resolvers::connection_edges,
        ))
        .field(Field::new(
            "nodes",
            TypeRef::named_nn_list_nn(&bundle.object_type),
            resolvers::connection_nodes,
        ))
        .field(Field::new(
            "pageInfo",
            TypeRef::named_nn(PAGE_INFO_TYPE),
            resolvers::connection_page_info,
        ))
        .field(Field::new(
            "count",
            TypeRef::named_nn(TypeRef::INT),
            resolvers::connection_count,
        ));
    types.push(connection.into());

    let edge = Object::new(&bundle.edge_type)
        .field(Field::new(
            "node",
            TypeRef::named_nn(&bundle.object_type),
            resolvers::edge_node,
        ))
        .field(Field::new(
            "cursor",
            TypeRef::named_nn(TypeRef::STRING),
            resolvers::edge_cursor,
        ));
    types.push(edge.into());

    // Mutation payload.
    let payload = Object::new(&bundle.payload_type)
        .field(Field::new(
            "object",
            TypeRef::named(&bundle.object_type),
            resolvers::payload_object,
        ))
        .field(Field::new(
            CLIENT_MUTATION_ID_FIELD,
            TypeRef::named(TypeRef::STRING),
            resolvers::payload_client_mutation_id,
        ));
    types.push(payload.into());
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::init_logging;

    fn pointer(target: &str) -> FieldKind {
        FieldKind::Pointer {
            target_class: target.into(),
        }
    }

    fn relation(target: &str) -> FieldKind {
        FieldKind::Relation {
            target_class: target.into(),
        }
    }

    #[test]
    fn test_bundle_names() {
        init_logging();
        let bundle = TypeBundle::new(Arc::new(ClassSchema::new("_User")));
        assert_eq!(bundle.display_name, "User");
        assert_eq!(bundle.object_type, "User");
        assert_eq!(bundle.input_type, "UserInput");
        assert_eq!(bundle.update_input_type, "UpdateUserInput");
        assert_eq!(bundle.where_input_type, "UserWhereInput");
        assert_eq!(bundle.connection_type, "UserConnection");
        assert_eq!(bundle.edge_type, "UserEdge");
        assert_eq!(bundle.payload_type, "UserPayload");
    }

    #[test]
    fn test_relations_are_output_only() {
        init_logging();
        assert!(input_field("likes", &relation("_User")).is_none());
        assert!(update_input_field("likes", &relation("_User")).is_none());
        assert!(filter_field("likes", &relation("_User")).is_none());

        let db = DatabaseSchema::default().with_class(ClassSchema::new("_User"));
        assert!(output_field("Post", "likes", &relation("_User"), &db).is_some());
    }

    #[test]
    fn test_unknown_target_class_is_omitted() {
        init_logging();
        let db = DatabaseSchema::default();
        assert!(output_field("Post", "author", &pointer("Ghost"), &db).is_none());
        // Input mapping does not consult the schema, only the kind.
        assert!(input_field("author", &pointer("Ghost")).is_some());
    }
}
