//! Shared GraphQL types every generated class schema relies on.
//!
//! These are registered once per schema, before any class bundle: the custom
//! scalars backing the non-structured field kinds, the `GeoPoint` object and
//! input pair, the per-scalar constraint inputs used by filter types, the
//! Relay `PageInfo` object and the `Node` interface implemented by every
//! generated class type.

use super::dynamic::{
    Field, FieldFuture, FieldValue, InputObject, InputValue, Interface, InterfaceField, Object,
    Scalar, Type, TypeRef,
};

/// Type name of the date scalar (ISO-8601 strings).
pub const DATE_SCALAR: &str = "Date";
/// Type name of the file scalar (opaque file descriptors).
pub const FILE_SCALAR: &str = "File";
/// Type name of the free-form object scalar.
pub const OBJECT_SCALAR: &str = "Object";
/// Type name of the free-form array scalar.
pub const ARRAY_SCALAR: &str = "Array";
/// Type name of the geographic point output object.
pub const GEO_POINT_TYPE: &str = "GeoPoint";
/// Type name of the geographic point input.
pub const GEO_POINT_INPUT: &str = "GeoPointInput";
/// Type name of the Relay pagination metadata object.
pub const PAGE_INFO_TYPE: &str = "PageInfo";
/// Type name of the interface implemented by every generated class type.
pub const NODE_INTERFACE: &str = "Node";

/// Constraint input names, one per comparable scalar.
pub const ID_CONSTRAINT: &str = "IdConstraint";
pub const STRING_CONSTRAINT: &str = "StringConstraint";
pub const NUMBER_CONSTRAINT: &str = "NumberConstraint";
pub const BOOLEAN_CONSTRAINT: &str = "BooleanConstraint";
pub const DATE_CONSTRAINT: &str = "DateConstraint";

/// A resolved geographic point, the parent value of [`GEO_POINT_TYPE`] fields.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoPointValue {
    pub latitude: f64,
    pub longitude: f64,
}

/// The parent value of the [`PAGE_INFO_TYPE`] object.
#[derive(Clone, Debug, Default)]
pub struct PageInfoValue {
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub start_cursor: Option<String>,
    pub end_cursor: Option<String>,
}

/// Register the shared primitive types.
pub fn register(types: &mut Vec<Type>) {
    for (name, description) in [
        (DATE_SCALAR, "An ISO-8601 encoded date"),
        (FILE_SCALAR, "An opaque reference to a stored file"),
        (OBJECT_SCALAR, "An arbitrary JSON object"),
        (ARRAY_SCALAR, "An arbitrary JSON array"),
    ] {
        types.push(Scalar::new(name).description(description).into());
    }

    types.push(geo_point().into());
    types.push(geo_point_input().into());
    types.push(page_info().into());
    types.push(node_interface().into());

    let float = || TypeRef::named(TypeRef::FLOAT);
    types.push(constraint_input(ID_CONSTRAINT, || TypeRef::named(TypeRef::ID), false).into());
    types
        .push(constraint_input(STRING_CONSTRAINT, || TypeRef::named(TypeRef::STRING), true).into());
    types.push(constraint_input(NUMBER_CONSTRAINT, float, true).into());
    types.push(
        constraint_input(BOOLEAN_CONSTRAINT, || TypeRef::named(TypeRef::BOOLEAN), false).into(),
    );
    types.push(constraint_input(DATE_CONSTRAINT, || TypeRef::named(DATE_SCALAR), true).into());
}

/// The constraint input for one scalar: equality operators, `exists`, and the
/// ordering operators when the scalar is comparable.
fn constraint_input(name: &str, operand: impl Fn() -> TypeRef, ordered: bool) -> InputObject {
    let mut input = InputObject::new(name)
        .description(format!("Conditions on a {name} field"))
        .field(InputValue::new("eq", operand()))
        .field(InputValue::new("ne", operand()));
    if ordered {
        for op in ["lt", "lte", "gt", "gte"] {
            input = input.field(InputValue::new(op, operand()));
        }
    }
    input.field(InputValue::new("exists", TypeRef::named(TypeRef::BOOLEAN)))
}

fn geo_point() -> Object {
    Object::new(GEO_POINT_TYPE)
        .description("A geographic point expressed as latitude and longitude")
        .field(Field::new(
            "latitude",
            TypeRef::named_nn(TypeRef::FLOAT),
            |ctx| {
                FieldFuture::new(async move {
                    let point = ctx.parent_value.try_downcast_ref::<GeoPointValue>()?;
                    Ok(Some(FieldValue::value(point.latitude)))
                })
            },
        ))
        .field(Field::new(
            "longitude",
            TypeRef::named_nn(TypeRef::FLOAT),
            |ctx| {
                FieldFuture::new(async move {
                    let point = ctx.parent_value.try_downcast_ref::<GeoPointValue>()?;
                    Ok(Some(FieldValue::value(point.longitude)))
                })
            },
        ))
}

fn geo_point_input() -> InputObject {
    InputObject::new(GEO_POINT_INPUT)
        .description("A geographic point expressed as latitude and longitude")
        .field(InputValue::new("latitude", TypeRef::named_nn(TypeRef::FLOAT)))
        .field(InputValue::new("longitude", TypeRef::named_nn(TypeRef::FLOAT)))
}

fn page_info() -> Object {
    let bool_field = |name: &str, get: fn(&PageInfoValue) -> bool| {
        Field::new(name, TypeRef::named_nn(TypeRef::BOOLEAN), move |ctx| {
            FieldFuture::new(async move {
                let info = ctx.parent_value.try_downcast_ref::<PageInfoValue>()?;
                Ok(Some(FieldValue::value(get(info))))
            })
        })
    };
    let cursor_field = |name: &str, get: fn(&PageInfoValue) -> Option<String>| {
        Field::new(name, TypeRef::named(TypeRef::STRING), move |ctx| {
            FieldFuture::new(async move {
                let info = ctx.parent_value.try_downcast_ref::<PageInfoValue>()?;
                Ok(get(info).map(FieldValue::value))
            })
        })
    };
    Object::new(PAGE_INFO_TYPE)
        .description("Information about pagination in a connection")
        .field(bool_field("hasNextPage", |info| info.has_next_page))
        .field(bool_field("hasPreviousPage", |info| info.has_previous_page))
        .field(cursor_field("startCursor", |info| info.start_cursor.clone()))
        .field(cursor_field("endCursor", |info| info.end_cursor.clone()))
}

fn node_interface() -> Interface {
    Interface::new(NODE_INTERFACE)
        .description("An object with a globally unique identifier")
        .field(InterfaceField::new("id", TypeRef::named_nn(TypeRef::ID)))
}
