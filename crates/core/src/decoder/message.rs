use protobuf::MessageDyn;
use protobuf::reflect::{MessageRef, ReflectFieldRef, ReflectValueRef};

use super::DecodeError;
use crate::schema::{FieldDescriptor, FieldSelection, MessageSchema, SchemaRegistry};
use crate::tree::{PropertyNode, Value};

/// Decodes one entry record into a dynamic message of `schema`'s type.
pub fn decode_entry(schema: &MessageSchema, bytes: &[u8]) -> Result<Box<dyn MessageDyn>, DecodeError> {
    Ok(schema.descriptor().parse_from_bytes(bytes)?)
}

/// Converts a decoded message into a property tree rooted at `id`.
///
/// Only fields present in the payload become nodes; defaults are added
/// later by `AddDefaults`. Repeated fields become containers with children
/// `"0"`, `"1"`, ...; map fields become containers keyed by the map key.
pub fn message_to_node(
    registry: &SchemaRegistry,
    schema: &MessageSchema,
    message: &dyn MessageDyn,
    id: &str,
    name: &str,
    selection: &FieldSelection,
) -> PropertyNode {
    let mut root = PropertyNode::root(id, name);
    fill_message(&mut root, registry, schema, message, selection);
    root
}

fn fill_message(
    node: &mut PropertyNode,
    registry: &SchemaRegistry,
    schema: &MessageSchema,
    message: &dyn MessageDyn,
    selection: &FieldSelection,
) {
    for field in schema.fields() {
        if !selection.includes(&field.name) {
            continue;
        }
        let id = node.child_id(&field.name);
        match field.proto.get_reflect(message) {
            ReflectFieldRef::Optional(opt) => {
                if let Some(value) = opt.value() {
                    node.add_or_replace_child(convert(registry, field, id, &field.name, value));
                }
            }
            ReflectFieldRef::Repeated(repeated) => {
                if repeated.is_empty() {
                    continue;
                }
                let mut container = PropertyNode::decoded(id, &field.name, None);
                for i in 0..repeated.len() {
                    let name = i.to_string();
                    let child = convert(registry, field, container.child_id(&name), &name, repeated.get(i));
                    container.add_or_replace_child(child);
                }
                node.add_or_replace_child(container);
            }
            ReflectFieldRef::Map(map) => {
                if map.is_empty() {
                    continue;
                }
                let mut entries: Vec<(String, ReflectValueRef)> = map
                    .into_iter()
                    .map(|(k, v)| (scalar_of(&k).map(|s| s.to_string()).unwrap_or_default(), v))
                    .collect();
                entries.sort_by(|a, b| a.0.cmp(&b.0));
                let mut container = PropertyNode::decoded(id, &field.name, None);
                for (key, value) in entries {
                    let child = convert(registry, field, container.child_id(&key), &key, value);
                    container.add_or_replace_child(child);
                }
                node.add_or_replace_child(container);
            }
        }
    }
}

fn convert(
    registry: &SchemaRegistry,
    field: &FieldDescriptor,
    id: String,
    name: &str,
    value: ReflectValueRef,
) -> PropertyNode {
    if let ReflectValueRef::Message(m) = &value {
        let mut node = PropertyNode::decoded(id, name, None);
        if let Some(nested) = registry.nested(field) {
            fill_message(&mut node, registry, nested, &**m, &FieldSelection::All);
        }
        return node;
    }
    PropertyNode::decoded(id, name, scalar_of(&value))
}

/// Scalar payload of a reflected value; `None` for messages.
pub fn scalar_of(value: &ReflectValueRef) -> Option<Value> {
    Some(match value {
        ReflectValueRef::U32(v) => Value::UInt(u64::from(*v)),
        ReflectValueRef::U64(v) => Value::UInt(*v),
        ReflectValueRef::I32(v) => Value::Int(i64::from(*v)),
        ReflectValueRef::I64(v) => Value::Int(*v),
        ReflectValueRef::F32(v) => Value::Float(f64::from(*v)),
        ReflectValueRef::F64(v) => Value::Float(*v),
        ReflectValueRef::Bool(v) => Value::Bool(*v),
        ReflectValueRef::String(s) => Value::String((*s).to_string()),
        ReflectValueRef::Bytes(b) => Value::Bytes(b.to_vec()),
        ReflectValueRef::Enum(_, n) => Value::Int(i64::from(*n)),
        ReflectValueRef::Message(_) => return None,
    })
}

/// A singular field's scalar value, if present.
pub fn field_value(schema: &MessageSchema, message: &dyn MessageDyn, name: &str) -> Option<Value> {
    let field = schema.field(name)?;
    match field.proto.get_reflect(message) {
        ReflectFieldRef::Optional(opt) => opt.value().as_ref().and_then(scalar_of),
        _ => None,
    }
}

/// A singular message-typed field, if present.
pub fn field_message<'a>(
    schema: &MessageSchema,
    message: &'a dyn MessageDyn,
    name: &str,
) -> Option<MessageRef<'a>> {
    let field = schema.field(name)?;
    match field.proto.get_reflect(message) {
        ReflectFieldRef::Optional(opt) => match opt.value()? {
            ReflectValueRef::Message(m) => Some(m),
            _ => None,
        },
        _ => None,
    }
}

/// Scalar elements of a repeated field, in wire order.
pub fn repeated_values(schema: &MessageSchema, message: &dyn MessageDyn, name: &str) -> Vec<Value> {
    let Some(field) = schema.field(name) else {
        return Vec::new();
    };
    match field.proto.get_reflect(message) {
        ReflectFieldRef::Repeated(repeated) => (0..repeated.len())
            .filter_map(|i| scalar_of(&repeated.get(i)))
            .collect(),
        _ => Vec::new(),
    }
}

/// Elements of a repeated message-typed field, in wire order.
pub fn repeated_messages<'a>(
    schema: &MessageSchema,
    message: &'a dyn MessageDyn,
    name: &str,
) -> Vec<MessageRef<'a>> {
    let Some(field) = schema.field(name) else {
        return Vec::new();
    };
    match field.proto.get_reflect(message) {
        ReflectFieldRef::Repeated(repeated) => (0..repeated.len())
            .filter_map(|i| match repeated.get(i) {
                ReflectValueRef::Message(m) => Some(m),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}
