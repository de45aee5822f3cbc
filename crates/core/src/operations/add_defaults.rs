use std::sync::Arc;

use super::Operation;
use crate::schema::{FieldDescriptor, FieldSelection, MessageSchema, SchemaRegistry};
use crate::tree::{PropertyNode, PropertySource};

/// Adds schema defaults for fields missing from a decoded message.
///
/// A field gets a [`PropertySource::Default`] node when it is absent, holds
/// exactly the schema default, or is an empty placeholder. Message-typed
/// defaults are empty placeholders and are not expanded further, so
/// recursive schemas terminate. Present nested messages (including repeated
/// and map elements) are filled in with all of their fields.
#[derive(Debug, Clone)]
pub struct AddDefaults {
    registry: Arc<SchemaRegistry>,
    message: String,
    selection: FieldSelection,
}

impl AddDefaults {
    pub fn new(registry: Arc<SchemaRegistry>, message: impl Into<String>, selection: FieldSelection) -> Self {
        Self {
            registry,
            message: message.into(),
            selection,
        }
    }
}

impl Operation for AddDefaults {
    fn apply(&self, node: &mut PropertyNode) {
        let Some(schema) = self.registry.fields_of(&self.message) else {
            return;
        };
        fill(node, &self.registry, schema, &self.selection);
    }
}

fn fill(node: &mut PropertyNode, registry: &SchemaRegistry, schema: &MessageSchema, selection: &FieldSelection) {
    for field in schema.fields() {
        if !selection.includes(&field.name) {
            continue;
        }
        let existing = node.child_by_name(&field.name);
        // already defaulted, possibly as an unexpanded message placeholder
        if existing.is_some_and(|child| child.source() == PropertySource::Default) {
            continue;
        }
        let keep = existing.is_some_and(|child| !needs_default(child, field));
        if !keep {
            let default = PropertyNode::new(
                node.child_id(&field.name),
                &field.name,
                PropertySource::Default,
                field.default_value.clone(),
            );
            node.add_or_replace_child(default);
            continue;
        }
        let (Some(nested), Some(child)) = (registry.nested(field), node.child_by_name_mut(&field.name)) else {
            continue;
        };
        if field.is_repeated {
            for element in child.children_mut() {
                fill(element, registry, nested, &FieldSelection::All);
            }
        } else {
            fill(child, registry, nested, &FieldSelection::All);
        }
    }
}

fn needs_default(child: &PropertyNode, field: &FieldDescriptor) -> bool {
    if child.is_placeholder() {
        return true;
    }
    !field.is_repeated && field.default_value.is_some() && child.value() == field.default_value.as_ref()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::decoder::{decode_entry, message_to_node};
    use crate::testing::{self, Proto};
    use crate::tree::Value;

    fn decoded(bytes: &[u8]) -> PropertyNode {
        let reg = testing::registry();
        let schema = reg.fields_of(testing::LAYER).expect("layer");
        let msg = decode_entry(schema, bytes).expect("decode");
        message_to_node(&reg, schema, &*msg, "1 L", "L", &FieldSelection::All)
    }

    fn op(selection: FieldSelection) -> AddDefaults {
        AddDefaults::new(Arc::new(testing::registry()), testing::LAYER, selection)
    }

    fn snapshot(node: &PropertyNode) -> Vec<(String, Option<Value>, PropertySource)> {
        let mut out = Vec::new();
        node.walk(&mut |path, n| out.push((path.to_string(), n.value().cloned(), n.source())));
        out
    }

    #[test]
    fn absent_fields_get_defaults() {
        let mut node = decoded(&Proto::default().int(1, 4).string(2, "L").into_bytes());
        op(FieldSelection::All).apply(&mut node);

        let z = node.child_by_name("z").expect("z");
        assert_eq!(z.value(), Some(&Value::Int(0)));
        assert_eq!(z.source(), PropertySource::Default);
        assert_eq!(node.child_value("parent"), Some(&Value::Int(-1)));
        assert_eq!(node.child_by_name("id").map(PropertyNode::source), Some(PropertySource::Decoded));
        // messages and repeated fields become empty placeholders
        assert!(node.child_by_name("color").is_some_and(PropertyNode::is_placeholder));
        assert!(node.child_by_name("children").is_some_and(PropertyNode::is_placeholder));
    }

    #[test]
    fn values_equal_to_default_are_marked_default() {
        let mut node = decoded(&Proto::default().int(10, 0).into_bytes());
        op(FieldSelection::All).apply(&mut node);
        assert_eq!(node.child_by_name("z").map(PropertyNode::source), Some(PropertySource::Default));
    }

    #[test]
    fn present_messages_are_filled() {
        let bytes = Proto::default()
            .message(20, Proto::default().float(4, 1.0))
            .message(7, Proto::default().message(2, Proto::default().int(3, 5)))
            .into_bytes();
        let mut node = decoded(&bytes);
        op(FieldSelection::All).apply(&mut node);

        let color = node.child_by_name("color").expect("color");
        assert_eq!(color.child_value("r"), Some(&Value::Float(0.0)));
        assert_eq!(color.child_value("a"), Some(&Value::Float(1.0)));
        let rect = node.descendant(&["visibleRegion", "rect", "0"]).expect("rect");
        assert_eq!(rect.child_value("left"), Some(&Value::Int(0)));
        assert_eq!(rect.child_value("right"), Some(&Value::Int(5)));
    }

    #[test]
    fn selection_restricts_fields() {
        let mut node = decoded(&[]);
        op(FieldSelection::Only(vec!["z".into()])).apply(&mut node);
        assert_eq!(node.all_children().len(), 1);

        let mut node = decoded(&[]);
        op(FieldSelection::Except(vec!["z".into()])).apply(&mut node);
        assert!(node.child_by_name("z").is_none());
        assert!(node.child_by_name("layerStack").is_some());
    }

    #[test]
    fn message_placeholders_stay_empty_when_reapplied() {
        let op = op(FieldSelection::All);
        let mut node = decoded(&[]);
        op.apply(&mut node);
        let count = node.node_count();
        op.apply(&mut node);
        assert_eq!(node.node_count(), count);
        for name in ["color", "crop", "transform", "destinationFrame"] {
            let child = node.child_by_name(name).expect(name);
            assert!(child.is_placeholder(), "{name} was expanded");
            assert_eq!(child.source(), PropertySource::Default);
        }
    }

    #[test]
    fn recursive_schema_terminates() {
        let reg = Arc::new(testing::registry());
        let mut node = PropertyNode::root("n", "n");
        AddDefaults::new(reg, testing::NODE, FieldSelection::All).apply(&mut node);
        assert!(node.child_by_name("child").is_some_and(PropertyNode::is_placeholder));
    }

    #[test]
    fn unknown_message_is_a_no_op() {
        let reg = Arc::new(testing::registry());
        let mut node = PropertyNode::root("n", "n");
        AddDefaults::new(reg, "no.such.Message", FieldSelection::All).apply(&mut node);
        assert_eq!(node.node_count(), 1);
    }

    fn layer_payload() -> impl Strategy<Value = Vec<u8>> {
        (
            prop::option::of(any::<i32>()),
            prop::option::of("[a-z]{0,6}"),
            prop::option::of(-3i32..3),
            prop::option::of(0u32..3),
            prop::option::of(any::<bool>()),
            prop::option::of((0f32..1.0, 0f32..1.0)),
        )
            .prop_map(|(id, name, z, stack, opaque, color)| {
                let mut p = Proto::default();
                if let Some(id) = id {
                    p = p.int(1, i64::from(id));
                }
                if let Some(name) = name {
                    p = p.string(2, &name);
                }
                if let Some(stack) = stack {
                    p = p.uint(9, u64::from(stack));
                }
                if let Some(z) = z {
                    p = p.int(10, i64::from(z));
                }
                if let Some(opaque) = opaque {
                    p = p.boolean(16, opaque);
                }
                if let Some((r, a)) = color {
                    p = p.message(20, Proto::default().float(1, r).float(4, a));
                }
                p.into_bytes()
            })
    }

    proptest! {
        #[test]
        fn applying_twice_is_idempotent(bytes in layer_payload()) {
            let op = op(FieldSelection::All);
            let mut node = decoded(&bytes);
            op.apply(&mut node);
            let once = snapshot(&node);
            op.apply(&mut node);
            prop_assert_eq!(once, snapshot(&node));
        }

        #[test]
        fn every_field_is_present_after_defaults(bytes in layer_payload()) {
            let reg = testing::registry();
            let schema = reg.fields_of(testing::LAYER).expect("layer");
            let before = decoded(&bytes);
            let mut node = before.clone();
            op(FieldSelection::All).apply(&mut node);
            for field in schema.fields() {
                let child = node.child_by_name(&field.name);
                prop_assert!(child.is_some(), "missing {}", field.name);
                let child = child.expect("checked");
                match before.child_value(&field.name) {
                    Some(v) => prop_assert_eq!(child.value(), Some(v)),
                    None => prop_assert_eq!(child.value(), field.default_value.as_ref()),
                }
            }
        }
    }
}
