use std::collections::BTreeMap;
use std::sync::Arc;

use super::Operation;
use super::intdef::{IntDefMap, decompose};
use crate::schema::{MessageSchema, SchemaRegistry};
use crate::tree::{PropertyFormatter, PropertyNode, Value};

/// Shows integer flag fields as `"FLAG_A | FLAG_B | 16"`.
///
/// Runs after [`SetFormatters`](super::SetFormatters) and replaces the
/// formatter of every bound integer field; the raw value is unchanged.
#[derive(Debug, Clone)]
pub struct TranslateIntDef {
    registry: Arc<SchemaRegistry>,
    message: String,
    intdefs: Arc<IntDefMap>,
}

impl TranslateIntDef {
    pub fn new(registry: Arc<SchemaRegistry>, message: impl Into<String>, intdefs: Arc<IntDefMap>) -> Self {
        Self {
            registry,
            message: message.into(),
            intdefs,
        }
    }

    fn visit(&self, node: &mut PropertyNode, schema: &MessageSchema) {
        for child in node.children_mut() {
            let Some(field) = schema.field(child.name()) else {
                continue;
            };
            if let Some(nested) = self.registry.nested(field) {
                if field.is_repeated {
                    for element in child.children_mut() {
                        self.visit(element, nested);
                    }
                } else {
                    self.visit(child, nested);
                }
                continue;
            }
            if !field.is_integer() {
                continue;
            }
            let Some(flags) = self.intdefs.dictionary_for(schema, field) else {
                continue;
            };
            let formatter: Arc<dyn PropertyFormatter> = Arc::new(IntDefFormatter { flags });
            if field.is_repeated {
                for element in child.children_mut() {
                    element.set_formatter(Some(Arc::clone(&formatter)));
                }
            } else if child.value().is_some() {
                child.set_formatter(Some(formatter));
            }
        }
    }
}

impl Operation for TranslateIntDef {
    fn apply(&self, node: &mut PropertyNode) {
        if let Some(schema) = self.registry.fields_of(&self.message) {
            self.visit(node, schema);
        }
    }
}

#[derive(Debug)]
pub struct IntDefFormatter {
    flags: Arc<BTreeMap<u64, String>>,
}

impl PropertyFormatter for IntDefFormatter {
    fn format(&self, node: &PropertyNode) -> String {
        let bits = match node.value() {
            // 32-bit fields decode sign-extended; translate their own bits.
            Some(Value::Int(v)) if *v < 0 && *v >= i64::from(i32::MIN) => u64::from(*v as i32 as u32),
            Some(v) => match v.as_bits() {
                Some(bits) => bits,
                None => return v.to_string(),
            },
            None => return String::new(),
        };
        decompose(bits, &self.flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::SetFormatters;
    use crate::testing;

    fn layer(flags: u64) -> PropertyNode {
        let input = PropertyNode::decoded("l.inputWindowInfo", "inputWindowInfo", None)
            .with_leaf("inputConfig", 3u64)
            .with_leaf("layoutParamsFlags", 8u64);
        PropertyNode::root("l", "l")
            .with_leaf("flags", flags)
            .with_leaf("z", 3i64)
            .with_child(input)
    }

    fn intdefs() -> Arc<IntDefMap> {
        Arc::new(
            IntDefMap::default()
                .with_dictionary("LayerFlags", [(0x01, "HIDDEN"), (0x02, "OPAQUE")])
                .with_dictionary("InputConfig", [(1, "NO_INPUT_CHANNEL"), (4, "NOT_FOCUSABLE")])
                .with_dictionary("WindowFlags", [(8, "FLAG_NOT_FOCUSABLE")])
                .with_binding(Some("InputWindowInfoProto"), "inputConfig", "InputConfig")
                .with_binding(None, "layoutParamsFlags", "WindowFlags"),
        )
    }

    fn translate(node: &mut PropertyNode) {
        let reg = Arc::new(testing::registry());
        SetFormatters::new()
            .with_schema(Arc::clone(&reg), testing::LAYER)
            .apply(node);
        TranslateIntDef::new(reg, testing::LAYER, intdefs()).apply(node);
    }

    #[test]
    fn typedef_annotation_selects_dictionary() {
        let mut node = layer(3);
        translate(&mut node);
        let flags = node.child_by_name("flags").expect("flags");
        assert_eq!(flags.formatted_value(), "OPAQUE | HIDDEN");
        assert_eq!(flags.value(), Some(&Value::UInt(3)));
    }

    #[test]
    fn scoped_and_unscoped_bindings() {
        let mut node = layer(0);
        translate(&mut node);
        let config = node.descendant(&["inputWindowInfo", "inputConfig"]).expect("config");
        assert_eq!(config.formatted_value(), "NO_INPUT_CHANNEL | 2");
        let lp = node.descendant(&["inputWindowInfo", "layoutParamsFlags"]).expect("flags");
        assert_eq!(lp.formatted_value(), "FLAG_NOT_FOCUSABLE");
    }

    #[test]
    fn unbound_fields_keep_their_formatter() {
        let mut node = layer(0);
        translate(&mut node);
        assert_eq!(node.child_by_name("z").map(PropertyNode::formatted_value).as_deref(), Some("3"));
        assert_eq!(node.child_by_name("flags").map(PropertyNode::formatted_value).as_deref(), Some("0"));
    }

    #[test]
    fn negative_int32_values_use_low_bits() {
        let flags = Arc::new([(0x8000_0000u64, "TOP".to_string()), (1, "LOW".to_string())].into_iter().collect());
        let f = IntDefFormatter { flags };
        let node = PropertyNode::decoded("x", "x", Some(Value::Int(i64::from(i32::MIN) + 1)));
        assert_eq!(f.format(&node), "TOP | LOW");
    }
}
