use std::collections::BTreeMap;
use std::sync::Arc;

use super::Operation;
use super::formatters::{DefaultFormatter, EmptyArrayFormatter, EnumFormatter, Shape};
use crate::schema::{FieldDescriptor, MessageSchema, SchemaRegistry};
use crate::tree::{PropertyFormatter, PropertyNode};

/// Attaches display formatters to every node below the root.
///
/// Priority per node: a custom formatter registered for the field name,
/// then an already attached formatter, then the enum names from the schema,
/// then a recognised composite [`Shape`], then `[]` for an empty repeated
/// field, then the default stringifier for leaves with a value. Composite
/// nodes with no recognised shape are left without a formatter.
#[derive(Debug, Clone, Default)]
pub struct SetFormatters {
    schema: Option<(Arc<SchemaRegistry>, String)>,
    custom: BTreeMap<String, Arc<dyn PropertyFormatter>>,
}

impl SetFormatters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads enum names and repeated-ness from the schema of `message`.
    pub fn with_schema(mut self, registry: Arc<SchemaRegistry>, message: impl Into<String>) -> Self {
        self.schema = Some((registry, message.into()));
        self
    }

    pub fn with_custom(mut self, field: impl Into<String>, formatter: Arc<dyn PropertyFormatter>) -> Self {
        self.custom.insert(field.into(), formatter);
        self
    }

    fn visit_message(&self, node: &mut PropertyNode, registry: Option<&SchemaRegistry>, schema: Option<&MessageSchema>) {
        for child in node.children_mut() {
            let field = schema.and_then(|s| s.field(child.name()));
            self.visit_field(child, registry, field);
        }
    }

    fn visit_field(&self, node: &mut PropertyNode, registry: Option<&SchemaRegistry>, field: Option<&FieldDescriptor>) {
        let nested = registry.zip(field).and_then(|(r, f)| r.nested(f)).map(Arc::as_ref);
        if field.is_some_and(|f| f.is_repeated) {
            if let Some(formatter) = self.pick(node, None, true) {
                node.set_formatter(Some(formatter));
            }
            for element in node.children_mut() {
                if let Some(formatter) = self.pick(element, field, false) {
                    element.set_formatter(Some(formatter));
                }
                self.visit_message(element, registry, nested);
            }
            return;
        }
        if let Some(formatter) = self.pick(node, field, false) {
            node.set_formatter(Some(formatter));
        }
        self.visit_message(node, registry, nested);
    }

    fn pick(&self, node: &PropertyNode, field: Option<&FieldDescriptor>, repeated: bool) -> Option<Arc<dyn PropertyFormatter>> {
        if let Some(custom) = self.custom.get(node.name()) {
            return Some(Arc::clone(custom));
        }
        if node.formatter().is_some() {
            return None;
        }
        if repeated {
            return node
                .is_placeholder()
                .then(|| Arc::new(EmptyArrayFormatter) as Arc<dyn PropertyFormatter>);
        }
        if let Some(info) = field.and_then(FieldDescriptor::enum_info) {
            return Some(Arc::new(EnumFormatter(Arc::new(info.clone()))));
        }
        if node.has_children() {
            return Shape::detect(node).map(Shape::formatter);
        }
        node.value()
            .map(|_| Arc::new(DefaultFormatter) as Arc<dyn PropertyFormatter>)
    }
}

impl Operation for SetFormatters {
    fn apply(&self, node: &mut PropertyNode) {
        let (registry, schema) = match &self.schema {
            Some((registry, message)) => (Some(registry.as_ref()), registry.fields_of(message).map(Arc::as_ref)),
            None => (None, None),
        };
        self.visit_message(node, registry, schema);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::AddDefaults;
    use crate::schema::FieldSelection;
    use crate::testing;
    use crate::tree::Value;

    #[derive(Debug)]
    struct Fixed(&'static str);

    impl PropertyFormatter for Fixed {
        fn format(&self, _node: &PropertyNode) -> String {
            self.0.to_string()
        }
    }

    fn layer() -> PropertyNode {
        let color = PropertyNode::decoded("l.color", "color", None)
            .with_leaf("r", 1.0)
            .with_leaf("g", 1.0)
            .with_leaf("b", 1.0)
            .with_leaf("a", 0.0);
        let bounds = PropertyNode::decoded("l.bounds", "bounds", None)
            .with_leaf("left", 0.0)
            .with_leaf("top", 0.0)
            .with_leaf("right", 1.0)
            .with_leaf("bottom", 1.0);
        let odd = PropertyNode::decoded("l.odd", "odd", None).with_leaf("q", 1i64);
        PropertyNode::root("l", "l")
            .with_leaf("z", 0.25)
            .with_leaf("hwcCompositionType", 2i64)
            .with_child(color)
            .with_child(bounds)
            .with_child(odd)
    }

    fn with_schema() -> SetFormatters {
        SetFormatters::new().with_schema(Arc::new(testing::registry()), testing::LAYER)
    }

    #[test]
    fn shapes_leaves_and_enums() {
        let mut node = layer();
        with_schema().apply(&mut node);
        let f = |n: &str| node.child_by_name(n).map(PropertyNode::formatted_value);
        assert_eq!(f("z").as_deref(), Some("0.250"));
        assert_eq!(f("hwcCompositionType").as_deref(), Some("DEVICE"));
        assert_eq!(f("color").as_deref(), Some("empty, alpha: 0"));
        assert_eq!(f("bounds").as_deref(), Some("(0, 0) - (1, 1)"));
        assert_eq!(f("odd").as_deref(), Some(""));
        let q = node.descendant(&["odd", "q"]).map(PropertyNode::formatted_value);
        assert_eq!(q.as_deref(), Some("1"));
    }

    #[test]
    fn enums_need_the_schema() {
        let mut node = layer();
        SetFormatters::new().apply(&mut node);
        let hwc = node.child_by_name("hwcCompositionType").map(PropertyNode::formatted_value);
        assert_eq!(hwc.as_deref(), Some("2"));
    }

    #[test]
    fn custom_formatters_win() {
        let mut node = layer();
        with_schema()
            .with_custom("bounds", Arc::new(Fixed("custom")))
            .apply(&mut node);
        let bounds = node.child_by_name("bounds").map(PropertyNode::formatted_value);
        assert_eq!(bounds.as_deref(), Some("custom"));
    }

    #[test]
    fn existing_formatters_are_kept() {
        let mut node = layer();
        if let Some(z) = node.child_by_name_mut("z") {
            z.set_formatter(Some(Arc::new(Fixed("kept"))));
        }
        with_schema().apply(&mut node);
        let z = node.child_by_name("z").map(PropertyNode::formatted_value);
        assert_eq!(z.as_deref(), Some("kept"));
    }

    #[test]
    fn empty_repeated_fields_show_brackets() {
        let reg = Arc::new(testing::registry());
        let mut node = PropertyNode::root("l", "l");
        AddDefaults::new(Arc::clone(&reg), testing::LAYER, FieldSelection::All).apply(&mut node);
        SetFormatters::new().with_schema(reg, testing::LAYER).apply(&mut node);

        let children = node.child_by_name("children").map(PropertyNode::formatted_value);
        assert_eq!(children.as_deref(), Some("[]"));
        // absent message: placeholder without a formatter
        let color = node.child_by_name("color").map(PropertyNode::formatted_value);
        assert_eq!(color.as_deref(), Some(""));
        assert_eq!(node.child_value("z"), Some(&Value::Int(0)));
        let z = node.child_by_name("z").map(PropertyNode::formatted_value);
        assert_eq!(z.as_deref(), Some("0"));
    }

    #[test]
    fn repeated_elements_use_element_type() {
        let rect = |i: &str, r: f64| {
            PropertyNode::decoded(format!("l.visibleRegion.rect.{i}"), i, None)
                .with_leaf("left", 0.0)
                .with_leaf("top", 0.0)
                .with_leaf("right", r)
                .with_leaf("bottom", r)
        };
        let region = PropertyNode::decoded("l.visibleRegion", "visibleRegion", None).with_child(
            PropertyNode::decoded("l.visibleRegion.rect", "rect", None)
                .with_child(rect("0", 2.0))
                .with_child(rect("1", 3.0)),
        );
        let mut node = PropertyNode::root("l", "l").with_child(region);
        with_schema().apply(&mut node);

        let region = node.child_by_name("visibleRegion").map(PropertyNode::formatted_value);
        assert_eq!(region.as_deref(), Some("SkRegion((0, 0, 2, 2), (0, 0, 3, 3))"));
        let second = node
            .descendant(&["visibleRegion", "rect", "1"])
            .map(PropertyNode::formatted_value);
        assert_eq!(second.as_deref(), Some("(0, 0) - (3, 3)"));
    }
}
