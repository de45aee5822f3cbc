//! Post-build passes that annotate a [`HierarchyTree`](crate::hierarchy::HierarchyTree).

pub mod layer_rects;
pub mod rects;
pub mod visibility;

use std::sync::Arc;

use winscope_protocol::Rect;

use crate::hierarchy::{HierarchyTree, NodeIndex};
use crate::operations::formatters::{DefaultFormatter, ListFormatter, transform_type};
use crate::tree::{PropertyNode, Value};

pub use layer_rects::LayerRectsComputation;
pub use rects::RectsComputation;
pub use visibility::VisibilityComputation;

fn number(node: &PropertyNode, name: &str) -> Option<f64> {
    node.child_value(name).and_then(Value::as_f64)
}

fn number_at(node: &PropertyNode, path: &[&str]) -> Option<f64> {
    node.descendant(path)?.value()?.as_f64()
}

/// `left/top/right/bottom` children as a rect; `None` for a placeholder.
fn rect_of(node: &PropertyNode) -> Option<Rect> {
    if !node.has_children() {
        return None;
    }
    let side = |n| number(node, n).unwrap_or(0.0);
    Some(Rect::from_ltrb(side("left"), side("top"), side("right"), side("bottom")))
}

/// Every child holds zero (or nothing).
fn is_all_zero(node: &PropertyNode) -> bool {
    node.all_children()
        .iter()
        .all(|c| c.value().and_then(Value::as_f64).is_none_or(|v| v == 0.0))
}

fn transform_bits(node: &PropertyNode) -> u64 {
    node.descendant(&["transform", "type"])
        .and_then(PropertyNode::value)
        .and_then(Value::as_bits)
        .unwrap_or(0)
}

fn is_simple_rotation(bits: u64) -> bool {
    bits & transform_type::ROT_INVALID == 0
}

/// Transforms without scale or an invalid rotation are pure rotations and
/// always invertible; otherwise the 2x2 matrix needs a non-zero determinant.
fn is_valid_transform(transform: &PropertyNode) -> bool {
    let bits = transform
        .child_value("type")
        .and_then(Value::as_bits)
        .unwrap_or(0);
    if bits & (transform_type::SCALE | transform_type::ROT_INVALID) == 0 {
        return true;
    }
    let m = |n| number(transform, n).unwrap_or(0.0);
    m("dsdx") * m("dtdy") != m("dtdx") * m("dsdy")
}

fn z_of(tree: &HierarchyTree, index: NodeIndex) -> f64 {
    number(tree.eager(index), "z").unwrap_or(0.0)
}

/// Layers below the root, parents before children, siblings from the
/// highest Z down.
pub(crate) fn z_order_top_down(tree: &HierarchyTree) -> Vec<NodeIndex> {
    let mut order = Vec::with_capacity(tree.len());
    let mut stack: Vec<NodeIndex> = sorted_by_z(tree, tree.children(tree.root()));
    stack.reverse();
    while let Some(index) = stack.pop() {
        order.push(index);
        let mut children = sorted_by_z(tree, tree.children(index));
        children.reverse();
        stack.extend(children);
    }
    order
}

fn sorted_by_z(tree: &HierarchyTree, nodes: &[NodeIndex]) -> Vec<NodeIndex> {
    let mut sorted = nodes.to_vec();
    sorted.sort_by(|&a, &b| z_of(tree, b).total_cmp(&z_of(tree, a)));
    sorted
}

/// Calculated scalar property with the default stringifier.
fn calculated_leaf(owner_id: &str, name: &str, value: impl Into<Value>) -> PropertyNode {
    let mut node = PropertyNode::calculated(format!("{owner_id}.{name}"), name, Some(value.into()));
    node.set_formatter(Some(Arc::new(DefaultFormatter)));
    node
}

/// Calculated list property with elements `"0"`, `"1"`, ...
fn calculated_list<V: Into<Value>>(owner_id: &str, name: &str, items: impl IntoIterator<Item = V>) -> PropertyNode {
    let mut list = PropertyNode::calculated(format!("{owner_id}.{name}"), name, None);
    for (i, item) in items.into_iter().enumerate() {
        let element = calculated_leaf(list.id(), &i.to_string(), item);
        list.add_or_replace_child(element);
    }
    list.set_formatter(Some(Arc::new(ListFormatter)));
    list
}
