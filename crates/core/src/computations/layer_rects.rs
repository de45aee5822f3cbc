use std::collections::HashMap;

use winscope_protocol::{Rect, TraceRect};

use super::{number, number_at, rect_of, z_order_top_down};
use crate::hierarchy::{Computation, HierarchyTree, NodeIndex};
use crate::operations::formatters::transform_type;
use crate::tree::{PropertyNode, Value};

/// Bounds surface-flinger reports for layers it could not size.
const DEFAULT_INVALID_BOUNDS: Rect = Rect {
    x: -50000.0,
    y: -50000.0,
    w: 100000.0,
    h: 100000.0,
};

/// Display and layer rects for a surface-flinger entry.
///
/// The root gets one rect per display. Each layer with screen bounds gets
/// one rect whose depth counts up from 1 per layer stack, back to front.
/// Invisible layers whose bounds are one of the placeholder "infinite"
/// rects are skipped. Must run after [`VisibilityComputation`](super::VisibilityComputation).
#[derive(Debug, Default)]
pub struct LayerRectsComputation;

impl Computation for LayerRectsComputation {
    fn execute_in_place(&self, tree: &mut HierarchyTree) {
        let root = tree.root();
        let displays: Vec<PropertyNode> = tree
            .eager(root)
            .child_by_name("displays")
            .map(|d| d.all_children().to_vec())
            .unwrap_or_default();
        let display_rects = make_display_rects(&displays);
        let invalid = invalid_bounds(&displays);

        let mut depth_by_stack: HashMap<i64, u32> = display_rects.iter().map(|d| (d.group_id, 1)).collect();
        let mut layer_rects = Vec::new();
        for index in z_order_top_down(tree).into_iter().rev() {
            let layer = tree.eager(index);
            let visible = match layer.child_value("isComputedVisible").and_then(Value::as_bool) {
                Some(v) => v,
                None => {
                    tracing::debug!(stable_id = tree.stable_id(index), "no computed visibility, assuming hidden");
                    tree.is_visible(index).unwrap_or(false)
                }
            };
            if !has_layer_rect(layer, visible, &invalid) {
                continue;
            }
            let stack = layer.child_value("layerStack").and_then(Value::as_i64).unwrap_or(0);
            let depth = depth_by_stack.entry(stack).or_insert(1);
            layer_rects.push((index, make_layer_rect(tree, index, stack, *depth, visible)));
            *depth += 1;
        }

        tree.set_rects(root, display_rects);
        for (index, rect) in layer_rects {
            tree.set_rects(index, vec![rect]);
        }
    }
}

fn display_size(display: &PropertyNode) -> (f64, f64) {
    let w = number_at(display, &["size", "w"]).unwrap_or(0.0);
    let h = number_at(display, &["size", "h"]).unwrap_or(0.0);
    let bits = display
        .descendant(&["transform", "type"])
        .and_then(PropertyNode::value)
        .and_then(Value::as_bits)
        .unwrap_or(0);
    // ROT_270 includes the ROT_90 bit.
    if bits & transform_type::ROT_INVALID == 0 && bits & transform_type::ROT_90 != 0 {
        (h, w)
    } else {
        (w, h)
    }
}

fn make_display_rects(displays: &[PropertyNode]) -> Vec<TraceRect> {
    let mut name_counts: HashMap<String, u32> = HashMap::new();
    displays
        .iter()
        .enumerate()
        .map(|(i, display)| {
            let mut rect = display
                .child_by_name("layerStackSpaceRect")
                .and_then(rect_of)
                .unwrap_or(Rect::new(0.0, 0.0, 0.0, 0.0));
            if rect.is_empty() {
                let (w, h) = display_size(display);
                rect = Rect::new(0.0, 0.0, w, h);
            }
            let base = display
                .child_value("name")
                .and_then(Value::as_str)
                .filter(|n| !n.is_empty())
                .unwrap_or("Unknown Display")
                .to_string();
            let count = name_counts.entry(base.clone()).or_insert(0);
            *count += 1;
            let name = match *count {
                1 => base,
                n if base == "Unknown Display" => format!("{base} ({n})"),
                n => format!("{base} (Mirror {n})"),
            };
            let id = display.child_value("id").map(ToString::to_string).unwrap_or_default();
            TraceRect {
                id: format!("Display - {id}"),
                name,
                rect,
                group_id: display.child_value("layerStack").and_then(Value::as_i64).unwrap_or(0),
                depth: u32::try_from(i).unwrap_or(u32::MAX),
                is_visible: false,
                is_display: true,
                corner_radius: 0.0,
                opacity: 1.0,
            }
        })
        .collect()
}

/// Placeholder bounds derived from each display size and the largest one,
/// each also in its rotated form.
fn invalid_bounds(displays: &[PropertyNode]) -> Vec<Rect> {
    if displays.is_empty() {
        return Vec::new();
    }
    let from_size = |(w, h): (f64, f64)| {
        let (x, y) = (w * 10.0, h * 10.0);
        [Rect::new(-x, -y, x * 2.0, y * 2.0), Rect::new(-y, -x, y * 2.0, x * 2.0)]
    };
    let mut bounds = Vec::new();
    let mut max = (0.0_f64, 0.0_f64);
    for display in displays {
        let size = display_size(display);
        bounds.extend(from_size(size));
        max = (max.0.max(size.0), max.1.max(size.1));
    }
    bounds.extend(from_size(max));
    bounds
}

fn has_layer_rect(layer: &PropertyNode, visible: bool, invalid: &[Rect]) -> bool {
    let Some(bounds) = layer.child_by_name("screenBounds").and_then(rect_of) else {
        return false;
    };
    if visible {
        return true;
    }
    !invalid.iter().any(|r| bounds.is_almost_equal(r, 0.01)) && !bounds.is_almost_equal(&DEFAULT_INVALID_BOUNDS, 0.01)
}

fn make_layer_rect(tree: &HierarchyTree, index: NodeIndex, stack: i64, depth: u32, visible: bool) -> TraceRect {
    let layer = tree.eager(index);
    let opacity = number_at(layer, &["color", "a"]).unwrap_or(if visible { 0.0 } else { 1.0 });
    TraceRect {
        id: tree.stable_id(index).to_string(),
        name: tree.node(index).name.clone(),
        rect: layer
            .child_by_name("screenBounds")
            .and_then(rect_of)
            .unwrap_or(Rect::new(0.0, 0.0, 0.0, 0.0)),
        group_id: stack,
        depth,
        is_visible: visible,
        is_display: false,
        corner_radius: number(layer, "cornerRadius").unwrap_or(0.0),
        opacity,
    }
}
