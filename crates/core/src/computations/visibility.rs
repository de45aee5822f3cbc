use std::collections::HashMap;

use winscope_protocol::Rect;

use super::{
    calculated_leaf, calculated_list, is_all_zero, is_simple_rotation, is_valid_transform, number, number_at,
    rect_of, transform_bits, z_order_top_down,
};
use crate::hierarchy::{Computation, HierarchyTree, NodeIndex};
use crate::tree::{PropertyNode, Value};

const HIDDEN_FLAG: u64 = 0x1;
const OFFSCREEN_LAYER_ROOT_ID: i64 = 0x7ffffffd;

/// Surface-flinger layer visibility.
///
/// Layers are visited top-down in Z order. A layer that survives the local
/// checks (policy flags, parents, alpha, buffer, visible region) is tested
/// against the opaque layers already seen on its layer stack: full
/// containment occludes it, overlap only records the relation. Adds the
/// calculated properties `isComputedVisible`, `isHiddenByPolicy`,
/// `occludedBy`, `partiallyOccludedBy`, `coveredBy` and `visibilityReason`.
#[derive(Debug, Default)]
pub struct VisibilityComputation;

impl Computation for VisibilityComputation {
    fn execute_in_place(&self, tree: &mut HierarchyTree) {
        let root = tree.eager(tree.root());
        let displays = display_rects(root);
        let excludes_composition = root
            .child_value("excludesCompositionState")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let mut opaque: Vec<NodeIndex> = Vec::new();
        let mut translucent: Vec<NodeIndex> = Vec::new();
        let mut outcomes = Vec::new();

        for index in z_order_top_down(tree) {
            let layer = tree.eager(index);
            let excludes = excludes_composition
                || layer
                    .child_value("excludesCompositionState")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
            let hidden_by_parent = is_hidden_by_parent(tree, index);
            let mut outcome = Outcome::new(index);

            if !is_locally_visible(layer, hidden_by_parent, excludes) {
                outcome.hidden_by_policy = Some(is_hidden_by_policy(layer));
                outcome.reasons = Some(reasons(layer, hidden_by_parent, excludes, false));
                outcomes.push(outcome);
                continue;
            }

            let stack = layer_stack(layer);
            let crop = displays.get(&stack).copied().unwrap_or(Rect::new(0.0, 0.0, 0.0, 0.0));
            let same_stack = |other: &NodeIndex| layer_stack(tree.eager(*other)) == stack;

            let occluded: Vec<NodeIndex> = opaque
                .iter()
                .filter(|o| same_stack(o))
                .filter(|&&o| contains(tree.eager(o), layer, &crop))
                .filter(|&&o| {
                    let other_radius = number(tree.eager(o), "cornerRadius").unwrap_or(0.0);
                    other_radius <= 0.0 || other_radius == number(layer, "cornerRadius").unwrap_or(0.0)
                })
                .copied()
                .collect();
            let partially: Vec<NodeIndex> = opaque
                .iter()
                .filter(|o| same_stack(o))
                .filter(|&&o| overlaps(tree.eager(o), layer, &crop) && !occluded.contains(&o))
                .copied()
                .collect();
            let covered: Vec<NodeIndex> = translucent
                .iter()
                .filter(|o| same_stack(o))
                .filter(|&&o| overlaps(tree.eager(o), layer, &crop))
                .copied()
                .collect();

            outcome.visible = occluded.is_empty();
            if !outcome.visible {
                outcome.reasons = Some(reasons(layer, false, excludes, true));
            }
            let ids = |list: &[NodeIndex]| -> Vec<String> {
                list.iter().map(|&o| tree.stable_id(o).to_string()).collect()
            };
            outcome.occluded_by = Some(ids(&occluded));
            outcome.partially_occluded_by = Some(ids(&partially));
            outcome.covered_by = Some(ids(&covered));
            outcomes.push(outcome);

            if is_opaque(layer) {
                opaque.push(index);
            } else {
                translucent.push(index);
            }
        }

        for outcome in outcomes {
            outcome.apply(tree);
        }
    }
}

struct Outcome {
    index: NodeIndex,
    visible: bool,
    hidden_by_policy: Option<bool>,
    occluded_by: Option<Vec<String>>,
    partially_occluded_by: Option<Vec<String>>,
    covered_by: Option<Vec<String>>,
    reasons: Option<Vec<String>>,
}

impl Outcome {
    fn new(index: NodeIndex) -> Self {
        Self {
            index,
            visible: false,
            hidden_by_policy: None,
            occluded_by: None,
            partially_occluded_by: None,
            covered_by: None,
            reasons: None,
        }
    }

    fn apply(self, tree: &mut HierarchyTree) {
        let owner = tree.eager(self.index).id().to_string();
        let mut props = vec![calculated_leaf(&owner, "isComputedVisible", self.visible)];
        if let Some(hidden) = self.hidden_by_policy {
            props.push(calculated_leaf(&owner, "isHiddenByPolicy", hidden));
        }
        let lists = [
            ("occludedBy", self.occluded_by),
            ("partiallyOccludedBy", self.partially_occluded_by),
            ("coveredBy", self.covered_by),
            ("visibilityReason", self.reasons),
        ];
        for (name, list) in lists {
            if let Some(items) = list {
                props.push(calculated_list(&owner, name, items));
            }
        }
        tree.set_visible(self.index, self.visible);
        for prop in props {
            tree.add_eager_property(self.index, prop);
        }
    }
}

/// Layer stack → display rect in layer-stack space.
fn display_rects(root: &PropertyNode) -> HashMap<i64, Rect> {
    let Some(displays) = root.child_by_name("displays") else {
        return HashMap::new();
    };
    displays
        .all_children()
        .iter()
        .filter_map(|d| {
            let stack = d.child_value("layerStack").and_then(Value::as_i64)?;
            let rect = d.child_by_name("layerStackSpaceRect").and_then(rect_of)?;
            Some((stack, rect))
        })
        .collect()
}

fn layer_stack(layer: &PropertyNode) -> i64 {
    layer.child_value("layerStack").and_then(Value::as_i64).unwrap_or(0)
}

fn is_hidden_by_policy(layer: &PropertyNode) -> bool {
    let flags = layer.child_value("flags").and_then(Value::as_bits).unwrap_or(0);
    flags & HIDDEN_FLAG != 0 || layer.child_value("id").and_then(Value::as_i64) == Some(OFFSCREEN_LAYER_ROOT_ID)
}

/// Some non-root ancestor is hidden by policy.
fn is_hidden_by_parent(tree: &HierarchyTree, index: NodeIndex) -> bool {
    tree.ancestors(index)
        .filter(|&a| a != tree.root())
        .any(|a| is_hidden_by_policy(tree.eager(a)))
}

fn alpha(layer: &PropertyNode) -> Option<f64> {
    number_at(layer, &["color", "a"])
}

fn is_opaque(layer: &PropertyNode) -> bool {
    alpha(layer) == Some(1.0) && layer.child_value("isOpaque").and_then(Value::as_bool).unwrap_or(false)
}

fn is_buffer_empty(layer: &PropertyNode) -> bool {
    let Some(buffer) = layer.child_by_name("activeBuffer") else {
        return true;
    };
    !buffer.has_children()
        || ["width", "height", "stride", "format"]
            .iter()
            .all(|n| number(buffer, n).unwrap_or(0.0) == 0.0)
}

fn has_effects(layer: &PropertyNode) -> bool {
    let color_fill = layer
        .child_by_name("color")
        .filter(|c| c.child_by_name("a").is_some())
        .is_some_and(|c| !is_all_zero(c));
    color_fill || number(layer, "shadowRadius").unwrap_or(0.0) > 0.0
}

fn has_blur(layer: &PropertyNode) -> bool {
    number(layer, "backgroundBlurRadius").unwrap_or(0.0) > 0.0
}

/// Every rect of the region is zero-sized.
fn is_valid_empty_region(region: &PropertyNode) -> bool {
    region
        .child_by_name("rect")
        .is_some_and(|rects| rects.all_children().iter().all(is_all_zero))
}

fn has_visible_region(layer: &PropertyNode, excludes_composition: bool) -> bool {
    if excludes_composition {
        // Composition state is missing; the bounds stand in for the region.
        return layer.child_by_name("bounds").is_some_and(|b| !is_all_zero(b));
    }
    match layer.child_by_name("visibleRegion") {
        Some(region) if region.has_children() => !is_valid_empty_region(region),
        _ => false,
    }
}

fn is_locally_visible(layer: &PropertyNode, hidden_by_parent: bool, excludes_composition: bool) -> bool {
    if hidden_by_parent || is_hidden_by_policy(layer) {
        return false;
    }
    if alpha(layer).unwrap_or(0.0) == 0.0 {
        return false;
    }
    if is_buffer_empty(layer) && !has_effects(layer) {
        return false;
    }
    has_visible_region(layer, excludes_composition)
}

fn cropped_screen_bounds(layer: &PropertyNode, crop: &Rect) -> Option<Rect> {
    let bounds = layer.child_by_name("screenBounds").and_then(rect_of)?;
    Some(if crop.is_empty() { bounds } else { bounds.crop_rect(crop) })
}

fn contains(outer: &PropertyNode, inner: &PropertyNode, crop: &Rect) -> bool {
    if !is_simple_rotation(transform_bits(outer)) || !is_simple_rotation(transform_bits(inner)) {
        return false;
    }
    match (cropped_screen_bounds(outer, crop), cropped_screen_bounds(inner, crop)) {
        (Some(a), Some(b)) => a.contains_rect(&b),
        _ => false,
    }
}

fn overlaps(a: &PropertyNode, b: &PropertyNode, crop: &Rect) -> bool {
    match (cropped_screen_bounds(a, crop), cropped_screen_bounds(b, crop)) {
        (Some(a), Some(b)) => a.intersects_rect(&b),
        _ => false,
    }
}

fn reasons(layer: &PropertyNode, hidden_by_parent: bool, excludes_composition: bool, occluded: bool) -> Vec<String> {
    let mut reasons = Vec::new();
    if is_hidden_by_policy(layer) {
        reasons.push("flag is hidden".to_string());
    }
    if hidden_by_parent {
        let parent = layer.child_value("parent").map(ToString::to_string).unwrap_or_default();
        reasons.push(format!("hidden by parent {parent}"));
    }
    if is_buffer_empty(layer) {
        reasons.push("buffer is empty".to_string());
    }
    if alpha(layer).unwrap_or(0.0) == 0.0 {
        reasons.push("alpha is 0".to_string());
    }
    let empty_bounds = layer.child_by_name("bounds").is_some_and(is_all_zero);
    if empty_bounds {
        reasons.push("bounds is 0x0".to_string());
        let empty_color = layer
            .child_by_name("color")
            .filter(|c| c.child_by_name("a").is_some())
            .is_some_and(is_all_zero);
        if empty_color {
            reasons.push("crop is 0x0".to_string());
        }
    }
    if layer.child_by_name("transform").is_some_and(|t| t.has_children() && !is_valid_transform(t)) {
        reasons.push("transform is invalid".to_string());
    }
    let relative_removed = layer.child_value("isRelativeOf").and_then(Value::as_bool) == Some(true)
        && layer.child_value("zOrderRelativeOf").and_then(Value::as_i64) == Some(-1);
    if relative_removed {
        reasons.push("relativeOf layer has been removed".to_string());
    }
    if is_buffer_empty(layer) && !has_effects(layer) && !has_blur(layer) {
        reasons.push("does not have color fill, shadow or blur".to_string());
    }
    match layer.child_by_name("visibleRegion") {
        Some(region) if is_valid_empty_region(region) => {
            reasons.push("visible region calculated by Composition Engine is empty".to_string());
        }
        Some(region) if region.is_placeholder() && !excludes_composition => {
            reasons.push("null visible region".to_string());
        }
        _ => {}
    }
    if occluded {
        reasons.push("occluded".to_string());
    }
    if reasons.is_empty() {
        reasons.push("unknown".to_string());
    }
    reasons
}
