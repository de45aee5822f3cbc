use std::collections::HashMap;

use winscope_protocol::{Rect, TraceRect};

use crate::hierarchy::{Computation, HierarchyTree, NodeIndex};
use crate::tree::{PropertyNode, PropertySource, Value};

/// Absolute geometry of a view node, as its children see it.
#[derive(Debug, Clone, Copy)]
struct Frame {
    x: f64,
    y: f64,
    scale_x: f64,
    scale_y: f64,
    scroll_x: f64,
    scroll_y: f64,
    alpha: f64,
    visible: bool,
}

impl Frame {
    const ORIGIN: Frame = Frame {
        x: 0.0,
        y: 0.0,
        scale_x: 1.0,
        scale_y: 1.0,
        scroll_x: 0.0,
        scroll_y: 0.0,
        alpha: 1.0,
        visible: true,
    };
}

/// Screen rects for view-style hierarchies where every node is positioned
/// relative to its parent.
///
/// A child's origin is the parent's origin plus its `left`/`top` offset and
/// translation, minus the parent's scroll, all in the parent's scale.
/// Scale and alpha multiply down the chain; a node is visible when it and
/// all its ancestors have `visibility == 0`. Scale and alpha only count when
/// decoded from the trace, so injected zero defaults do not collapse a view.
#[derive(Debug, Default)]
pub struct RectsComputation;

impl Computation for RectsComputation {
    fn execute_in_place(&self, tree: &mut HierarchyTree) {
        let root = tree.root();
        let mut frames: HashMap<NodeIndex, Frame> = HashMap::new();
        frames.insert(root, Frame {
            scroll_x: number(tree.eager(root), "scrollX"),
            scroll_y: number(tree.eager(root), "scrollY"),
            ..Frame::ORIGIN
        });

        let mut computed = Vec::new();
        for (depth, index) in tree.iter_dfs().filter(|&i| i != root).enumerate() {
            let parent = tree
                .parent(index)
                .and_then(|p| frames.get(&p).copied())
                .unwrap_or(Frame::ORIGIN);
            let view = tree.eager(index);
            let frame = child_frame(&parent, view);
            let rect = Rect::new(
                frame.x,
                frame.y,
                number(view, "width") * frame.scale_x,
                number(view, "height") * frame.scale_y,
            );
            computed.push((
                index,
                TraceRect {
                    id: tree.stable_id(index).to_string(),
                    name: tree.node(index).name.clone(),
                    rect,
                    group_id: 0,
                    depth: u32::try_from(depth).unwrap_or(u32::MAX),
                    is_visible: frame.visible,
                    is_display: false,
                    corner_radius: 0.0,
                    opacity: frame.alpha,
                },
            ));
            frames.insert(index, frame);
        }

        for (index, rect) in computed {
            tree.set_visible(index, rect.is_visible);
            tree.set_rects(index, vec![rect]);
        }
    }
}

fn number(node: &PropertyNode, name: &str) -> f64 {
    node.child_value(name).and_then(Value::as_f64).unwrap_or(0.0)
}

/// A decoded factor, or 1 when the trace left it out.
fn factor(node: &PropertyNode, name: &str) -> f64 {
    match node.child_by_name(name) {
        Some(child) if child.source() == PropertySource::Decoded => child.value().and_then(Value::as_f64).unwrap_or(1.0),
        _ => 1.0,
    }
}

fn child_frame(parent: &Frame, view: &PropertyNode) -> Frame {
    let offset_x = number(view, "left") + number(view, "translationX") - parent.scroll_x;
    let offset_y = number(view, "top") + number(view, "translationY") - parent.scroll_y;
    // View.VISIBLE
    let shown = number(view, "visibility") == 0.0;
    Frame {
        x: parent.x + offset_x * parent.scale_x,
        y: parent.y + offset_y * parent.scale_y,
        scale_x: parent.scale_x * factor(view, "scaleX"),
        scale_y: parent.scale_y * factor(view, "scaleY"),
        scroll_x: number(view, "scrollX"),
        scroll_y: number(view, "scrollY"),
        alpha: parent.alpha * factor(view, "alpha"),
        visible: parent.visible && shown,
    }
}
