use serde::{Deserialize, Serialize};

use crate::types::Rect;

/// Absolute screen geometry computed for one hierarchy node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRect {
    /// Stable id of the node the rect belongs to.
    pub id: String,
    pub name: String,
    pub rect: Rect,
    /// Display / layer stack the rect is drawn on.
    pub group_id: i64,
    /// Paint order within the group, 0 = furthest back.
    pub depth: u32,
    pub is_visible: bool,
    /// Outline of a display rather than of a node's content.
    pub is_display: bool,
    pub corner_radius: f64,
    pub opacity: f64,
}
