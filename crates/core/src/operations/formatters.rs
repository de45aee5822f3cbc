use std::sync::Arc;

use winscope_protocol::Color;

use crate::schema::EnumInfo;
use crate::tree::{PropertyFormatter, PropertyNode, format_number};

/// Stringifies a leaf value; fractional numbers get three decimals.
#[derive(Debug, Default)]
pub struct DefaultFormatter;

impl PropertyFormatter for DefaultFormatter {
    fn format(&self, node: &PropertyNode) -> String {
        node.value().map(ToString::to_string).unwrap_or_default()
    }
}

/// Maps an enum number to its declared name, falling back to the number.
#[derive(Debug)]
pub struct EnumFormatter(pub Arc<EnumInfo>);

impl PropertyFormatter for EnumFormatter {
    fn format(&self, node: &PropertyNode) -> String {
        let Some(number) = node.value().and_then(|v| v.as_i64()) else {
            return node.value().map(ToString::to_string).unwrap_or_default();
        };
        self.0
            .name_of(number)
            .map_or_else(|| number.to_string(), str::to_string)
    }
}

/// Formatter for an empty repeated field.
#[derive(Debug, Default)]
pub struct EmptyArrayFormatter;

impl PropertyFormatter for EmptyArrayFormatter {
    fn format(&self, _node: &PropertyNode) -> String {
        "[]".to_string()
    }
}

/// `[a, b, c]` from the formatted values of a list's elements.
#[derive(Debug, Default)]
pub struct ListFormatter;

impl PropertyFormatter for ListFormatter {
    fn format(&self, node: &PropertyNode) -> String {
        let items: Vec<String> = node
            .all_children()
            .iter()
            .map(|c| match c.formatter() {
                Some(_) => c.formatted_value(),
                None => c.value().map(ToString::to_string).unwrap_or_default(),
            })
            .collect();
        format!("[{}]", items.join(", "))
    }
}

/// A composite value recognised by the names of its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Color,
    Rect,
    Size,
    Position,
    Region,
    Transform,
    Matrix,
}

impl Shape {
    pub fn detect(node: &PropertyNode) -> Option<Self> {
        if !node.has_children() {
            return None;
        }
        let has = |n: &str| node.child_by_name(n).is_some();
        let has_all = |names: &[&str]| names.iter().all(|n| has(n));
        let only = |names: &[&str]| node.all_children().iter().all(|c| names.contains(&c.name()));

        if has_all(&["r", "g", "b", "a"]) {
            Some(Self::Color)
        } else if has_all(&["left", "top", "right", "bottom"]) {
            Some(Self::Rect)
        } else if has("rect") && only(&["id", "rect"]) {
            Some(Self::Region)
        } else if has("type") && has_all(&MATRIX) {
            Some(Self::Transform)
        } else if has_all(&MATRIX) {
            Some(Self::Matrix)
        } else if has_all(&["w", "h"]) && only(&["w", "h"]) {
            Some(Self::Size)
        } else if has_all(&["x", "y"]) && only(&["x", "y"]) {
            Some(Self::Position)
        } else {
            None
        }
    }

    pub fn formatter(self) -> Arc<dyn PropertyFormatter> {
        match self {
            Self::Color => Arc::new(ColorFormatter),
            Self::Rect => Arc::new(RectFormatter),
            Self::Size => Arc::new(SizeFormatter),
            Self::Position => Arc::new(PositionFormatter),
            Self::Region => Arc::new(RegionFormatter),
            Self::Transform => Arc::new(TransformFormatter),
            Self::Matrix => Arc::new(MatrixFormatter),
        }
    }
}

const MATRIX: [&str; 4] = ["dsdx", "dtdx", "dsdy", "dtdy"];

fn num(node: &PropertyNode, name: &str) -> f64 {
    node.child_value(name).and_then(|v| v.as_f64()).unwrap_or(0.0)
}

fn fmt(node: &PropertyNode, name: &str) -> String {
    format_number(num(node, name))
}

#[derive(Debug)]
pub struct ColorFormatter;

impl PropertyFormatter for ColorFormatter {
    fn format(&self, node: &PropertyNode) -> String {
        let color = Color::rgba(
            num(node, "r") as f32,
            num(node, "g") as f32,
            num(node, "b") as f32,
            num(node, "a") as f32,
        );
        if color.is_empty() {
            return format!("empty, alpha: {}", fmt(node, "a"));
        }
        format!(
            "({}, {}, {}, {})",
            fmt(node, "r"),
            fmt(node, "g"),
            fmt(node, "b"),
            fmt(node, "a")
        )
    }
}

/// `true` for the all-zero rect and the `(0, 0, -1, -1)` "invalid" rect.
pub fn is_empty_rect(node: &PropertyNode) -> bool {
    let ltrb = [
        num(node, "left"),
        num(node, "top"),
        num(node, "right"),
        num(node, "bottom"),
    ];
    ltrb == [0.0; 4] || ltrb == [0.0, 0.0, -1.0, -1.0]
}

#[derive(Debug)]
pub struct RectFormatter;

impl PropertyFormatter for RectFormatter {
    fn format(&self, node: &PropertyNode) -> String {
        if is_empty_rect(node) {
            return "empty".to_string();
        }
        format!(
            "({}, {}) - ({}, {})",
            fmt(node, "left"),
            fmt(node, "top"),
            fmt(node, "right"),
            fmt(node, "bottom")
        )
    }
}

#[derive(Debug)]
pub struct SizeFormatter;

impl PropertyFormatter for SizeFormatter {
    fn format(&self, node: &PropertyNode) -> String {
        format!("{} x {}", fmt(node, "w"), fmt(node, "h"))
    }
}

#[derive(Debug)]
pub struct PositionFormatter;

impl PropertyFormatter for PositionFormatter {
    fn format(&self, node: &PropertyNode) -> String {
        format!("({}, {})", fmt(node, "x"), fmt(node, "y"))
    }
}

#[derive(Debug)]
pub struct RegionFormatter;

impl PropertyFormatter for RegionFormatter {
    fn format(&self, node: &PropertyNode) -> String {
        let rects: Vec<String> = node
            .child_by_name("rect")
            .map(PropertyNode::all_children)
            .unwrap_or_default()
            .iter()
            .map(|r| {
                format!(
                    "({}, {}, {}, {})",
                    fmt(r, "left"),
                    fmt(r, "top"),
                    fmt(r, "right"),
                    fmt(r, "bottom")
                )
            })
            .collect();
        format!("SkRegion({})", rects.join(", "))
    }
}

#[derive(Debug)]
pub struct MatrixFormatter;

impl PropertyFormatter for MatrixFormatter {
    fn format(&self, node: &PropertyNode) -> String {
        format!(
            "dsdx: {}, dtdx: {}, dsdy: {}, dtdy: {}",
            fmt(node, "dsdx"),
            fmt(node, "dtdx"),
            fmt(node, "dsdy"),
            fmt(node, "dtdy")
        )
    }
}

#[derive(Debug)]
pub struct TransformFormatter;

impl PropertyFormatter for TransformFormatter {
    fn format(&self, node: &PropertyNode) -> String {
        let bits = node
            .child_value("type")
            .and_then(|v| v.as_bits())
            .unwrap_or(0);
        transform_type_names(bits)
    }
}

pub mod transform_type {
    pub const TRANSLATE: u64 = 0x0001;
    pub const ROTATE: u64 = 0x0002;
    pub const SCALE: u64 = 0x0004;
    pub const FLIP_H: u64 = 0x0100;
    pub const FLIP_V: u64 = 0x0200;
    pub const ROT_90: u64 = 0x0400;
    pub const ROT_180: u64 = FLIP_H | FLIP_V;
    pub const ROT_270: u64 = ROT_180 | ROT_90;
    pub const ROT_INVALID: u64 = 0x8000;
}

/// Names the bits of a surface-flinger transform type, joined by `|`.
pub fn transform_type_names(bits: u64) -> String {
    use transform_type::*;

    let mut flags = Vec::new();
    if bits & (TRANSLATE | ROTATE | SCALE) == 0 {
        flags.push("IDENTITY");
    }
    if bits & SCALE != 0 {
        flags.push("SCALE");
    }
    if bits & TRANSLATE != 0 {
        flags.push("TRANSLATE");
    }
    if bits & ROT_INVALID != 0 {
        flags.push("ROT_INVALID");
    } else if bits & ROT_270 == ROT_270 {
        flags.push("ROT_270");
    } else if bits & ROT_180 == ROT_180 {
        flags.push("ROT_180");
    } else {
        if bits & ROT_90 != 0 {
            flags.push("ROT_90");
        }
        if bits & FLIP_V != 0 {
            flags.push("FLIP_V");
        }
        if bits & FLIP_H != 0 {
            flags.push("FLIP_H");
        }
    }
    flags.join("|")
}
