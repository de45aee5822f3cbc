pub mod chip;
pub mod diff;
pub mod trace_rect;
pub mod types;
pub mod ui_tree;

pub use chip::Chip;
pub use diff::DiffType;
pub use trace_rect::TraceRect;
pub use types::{Color, Rect};
pub use ui_tree::{PropertyLeaf, UiTreeNode};
