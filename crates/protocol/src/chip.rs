use serde::{Deserialize, Serialize};

/// Short status badges attached to hierarchy nodes for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Chip {
    /// Composited by the GPU (client composition).
    Gpu,
    /// Composited by the hardware composer.
    Hwc,
    /// Computed visible on screen.
    Visible,
    /// Z-ordered relative to another node.
    RelativeZ,
    /// Another node is Z-ordered relative to this one.
    RelativeZParent,
    /// Referenced but not present in the snapshot.
    Missing,
}
