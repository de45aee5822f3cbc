use serde::{Deserialize, Serialize};

use crate::chip::Chip;
use crate::diff::DiffType;

/// The UI-facing projection of one hierarchy node.
///
/// This is the single contract between the tree engine and anything that
/// displays or exports hierarchies:
///
/// ```text
///   protobuf entry ─▶ HierarchyTree ─▶ TreeGenerator ─▶ UiTreeNode ─▶ diff ─▶ UiTreeNode
///                     (arena, lazy     (filter, flat,    (this)               (diff_type
///                      properties)      pins, chips)                           tagged)
/// ```
///
/// # Design principles
///
/// 1. **Self-contained**: a node carries the formatted property leaves it
///    is compared on (eager ones, or eager and lazy ones from a full
///    generation), so diffing and display need no access to the source
///    trace.
/// 2. **Identity is separate from display**: `stable_id` identifies the same
///    logical entity across snapshots, `id` is unique within one tree, and
///    `display_name` is free to be shortened.
/// 3. **Serializable**: can be handed to a UI or exported as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiTreeNode {
    /// Unique within one generated tree.
    pub id: String,
    /// Identity of the logical entity across snapshots.
    pub stable_id: String,
    /// Node kind ("Layer", "Window", "LayerTraceEntry", ...).
    pub kind: String,
    pub name: String,
    /// `name`, possibly shortened for display.
    pub display_name: String,
    /// Numeric identity from the trace (layer id, view hash code, ...).
    pub numeric_id: Option<i64>,
    /// Computed visibility, when a computation produced one.
    pub is_visible: Option<bool>,
    pub chips: Vec<Chip>,
    /// Formatted property leaves, in tree order.
    pub properties: Vec<PropertyLeaf>,
    pub diff_type: DiffType,
    /// Position in a depth-first walk of the generated tree.
    pub dfs_order: usize,
    pub children: Vec<UiTreeNode>,
}

/// One formatted property leaf, addressed by its dotted path below the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyLeaf {
    pub path: String,
    pub value: String,
}

impl UiTreeNode {
    pub fn new(
        stable_id: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        let stable_id = stable_id.into();
        let name = name.into();
        Self {
            id: stable_id.clone(),
            stable_id,
            kind: kind.into(),
            display_name: name.clone(),
            name,
            numeric_id: None,
            is_visible: None,
            chips: Vec::new(),
            properties: Vec::new(),
            diff_type: DiffType::None,
            dfs_order: 0,
            children: Vec::new(),
        }
    }

    /// First direct child with the given name.
    pub fn child_by_name(&self, name: &str) -> Option<&UiTreeNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn all_children(&self) -> &[UiTreeNode] {
        &self.children
    }

    /// Formatted value of a property leaf by dotted path.
    pub fn property(&self, path: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|p| p.path == path)
            .map(|p| p.value.as_str())
    }

    /// First node (pre-order) satisfying the predicate, including `self`.
    pub fn find_dfs(&self, pred: &dyn Fn(&UiTreeNode) -> bool) -> Option<&UiTreeNode> {
        if pred(self) {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_dfs(pred))
    }

    /// Pre-order iteration over this node and all descendants.
    pub fn iter_dfs(&self) -> impl Iterator<Item = &UiTreeNode> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn node_count(&self) -> usize {
        self.iter_dfs().count()
    }
}
