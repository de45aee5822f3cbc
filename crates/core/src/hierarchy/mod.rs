//! Arena-backed hierarchy of property providers for one trace entry.

pub mod builder;

use thiserror::Error;
use winscope_protocol::TraceRect;

use crate::tree::{PropertiesProvider, PropertyNode};

pub use builder::{ChildSpec, HierarchyTreeBuilder};

#[derive(Debug, Error)]
pub enum HierarchyError {
    #[error("hierarchy has no root provider")]
    MissingRoot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(pub usize);

#[derive(Debug, Clone)]
pub struct HierarchyNode {
    pub kind: String,
    pub name: String,
    pub numeric_id: Option<i64>,
    parent: Option<NodeIndex>,
    children: Vec<NodeIndex>,
}

/// `"{kind} {id} {name}"`, or `"{kind} {name}"` without a numeric id.
pub fn make_stable_id(kind: &str, numeric_id: Option<i64>, name: &str) -> String {
    match numeric_id {
        Some(id) => format!("{kind} {id} {name}"),
        None => format!("{kind} {name}"),
    }
}

/// Nodes, their stable ids, providers and computed annotations, all indexed
/// by [`NodeIndex`]. Index 0 is the root.
#[derive(Debug)]
pub struct HierarchyTree {
    nodes: Vec<HierarchyNode>,
    stable_ids: Vec<String>,
    providers: Vec<PropertiesProvider>,
    visible: Vec<Option<bool>>,
    rects: Vec<Vec<TraceRect>>,
}

impl HierarchyTree {
    pub const ROOT: NodeIndex = NodeIndex(0);

    fn with_root(kind: &str, name: &str, provider: PropertiesProvider) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            stable_ids: Vec::new(),
            providers: Vec::new(),
            visible: Vec::new(),
            rects: Vec::new(),
        };
        tree.push(kind, None, name, provider);
        tree
    }

    fn push(&mut self, kind: &str, numeric_id: Option<i64>, name: &str, provider: PropertiesProvider) -> NodeIndex {
        let index = NodeIndex(self.nodes.len());
        self.stable_ids.push(make_stable_id(kind, numeric_id, name));
        self.nodes.push(HierarchyNode {
            kind: kind.to_string(),
            name: name.to_string(),
            numeric_id,
            parent: None,
            children: Vec::new(),
        });
        self.providers.push(provider);
        self.visible.push(None);
        self.rects.push(Vec::new());
        index
    }

    fn attach(&mut self, parent: NodeIndex, child: NodeIndex) {
        if let Some(old) = self.nodes[child.0].parent.take() {
            self.nodes[old.0].children.retain(|&c| c != child);
        }
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    pub fn root(&self) -> NodeIndex {
        Self::ROOT
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, index: NodeIndex) -> &HierarchyNode {
        &self.nodes[index.0]
    }

    pub fn children(&self, index: NodeIndex) -> &[NodeIndex] {
        &self.nodes[index.0].children
    }

    pub fn parent(&self, index: NodeIndex) -> Option<NodeIndex> {
        self.nodes[index.0].parent
    }

    pub fn stable_id(&self, index: NodeIndex) -> &str {
        &self.stable_ids[index.0]
    }

    pub fn provider(&self, index: NodeIndex) -> &PropertiesProvider {
        &self.providers[index.0]
    }

    /// Eager properties; always materialised.
    pub fn eager(&self, index: NodeIndex) -> &PropertyNode {
        self.providers[index.0].eager()
    }

    /// Eager and lazy properties, loading the lazy part on first access.
    pub async fn properties(&self, index: NodeIndex) -> &PropertyNode {
        self.providers[index.0].all().await
    }

    /// Adds a calculated property to a node's eager properties.
    pub fn add_eager_property(&mut self, index: NodeIndex, property: PropertyNode) {
        self.providers[index.0].add_eager_property(property);
    }

    pub fn is_visible(&self, index: NodeIndex) -> Option<bool> {
        self.visible[index.0]
    }

    pub fn set_visible(&mut self, index: NodeIndex, visible: bool) {
        self.visible[index.0] = Some(visible);
    }

    /// Rects computed for a node; the root holds one per display.
    pub fn rects(&self, index: NodeIndex) -> &[TraceRect] {
        &self.rects[index.0]
    }

    pub fn set_rects(&mut self, index: NodeIndex, rects: Vec<TraceRect>) {
        self.rects[index.0] = rects;
    }

    /// Every computed rect in depth-first order.
    pub fn all_rects(&self) -> Vec<&TraceRect> {
        self.iter_dfs().flat_map(|i| self.rects(i)).collect()
    }

    /// Node indices in pre-order.
    pub fn iter_dfs(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        let mut stack = vec![Self::ROOT];
        std::iter::from_fn(move || {
            let index = stack.pop()?;
            stack.extend(self.children(index).iter().rev());
            Some(index)
        })
    }

    /// Ancestors from the parent up to the root.
    pub fn ancestors(&self, index: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        std::iter::successors(self.parent(index), move |&i| self.parent(i))
    }

    pub fn child_by_name(&self, index: NodeIndex, name: &str) -> Option<NodeIndex> {
        self.children(index)
            .iter()
            .copied()
            .find(|&c| self.nodes[c.0].name == name)
    }

    pub fn find_by_stable_id(&self, stable_id: &str) -> Option<NodeIndex> {
        self.stable_ids
            .iter()
            .position(|s| s == stable_id)
            .map(NodeIndex)
    }

    /// First node (by index) of `kind` with the given numeric id.
    pub fn find_by_numeric_id(&self, kind: &str, id: i64) -> Option<NodeIndex> {
        self.nodes
            .iter()
            .position(|n| n.numeric_id == Some(id) && n.kind == kind)
            .map(NodeIndex)
    }
}

/// A post-build pass that annotates the tree.
///
/// Implementations must be idempotent: running one twice yields the same
/// annotations as running it once.
pub trait Computation: Send + Sync + std::fmt::Debug {
    fn execute_in_place(&self, tree: &mut HierarchyTree);
}
