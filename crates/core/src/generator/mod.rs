//! Projects a [`HierarchyTree`] into the [`UiTreeNode`] shape the UI shows:
//! filtered, optionally flattened, with chips and formatted properties.

pub mod filter;

use std::collections::{HashMap, HashSet};

use winscope_protocol::{Chip, PropertyLeaf, UiTreeNode};

use crate::hierarchy::{HierarchyTree, NodeIndex};
use crate::tree::{PropertyNode, Value};

pub use filter::{Matcher, TextFilter};

/// hwcCompositionType values
const HWC_CLIENT: i64 = 1;
const HWC_DEVICE: i64 = 2;
const HWC_SOLID_COLOR: i64 = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedTree {
    /// The entry node; always present, whatever the filter.
    pub root: UiTreeNode,
    /// Nodes whose stable id was pinned, in depth-first order, without
    /// children.
    pub pinned: Vec<UiTreeNode>,
}

#[derive(Debug)]
pub struct TreeGenerator<'t> {
    tree: &'t HierarchyTree,
    filter: TextFilter,
    pinned_ids: Vec<String>,
    only_visible: bool,
    simplify_names: bool,
    flat: bool,
}

/// Per-node outcome of filtering.
#[derive(Debug, Clone, Copy, Default)]
struct Mark {
    /// Passes the filter and visibility checks itself.
    shown: bool,
    /// `shown`, or has a kept descendant.
    kept: bool,
    /// Matches the filter on its own name.
    own_match: bool,
}

impl<'t> TreeGenerator<'t> {
    pub fn new(tree: &'t HierarchyTree, filter: TextFilter, pinned_ids: Vec<String>) -> Self {
        Self {
            tree,
            filter,
            pinned_ids,
            only_visible: false,
            simplify_names: false,
            flat: false,
        }
    }

    pub fn set_only_visible(mut self, enabled: bool) -> Self {
        self.only_visible = enabled;
        self
    }

    pub fn set_simplify_names(mut self, enabled: bool) -> Self {
        self.simplify_names = enabled;
        self
    }

    pub fn set_flat(mut self, enabled: bool) -> Self {
        self.flat = enabled;
        self
    }

    /// Builds the UI tree with each node's eager properties.
    pub fn generate(&self) -> GeneratedTree {
        let tree = self.tree;
        let eager: Vec<&PropertyNode> = (0..tree.len()).map(|i| tree.eager(NodeIndex(i))).collect();
        self.project(&eager)
    }

    /// Like [`generate`](Self::generate), but nodes carry their full eager
    /// and lazy property leaves, loading lazy properties where needed. Trees
    /// meant for [`diff`](crate::differ::diff) should be generated this way
    /// so that changes to lazy fields are detected.
    pub async fn generate_full(&self) -> GeneratedTree {
        let tree = self.tree;
        let mut full = Vec::with_capacity(tree.len());
        for i in 0..tree.len() {
            full.push(tree.provider(NodeIndex(i)).all().await);
        }
        self.project(&full)
    }

    /// `properties` holds the property tree to flatten for every node, by
    /// arena index.
    fn project(&self, properties: &[&PropertyNode]) -> GeneratedTree {
        let tree = self.tree;
        let root = tree.root();
        let matcher = self.filter.compile();
        let mut marks = vec![Mark::default(); tree.len()];
        self.mark(root, false, &matcher, &mut marks);

        let relative_z_targets: HashSet<i64> = tree
            .iter_dfs()
            .filter_map(|i| self.relative_z_of(i))
            .collect();
        let chips = |i: NodeIndex| self.chips(i, &relative_z_targets);

        let mut out = if self.flat {
            let mut node = self.ui_node(root, chips(root), properties);
            node.children = tree
                .iter_dfs()
                .filter(|&i| i != root && marks[i.0].kept && marks[i.0].shown && marks[i.0].own_match)
                .map(|i| self.ui_node(i, chips(i), properties))
                .collect();
            node
        } else {
            self.build(root, &marks, &chips, properties)
        };
        assign_ids_and_order(&mut out);

        let mut pinned: Vec<UiTreeNode> = tree
            .iter_dfs()
            .filter(|&i| self.pinned_ids.iter().any(|p| p == tree.stable_id(i)))
            .map(|i| self.ui_node(i, chips(i), properties))
            .collect();
        for node in &mut pinned {
            assign_ids_and_order(node);
        }

        tracing::debug!(nodes = out.node_count(), pinned = pinned.len(), "generated ui tree");
        GeneratedTree { root: out, pinned }
    }

    fn mark(&self, index: NodeIndex, ancestor_matched: bool, matcher: &Matcher, marks: &mut [Mark]) -> bool {
        let tree = self.tree;
        let is_root = index == tree.root();
        let node = tree.node(index);
        let own_match = !is_root && (matcher.matches(&node.name) || matcher.matches(tree.stable_id(index)));
        let visible_ok = !self.only_visible || is_root || tree.is_visible(index) == Some(true);
        let shown = (is_root || ancestor_matched || own_match) && visible_ok;

        let mut descendant_kept = false;
        for &child in tree.children(index) {
            // every child is visited so all marks get filled
            descendant_kept |= self.mark(child, ancestor_matched || own_match, matcher, marks);
        }
        let kept = is_root || shown || descendant_kept;
        marks[index.0] = Mark { shown, kept, own_match };
        kept
    }

    fn build(
        &self,
        index: NodeIndex,
        marks: &[Mark],
        chips: &dyn Fn(NodeIndex) -> Vec<Chip>,
        properties: &[&PropertyNode],
    ) -> UiTreeNode {
        let mut node = self.ui_node(index, chips(index), properties);
        node.children = self
            .tree
            .children(index)
            .iter()
            .filter(|c| marks[c.0].kept)
            .map(|&c| self.build(c, marks, chips, properties))
            .collect();
        node
    }

    fn ui_node(&self, index: NodeIndex, chips: Vec<Chip>, properties: &[&PropertyNode]) -> UiTreeNode {
        let tree = self.tree;
        let h = tree.node(index);
        let mut node = UiTreeNode::new(tree.stable_id(index), &h.kind, &h.name);
        if self.simplify_names {
            node.display_name = simplify_name(&h.name);
        }
        node.numeric_id = h.numeric_id;
        node.is_visible = tree.is_visible(index);
        node.chips = chips;
        node.properties = property_leaves(properties[index.0]);
        node
    }

    /// Target of a relative-Z link that earns the node a chip.
    fn relative_z_of(&self, index: NodeIndex) -> Option<i64> {
        let tree = self.tree;
        let parent = tree.parent(index)?;
        if parent == tree.root() {
            return None;
        }
        tree.eager(index)
            .child_value("zOrderRelativeOf")
            .and_then(Value::as_i64)
            .filter(|&target| target != -1)
    }

    fn chips(&self, index: NodeIndex, relative_z_targets: &HashSet<i64>) -> Vec<Chip> {
        let tree = self.tree;
        let eager = tree.eager(index);
        let mut chips = Vec::new();
        match eager.child_value("hwcCompositionType").and_then(Value::as_i64) {
            Some(HWC_CLIENT) => chips.push(Chip::Gpu),
            Some(HWC_DEVICE | HWC_SOLID_COLOR) => chips.push(Chip::Hwc),
            _ => {}
        }
        if index != tree.root() && tree.is_visible(index) == Some(true) {
            chips.push(Chip::Visible);
        }
        if self.relative_z_of(index).is_some() {
            chips.push(Chip::RelativeZ);
        }
        if tree
            .node(index)
            .numeric_id
            .is_some_and(|id| relative_z_targets.contains(&id))
        {
            chips.push(Chip::RelativeZParent);
        }
        if eager.child_value("isMissing").and_then(Value::as_bool) == Some(true) {
            chips.push(Chip::Missing);
        }
        chips
    }
}

/// `a.b.c.d.Last` → `a.b.(...).Last`; names with up to three parts are kept.
pub fn simplify_name(name: &str) -> String {
    let parts: Vec<&str> = name.split('.').collect();
    match parts.as_slice() {
        [first, second, .., last] if parts.len() > 3 => format!("{first}.{second}.(...).{last}"),
        _ => name.to_string(),
    }
}

/// Formatted leaves of a property tree, in pre-order.
fn property_leaves(root: &PropertyNode) -> Vec<PropertyLeaf> {
    let mut leaves = Vec::new();
    root.walk(&mut |path, node| {
        if node.has_children() {
            return;
        }
        let value = match node.formatter() {
            Some(_) => node.formatted_value(),
            None => node.value().map(ToString::to_string).unwrap_or_default(),
        };
        leaves.push(PropertyLeaf {
            path: path.to_string(),
            value,
        });
    });
    leaves
}

/// Gives every node an id unique within the tree (repeats of a stable id
/// get `" (n)"` appended) and numbers nodes in pre-order.
pub(crate) fn assign_ids_and_order(root: &mut UiTreeNode) {
    fn go(node: &mut UiTreeNode, seen: &mut HashMap<String, usize>, order: &mut usize) {
        let count = seen.entry(node.stable_id.clone()).or_insert(0);
        node.id = match *count {
            0 => node.stable_id.clone(),
            n => format!("{} ({n})", node.stable_id),
        };
        *count += 1;
        node.dfs_order = *order;
        *order += 1;
        for child in &mut node.children {
            go(child, seen, order);
        }
    }
    go(root, &mut HashMap::new(), &mut 0);
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::hierarchy::{ChildSpec, Computation, HierarchyTreeBuilder};
    use crate::tree::{LazyLoader, PropertiesProvider};

    /// Marks nodes visible by their `visible` property.
    #[derive(Debug)]
    struct FromProperty;

    impl Computation for FromProperty {
        fn execute_in_place(&self, tree: &mut HierarchyTree) {
            let root = tree.root();
            let all: Vec<_> = tree.iter_dfs().filter(|&i| i != root).collect();
            for i in all {
                let v = tree.eager(i).child_value("visible").and_then(Value::as_bool);
                tree.set_visible(i, v == Some(true));
            }
        }
    }

    struct Spec {
        id: i64,
        parent: Option<i64>,
        name: &'static str,
        visible: bool,
        extra: Vec<(&'static str, i64)>,
    }

    fn spec(id: i64, parent: Option<i64>, name: &'static str, visible: bool) -> Spec {
        Spec {
            id,
            parent,
            name,
            visible,
            extra: Vec::new(),
        }
    }

    fn build(specs: Vec<Spec>) -> HierarchyTree {
        let children = specs
            .into_iter()
            .map(|s| {
                let sid = format!("Layer {} {}", s.id, s.name);
                let eager = s
                    .extra
                    .iter()
                    .fold(PropertyNode::root(&sid, s.name).with_leaf("visible", s.visible), |n, (k, v)| {
                        n.with_leaf(k, *v)
                    });
                ChildSpec {
                    key: s.id,
                    parent_key: s.parent,
                    kind: "Layer".into(),
                    numeric_id: Some(s.id),
                    name: s.name.into(),
                    provider: PropertiesProvider::eager_only(eager),
                }
            })
            .collect();
        HierarchyTreeBuilder::new()
            .set_root("LayerTraceEntry", "root", PropertiesProvider::eager_only(PropertyNode::root("root", "root")))
            .set_children(children)
            .set_computations(vec![Arc::new(FromProperty)])
            .build()
            .expect("tree")
    }

    fn names(node: &UiTreeNode) -> Vec<&str> {
        node.iter_dfs().map(|n| n.name.as_str()).collect()
    }

    #[test]
    fn only_visible_keeps_visible_children() {
        let tree = build(vec![spec(1, None, "Child1", true), spec(2, None, "Child2", false)]);
        let out = TreeGenerator::new(&tree, TextFilter::default(), Vec::new())
            .set_only_visible(true)
            .generate();
        assert_eq!(names(&out.root), vec!["root", "Child1"]);
        assert_eq!(out.root.children[0].chips, vec![Chip::Visible]);
    }

    #[test]
    fn hidden_ancestors_of_visible_nodes_stay() {
        let tree = build(vec![spec(1, None, "Container", false), spec(2, Some(1), "Leaf", true)]);
        let out = TreeGenerator::new(&tree, TextFilter::default(), Vec::new())
            .set_only_visible(true)
            .generate();
        assert_eq!(names(&out.root), vec!["root", "Container", "Leaf"]);
    }

    #[test]
    fn filter_keeps_matches_their_subtrees_and_ancestors() {
        let tree = build(vec![
            spec(1, None, "Task", true),
            spec(2, Some(1), "Activity", true),
            spec(3, Some(2), "Surface", true),
            spec(4, None, "Wallpaper", true),
        ]);
        let out = TreeGenerator::new(&tree, TextFilter::new("activity"), Vec::new()).generate();
        assert_eq!(names(&out.root), vec!["root", "Task", "Activity", "Surface"]);

        let none = TreeGenerator::new(&tree, TextFilter::new("nothing"), Vec::new()).generate();
        assert_eq!(names(&none.root), vec!["root"]);
    }

    #[test]
    fn flat_view_lists_own_matches_in_dfs_order() {
        let tree = build(vec![
            spec(1, None, "SurfaceA", true),
            spec(2, Some(1), "Other", true),
            spec(3, Some(2), "SurfaceB", true),
        ]);
        let out = TreeGenerator::new(&tree, TextFilter::new("surface"), Vec::new())
            .set_flat(true)
            .generate();
        assert_eq!(names(&out.root), vec!["root", "SurfaceA", "SurfaceB"]);
        assert!(out.root.children.iter().all(|c| c.children.is_empty()));
        let orders: Vec<_> = out.root.iter_dfs().map(|n| n.dfs_order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
    }

    #[test]
    fn pinned_nodes_ignore_the_filter() {
        let tree = build(vec![spec(1, None, "A", true), spec(2, Some(1), "B", false)]);
        let out = TreeGenerator::new(&tree, TextFilter::new("zzz"), vec!["Layer 2 B".into(), "Layer 1 A".into()]).generate();
        let pinned: Vec<_> = out.pinned.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(pinned, vec!["A", "B"]);
        assert!(out.pinned[0].children.is_empty());
    }

    #[test]
    fn chips_from_properties() {
        let mut gpu = spec(1, None, "Gpu", false);
        gpu.extra = vec![("hwcCompositionType", 1)];
        let mut hwc = spec(2, Some(1), "Hwc", false);
        hwc.extra = vec![("hwcCompositionType", 3), ("zOrderRelativeOf", 1)];
        let mut top = spec(3, None, "Top", false);
        top.extra = vec![("zOrderRelativeOf", 1)];
        let tree = build(vec![gpu, hwc, top]);
        let out = TreeGenerator::new(&tree, TextFilter::default(), Vec::new()).generate();
        let chips = |name: &str| {
            out.root
                .find_dfs(&|n| n.name == name)
                .map(|n| n.chips.clone())
                .unwrap_or_default()
        };
        assert_eq!(chips("Gpu"), vec![Chip::Gpu, Chip::RelativeZParent]);
        assert_eq!(chips("Hwc"), vec![Chip::Hwc, Chip::RelativeZ]);
        // top-level layers do not get the relative-Z chip
        assert!(chips("Top").is_empty());
    }

    #[test]
    fn names_and_properties() {
        let tree = build(vec![spec(1, None, "com.android.systemui.wallpapers.ImageWallpaper", true)]);
        let out = TreeGenerator::new(&tree, TextFilter::default(), Vec::new())
            .set_simplify_names(true)
            .generate();
        let node = &out.root.children[0];
        assert_eq!(node.display_name, "com.android.(...).ImageWallpaper");
        assert_eq!(node.name, "com.android.systemui.wallpapers.ImageWallpaper");
        assert_eq!(node.property("visible"), Some("true"));
        assert_eq!(simplify_name("a.b.c"), "a.b.c");
    }

    #[tokio::test]
    async fn full_generation_includes_lazy_leaves() {
        let loader: LazyLoader = Arc::new(|| PropertyNode::root("Layer 1 A", "A").with_leaf("ownerUid", 1000i64));
        let provider = PropertiesProvider::builder()
            .set_eager_properties(PropertyNode::root("Layer 1 A", "A").with_leaf("z", 1i64))
            .set_lazy_properties_strategy(loader)
            .build();
        let tree = HierarchyTreeBuilder::new()
            .set_root("LayerTraceEntry", "root", PropertiesProvider::eager_only(PropertyNode::root("root", "root")))
            .set_children(vec![ChildSpec {
                key: 1,
                parent_key: None,
                kind: "Layer".into(),
                numeric_id: Some(1),
                name: "A".into(),
                provider,
            }])
            .build()
            .expect("tree");
        let generator = TreeGenerator::new(&tree, TextFilter::default(), Vec::new());

        let eager = generator.generate();
        assert_eq!(eager.root.children[0].property("ownerUid"), None);
        assert!(!tree.provider(NodeIndex(1)).is_loaded());

        let full = generator.generate_full().await;
        let node = &full.root.children[0];
        assert_eq!(node.property("ownerUid"), Some("1000"));
        assert_eq!(node.property("z"), Some("1"));
    }

    #[test]
    fn repeated_stable_ids_get_unique_ids() {
        let mut root = UiTreeNode::new("root", "Entry", "root");
        root.children = vec![UiTreeNode::new("X", "Layer", "X"), UiTreeNode::new("X", "Layer", "X")];
        assign_ids_and_order(&mut root);
        assert_eq!(root.children[0].id, "X");
        assert_eq!(root.children[1].id, "X (1)");
        assert_eq!(root.children[1].dfs_order, 2);
    }
}
