use std::collections::HashMap;
use std::sync::Arc;

use super::{Computation, HierarchyError, HierarchyTree, NodeIndex};
use crate::tree::PropertiesProvider;

/// One non-root node to wire into the hierarchy.
#[derive(Debug)]
pub struct ChildSpec {
    /// Identifies the node for `parent_key` lookups within one entry.
    pub key: i64,
    /// `None` attaches the node directly under the root.
    pub parent_key: Option<i64>,
    pub kind: String,
    pub numeric_id: Option<i64>,
    pub name: String,
    pub provider: PropertiesProvider,
}

/// Assembles a [`HierarchyTree`] from a root provider and child specs, then
/// runs the computations in order.
#[derive(Debug, Default)]
pub struct HierarchyTreeBuilder {
    root: Option<(String, String, PropertiesProvider)>,
    children: Vec<ChildSpec>,
    computations: Vec<Arc<dyn Computation>>,
}

impl HierarchyTreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_root(mut self, kind: impl Into<String>, name: impl Into<String>, provider: PropertiesProvider) -> Self {
        self.root = Some((kind.into(), name.into(), provider));
        self
    }

    pub fn set_children(mut self, children: Vec<ChildSpec>) -> Self {
        self.children = children;
        self
    }

    pub fn set_computations(mut self, computations: Vec<Arc<dyn Computation>>) -> Self {
        self.computations = computations;
        self
    }

    pub fn build(self) -> Result<HierarchyTree, HierarchyError> {
        let (kind, name, provider) = self.root.ok_or(HierarchyError::MissingRoot)?;
        let mut tree = HierarchyTree::with_root(&kind, &name, provider);

        // First occurrence of a key wins for parent lookups.
        let mut by_key: HashMap<i64, NodeIndex> = HashMap::new();
        let mut parents = Vec::with_capacity(self.children.len());
        for spec in self.children {
            let index = tree.push(&spec.kind, spec.numeric_id, &spec.name, spec.provider);
            by_key.entry(spec.key).or_insert(index);
            parents.push((index, spec.parent_key));
        }

        let root = tree.root();
        for &(index, parent_key) in &parents {
            let parent = match parent_key {
                None => root,
                Some(key) => match by_key.get(&key) {
                    Some(&parent) if parent != index => parent,
                    _ => {
                        tracing::warn!(
                            stable_id = tree.stable_id(index),
                            parent_key = key,
                            "parent not found, attaching to root"
                        );
                        root
                    }
                },
            };
            tree.attach(parent, index);
        }
        reattach_unreachable(&mut tree);

        for computation in &self.computations {
            computation.execute_in_place(&mut tree);
        }
        Ok(tree)
    }
}

/// Nodes caught in a parent cycle never reach the root; hang them off it.
fn reattach_unreachable(tree: &mut HierarchyTree) {
    let mut reached = vec![false; tree.len()];
    for index in tree.iter_dfs().collect::<Vec<_>>() {
        reached[index.0] = true;
    }
    for i in 1..tree.len() {
        if reached[i] {
            continue;
        }
        let index = NodeIndex(i);
        tracing::warn!(stable_id = tree.stable_id(index), "parent cycle, attaching to root");
        tree.attach(HierarchyTree::ROOT, index);
        let subtree: Vec<NodeIndex> = subtree_of(tree, index);
        for n in subtree {
            reached[n.0] = true;
        }
    }
}

fn subtree_of(tree: &HierarchyTree, index: NodeIndex) -> Vec<NodeIndex> {
    let mut out = Vec::new();
    let mut stack = vec![index];
    while let Some(i) = stack.pop() {
        out.push(i);
        stack.extend(tree.children(i).iter().copied());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{PropertyNode, Value};

    fn provider(name: &str) -> PropertiesProvider {
        PropertiesProvider::eager_only(PropertyNode::root(name, name).with_leaf("name", name))
    }

    fn spec(key: i64, parent: Option<i64>, name: &str) -> ChildSpec {
        ChildSpec {
            key,
            parent_key: parent,
            kind: "Layer".into(),
            numeric_id: Some(key),
            name: name.into(),
            provider: provider(name),
        }
    }

    #[derive(Debug)]
    struct MarkAllVisible;

    impl Computation for MarkAllVisible {
        fn execute_in_place(&self, tree: &mut HierarchyTree) {
            for i in tree.iter_dfs().collect::<Vec<_>>() {
                tree.set_visible(i, true);
                let p = PropertyNode::calculated(tree.eager(i).child_id("isVisible"), "isVisible", Some(true.into()));
                tree.add_eager_property(i, p);
            }
        }
    }

    #[test]
    fn missing_root_is_an_error() {
        assert!(matches!(
            HierarchyTreeBuilder::new().build(),
            Err(HierarchyError::MissingRoot)
        ));
    }

    #[test]
    fn wires_children_by_parent_key() {
        let tree = HierarchyTreeBuilder::new()
            .set_root("LayerTraceEntry", "root", provider("root"))
            .set_children(vec![spec(2, Some(1), "B"), spec(1, None, "A"), spec(3, None, "C")])
            .build()
            .expect("tree");

        let root = tree.root();
        let names: Vec<_> = tree.children(root).iter().map(|&c| tree.node(c).name.as_str()).collect();
        assert_eq!(names, vec!["A", "C"]);
        let a = tree.child_by_name(root, "A").expect("A");
        let b = tree.child_by_name(a, "B").expect("B");
        assert_eq!(tree.stable_id(b), "Layer 2 B");
        assert_eq!(tree.stable_id(root), "LayerTraceEntry root");
        assert_eq!(tree.ancestors(b).collect::<Vec<_>>(), vec![a, root]);
    }

    #[test]
    fn orphans_and_cycles_attach_to_root() {
        let tree = HierarchyTreeBuilder::new()
            .set_root("Entry", "root", provider("root"))
            .set_children(vec![
                spec(1, Some(99), "Orphan"),
                spec(2, Some(3), "X"),
                spec(3, Some(2), "Y"),
                spec(4, Some(4), "Self"),
            ])
            .build()
            .expect("tree");
        assert_eq!(tree.iter_dfs().count(), 5);
        assert!(tree.child_by_name(tree.root(), "Orphan").is_some());
        assert!(tree.child_by_name(tree.root(), "Self").is_some());
    }

    #[test]
    fn computations_annotate() {
        let tree = HierarchyTreeBuilder::new()
            .set_root("Entry", "root", provider("root"))
            .set_children(vec![spec(1, None, "A")])
            .set_computations(vec![Arc::new(MarkAllVisible)])
            .build()
            .expect("tree");
        let a = tree.find_by_stable_id("Layer 1 A").expect("A");
        assert_eq!(tree.is_visible(a), Some(true));
        assert_eq!(tree.eager(a).child_value("isVisible"), Some(&Value::Bool(true)));
        assert_eq!(tree.find_by_numeric_id("Layer", 1), Some(a));
    }
}
