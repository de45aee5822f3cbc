//! Structural diff between two generated trees.

use std::collections::{HashMap, HashSet};

use winscope_protocol::{DiffType, UiTreeNode};

use crate::generator::assign_ids_and_order;

/// Computes the identity nodes are matched by across snapshots.
pub type Identity<'f> = &'f dyn Fn(&UiTreeNode) -> String;

/// [`diff_with`] matching nodes by stable id.
pub fn diff(old: Option<&UiTreeNode>, new: &UiTreeNode) -> UiTreeNode {
    diff_with(old, new, &|n| n.stable_id.clone())
}

/// Tags a copy of `new` with how each node changed since `old`.
///
/// Children are walked position by position. When the identities at a
/// position differ, the old node is reported as `DELETED` (or
/// `DELETED_MOVE` if it exists elsewhere in `new`) right before the new node,
/// which is `ADDED` (or `ADDED_MOVE`, diffed against its old counterpart).
/// A new node whose identity is among its old siblings is just reordered and
/// compared with that sibling. Nodes with matching identities are `MODIFIED`
/// when their properties differ. The roots are always compared.
///
/// Without an old tree every node is `NONE`. The result has fresh unique
/// ids and depth-first order; the inputs are not modified.
pub fn diff_with(old: Option<&UiTreeNode>, new: &UiTreeNode, identity: Identity<'_>) -> UiTreeNode {
    let mut out = match old {
        Some(old) => {
            let differ = Differ {
                identity,
                old_by_id: index(old, identity),
                new_ids: index(new, identity).into_keys().collect(),
            };
            differ.matched(new, old)
        }
        None => unchanged(new),
    };
    assign_ids_and_order(&mut out);
    out
}

struct Differ<'a, 'f> {
    identity: Identity<'f>,
    old_by_id: HashMap<String, &'a UiTreeNode>,
    new_ids: HashSet<String>,
}

impl<'a> Differ<'a, '_> {
    fn matched(&self, new: &UiTreeNode, old: &'a UiTreeNode) -> UiTreeNode {
        let diff_type = if new.properties == old.properties {
            DiffType::None
        } else {
            DiffType::Modified
        };
        let mut out = shallow(new, diff_type);
        out.children = self.children(Some(new), Some(old));
        out
    }

    fn added(&self, new: &UiTreeNode) -> UiTreeNode {
        let mut out = shallow(new, DiffType::Added);
        out.children = self.children(Some(new), None);
        out
    }

    fn removed(&self, old: &'a UiTreeNode, id: &str) -> UiTreeNode {
        let diff_type = if self.new_ids.contains(id) {
            DiffType::DeletedMove
        } else {
            DiffType::Deleted
        };
        let mut out = shallow(old, diff_type);
        out.children = self.children(None, Some(old));
        out
    }

    /// A new node whose identity differs from the old node at its position.
    fn placed(&self, new: &UiTreeNode, id: &str, old_siblings: &'a [UiTreeNode], old_ids: &[String]) -> UiTreeNode {
        if let Some(pos) = old_ids.iter().position(|o| o == id) {
            return self.matched(new, &old_siblings[pos]);
        }
        match self.old_by_id.get(id) {
            Some(&counterpart) => {
                let mut out = self.matched(new, counterpart);
                out.diff_type = DiffType::AddedMove;
                out
            }
            None => self.added(new),
        }
    }

    fn children(&self, new: Option<&UiTreeNode>, old: Option<&'a UiTreeNode>) -> Vec<UiTreeNode> {
        let new_children = new.map_or(&[][..], |n| n.children.as_slice());
        let old_children = old.map_or(&[][..], |o| o.children.as_slice());
        let new_ids: Vec<String> = new_children.iter().map(self.identity).collect();
        let old_ids: Vec<String> = old_children.iter().map(self.identity).collect();

        let mut out = Vec::with_capacity(new_children.len().max(old_children.len()));
        for i in 0..new_children.len().max(old_children.len()) {
            let old_child = old_children.get(i).map(|o| (o, old_ids[i].as_str()));
            match new_children.get(i) {
                Some(new_child) => {
                    let id = new_ids[i].as_str();
                    match old_child {
                        Some((o, old_id)) if old_id == id => out.push(self.matched(new_child, o)),
                        _ => {
                            if let Some((o, old_id)) = old_child
                                && !new_ids.iter().any(|n| n == old_id)
                            {
                                out.push(self.removed(o, old_id));
                            }
                            out.push(self.placed(new_child, id, old_children, &old_ids));
                        }
                    }
                }
                None => {
                    if let Some((o, old_id)) = old_child
                        && !new_ids.iter().any(|n| n == old_id)
                    {
                        out.push(self.removed(o, old_id));
                    }
                }
            }
        }
        out
    }
}

/// Identity → first node carrying it, over the whole tree.
fn index<'a>(root: &'a UiTreeNode, identity: Identity<'_>) -> HashMap<String, &'a UiTreeNode> {
    let mut map = HashMap::new();
    for node in root.iter_dfs() {
        let id = identity(node);
        if map.contains_key(&id) {
            tracing::warn!(%id, "duplicate node identity in diff input, keeping the first");
            continue;
        }
        map.insert(id, node);
    }
    map
}

fn shallow(node: &UiTreeNode, diff_type: DiffType) -> UiTreeNode {
    UiTreeNode {
        id: node.id.clone(),
        stable_id: node.stable_id.clone(),
        kind: node.kind.clone(),
        name: node.name.clone(),
        display_name: node.display_name.clone(),
        numeric_id: node.numeric_id,
        is_visible: node.is_visible,
        chips: node.chips.clone(),
        properties: node.properties.clone(),
        diff_type,
        dfs_order: node.dfs_order,
        children: Vec::new(),
    }
}

fn unchanged(node: &UiTreeNode) -> UiTreeNode {
    let mut out = shallow(node, DiffType::None);
    out.children = node.children.iter().map(unchanged).collect();
    out
}
