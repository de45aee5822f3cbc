use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::value::Value;

/// Where a property came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertySource {
    /// Present in the decoded payload.
    Decoded,
    /// Synthesized from the schema default.
    Default,
    /// Derived by a post-build computation.
    Calculated,
}

/// Maps a node to its display string.
///
/// Formatters receive the whole node so composite shapes (rects, colors,
/// matrices) can read their children.
pub trait PropertyFormatter: Send + Sync + std::fmt::Debug {
    fn format(&self, node: &PropertyNode) -> String;
}

/// A named, typed node of a property tree.
///
/// Children have unique names and keep insertion order. A node with
/// children carries no value; a childless node without a value is a
/// "not populated" placeholder.
#[derive(Debug, Clone)]
pub struct PropertyNode {
    id: String,
    name: String,
    value: Option<Value>,
    children: Vec<PropertyNode>,
    source: PropertySource,
    formatter: Option<Arc<dyn PropertyFormatter>>,
}

impl PropertyNode {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        source: PropertySource,
        value: Option<Value>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            value,
            children: Vec::new(),
            source,
            formatter: None,
        }
    }

    /// The root of a property tree. Its id prefixes every descendant id.
    pub fn root(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(id, name, PropertySource::Decoded, None)
    }

    pub fn decoded(id: impl Into<String>, name: impl Into<String>, value: Option<Value>) -> Self {
        Self::new(id, name, PropertySource::Decoded, value)
    }

    pub fn calculated(id: impl Into<String>, name: impl Into<String>, value: Option<Value>) -> Self {
        Self::new(id, name, PropertySource::Calculated, value)
    }

    /// Id for a child of this node called `name`.
    pub fn child_id(&self, name: &str) -> String {
        format!("{}.{name}", self.id)
    }

    /// Builder-style child append, used when assembling trees by hand.
    pub fn with_child(mut self, child: PropertyNode) -> Self {
        self.add_or_replace_child(child);
        self
    }

    /// Builder-style leaf append; the id is derived from this node.
    pub fn with_leaf(self, name: &str, value: impl Into<Value>) -> Self {
        let leaf = PropertyNode::new(self.child_id(name), name, self.source, Some(value.into()));
        self.with_child(leaf)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn source(&self) -> PropertySource {
        self.source
    }

    pub fn formatter(&self) -> Option<&Arc<dyn PropertyFormatter>> {
        self.formatter.as_ref()
    }

    pub fn all_children(&self) -> &[PropertyNode] {
        &self.children
    }

    pub fn children_mut(&mut self) -> impl Iterator<Item = &mut PropertyNode> {
        self.children.iter_mut()
    }

    pub fn child_by_name(&self, name: &str) -> Option<&PropertyNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn child_by_name_mut(&mut self, name: &str) -> Option<&mut PropertyNode> {
        self.children.iter_mut().find(|c| c.name == name)
    }

    /// Walks a dotted path of child names.
    pub fn descendant(&self, path: &[&str]) -> Option<&PropertyNode> {
        path.iter()
            .try_fold(self, |node, name| node.child_by_name(name))
    }

    /// Value of a direct child leaf.
    pub fn child_value(&self, name: &str) -> Option<&Value> {
        self.child_by_name(name).and_then(PropertyNode::value)
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// No value and no children.
    pub fn is_placeholder(&self) -> bool {
        self.value.is_none() && self.children.is_empty()
    }

    /// Inserts `child`, replacing a same-named child in place.
    pub fn add_or_replace_child(&mut self, child: PropertyNode) {
        self.value = None;
        match self.children.iter_mut().find(|c| c.name == child.name) {
            Some(existing) => *existing = child,
            None => self.children.push(child),
        }
    }

    pub fn remove_child(&mut self, name: &str) -> Option<PropertyNode> {
        let pos = self.children.iter().position(|c| c.name == name)?;
        Some(self.children.remove(pos))
    }

    pub fn set_value(&mut self, value: Option<Value>) {
        self.value = value;
    }

    pub fn set_source(&mut self, source: PropertySource) {
        self.source = source;
    }

    pub fn set_formatter(&mut self, formatter: Option<Arc<dyn PropertyFormatter>>) {
        self.formatter = formatter;
    }

    /// Display string; empty when no formatter is attached.
    pub fn formatted_value(&self) -> String {
        self.formatter
            .as_ref()
            .map(|f| f.format(self))
            .unwrap_or_default()
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(PropertyNode::node_count).sum::<usize>()
    }

    /// Pre-order walk yielding each node with its path below `self`.
    pub fn walk(&self, visit: &mut dyn FnMut(&str, &PropertyNode)) {
        fn go(node: &PropertyNode, prefix: &str, visit: &mut dyn FnMut(&str, &PropertyNode)) {
            for child in &node.children {
                let path = if prefix.is_empty() {
                    child.name.clone()
                } else {
                    format!("{prefix}.{}", child.name)
                };
                visit(&path, child);
                go(child, &path, visit);
            }
        }
        go(self, "", visit);
    }
}
