use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::computations::{LayerRectsComputation, RectsComputation, VisibilityComputation};
use crate::decoder::ContainerFormat;
use crate::hierarchy::Computation;
use crate::schema::FieldSelection;

/// Everything needed to turn one kind of trace file into hierarchies.
///
/// Loadable from JSON, so new trace kinds only need a schema and a format
/// description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceFormat {
    pub name: String,
    pub container: ContainerFormat,
    /// Full name of the entry message.
    pub entry_message: String,
    pub hierarchy: HierarchyFormat,
    #[serde(default)]
    pub computations: Vec<ComputationKind>,
}

/// How the nodes of one entry are laid out in its message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyFormat {
    pub root_kind: String,
    pub root_name: String,
    /// Entry fields kept as root properties.
    #[serde(default)]
    pub root_eager: FieldSelection,
    pub children: ChildContainer,
    pub child_kind: String,
    /// Full name of the node message.
    pub child_message: String,
    /// Integer field holding the node's numeric id.
    #[serde(default)]
    pub id_field: Option<String>,
    pub name_field: String,
    /// Node fields decoded eagerly; the rest load on demand.
    #[serde(default)]
    pub eager: FieldSelection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChildContainer {
    /// All nodes in one repeated field, linked by a parent-id field.
    /// Negative parent ids mean "top level".
    Flat {
        /// Singular message fields leading from the entry to the list owner.
        #[serde(default)]
        path: Vec<String>,
        list: String,
        parent_field: String,
        /// Repeated child-id field; ids listed there but absent from the
        /// entry become placeholder nodes.
        #[serde(default)]
        children_field: Option<String>,
    },
    /// Top-level nodes in one repeated field, each nesting its children.
    Nested {
        #[serde(default)]
        path: Vec<String>,
        roots: String,
        children_field: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputationKind {
    Visibility,
    LayerRects,
    Rects,
}

impl ComputationKind {
    pub fn build(self) -> Arc<dyn Computation> {
        match self {
            Self::Visibility => Arc::new(VisibilityComputation),
            Self::LayerRects => Arc::new(LayerRectsComputation),
            Self::Rects => Arc::new(RectsComputation),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_format_from_json() {
        let format: TraceFormat = serde_json::from_str(
            r#"{
                "name": "views",
                "container": { "magic": [8, 86], "entry_field": 2, "timestamp_field": 1 },
                "entry_message": "test.ViewEntryProto",
                "hierarchy": {
                    "root_kind": "Window",
                    "root_name": "window",
                    "children": { "type": "nested", "roots": "views", "children_field": "children" },
                    "child_kind": "View",
                    "child_message": "test.ViewNodeProto",
                    "id_field": "hashcode",
                    "name_field": "viewId"
                },
                "computations": ["rects"]
            }"#,
        )
        .expect("format");
        assert_eq!(format.hierarchy.eager, FieldSelection::All);
        assert!(matches!(format.hierarchy.children, ChildContainer::Nested { ref path, .. } if path.is_empty()));
        assert_eq!(format.computations, vec![ComputationKind::Rects]);
    }
}
