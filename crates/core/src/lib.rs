//! Decoding of winscope protobuf traces into lazily-populated property trees
//! and entity hierarchies, and their projection into filtered, chip-annotated
//! and diffed [`UiTreeNode`](winscope_protocol::UiTreeNode) trees.

pub mod computations;
pub mod decoder;
pub mod differ;
pub mod generator;
pub mod hierarchy;
pub mod operations;
pub mod parsers;
pub mod schema;
pub mod trace;
pub mod tree;

#[cfg(test)]
pub(crate) mod testing;

pub use differ::{diff, diff_with};
pub use generator::{GeneratedTree, TextFilter, TreeGenerator};
pub use hierarchy::{HierarchyTree, NodeIndex};
pub use parsers::{ParseError, ParsedEntry, TraceFormat, TraceParser, parse_auto};
pub use trace::{Trace, TraceEntry};
pub use tree::{PropertiesProvider, PropertyNode, Value};
