//! Transformations applied to freshly decoded property trees.
//!
//! Operations never fail: a field that cannot be found or a shape that
//! cannot be recognised leaves the tree as it was.

pub mod add_defaults;
pub mod formatters;
pub mod intdef;
pub mod set_formatters;
pub mod translate_intdef;

use std::sync::Arc;

use crate::tree::PropertyNode;

pub use add_defaults::AddDefaults;
pub use intdef::{IntDefMap, IntDefError};
pub use set_formatters::SetFormatters;
pub use translate_intdef::TranslateIntDef;

pub trait Operation: Send + Sync + std::fmt::Debug {
    fn apply(&self, node: &mut PropertyNode);
}

/// Operations applied in insertion order.
#[derive(Debug, Clone, Default)]
pub struct OperationChain {
    ops: Vec<Arc<dyn Operation>>,
}

impl OperationChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, op: impl Operation + 'static) -> Self {
        self.ops.push(Arc::new(op));
        self
    }

    pub fn with_shared(mut self, op: Arc<dyn Operation>) -> Self {
        self.ops.push(op);
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn apply(&self, node: &mut PropertyNode) {
        for op in &self.ops {
            op.apply(node);
        }
    }
}
