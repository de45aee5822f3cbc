use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::OnceCell;

use super::property::PropertyNode;
use crate::operations::OperationChain;

/// Produces the lazily decoded part of a node's properties.
pub type LazyLoader = Arc<dyn Fn() -> PropertyNode + Send + Sync>;

/// Eager and lazy properties of one hierarchy node.
///
/// The eager tree is built and processed up front. The lazy tree is
/// decoded on the first call to [`PropertiesProvider::all`], processed with
/// the lazy and common operations, merged with the eager tree and cached.
/// Concurrent first callers wait on the same in-flight load.
pub struct PropertiesProvider {
    eager: PropertyNode,
    lazy: Option<LazyLoader>,
    lazy_ops: OperationChain,
    common_ops: OperationChain,
    full: OnceCell<PropertyNode>,
    loads: AtomicUsize,
}

impl std::fmt::Debug for PropertiesProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertiesProvider")
            .field("eager", &self.eager.id())
            .field("has_lazy", &self.lazy.is_some())
            .field("loaded", &self.full.initialized())
            .finish()
    }
}

impl PropertiesProvider {
    pub fn builder() -> PropertiesProviderBuilder {
        PropertiesProviderBuilder::default()
    }

    /// Provider with eager properties only.
    pub fn eager_only(eager: PropertyNode) -> Self {
        Self::builder().set_eager_properties(eager).build()
    }

    pub fn eager(&self) -> &PropertyNode {
        &self.eager
    }

    /// Adds or replaces an eager property, also updating the merged tree if
    /// it was already loaded.
    pub fn add_eager_property(&mut self, child: PropertyNode) {
        if let Some(full) = self.full.get_mut() {
            full.add_or_replace_child(child.clone());
        }
        self.eager.add_or_replace_child(child);
    }

    pub fn is_loaded(&self) -> bool {
        self.full.initialized()
    }

    /// How many times the lazy loader has run.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Acquire)
    }

    /// All properties: eager merged over lazy. The lazy part loads at most
    /// once per provider.
    pub async fn all(&self) -> &PropertyNode {
        self.full.get_or_init(|| async { self.load() }).await
    }

    fn load(&self) -> PropertyNode {
        let Some(loader) = &self.lazy else {
            return self.eager.clone();
        };
        self.loads.fetch_add(1, Ordering::AcqRel);
        let mut full = loader();
        self.lazy_ops.apply(&mut full);
        self.common_ops.apply(&mut full);
        for child in self.eager.all_children() {
            full.add_or_replace_child(child.clone());
        }
        tracing::debug!(id = self.eager.id(), nodes = full.node_count(), "loaded lazy properties");
        full
    }
}

/// Assembles a [`PropertiesProvider`], running the eager and common
/// operations over the eager tree in [`build`](Self::build).
#[derive(Default)]
pub struct PropertiesProviderBuilder {
    eager: Option<PropertyNode>,
    lazy: Option<LazyLoader>,
    eager_ops: OperationChain,
    lazy_ops: OperationChain,
    common_ops: OperationChain,
}

impl PropertiesProviderBuilder {
    pub fn set_eager_properties(mut self, node: PropertyNode) -> Self {
        self.eager = Some(node);
        self
    }

    pub fn set_lazy_properties_strategy(mut self, loader: LazyLoader) -> Self {
        self.lazy = Some(loader);
        self
    }

    pub fn set_eager_operations(mut self, ops: OperationChain) -> Self {
        self.eager_ops = ops;
        self
    }

    pub fn set_lazy_operations(mut self, ops: OperationChain) -> Self {
        self.lazy_ops = ops;
        self
    }

    pub fn set_common_operations(mut self, ops: OperationChain) -> Self {
        self.common_ops = ops;
        self
    }

    pub fn build(self) -> PropertiesProvider {
        let mut eager = self
            .eager
            .unwrap_or_else(|| PropertyNode::root("", ""));
        self.eager_ops.apply(&mut eager);
        self.common_ops.apply(&mut eager);
        PropertiesProvider {
            eager,
            lazy: self.lazy,
            lazy_ops: self.lazy_ops,
            common_ops: self.common_ops,
            full: OnceCell::new(),
            loads: AtomicUsize::new(0),
        }
    }
}
