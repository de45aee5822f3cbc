//! Turns one decoded entry message into a root provider and child specs.

use std::collections::HashSet;
use std::sync::Arc;

use protobuf::MessageDyn;

use super::format::{ChildContainer, HierarchyFormat};
use crate::decoder::message::{field_message, field_value, repeated_messages, repeated_values};
use crate::decoder::{DecodeWarning, dedupe_identities, message_to_node};
use crate::hierarchy::{ChildSpec, make_stable_id};
use crate::operations::{AddDefaults, IntDefMap, OperationChain, SetFormatters, TranslateIntDef};
use crate::schema::{FieldSelection, MessageSchema, SchemaError, SchemaRegistry};
use crate::tree::{LazyLoader, PropertiesProvider, PropertyNode, Value};

const MISSING_NAME: &str = "Missing layer";

pub(crate) struct Extracted {
    pub root: PropertiesProvider,
    pub children: Vec<ChildSpec>,
    pub warnings: Vec<DecodeWarning>,
}

/// A node message found in the entry, before providers are built.
struct Found {
    key: i64,
    parent_key: Option<i64>,
    numeric_id: Option<i64>,
    name: String,
    message: Box<dyn MessageDyn>,
}

#[derive(Debug)]
pub(crate) struct Extractor {
    format: HierarchyFormat,
    registry: Arc<SchemaRegistry>,
    intdefs: Arc<IntDefMap>,
    entry: Arc<MessageSchema>,
    node: Arc<MessageSchema>,
    /// Node fields decoded up front and on demand, without the nested
    /// children field.
    eager: FieldSelection,
    lazy: Option<FieldSelection>,
}

impl Extractor {
    pub fn new(
        format: HierarchyFormat,
        entry_message: &str,
        registry: Arc<SchemaRegistry>,
        intdefs: Arc<IntDefMap>,
    ) -> Result<Self, SchemaError> {
        let entry = Arc::clone(registry.require(entry_message)?);
        let node = Arc::clone(registry.require(&format.child_message)?);
        let nested = match &format.children {
            ChildContainer::Nested { children_field, .. } => Some(children_field.as_str()),
            ChildContainer::Flat { .. } => None,
        };
        let eager = without(&format.eager, nested);
        let lazy = match &format.eager {
            FieldSelection::All => None,
            FieldSelection::Only(names) => Some(without(&FieldSelection::Except(names.clone()), nested)),
            FieldSelection::Except(names) => Some(without(&FieldSelection::Only(names.clone()), nested)),
        };
        Ok(Self {
            format,
            registry,
            intdefs,
            entry,
            node,
            eager,
            lazy,
        })
    }

    pub fn extract(&self, message: &dyn MessageDyn) -> Extracted {
        let mut found = Vec::new();
        with_owner(&self.registry, &self.entry, message, self.container_path(), &mut |schema, owner| {
            found = match &self.format.children {
                ChildContainer::Flat { list, parent_field, .. } => self.find_flat(schema, owner, list, parent_field),
                ChildContainer::Nested {
                    roots, children_field, ..
                } => self.find_nested(schema, owner, roots, children_field),
            };
        });

        let warnings = dedupe_identities(found.iter_mut().map(|f| (f.numeric_id, &mut f.name)));
        let missing = self.missing_children(&found);
        let mut children: Vec<ChildSpec> = found.into_iter().map(|f| self.child_spec(f)).collect();
        children.extend(missing);

        Extracted {
            root: self.root_provider(message),
            children,
            warnings,
        }
    }

    fn container_path(&self) -> &[String] {
        match &self.format.children {
            ChildContainer::Flat { path, .. } | ChildContainer::Nested { path, .. } => path,
        }
    }

    fn numeric_id(&self, message: &dyn MessageDyn) -> Option<i64> {
        let field = self.format.id_field.as_deref()?;
        field_value(&self.node, message, field).and_then(|v| v.as_i64())
    }

    fn name_of(&self, message: &dyn MessageDyn) -> String {
        match field_value(&self.node, message, &self.format.name_field) {
            Some(Value::String(name)) => name,
            _ => String::new(),
        }
    }

    fn find_flat(&self, owner_schema: &MessageSchema, owner: &dyn MessageDyn, list: &str, parent_field: &str) -> Vec<Found> {
        let parent_default = self
            .node
            .field(parent_field)
            .and_then(|f| f.default_value.as_ref())
            .and_then(Value::as_i64)
            .unwrap_or(-1);
        repeated_messages(owner_schema, owner, list)
            .into_iter()
            .enumerate()
            .map(|(i, m)| {
                let numeric_id = self.numeric_id(&*m);
                let parent = field_value(&self.node, &*m, parent_field)
                    .and_then(|v| v.as_i64())
                    .unwrap_or(parent_default);
                Found {
                    key: numeric_id.unwrap_or(i as i64),
                    parent_key: (parent >= 0).then_some(parent),
                    numeric_id,
                    name: self.name_of(&*m),
                    message: m.clone_box(),
                }
            })
            .collect()
    }

    fn find_nested(&self, owner_schema: &MessageSchema, owner: &dyn MessageDyn, roots: &str, children_field: &str) -> Vec<Found> {
        let mut found = Vec::new();
        for root in repeated_messages(owner_schema, owner, roots) {
            self.collect_nested(&*root, None, children_field, &mut found);
        }
        found
    }

    // Keys are pre-order positions; numeric ids may repeat or be absent.
    fn collect_nested(&self, message: &dyn MessageDyn, parent_key: Option<i64>, children_field: &str, out: &mut Vec<Found>) {
        let key = out.len() as i64;
        out.push(Found {
            key,
            parent_key,
            numeric_id: self.numeric_id(message),
            name: self.name_of(message),
            message: message.clone_box(),
        });
        for child in repeated_messages(&self.node, message, children_field) {
            self.collect_nested(&*child, Some(key), children_field, out);
        }
    }

    /// Placeholder specs for ids listed as children but absent from the entry.
    fn missing_children(&self, found: &[Found]) -> Vec<ChildSpec> {
        let ChildContainer::Flat {
            children_field: Some(children_field),
            ..
        } = &self.format.children
        else {
            return Vec::new();
        };
        let present: HashSet<i64> = found.iter().map(|f| f.key).collect();
        let mut added = HashSet::new();
        let mut missing = Vec::new();
        for parent in found {
            for id in repeated_values(&self.node, &*parent.message, children_field)
                .iter()
                .filter_map(Value::as_i64)
            {
                if present.contains(&id) || !added.insert(id) {
                    continue;
                }
                tracing::warn!(id, parent = parent.key, "child missing from entry");
                let stable_id = make_stable_id(&self.format.child_kind, Some(id), MISSING_NAME);
                let eager = PropertyNode::root(&stable_id, MISSING_NAME).with_child(PropertyNode::calculated(
                    format!("{stable_id}.isMissing"),
                    "isMissing",
                    Some(Value::Bool(true)),
                ));
                missing.push(ChildSpec {
                    key: id,
                    parent_key: Some(parent.key),
                    kind: self.format.child_kind.clone(),
                    numeric_id: Some(id),
                    name: MISSING_NAME.to_string(),
                    provider: PropertiesProvider::builder()
                        .set_eager_properties(eager)
                        .set_common_operations(OperationChain::new().with(SetFormatters::new()))
                        .build(),
                });
            }
        }
        missing
    }

    fn common_operations(&self, message: &str) -> OperationChain {
        OperationChain::new()
            .with(SetFormatters::new().with_schema(Arc::clone(&self.registry), message))
            .with(TranslateIntDef::new(
                Arc::clone(&self.registry),
                message,
                Arc::clone(&self.intdefs),
            ))
    }

    fn root_provider(&self, message: &dyn MessageDyn) -> PropertiesProvider {
        let format = &self.format;
        let stable_id = make_stable_id(&format.root_kind, None, &format.root_name);
        let eager = message_to_node(
            &self.registry,
            &self.entry,
            message,
            &stable_id,
            &format.root_name,
            &format.root_eager,
        );
        let entry = self.entry.full_name();
        PropertiesProvider::builder()
            .set_eager_properties(eager)
            .set_eager_operations(OperationChain::new().with(AddDefaults::new(
                Arc::clone(&self.registry),
                entry,
                format.root_eager.clone(),
            )))
            .set_common_operations(self.common_operations(entry))
            .build()
    }

    fn child_spec(&self, found: Found) -> ChildSpec {
        let stable_id = make_stable_id(&self.format.child_kind, found.numeric_id, &found.name);
        let node = self.node.full_name();
        let eager = message_to_node(&self.registry, &self.node, &*found.message, &stable_id, &found.name, &self.eager);
        let mut provider = PropertiesProvider::builder()
            .set_eager_properties(eager)
            .set_eager_operations(OperationChain::new().with(AddDefaults::new(
                Arc::clone(&self.registry),
                node,
                self.eager.clone(),
            )))
            .set_common_operations(self.common_operations(node));

        if let Some(lazy) = &self.lazy {
            provider = provider
                .set_lazy_properties_strategy(self.loader(found.message, stable_id, found.name.clone(), lazy.clone()))
                .set_lazy_operations(OperationChain::new().with(AddDefaults::new(
                    Arc::clone(&self.registry),
                    node,
                    lazy.clone(),
                )));
        }

        ChildSpec {
            key: found.key,
            parent_key: found.parent_key,
            kind: self.format.child_kind.clone(),
            numeric_id: found.numeric_id,
            name: found.name,
            provider: provider.build(),
        }
    }

    fn loader(&self, message: Box<dyn MessageDyn>, id: String, name: String, selection: FieldSelection) -> LazyLoader {
        let registry = Arc::clone(&self.registry);
        let schema = Arc::clone(&self.node);
        Arc::new(move || message_to_node(&registry, &schema, &*message, &id, &name, &selection))
    }
}

/// Follows singular message fields from the entry down to the message
/// owning the node list. Does nothing if a step is absent.
fn with_owner(
    registry: &SchemaRegistry,
    schema: &MessageSchema,
    message: &dyn MessageDyn,
    path: &[String],
    visit: &mut dyn FnMut(&MessageSchema, &dyn MessageDyn),
) {
    let Some((step, rest)) = path.split_first() else {
        visit(schema, message);
        return;
    };
    let nested = schema.field(step).and_then(|f| registry.nested(f));
    if let (Some(nested), Some(inner)) = (nested, field_message(schema, message, step)) {
        with_owner(registry, nested, &*inner, rest, visit);
    }
}

/// `selection` with `field` always left out.
fn without(selection: &FieldSelection, field: Option<&str>) -> FieldSelection {
    let Some(field) = field else {
        return selection.clone();
    };
    match selection {
        FieldSelection::All => FieldSelection::Except(vec![field.to_string()]),
        FieldSelection::Only(names) => FieldSelection::Only(names.iter().filter(|n| *n != field).cloned().collect()),
        FieldSelection::Except(names) => {
            let mut names = names.clone();
            names.push(field.to_string());
            FieldSelection::Except(names)
        }
    }
}
