//! Schema introspection over compiled protobuf descriptors.
//!
//! Every message type is turned into a [`MessageSchema`] once, when the
//! registry is built. Decoding, default injection and formatting only ever
//! read these tables.

pub mod builder;
pub mod field;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use protobuf::Message;
use protobuf::descriptor::{FileDescriptorProto, FileDescriptorSet};
use protobuf::reflect::{FileDescriptor, MessageDescriptor};
use protobuf::UnknownValueRef;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use field::{EnumInfo, FieldDescriptor, FieldKind, ScalarKind, lower_camel};

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("invalid descriptor: {0}")]
    Protobuf(#[from] protobuf::Error),
    #[error("unknown message type `{0}`")]
    UnknownMessage(String),
}

/// Maps custom `FieldOptions` extension numbers to annotation keys.
///
/// Android protos tag bit-flag fields with a `typedef` option; its extension
/// number is not part of the descriptor itself so it is supplied here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaOptions {
    #[serde(default)]
    pub annotations: BTreeMap<u32, String>,
}

impl SchemaOptions {
    pub fn with_annotation(mut self, extension_number: u32, key: impl Into<String>) -> Self {
        self.annotations.insert(extension_number, key.into());
        self
    }
}

/// Which fields of a message an operation or decode pass touches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSelection {
    #[default]
    All,
    Only(Vec<String>),
    Except(Vec<String>),
}

impl FieldSelection {
    pub fn includes(&self, name: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(names) => names.iter().any(|n| n == name),
            Self::Except(names) => !names.iter().any(|n| n == name),
        }
    }
}

/// Field table of one message type, in declaration order.
#[derive(Debug)]
pub struct MessageSchema {
    full_name: String,
    name: String,
    fields: Vec<FieldDescriptor>,
    by_name: HashMap<String, usize>,
    descriptor: MessageDescriptor,
}

impl MessageSchema {
    fn build(descriptor: &MessageDescriptor, options: &SchemaOptions) -> Self {
        let fields: Vec<FieldDescriptor> = descriptor
            .fields()
            .map(|f| FieldDescriptor::from_proto(&f, read_annotations(&f, options)))
            .collect();
        let by_name = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect();
        Self {
            full_name: descriptor.full_name().to_string(),
            name: descriptor.name().to_string(),
            fields,
            by_name,
            descriptor: descriptor.clone(),
        }
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Unqualified message name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.by_name.get(name).map(|&i| &self.fields[i])
    }

    pub fn field_by_number(&self, number: u32) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.number == number)
    }

    pub fn descriptor(&self) -> &MessageDescriptor {
        &self.descriptor
    }
}

/// All message types of a compiled schema, indexed by full name.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    messages: HashMap<String, Arc<MessageSchema>>,
}

impl SchemaRegistry {
    /// Builds from the output of `protoc --descriptor_set_out`.
    pub fn from_descriptor_set(bytes: &[u8], options: &SchemaOptions) -> Result<Self, SchemaError> {
        let set = FileDescriptorSet::parse_from_bytes(bytes)?;
        Self::from_file_protos(set.file, options)
    }

    /// Builds from file descriptors listed in dependency order.
    pub fn from_file_protos(
        files: Vec<FileDescriptorProto>,
        options: &SchemaOptions,
    ) -> Result<Self, SchemaError> {
        let files = FileDescriptor::new_dynamic_fds(files, &[])?;
        let mut registry = Self::default();
        for file in &files {
            for message in file.messages() {
                registry.index(&message, options);
            }
        }
        tracing::debug!(messages = registry.messages.len(), "schema registry built");
        Ok(registry)
    }

    fn index(&mut self, descriptor: &MessageDescriptor, options: &SchemaOptions) {
        let schema = MessageSchema::build(descriptor, options);
        self.messages
            .insert(schema.full_name.clone(), Arc::new(schema));
        for nested in descriptor.nested_messages() {
            self.index(&nested, options);
        }
    }

    /// Field table of a message type. A leading `.` is accepted.
    pub fn fields_of(&self, message: &str) -> Option<&Arc<MessageSchema>> {
        self.messages.get(message.trim_start_matches('.'))
    }

    pub fn require(&self, message: &str) -> Result<&Arc<MessageSchema>, SchemaError> {
        self.fields_of(message)
            .ok_or_else(|| SchemaError::UnknownMessage(message.to_string()))
    }

    /// Schema of the element type of a message-typed field.
    pub fn nested(&self, field: &FieldDescriptor) -> Option<&Arc<MessageSchema>> {
        field.message_type().and_then(|name| self.fields_of(name))
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

fn read_annotations(
    field: &protobuf::reflect::FieldDescriptor,
    options: &SchemaOptions,
) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    let Some(field_options) = field.proto().options.as_ref() else {
        return out;
    };
    let unknown = field_options.special_fields.unknown_fields();
    for (&number, key) in &options.annotations {
        let value = match unknown.get(number) {
            Some(UnknownValueRef::LengthDelimited(bytes)) => {
                String::from_utf8_lossy(bytes).into_owned()
            }
            Some(UnknownValueRef::Varint(v)) => v.to_string(),
            _ => continue,
        };
        out.insert(key.clone(), value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use crate::tree::Value;

    #[test]
    fn fields_keep_declaration_order() {
        let reg = testing::registry();
        let layer = reg.fields_of(testing::LAYER).expect("layer");
        let names: Vec<_> = layer.fields().iter().take(4).map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name", "children", "relatives"]);
        assert!(reg.fields_of(&format!(".{}", testing::LAYER)).is_some());
    }

    #[test]
    fn defaults_per_kind() {
        let reg = testing::registry();
        let layer = reg.fields_of(testing::LAYER).expect("layer");
        let default = |n: &str| layer.field(n).and_then(|f| f.default_value.clone());
        assert_eq!(default("id"), Some(Value::Int(0)));
        assert_eq!(default("name"), Some(Value::String(String::new())));
        assert_eq!(default("isOpaque"), Some(Value::Bool(false)));
        assert_eq!(default("parent"), Some(Value::Int(-1)));
        assert_eq!(default("layerStack"), Some(Value::UInt(0)));
        assert_eq!(default("hwcCompositionType"), Some(Value::Int(0)));
        assert_eq!(default("color"), None);
        assert_eq!(default("children"), None);
    }

    #[test]
    fn nested_types_resolve_through_registry() {
        let reg = testing::registry();
        let layer = reg.fields_of(testing::LAYER).expect("layer");
        let color = layer.field("color").and_then(|f| reg.nested(f)).expect("color");
        assert_eq!(color.name(), "ColorProto");
        // self-recursive schema terminates
        let node = reg.fields_of("test.NodeProto").expect("node");
        let child = node.field("child").and_then(|f| reg.nested(f)).expect("child");
        assert_eq!(child.full_name(), "test.NodeProto");
    }

    #[test]
    fn enums_and_annotations() {
        let reg = testing::registry();
        let layer = reg.fields_of(testing::LAYER).expect("layer");
        let hwc = layer.field("hwcCompositionType").and_then(FieldDescriptor::enum_info);
        assert_eq!(hwc.and_then(|e| e.name_of(2)), Some("DEVICE"));
        let flags = layer.field("flags").expect("flags");
        assert_eq!(flags.annotation("typedef"), Some("LayerFlags"));
        assert!(layer.field("id").is_some_and(|f| f.annotations.is_empty()));
    }

    #[test]
    fn map_fields_are_repeated() {
        let reg = testing::registry();
        let layer = reg.fields_of(testing::LAYER).expect("layer");
        let meta = layer.field("metadata").expect("metadata");
        assert!(meta.is_map && meta.is_repeated);
        assert!(meta.default_value.is_none());
    }

    #[test]
    fn unknown_message_is_an_error() {
        let reg = testing::registry();
        assert!(matches!(
            reg.require("test.Missing"),
            Err(SchemaError::UnknownMessage(_))
        ));
    }

    #[test]
    fn descriptor_set_roundtrip() {
        let set = FileDescriptorSet {
            file: testing::files(),
            ..Default::default()
        };
        let bytes = set.write_to_bytes().expect("encode");
        let reg = SchemaRegistry::from_descriptor_set(&bytes, &testing::options()).expect("registry");
        assert!(reg.fields_of(testing::TRACE_FILE).is_some());
        let flags = reg
            .fields_of(testing::LAYER)
            .and_then(|m| m.field("flags"))
            .and_then(|f| f.annotation("typedef"));
        assert_eq!(flags, Some("LayerFlags"));
    }
}
