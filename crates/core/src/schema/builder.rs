//! Declares protobuf schemas in code, for embedded presets and fixtures.
//!
//! Produces the same `FileDescriptorProto` that `protoc` would for the
//! equivalent proto2 source.

use protobuf::descriptor::field_descriptor_proto::{Label, Type};
use protobuf::descriptor::{
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
    FileDescriptorProto,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Int32,
    Int64,
    UInt32,
    UInt64,
    SInt32,
    Fixed64,
    SFixed64,
    Float,
    Double,
    Bool,
    String,
    Bytes,
    /// Fully qualified enum name, without the leading dot.
    Enum(String),
    /// Fully qualified message name, without the leading dot.
    Message(String),
}

impl FieldType {
    pub fn message(name: &str) -> Self {
        Self::Message(name.to_string())
    }

    pub fn enumeration(name: &str) -> Self {
        Self::Enum(name.to_string())
    }

    fn apply(&self, field: &mut FieldDescriptorProto) {
        let ty = match self {
            Self::Int32 => Type::TYPE_INT32,
            Self::Int64 => Type::TYPE_INT64,
            Self::UInt32 => Type::TYPE_UINT32,
            Self::UInt64 => Type::TYPE_UINT64,
            Self::SInt32 => Type::TYPE_SINT32,
            Self::Fixed64 => Type::TYPE_FIXED64,
            Self::SFixed64 => Type::TYPE_SFIXED64,
            Self::Float => Type::TYPE_FLOAT,
            Self::Double => Type::TYPE_DOUBLE,
            Self::Bool => Type::TYPE_BOOL,
            Self::String => Type::TYPE_STRING,
            Self::Bytes => Type::TYPE_BYTES,
            Self::Enum(name) => {
                field.set_type_name(format!(".{name}"));
                Type::TYPE_ENUM
            }
            Self::Message(name) => {
                field.set_type_name(format!(".{name}"));
                Type::TYPE_MESSAGE
            }
        };
        field.set_type(ty);
    }
}

pub struct FileBuilder {
    proto: FileDescriptorProto,
}

impl FileBuilder {
    pub fn new(file_name: &str, package: &str) -> Self {
        let mut proto = FileDescriptorProto::new();
        proto.set_name(file_name.to_string());
        proto.set_package(package.to_string());
        proto.set_syntax("proto2".to_string());
        Self { proto }
    }

    pub fn message(mut self, message: MessageBuilder) -> Self {
        self.proto.message_type.push(message.proto);
        self
    }

    pub fn enumeration(mut self, e: EnumBuilder) -> Self {
        self.proto.enum_type.push(e.proto);
        self
    }

    pub fn build(self) -> FileDescriptorProto {
        self.proto
    }
}

pub struct MessageBuilder {
    full_name: String,
    proto: DescriptorProto,
}

impl MessageBuilder {
    /// `full_name` is package-qualified; the message is declared under its
    /// last segment.
    pub fn new(full_name: &str) -> Self {
        let mut proto = DescriptorProto::new();
        let short = full_name.rsplit('.').next().unwrap_or(full_name);
        proto.set_name(short.to_string());
        Self {
            full_name: full_name.to_string(),
            proto,
        }
    }

    fn push(mut self, name: &str, number: i32, ty: &FieldType, label: Label) -> Self {
        let mut field = FieldDescriptorProto::new();
        field.set_name(name.to_string());
        field.set_number(number);
        field.set_label(label);
        ty.apply(&mut field);
        self.proto.field.push(field);
        self
    }

    pub fn field(self, name: &str, number: i32, ty: FieldType) -> Self {
        self.push(name, number, &ty, Label::LABEL_OPTIONAL)
    }

    pub fn repeated(self, name: &str, number: i32, ty: FieldType) -> Self {
        self.push(name, number, &ty, Label::LABEL_REPEATED)
    }

    /// `map<key, value>` declared through a nested `*Entry` message.
    pub fn map(mut self, name: &str, number: i32, key: FieldType, value: FieldType) -> Self {
        let entry_name = format!("{}Entry", upper_camel(name));
        let mut entry = MessageBuilder::new(&format!("{}.{entry_name}", self.full_name))
            .field("key", 1, key)
            .field("value", 2, value);
        entry.proto.options.mut_or_insert_default().set_map_entry(true);
        self.proto.nested_type.push(entry.proto);
        let entry_type = FieldType::Message(format!("{}.{entry_name}", self.full_name));
        self.push(name, number, &entry_type, Label::LABEL_REPEATED)
    }

    /// proto2 `[default = ...]` on the most recently added field.
    pub fn with_default(mut self, text: &str) -> Self {
        if let Some(field) = self.proto.field.last_mut() {
            field.set_default_value(text.to_string());
        }
        self
    }

    /// A string-valued custom field option on the most recently added
    /// field, e.g. `[(android.typedef) = "LayerFlags"]`.
    pub fn with_option(mut self, extension_number: u32, value: &str) -> Self {
        if let Some(field) = self.proto.field.last_mut() {
            field
                .options
                .mut_or_insert_default()
                .special_fields
                .mut_unknown_fields()
                .add_length_delimited(extension_number, value.as_bytes().to_vec());
        }
        self
    }
}

pub struct EnumBuilder {
    proto: EnumDescriptorProto,
}

impl EnumBuilder {
    pub fn new(name: &str) -> Self {
        let mut proto = EnumDescriptorProto::new();
        proto.set_name(name.to_string());
        Self { proto }
    }

    pub fn value(mut self, name: &str, number: i32) -> Self {
        let mut v = EnumValueDescriptorProto::new();
        v.set_name(name.to_string());
        v.set_number(number);
        self.proto.value.push(v);
        self
    }
}

fn upper_camel(name: &str) -> String {
    let camel = super::lower_camel(name);
    let mut chars = camel.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
