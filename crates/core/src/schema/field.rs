use std::collections::BTreeMap;
use std::sync::Arc;

use protobuf::reflect::{EnumDescriptor, FieldDescriptor as ProtoField, RuntimeFieldType, RuntimeType};

use crate::tree::Value;

/// Wire-independent scalar kinds. `sint*`/`sfixed*` fold into the signed
/// kinds, `fixed*` into the unsigned ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Int32,
    Int64,
    UInt32,
    UInt64,
    Float,
    Double,
    Bool,
    String,
    Bytes,
}

impl ScalarKind {
    pub fn is_integer(self) -> bool {
        matches!(self, Self::Int32 | Self::Int64 | Self::UInt32 | Self::UInt64)
    }

    fn zero(self) -> Value {
        match self {
            Self::Int32 | Self::Int64 => Value::Int(0),
            Self::UInt32 | Self::UInt64 => Value::UInt(0),
            Self::Float | Self::Double => Value::Float(0.0),
            Self::Bool => Value::Bool(false),
            Self::String => Value::String(String::new()),
            Self::Bytes => Value::Bytes(Vec::new()),
        }
    }

    /// Parses a proto2 `[default = ...]` literal.
    fn parse_default(self, text: &str) -> Option<Value> {
        match self {
            Self::Int32 | Self::Int64 => text.parse().ok().map(Value::Int),
            Self::UInt32 | Self::UInt64 => text.parse().ok().map(Value::UInt),
            Self::Float | Self::Double => match text {
                "inf" => Some(Value::Float(f64::INFINITY)),
                "-inf" => Some(Value::Float(f64::NEG_INFINITY)),
                "nan" => Some(Value::Float(f64::NAN)),
                _ => text.parse().ok().map(Value::Float),
            },
            Self::Bool => text.parse().ok().map(Value::Bool),
            Self::String => Some(Value::String(text.to_string())),
            Self::Bytes => Some(Value::Bytes(text.as_bytes().to_vec())),
        }
    }
}

/// Value names of one protobuf enum, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumInfo {
    pub full_name: String,
    pub values: Vec<(i32, String)>,
}

impl EnumInfo {
    fn from_descriptor(e: &EnumDescriptor) -> Self {
        Self {
            full_name: e.full_name().to_string(),
            values: e
                .values()
                .map(|v| (v.value(), v.name().to_string()))
                .collect(),
        }
    }

    pub fn name_of(&self, number: i64) -> Option<&str> {
        self.values
            .iter()
            .find(|(n, _)| i64::from(*n) == number)
            .map(|(_, name)| name.as_str())
    }

    fn number_of(&self, name: &str) -> Option<i32> {
        self.values.iter().find(|(_, n)| n == name).map(|(v, _)| *v)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Scalar(ScalarKind),
    Enum(Arc<EnumInfo>),
    /// Full name of the message type, resolved through the registry.
    Message(String),
}

/// Metadata for one field of a message type.
#[derive(Clone)]
pub struct FieldDescriptor {
    /// Property name: the lowerCamelCase form of the proto field name.
    pub name: String,
    pub proto_name: String,
    pub number: u32,
    pub kind: FieldKind,
    pub is_repeated: bool,
    pub is_map: bool,
    /// `None` for messages, repeated fields, maps, and unparsable defaults.
    pub default_value: Option<Value>,
    pub annotations: BTreeMap<String, String>,
    pub(crate) proto: ProtoField,
}

impl std::fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("proto_name", &self.proto_name)
            .field("number", &self.number)
            .field("kind", &self.kind)
            .field("is_repeated", &self.is_repeated)
            .field("is_map", &self.is_map)
            .field("default_value", &self.default_value)
            .field("annotations", &self.annotations)
            .finish_non_exhaustive()
    }
}

impl FieldDescriptor {
    pub(crate) fn from_proto(field: &ProtoField, annotations: BTreeMap<String, String>) -> Self {
        let (runtime, is_repeated, is_map) = match field.runtime_field_type() {
            RuntimeFieldType::Singular(t) => (t, false, false),
            RuntimeFieldType::Repeated(t) => (t, true, false),
            RuntimeFieldType::Map(_, v) => (v, true, true),
        };
        let kind = kind_of(&runtime);
        let default_value = if is_repeated {
            None
        } else {
            default_for(field, &kind)
        };
        Self {
            name: lower_camel(field.name()),
            proto_name: field.name().to_string(),
            number: field.number() as u32,
            kind,
            is_repeated,
            is_map,
            default_value,
            annotations,
            proto: field.clone(),
        }
    }

    pub fn message_type(&self) -> Option<&str> {
        match &self.kind {
            FieldKind::Message(name) => Some(name),
            _ => None,
        }
    }

    pub fn enum_info(&self) -> Option<&EnumInfo> {
        match &self.kind {
            FieldKind::Enum(info) => Some(info),
            _ => None,
        }
    }

    pub fn is_integer(&self) -> bool {
        match &self.kind {
            FieldKind::Scalar(k) => k.is_integer(),
            FieldKind::Enum(_) => true,
            FieldKind::Message(_) => false,
        }
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }
}

fn kind_of(runtime: &RuntimeType) -> FieldKind {
    match runtime {
        RuntimeType::I32 => FieldKind::Scalar(ScalarKind::Int32),
        RuntimeType::I64 => FieldKind::Scalar(ScalarKind::Int64),
        RuntimeType::U32 => FieldKind::Scalar(ScalarKind::UInt32),
        RuntimeType::U64 => FieldKind::Scalar(ScalarKind::UInt64),
        RuntimeType::F32 => FieldKind::Scalar(ScalarKind::Float),
        RuntimeType::F64 => FieldKind::Scalar(ScalarKind::Double),
        RuntimeType::Bool => FieldKind::Scalar(ScalarKind::Bool),
        RuntimeType::String => FieldKind::Scalar(ScalarKind::String),
        RuntimeType::VecU8 => FieldKind::Scalar(ScalarKind::Bytes),
        RuntimeType::Enum(e) => FieldKind::Enum(Arc::new(EnumInfo::from_descriptor(e))),
        RuntimeType::Message(m) => FieldKind::Message(m.full_name().to_string()),
    }
}

fn default_for(field: &ProtoField, kind: &FieldKind) -> Option<Value> {
    let proto = field.proto();
    let explicit = proto.has_default_value().then(|| proto.default_value());
    match kind {
        FieldKind::Scalar(k) => match explicit {
            Some(text) => k.parse_default(text),
            None => Some(k.zero()),
        },
        FieldKind::Enum(info) => {
            let number = match explicit {
                Some(text) => info.number_of(text)?,
                None => info.values.first().map(|(n, _)| *n).unwrap_or(0),
            };
            Some(Value::Int(i64::from(number)))
        }
        FieldKind::Message(_) => None,
    }
}

/// `layer_stack` → `layerStack`, following protoc's JSON name rule.
pub fn lower_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for c in name.chars() {
        if c == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camel_case_names() {
        assert_eq!(lower_camel("layer_stack"), "layerStack");
        assert_eq!(lower_camel("z_order_relative_of"), "zOrderRelativeOf");
        assert_eq!(lower_camel("id"), "id");
        assert_eq!(lower_camel("dsdx"), "dsdx");
    }

    #[test]
    fn explicit_defaults_parse_per_kind() {
        assert_eq!(ScalarKind::Int32.parse_default("-1"), Some(Value::Int(-1)));
        assert_eq!(ScalarKind::UInt64.parse_default("7"), Some(Value::UInt(7)));
        assert_eq!(ScalarKind::Bool.parse_default("true"), Some(Value::Bool(true)));
        assert_eq!(ScalarKind::Float.parse_default("0.5"), Some(Value::Float(0.5)));
        assert_eq!(ScalarKind::Int32.parse_default("abc"), None);
    }

    #[test]
    fn enum_lookup() {
        let info = EnumInfo {
            full_name: "t.Hwc".into(),
            values: vec![(0, "INVALID".into()), (2, "DEVICE".into())],
        };
        assert_eq!(info.name_of(2), Some("DEVICE"));
        assert_eq!(info.name_of(1), None);
        assert_eq!(info.number_of("INVALID"), Some(0));
    }
}
