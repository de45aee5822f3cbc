//! Fixtures shared by unit tests: the surface-flinger schema plus a small
//! recursive and view-style test schema, and a payload encoder.

use protobuf::CodedOutputStream;
use protobuf::descriptor::FileDescriptorProto;

use crate::parsers::surface_flinger;
use crate::schema::builder::{FieldType, FileBuilder, MessageBuilder};
use crate::schema::{SchemaOptions, SchemaRegistry};

pub const LAYER: &str = surface_flinger::LAYER;
pub const TRACE_FILE: &str = surface_flinger::TRACE_FILE;
pub const NODE: &str = "test.NodeProto";
pub const VIEW: &str = "test.ViewNodeProto";
pub const VIEW_ENTRY: &str = "test.ViewEntryProto";
pub const VIEW_MAGIC: &[u8] = b"\x08VIEWTRACE";

fn test_file() -> FileDescriptorProto {
    use FieldType::{Fixed64, Float, Int32, Int64, String};
    let view = || FieldType::message(VIEW);
    FileBuilder::new("test/test.proto", "test")
        .message(
            MessageBuilder::new(NODE)
                .field("id", 1, Int32)
                .field("child", 2, FieldType::message(NODE))
                .repeated("children", 3, FieldType::message(NODE))
                .field("label", 4, String),
        )
        .message(
            MessageBuilder::new(VIEW)
                .field("hashcode", 1, Int32)
                .field("view_id", 2, String)
                .field("left", 3, Int32)
                .field("top", 4, Int32)
                .field("width", 5, Int32)
                .field("height", 6, Int32)
                .field("scroll_x", 7, Int32)
                .field("scroll_y", 8, Int32)
                .field("translation_x", 9, Float)
                .field("translation_y", 10, Float)
                .field("scale_x", 11, Float)
                .field("scale_y", 12, Float)
                .field("alpha", 13, Float)
                .field("visibility", 14, Int32)
                .repeated("children", 15, view()),
        )
        .message(
            MessageBuilder::new(VIEW_ENTRY)
                .field("timestamp", 1, Int64)
                .field("window", 2, String)
                .repeated("views", 3, view()),
        )
        .message(
            MessageBuilder::new("test.ViewTraceFileProto")
                .field("magic_number", 1, Fixed64)
                .repeated("entry", 2, FieldType::message(VIEW_ENTRY)),
        )
        .build()
}

pub fn files() -> Vec<FileDescriptorProto> {
    vec![surface_flinger::schema_file(), test_file()]
}

pub fn options() -> SchemaOptions {
    surface_flinger::schema_options()
}

pub fn registry() -> SchemaRegistry {
    SchemaRegistry::from_file_protos(files(), &options()).expect("test schema")
}

/// Protobuf payload builder for hand-written test messages.
#[derive(Debug, Default, Clone)]
pub struct Proto {
    bytes: Vec<u8>,
}

impl Proto {
    fn write(mut self, f: impl FnOnce(&mut CodedOutputStream) -> protobuf::Result<()>) -> Self {
        {
            let mut out = CodedOutputStream::vec(&mut self.bytes);
            f(&mut out).expect("encode");
            out.flush().expect("flush");
        }
        self
    }

    pub fn int(self, field: u32, value: i64) -> Self {
        self.write(|o| o.write_int64(field, value))
    }

    pub fn uint(self, field: u32, value: u64) -> Self {
        self.write(|o| o.write_uint64(field, value))
    }

    pub fn sfixed64(self, field: u32, value: i64) -> Self {
        self.write(|o| o.write_sfixed64(field, value))
    }

    pub fn float(self, field: u32, value: f32) -> Self {
        self.write(|o| o.write_float(field, value))
    }

    pub fn boolean(self, field: u32, value: bool) -> Self {
        self.write(|o| o.write_bool(field, value))
    }

    pub fn string(self, field: u32, value: &str) -> Self {
        self.write(|o| o.write_string(field, value))
    }

    pub fn message(self, field: u32, nested: Proto) -> Self {
        self.write(|o| o.write_bytes(field, &nested.bytes))
    }

    /// One `map<int32, string>` entry.
    pub fn map_entry(self, field: u32, key: i32, value: &str) -> Self {
        self.message(field, Proto::default().int(1, i64::from(key)).string(2, value))
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Magic prefix followed by one length-delimited record per entry.
pub fn container(magic: &[u8], entry_field: u32, entries: Vec<Proto>) -> Vec<u8> {
    let body = entries
        .into_iter()
        .fold(Proto::default(), |file, entry| file.message(entry_field, entry));
    let mut bytes = magic.to_vec();
    bytes.extend(body.into_bytes());
    bytes
}
