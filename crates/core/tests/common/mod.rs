//! Hand-encoded surface-flinger traces.

use protobuf::CodedOutputStream;
use winscope_core::parsers::surface_flinger::MAGIC;

#[derive(Debug, Default, Clone)]
pub struct Proto(Vec<u8>);

impl Proto {
    fn write(mut self, f: impl FnOnce(&mut CodedOutputStream) -> protobuf::Result<()>) -> Self {
        {
            let mut out = CodedOutputStream::vec(&mut self.0);
            f(&mut out).expect("encode");
            out.flush().expect("flush");
        }
        self
    }

    pub fn int(self, field: u32, value: i64) -> Self {
        self.write(|o| o.write_int64(field, value))
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
        self.write(|o| o.write_bytes(field, &nested.0))
    }
}

fn rect(left: i64, top: i64, right: i64, bottom: i64) -> Proto {
    Proto::default().int(1, left).int(2, top).int(3, right).int(4, bottom)
}

fn float_rect(left: f32, top: f32, right: f32, bottom: f32) -> Proto {
    Proto::default().float(1, left).float(2, top).float(3, right).float(4, bottom)
}

/// A layer with a name, parent and z.
pub fn layer(id: i64, name: &str, parent: i64, z: i64) -> Proto {
    Proto::default().int(1, id).string(2, name).int(10, z).int(25, parent)
}

/// A layer that composes a buffer over the given square.
pub fn buffered_layer(id: i64, name: &str, parent: i64, z: i64, size: i64, hwc: i64) -> Proto {
    let px = size as f32;
    layer(id, name, parent, z)
        .message(7, Proto::default().message(2, rect(0, 0, size, size)))
        .boolean(16, true)
        .message(20, Proto::default().float(1, 0.0).float(2, 0.0).float(3, 0.0).float(4, 1.0))
        .message(27, Proto::default().int(1, size).int(2, size).int(3, size).int(4, 1))
        .int(35, hwc)
        .message(45, float_rect(0.0, 0.0, px, px))
        .message(46, float_rect(0.0, 0.0, px, px))
}

pub fn entry(ts: i64, layers: Vec<Proto>) -> Proto {
    let list = layers.into_iter().fold(Proto::default(), |l, layer| l.message(1, layer));
    let display = Proto::default()
        .int(1, 1)
        .string(2, "Built-in Screen")
        .int(3, 0)
        .message(5, rect(0, 0, 100, 100));
    Proto::default()
        .write(|o| o.write_sfixed64(1, ts))
        .string(2, "visibleRegionsDirty")
        .message(3, list)
        .message(7, display)
}

pub fn trace_file(entries: Vec<Proto>) -> Vec<u8> {
    let body = entries.into_iter().fold(Proto::default(), |file, e| file.message(2, e));
    let mut bytes = MAGIC.to_vec();
    bytes.extend(body.0);
    bytes
}
