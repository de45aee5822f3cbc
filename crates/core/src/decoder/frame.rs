use std::ops::Range;

use serde::{Deserialize, Serialize};

use super::DecodeError;

const WIRE_VARINT: u8 = 0;
const WIRE_FIXED64: u8 = 1;
const WIRE_LEN: u8 = 2;
const WIRE_FIXED32: u8 = 5;

/// Outer container layout of a trace file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerFormat {
    /// Bytes every file of this format starts with.
    pub magic: Vec<u8>,
    /// Field number of the repeated entry message in the container.
    pub entry_field: u32,
    /// Field number of the timestamp inside each entry, if any.
    pub timestamp_field: Option<u32>,
}

/// One entry record, addressed as a byte range of the file buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub index: usize,
    pub range: Range<usize>,
    pub timestamp: Option<i64>,
}

/// Splits a container buffer into entry records without decoding them.
///
/// Everything after the magic prefix is read as top-level protobuf fields;
/// length-delimited records of the entry field become [`RawEntry`]s and all
/// other fields are skipped.
pub fn decode_frames(buffer: &[u8], format: &ContainerFormat) -> Result<Vec<RawEntry>, DecodeError> {
    if !buffer.starts_with(&format.magic) {
        return Err(DecodeError::InvalidFormat {
            expected: format.magic.clone(),
        });
    }

    let mut wire = Wire::new(buffer, format.magic.len());
    let mut entries = Vec::new();
    while !wire.at_end() {
        let (field, wire_type) = wire.key()?;
        if field == format.entry_field && wire_type == WIRE_LEN {
            let range = wire.length_delimited()?;
            let timestamp = format
                .timestamp_field
                .and_then(|f| scan_timestamp(&buffer[range.clone()], f));
            entries.push(RawEntry {
                index: entries.len(),
                range,
                timestamp,
            });
        } else {
            wire.skip(wire_type)?;
        }
    }

    tracing::debug!(entries = entries.len(), bytes = buffer.len(), "split trace container");
    Ok(entries)
}

/// Reads an integer field from a record without a full decode.
fn scan_timestamp(record: &[u8], field_number: u32) -> Option<i64> {
    let mut wire = Wire::new(record, 0);
    while !wire.at_end() {
        let (field, wire_type) = wire.key().ok()?;
        if field == field_number {
            return match wire_type {
                WIRE_VARINT => wire.varint().ok().map(|v| v as i64),
                WIRE_FIXED64 => wire.fixed::<8>().ok().map(i64::from_le_bytes),
                _ => None,
            };
        }
        wire.skip(wire_type).ok()?;
    }
    None
}

/// Protobuf wire reader over a byte slice.
struct Wire<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Wire<'a> {
    fn new(buf: &'a [u8], pos: usize) -> Self {
        Self { buf, pos }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn malformed(&self, reason: &'static str) -> DecodeError {
        DecodeError::MalformedContainer {
            offset: self.pos,
            reason,
        }
    }

    fn varint(&mut self) -> Result<u64, DecodeError> {
        let mut result: u64 = 0;
        let mut shift = 0;
        loop {
            let Some(&byte) = self.buf.get(self.pos) else {
                return Err(self.malformed("truncated varint"));
            };
            self.pos += 1;
            result |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
            if shift >= 64 {
                return Err(self.malformed("varint too large"));
            }
        }
    }

    fn key(&mut self) -> Result<(u32, u8), DecodeError> {
        let key = self.varint()?;
        let field = u32::try_from(key >> 3).map_err(|_| self.malformed("field number out of range"))?;
        if field == 0 {
            return Err(self.malformed("field number 0"));
        }
        Ok((field, (key & 0x7) as u8))
    }

    fn advance(&mut self, len: usize) -> Result<Range<usize>, DecodeError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| self.malformed("record runs past end of buffer"))?;
        let range = self.pos..end;
        self.pos = end;
        Ok(range)
    }

    fn fixed<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let range = self.advance(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[range]);
        Ok(out)
    }

    fn length_delimited(&mut self) -> Result<Range<usize>, DecodeError> {
        let len = self.varint()?;
        let len = usize::try_from(len).map_err(|_| self.malformed("length out of range"))?;
        self.advance(len)
    }

    fn skip(&mut self, wire_type: u8) -> Result<(), DecodeError> {
        match wire_type {
            WIRE_VARINT => {
                self.varint()?;
            }
            WIRE_FIXED64 => {
                self.advance(8)?;
            }
            WIRE_LEN => {
                self.length_delimited()?;
            }
            WIRE_FIXED32 => {
                self.advance(4)?;
            }
            _ => return Err(self.malformed("unsupported wire type")),
        }
        Ok(())
    }
}
