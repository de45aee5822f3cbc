pub mod extract;
pub mod format;
pub mod surface_flinger;

use std::sync::Arc;

use thiserror::Error;

use crate::decoder::{DecodeError, DecodeWarning, decode_entry, decode_frames};
use crate::hierarchy::{Computation, HierarchyError, HierarchyTree, HierarchyTreeBuilder};
use crate::operations::IntDefMap;
use crate::schema::{MessageSchema, SchemaRegistry};
use crate::trace::Trace;

use extract::Extractor;
pub use format::{ChildContainer, ComputationKind, HierarchyFormat, TraceFormat};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("decode: {0}")]
    Decode(#[from] DecodeError),
    #[error("hierarchy: {0}")]
    Hierarchy(#[from] HierarchyError),
    #[error("entry {index} out of bounds for trace of {len} entries")]
    EntryOutOfBounds { index: i64, len: usize },
    #[error("no parser accepted the buffer")]
    NoParserFound,
}

/// The hierarchy of one entry plus what went wrong recoverably on the way.
#[derive(Debug)]
pub struct ParsedEntry {
    pub tree: HierarchyTree,
    pub timestamp: i64,
    pub warnings: Vec<DecodeWarning>,
}

/// Decodes trace files of one [`TraceFormat`].
#[derive(Debug)]
pub struct TraceParser {
    format: TraceFormat,
    entry: Arc<MessageSchema>,
    extractor: Extractor,
    computations: Vec<Arc<dyn Computation>>,
}

impl TraceParser {
    /// Checks that the format's messages exist in `registry`.
    pub fn new(format: TraceFormat, registry: Arc<SchemaRegistry>, intdefs: Arc<IntDefMap>) -> Result<Self, ParseError> {
        let entry = Arc::clone(registry.require(&format.entry_message).map_err(DecodeError::from)?);
        let extractor = Extractor::new(format.hierarchy.clone(), &format.entry_message, registry, intdefs)
            .map_err(DecodeError::from)?;
        let computations = format.computations.iter().map(|c| c.build()).collect();
        Ok(Self {
            format,
            entry,
            extractor,
            computations,
        })
    }

    /// The built-in surface-flinger layers parser.
    pub fn surface_flinger() -> Result<Self, ParseError> {
        let registry = surface_flinger::registry().map_err(DecodeError::from)?;
        Self::new(
            surface_flinger::format(),
            Arc::new(registry),
            Arc::new(surface_flinger::intdefs()),
        )
    }

    pub fn format(&self) -> &TraceFormat {
        &self.format
    }

    /// Splits the file into entries. Entry payloads are decoded later, one
    /// at a time, by [`entry_hierarchy`](Self::entry_hierarchy).
    pub fn parse(&self, buffer: impl Into<Arc<[u8]>>) -> Result<Trace, DecodeError> {
        let buffer = buffer.into();
        let entries = decode_frames(&buffer, &self.format.container)?;
        tracing::debug!(format = %self.format.name, entries = entries.len(), "parsed trace");
        Ok(Trace::new(buffer, entries))
    }

    pub fn entry_hierarchy(&self, trace: &Trace, index: i64) -> Result<ParsedEntry, ParseError> {
        let entry = trace.entry(index).ok_or(ParseError::EntryOutOfBounds {
            index,
            len: trace.len(),
        })?;
        let message = decode_entry(&self.entry, entry.bytes)?;
        let extracted = self.extractor.extract(&*message);
        let hierarchy = &self.format.hierarchy;
        let tree = HierarchyTreeBuilder::new()
            .set_root(&hierarchy.root_kind, &hierarchy.root_name, extracted.root)
            .set_children(extracted.children)
            .set_computations(self.computations.clone())
            .build()?;
        tracing::debug!(
            format = %self.format.name,
            entry = entry.index,
            nodes = tree.len(),
            warnings = extracted.warnings.len(),
            "built entry hierarchy"
        );
        Ok(ParsedEntry {
            tree,
            timestamp: entry.timestamp,
            warnings: extracted.warnings,
        })
    }
}

/// Tries each parser in turn. A parser that rejects the buffer or finds no
/// entries in it is skipped.
pub fn parse_auto<'p>(buffer: impl Into<Arc<[u8]>>, parsers: &'p [TraceParser]) -> Result<(&'p TraceParser, Trace), ParseError> {
    let buffer = buffer.into();
    for parser in parsers {
        match parser.parse(Arc::clone(&buffer)) {
            Ok(trace) if !trace.is_empty() => return Ok((parser, trace)),
            Ok(_) => tracing::debug!(format = %parser.format.name, "no entries"),
            Err(err) => tracing::debug!(format = %parser.format.name, %err, "rejected"),
        }
    }
    Err(ParseError::NoParserFound)
}
