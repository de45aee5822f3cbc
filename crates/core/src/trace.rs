//! Entry addressing over one decoded trace file.

use std::ops::Range;
use std::sync::Arc;

use crate::decoder::RawEntry;

/// A window over the entries of one trace file.
///
/// The file buffer and entry list are shared between a trace and all its
/// slices, so slicing is O(1). Indices passed to [`Trace::entry`] and the
/// `slice_*` methods are relative to the window; negative indices count
/// from its end. Entries without a timestamp sort as time 0.
#[derive(Debug, Clone)]
pub struct Trace {
    buffer: Arc<[u8]>,
    entries: Arc<[RawEntry]>,
    range: Range<usize>,
}

/// One entry of a [`Trace`], borrowed from the file buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceEntry<'a> {
    /// Position in the full file.
    pub index: usize,
    /// Position within the trace window it was taken from.
    pub relative_index: usize,
    pub timestamp: i64,
    pub bytes: &'a [u8],
}

impl Trace {
    pub fn new(buffer: Arc<[u8]>, entries: Vec<RawEntry>) -> Self {
        let len = entries.len();
        Self {
            buffer,
            entries: entries.into(),
            range: 0..len,
        }
    }

    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// Absolute entry range of this window within the file.
    pub fn absolute_range(&self) -> Range<usize> {
        self.range.clone()
    }

    pub fn buffer(&self) -> &Arc<[u8]> {
        &self.buffer
    }

    pub fn entry(&self, index: i64) -> Option<TraceEntry<'_>> {
        let absolute = self.to_absolute(index)?;
        if !self.range.contains(&absolute) {
            return None;
        }
        let raw = self.entries.get(absolute)?;
        Some(TraceEntry {
            index: absolute,
            relative_index: absolute - self.range.start,
            timestamp: raw.timestamp.unwrap_or(0),
            bytes: self.buffer.get(raw.range.clone())?,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = TraceEntry<'_>> + '_ {
        (0..self.len()).filter_map(|i| self.entry(i as i64))
    }

    /// Timestamps of the entries in this window.
    pub fn timestamps(&self) -> Vec<i64> {
        self.entries[self.range.clone()]
            .iter()
            .map(|e| e.timestamp.unwrap_or(0))
            .collect()
    }

    pub fn slice_entries(&self, start: Option<i64>, end: Option<i64>) -> Trace {
        let start = start
            .and_then(|s| self.to_absolute(s))
            .map_or(self.range.start, |s| self.clamp(s));
        let end = end
            .and_then(|e| self.to_absolute(e))
            .map_or(self.range.end, |e| self.clamp(e));
        self.slice(start, end)
    }

    /// Entries with `start <= timestamp < end`.
    pub fn slice_time(&self, start: Option<i64>, end: Option<i64>) -> Trace {
        let start = start.map_or(self.range.start, |t| self.clamp(self.first_at_or_after(t)));
        let end = end.map_or(self.range.end, |t| self.clamp(self.first_at_or_after(t)));
        self.slice(start, end)
    }

    /// The entry whose timestamp is nearest to `time`; ties go to the later entry.
    pub fn find_closest_entry(&self, time: i64) -> Option<TraceEntry<'_>> {
        if self.is_empty() {
            return None;
        }
        let pos = self.clamp(self.first_at_or_after(time));
        if pos == self.range.end {
            return self.entry(-1);
        }
        if pos == self.range.start {
            return self.entry(0);
        }
        let diff = |i: usize| (self.timestamp_at(i) - i128::from(time)).abs();
        let pick = if diff(pos - 1) < diff(pos) { pos - 1 } else { pos };
        self.entry((pick - self.range.start) as i64)
    }

    pub fn find_first_greater_or_equal_entry(&self, time: i64) -> Option<TraceEntry<'_>> {
        let pos = self.clamp(self.first_at_or_after(time));
        self.entry_at(pos).filter(|e| e.timestamp >= time)
    }

    pub fn find_first_greater_entry(&self, time: i64) -> Option<TraceEntry<'_>> {
        let pos = self.clamp(self.first_after(time));
        self.entry_at(pos).filter(|e| e.timestamp > time)
    }

    pub fn find_last_lower_or_equal_entry(&self, time: i64) -> Option<TraceEntry<'_>> {
        if self.is_empty() {
            return None;
        }
        match self.find_first_greater_entry(time) {
            None => self.entry(-1),
            Some(e) => self.before(e.index),
        }
    }

    pub fn find_last_lower_entry(&self, time: i64) -> Option<TraceEntry<'_>> {
        if self.is_empty() {
            return None;
        }
        match self.find_first_greater_or_equal_entry(time) {
            None => self.entry(-1),
            Some(e) => self.before(e.index),
        }
    }

    fn before(&self, absolute: usize) -> Option<TraceEntry<'_>> {
        if absolute == self.range.start {
            return None;
        }
        self.entry_at(absolute - 1)
    }

    fn entry_at(&self, absolute: usize) -> Option<TraceEntry<'_>> {
        let relative = absolute.checked_sub(self.range.start)?;
        self.entry(i64::try_from(relative).ok()?)
    }

    fn timestamp_at(&self, absolute: usize) -> i128 {
        i128::from(self.entries[absolute].timestamp.unwrap_or(0))
    }

    // Searches run over the whole file, then clamp to the window.
    fn first_at_or_after(&self, time: i64) -> usize {
        self.entries.partition_point(|e| e.timestamp.unwrap_or(0) < time)
    }

    fn first_after(&self, time: i64) -> usize {
        self.entries.partition_point(|e| e.timestamp.unwrap_or(0) <= time)
    }

    fn to_absolute(&self, index: i64) -> Option<usize> {
        if index < 0 {
            self.range.end.checked_sub(usize::try_from(index.unsigned_abs()).ok()?)
        } else {
            self.range.start.checked_add(usize::try_from(index).ok()?)
        }
    }

    fn clamp(&self, absolute: usize) -> usize {
        absolute.clamp(self.range.start, self.range.end)
    }

    fn slice(&self, start: usize, end: usize) -> Trace {
        let range = if start < end {
            start..end
        } else {
            self.range.end..self.range.end
        };
        Trace {
            buffer: Arc::clone(&self.buffer),
            entries: Arc::clone(&self.entries),
            range,
        }
    }
}
