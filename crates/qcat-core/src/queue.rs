//! Pending segment queue
//!
//! Strict FIFO of sources waiting to be bound, plus the end-of-input marker.

use std::collections::VecDeque;
use std::fmt;

/// One appended source together with its optional byte budget
pub struct Segment<S> {
    pub source: S,
    /// Bytes to forward before switching (None = until end-of-source)
    pub expected_bytes: Option<u64>,
}

/// Entry waiting in the queue
pub enum QueueEntry<S> {
    /// A source to concatenate
    Segment(Segment<S>),
    /// No more sources will ever be appended
    EndMarker,
}

impl<S> QueueEntry<S> {
    pub fn segment(source: S, expected_bytes: Option<u64>) -> Self {
        QueueEntry::Segment(Segment {
            source,
            expected_bytes,
        })
    }

    pub fn is_end_marker(&self) -> bool {
        matches!(self, QueueEntry::EndMarker)
    }
}

// Sources are opaque, so Debug only shows the budget
impl<S> fmt::Debug for QueueEntry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueEntry::Segment(segment) => f
                .debug_struct("Segment")
                .field("expected_bytes", &segment.expected_bytes)
                .finish_non_exhaustive(),
            QueueEntry::EndMarker => f.write_str("EndMarker"),
        }
    }
}

/// FIFO of pending entries
pub struct SegmentQueue<S> {
    entries: VecDeque<QueueEntry<S>>,
}

impl<S> SegmentQueue<S> {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Add an entry behind everything already queued
    pub fn push(&mut self, entry: QueueEntry<S>) {
        self.entries.push_back(entry);
    }

    /// Remove the oldest entry; None means nothing is queued right now
    pub fn dequeue_next(&mut self) -> Option<QueueEntry<S>> {
        self.entries.pop_front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every pending entry, returning how many were discarded
    pub fn clear(&mut self) -> usize {
        let discarded = self.entries.len();
        self.entries.clear();
        discarded
    }
}

impl<S> Default for SegmentQueue<S> {
    fn default() -> Self {
        Self::new()
    }
}
