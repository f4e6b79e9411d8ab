//! Byte budget accounting
//!
//! Decides how many leading bytes of an incoming chunk may be forwarded.
//! A limit of zero is treated the same as no limit at all.

/// Budget of the currently bound segment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentBudget {
    /// Bytes forwarded from this segment so far
    pub current_bytes: u64,
    /// Maximum bytes to forward from this segment (None = until end-of-source)
    pub expected_bytes: Option<u64>,
}

impl SegmentBudget {
    pub fn new(expected_bytes: Option<u64>) -> Self {
        Self {
            current_bytes: 0,
            expected_bytes: normalize_limit(expected_bytes),
        }
    }

    /// Bytes this segment may still forward
    pub fn remaining(&self) -> Option<u64> {
        self.expected_bytes
            .map(|expected| expected.saturating_sub(self.current_bytes))
    }

    /// Whether the segment forwarded exactly its expected length
    pub fn is_spent(&self) -> bool {
        self.expected_bytes
            .is_some_and(|expected| self.current_bytes == expected)
    }
}

/// Global budget across every segment of the output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Budget {
    /// Bytes forwarded over the whole output lifetime
    pub total_bytes: u64,
    /// Global forwarding cap (None = unbounded)
    pub max_bytes: Option<u64>,
}

impl Budget {
    pub fn new(max_bytes: Option<u64>) -> Self {
        Self {
            total_bytes: 0,
            max_bytes: normalize_limit(max_bytes),
        }
    }

    /// Bytes the output may still forward
    pub fn remaining(&self) -> Option<u64> {
        self.max_bytes
            .map(|max| max.saturating_sub(self.total_bytes))
    }

    /// How many leading bytes of a `candidate`-byte chunk may be forwarded.
    ///
    /// Pure function of the counters; never larger than `candidate`.
    pub fn admissible_len(&self, segment: &SegmentBudget, candidate: usize) -> usize {
        let mut n = u64::try_from(candidate).unwrap_or(u64::MAX);
        if let Some(remaining) = segment.remaining() {
            n = n.min(remaining);
        }
        if let Some(remaining) = self.remaining() {
            n = n.min(remaining);
        }
        // n <= candidate, so it always fits back into usize
        usize::try_from(n).unwrap_or(candidate)
    }

    /// Count `n` forwarded bytes against both budgets
    pub fn record(&mut self, segment: &mut SegmentBudget, n: usize) {
        let n = u64::try_from(n).unwrap_or(u64::MAX);
        self.total_bytes = self.total_bytes.saturating_add(n);
        segment.current_bytes = segment.current_bytes.saturating_add(n);
    }

    /// Whether the global budget has been reached exactly
    pub fn is_exhausted(&self) -> bool {
        self.max_bytes.is_some_and(|max| self.total_bytes == max)
    }
}

fn normalize_limit(limit: Option<u64>) -> Option<u64> {
    limit.filter(|&n| n > 0)
}
