//! Output sink state machine
//!
//! [`Splicer`] owns the queue, the active binding and the byte counters. It is
//! driven by three notifications from the bound source (a chunk arrived, the
//! source completed, the source failed) and by [`Splicer::commit`], which
//! tells it that the last forwarded chunk was accepted downstream.
//!
//! A switch decided while a chunk is in flight is only applied on commit, so
//! bytes of two sources never overlap downstream. Until then the outgoing
//! source stays bound and a failure it reports is still surfaced. Reaching
//! the global budget ends the output at once.

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::binding::{Binder, ObserverHandle};
use crate::budget::Budget;
use crate::config::SpliceConfig;
use crate::queue::{QueueEntry, SegmentQueue};

/// Externally visible state of the output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpliceState {
    /// No source bound; more may still be appended
    Idle,
    /// Relaying one source
    Bound,
    /// Finished for good; appends are ignored
    Terminated,
}

pub struct Splicer<S> {
    budget: Budget,
    queue: SegmentQueue<S>,
    binder: Binder<S>,
    terminate_on_error: bool,
    /// Advance to the next entry on the next commit
    switch_requested: bool,
    /// A forwarded chunk has not been accepted downstream yet
    in_flight: bool,
    terminated: bool,
}

impl<S> Splicer<S> {
    pub fn new(config: &SpliceConfig) -> Self {
        Self {
            budget: Budget::new(config.max_bytes),
            queue: SegmentQueue::new(),
            binder: Binder::new(),
            terminate_on_error: config.terminate_on_error,
            switch_requested: false,
            in_flight: false,
            terminated: false,
        }
    }

    /// Bind `entry` right away when idle, otherwise queue it
    pub fn append(&mut self, entry: QueueEntry<S>) -> &mut Self {
        if self.terminated {
            debug!("Append ignored: output already terminated ({:?})", entry);
            return self;
        }

        if self.binder.is_bound() {
            debug!(
                "Source bound, queueing {:?} (queue length {})",
                entry,
                self.queue.len() + 1
            );
            self.queue.push(entry);
        } else if self.queue.is_empty() {
            self.switch_to(Some(entry));
        } else {
            // Idle with a retained queue (after a non-terminal failure):
            // oldest entry goes first
            self.queue.push(entry);
            self.next_stream();
        }
        self
    }

    /// Process one chunk from the bound source.
    ///
    /// Returns the bytes to forward downstream: the chunk itself, or its
    /// leading part when a budget cuts it short. Chunks carrying a stale
    /// handle forward nothing, and neither does a segment that already
    /// forwarded its expected length.
    pub fn consume(&mut self, handle: ObserverHandle, mut chunk: Bytes) -> Bytes {
        if !self.binder.is_current(handle) {
            debug!(
                "Dropping {} bytes from released binding {}",
                chunk.len(),
                handle.binding()
            );
            return Bytes::new();
        }
        let Some(active) = self.binder.active_mut() else {
            return Bytes::new();
        };

        let keep = self.budget.admissible_len(&active.budget, chunk.len());
        if keep < chunk.len() {
            debug!(
                binding = %active.id(),
                kept = keep,
                discarded = chunk.len() - keep,
                "Truncating chunk at byte budget"
            );
            chunk.truncate(keep);
        }
        self.budget.record(&mut active.budget, keep);

        if self.budget.is_exhausted() {
            // Nothing else will be forwarded, so there is nothing to overlap with
            self.terminate("global byte budget reached");
            return chunk;
        }

        self.in_flight = true;
        if active.budget.is_spent() {
            debug!(
                binding = %active.id(),
                bytes = active.budget.current_bytes,
                "Segment budget reached"
            );
            self.switch_requested = true;
        }
        chunk
    }

    /// Downstream accepted the last forwarded chunk; apply a deferred switch
    pub fn commit(&mut self) {
        self.in_flight = false;
        if std::mem::take(&mut self.switch_requested) {
            self.next_stream();
        }
    }

    /// The source behind `handle` reached its natural end
    pub fn source_completed(&mut self, handle: ObserverHandle) {
        if !self.binder.is_current(handle) {
            debug!("Ignoring completion of released binding {}", handle.binding());
            return;
        }
        debug!(
            "Source {} completed after {} bytes",
            handle.binding(),
            self.current_bytes()
        );
        if self.in_flight {
            // Let the in-flight chunk land before switching
            self.switch_requested = true;
        } else {
            self.next_stream();
        }
    }

    /// The source behind `handle` failed.
    ///
    /// Returns true when the failure must be surfaced on the output, which is
    /// whenever the source is still bound, including between reaching its
    /// segment budget and the commit that switches away from it. Failures of
    /// released sources are dropped.
    pub fn source_failed(&mut self, handle: ObserverHandle) -> bool {
        if !self.binder.is_current(handle) {
            debug!("Ignoring failure of released binding {}", handle.binding());
            return false;
        }

        warn!(
            "Source {} failed after {} bytes",
            handle.binding(),
            self.current_bytes()
        );
        if self.terminate_on_error {
            self.terminate("source failed");
        } else {
            // No automatic resume: the queue waits for the next append
            self.binder.unbind();
            self.switch_requested = false;
            self.in_flight = false;
        }
        true
    }

    /// Explicit termination. Discards queued entries; idempotent.
    pub fn destroy(&mut self) {
        self.terminate("destroyed");
    }

    pub fn state(&self) -> SpliceState {
        if self.terminated {
            SpliceState::Terminated
        } else if self.binder.is_bound() {
            SpliceState::Bound
        } else {
            SpliceState::Idle
        }
    }

    /// Bytes forwarded over the whole output lifetime
    pub fn total_bytes(&self) -> u64 {
        self.budget.total_bytes
    }

    /// Bytes forwarded from the bound segment (0 when idle)
    pub fn current_bytes(&self) -> u64 {
        self.binder
            .active()
            .map_or(0, |active| active.budget.current_bytes)
    }

    /// Entries waiting behind the bound source
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// The bound source and the handle its notifications must carry
    pub fn active_source(&mut self) -> Option<(ObserverHandle, &mut S)> {
        self.binder
            .active_mut()
            .map(|active| (active.handle(), active.source_mut()))
    }

    /// The bound source when the next commit will switch away from it
    pub fn outgoing_source(&mut self) -> Option<(ObserverHandle, &mut S)> {
        if self.switch_requested {
            self.active_source()
        } else {
            None
        }
    }

    fn next_stream(&mut self) {
        let next = self.queue.dequeue_next();
        self.switch_to(next);
    }

    fn switch_to(&mut self, entry: Option<QueueEntry<S>>) {
        if let Some(released) = self.binder.unbind() {
            debug!("Released binding {}", released);
        }

        match entry {
            None => debug!(
                "Queue drained after {} bytes, waiting for more sources",
                self.budget.total_bytes
            ),
            Some(QueueEntry::EndMarker) => self.terminate("end of input"),
            Some(QueueEntry::Segment(segment)) => {
                let handle = self.binder.bind(segment.source, segment.expected_bytes);
                debug!(
                    "Bound source {} (expected bytes: {:?})",
                    handle.binding(),
                    segment.expected_bytes
                );
            }
        }
    }

    fn terminate(&mut self, reason: &str) {
        if self.terminated {
            return;
        }
        self.binder.unbind();
        let discarded = self.queue.clear();
        self.switch_requested = false;
        self.in_flight = false;
        self.terminated = true;
        info!(
            total_bytes = self.budget.total_bytes,
            discarded_entries = discarded,
            "Output terminated: {}",
            reason
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splicer(max_bytes: Option<u64>) -> Splicer<&'static str> {
        Splicer::new(&SpliceConfig::new().with_max_bytes(max_bytes))
    }

    fn bound(splicer: &mut Splicer<&'static str>) -> Option<(ObserverHandle, &'static str)> {
        splicer.active_source().map(|(handle, source)| (handle, *source))
    }

    #[test]
    fn test_append_binds_immediately_when_idle() {
        let mut s = splicer(None);
        assert_eq!(s.state(), SpliceState::Idle);

        s.append(QueueEntry::segment("a", Some(10)));
        assert_eq!(s.state(), SpliceState::Bound);
        assert_eq!(s.queued(), 0);

        s.append(QueueEntry::segment("b", None))
            .append(QueueEntry::segment("c", None));
        assert_eq!(s.queued(), 2);
        assert_eq!(bound(&mut s).map(|(_, src)| src), Some("a"));
    }

    #[test]
    fn test_truncation_keeps_head() {
        let mut s = splicer(None);
        s.append(QueueEntry::segment("a", Some(4)));
        let (handle, _) = bound(&mut s).unwrap();

        let out = s.consume(handle, Bytes::from_static(b"abcdef"));
        assert_eq!(&out[..], b"abcd");
        assert_eq!(s.total_bytes(), 4);

        // Switch waits for downstream acceptance
        assert_eq!(s.state(), SpliceState::Bound);
        s.commit();
        assert_eq!(s.state(), SpliceState::Idle);
    }

    #[test]
    fn test_segments_activate_in_append_order() {
        let mut s = splicer(None);
        s.append(QueueEntry::segment("a", Some(2)))
            .append(QueueEntry::segment("b", Some(2)))
            .append(QueueEntry::segment("c", Some(2)))
            .append(QueueEntry::EndMarker);

        let mut order = Vec::new();
        while let Some((handle, source)) = bound(&mut s) {
            order.push(source);
            s.consume(handle, Bytes::from_static(b"xyz"));
            s.commit();
        }
        assert_eq!(order, vec!["a", "b", "c"]);
        assert_eq!(s.total_bytes(), 6);
        assert_eq!(s.state(), SpliceState::Terminated);
    }

    #[test]
    fn test_global_budget_takes_precedence() {
        let mut s = splicer(Some(5));
        s.append(QueueEntry::segment("a", Some(5)))
            .append(QueueEntry::segment("b", None));
        let (handle, _) = bound(&mut s).unwrap();

        let out = s.consume(handle, Bytes::from_static(b"0123456789"));
        assert_eq!(out.len(), 5);
        // Both budgets hit at once: the whole output ends, "b" is never bound
        assert_eq!(s.state(), SpliceState::Terminated);
        assert_eq!(s.queued(), 0);
        s.commit();
        assert_eq!(s.state(), SpliceState::Terminated);
    }

    #[test]
    fn test_global_budget_terminates_without_commit() {
        let mut s = splicer(Some(4));
        s.append(QueueEntry::segment("a", None))
            .append(QueueEntry::EndMarker);
        let (handle, _) = bound(&mut s).unwrap();

        assert_eq!(s.consume(handle, Bytes::from_static(b"ab")).len(), 2);
        assert_eq!(s.state(), SpliceState::Bound);
        assert_eq!(s.consume(handle, Bytes::from_static(b"cdef")).len(), 2);
        assert_eq!(s.state(), SpliceState::Terminated);
        assert_eq!(s.total_bytes(), 4);
    }

    #[test]
    fn test_completion_deferred_while_chunk_in_flight() {
        let mut s = splicer(None);
        s.append(QueueEntry::segment("a", None))
            .append(QueueEntry::segment("b", None));
        let (handle, _) = bound(&mut s).unwrap();

        s.consume(handle, Bytes::from_static(b"abc"));
        s.source_completed(handle);
        assert_eq!(bound(&mut s).map(|(_, src)| src), Some("a"));

        s.commit();
        assert_eq!(bound(&mut s).map(|(_, src)| src), Some("b"));
        assert_eq!(s.current_bytes(), 0);
    }

    #[test]
    fn test_completion_switches_when_nothing_in_flight() {
        let mut s = splicer(None);
        s.append(QueueEntry::segment("a", None))
            .append(QueueEntry::segment("b", None));
        let (handle, _) = bound(&mut s).unwrap();

        s.consume(handle, Bytes::from_static(b"abc"));
        s.commit();
        s.source_completed(handle);
        assert_eq!(bound(&mut s).map(|(_, src)| src), Some("b"));
    }

    #[test]
    fn test_stale_notifications_ignored() {
        let mut s = splicer(None);
        s.append(QueueEntry::segment("a", None))
            .append(QueueEntry::segment("b", None));
        let (old, _) = bound(&mut s).unwrap();
        s.source_completed(old);

        let (current, source) = bound(&mut s).unwrap();
        assert_eq!(source, "b");
        assert!(s.consume(old, Bytes::from_static(b"late")).is_empty());
        assert!(!s.source_failed(old));
        s.source_completed(old);

        assert_eq!(s.state(), SpliceState::Bound);
        assert!(s.consume(current, Bytes::from_static(b"ok")).len() == 2);
        assert_eq!(s.total_bytes(), 2);
    }

    #[test]
    fn test_failure_before_switch_commit_surfaces() {
        let mut s = splicer(None);
        s.append(QueueEntry::segment("a", Some(3)))
            .append(QueueEntry::segment("b", None));
        let (handle, _) = bound(&mut s).unwrap();

        s.consume(handle, Bytes::from_static(b"abc"));
        assert_eq!(bound(&mut s).map(|(_, src)| src), Some("a"));
        assert!(s.outgoing_source().is_some());

        // Still bound until the commit, so the failure belongs to the output
        assert!(s.source_failed(handle));
        assert_eq!(s.state(), SpliceState::Terminated);
        assert_eq!(s.queued(), 0);
    }

    #[test]
    fn test_failure_after_segment_spent_is_dropped() {
        let mut s = splicer(None);
        s.append(QueueEntry::segment("a", Some(3)));
        let (handle, _) = bound(&mut s).unwrap();

        s.consume(handle, Bytes::from_static(b"abc"));
        s.commit();
        assert!(s.outgoing_source().is_none());
        assert!(!s.source_failed(handle));
        assert_eq!(s.state(), SpliceState::Idle);
    }

    #[test]
    fn test_outgoing_source_only_while_switch_pending() {
        let mut s = splicer(None);
        s.append(QueueEntry::segment("a", Some(4)))
            .append(QueueEntry::segment("b", None));
        let (handle, _) = bound(&mut s).unwrap();

        s.consume(handle, Bytes::from_static(b"ab"));
        assert!(s.outgoing_source().is_none());
        s.commit();

        s.consume(handle, Bytes::from_static(b"cd"));
        let (outgoing, source) = s.outgoing_source().unwrap();
        assert_eq!((outgoing, *source), (handle, "a"));
        s.commit();
        assert_eq!(bound(&mut s).map(|(_, src)| src), Some("b"));
        assert!(s.outgoing_source().is_none());
    }

    #[test]
    fn test_failure_terminates_by_default() {
        let mut s = splicer(None);
        s.append(QueueEntry::segment("a", None))
            .append(QueueEntry::segment("b", None));
        let (handle, _) = bound(&mut s).unwrap();

        s.consume(handle, Bytes::from_static(b"abc"));
        s.commit();
        assert!(s.source_failed(handle));
        assert_eq!(s.state(), SpliceState::Terminated);
        assert_eq!(s.queued(), 0);
        assert_eq!(s.total_bytes(), 3);
    }

    #[test]
    fn test_failure_without_termination_keeps_queue() {
        let config = SpliceConfig::new().with_terminate_on_error(false);
        let mut s: Splicer<&'static str> = Splicer::new(&config);
        s.append(QueueEntry::segment("a", None))
            .append(QueueEntry::segment("b", None));
        let (handle, _) = bound(&mut s).unwrap();

        assert!(s.source_failed(handle));
        assert_eq!(s.state(), SpliceState::Idle);
        assert_eq!(s.queued(), 1);

        // No automatic resume; the next append restarts from the oldest entry
        s.append(QueueEntry::segment("c", None));
        assert_eq!(bound(&mut s).map(|(_, src)| src), Some("b"));
        assert_eq!(s.queued(), 1);
    }

    #[test]
    fn test_end_marker_while_idle_terminates() {
        let mut s = splicer(None);
        s.append(QueueEntry::EndMarker);
        assert_eq!(s.state(), SpliceState::Terminated);
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let mut s = splicer(None);
        s.append(QueueEntry::segment("a", None))
            .append(QueueEntry::segment("b", None));
        s.destroy();
        assert_eq!(s.state(), SpliceState::Terminated);
        assert_eq!(s.queued(), 0);

        s.destroy();
        s.append(QueueEntry::segment("c", None));
        assert_eq!(s.state(), SpliceState::Terminated);
        assert_eq!(s.queued(), 0);
        assert!(bound(&mut s).is_none());
    }

    #[test]
    fn test_chunks_after_decided_switch_are_dropped() {
        let mut s = splicer(None);
        s.append(QueueEntry::segment("a", Some(2)));
        let (handle, _) = bound(&mut s).unwrap();

        assert_eq!(s.consume(handle, Bytes::from_static(b"ab")).len(), 2);
        assert!(s.consume(handle, Bytes::from_static(b"cd")).is_empty());
        assert_eq!(s.total_bytes(), 2);
        s.commit();
        assert_eq!(s.state(), SpliceState::Idle);
    }

    #[test]
    fn test_non_terminal_failure_cancels_pending_switch() {
        let config = SpliceConfig::new().with_terminate_on_error(false);
        let mut s: Splicer<&'static str> = Splicer::new(&config);
        s.append(QueueEntry::segment("a", Some(2)))
            .append(QueueEntry::segment("b", None));
        let (handle, _) = bound(&mut s).unwrap();

        s.consume(handle, Bytes::from_static(b"ab"));
        assert!(s.source_failed(handle));
        s.commit();
        assert_eq!(s.state(), SpliceState::Idle);
        assert_eq!(s.queued(), 1);
    }
}
