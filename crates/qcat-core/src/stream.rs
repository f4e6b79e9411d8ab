//! `futures::Stream` adapter around the splicer
//!
//! [`QueuedStream`] polls the bound source, routes its chunks, completion and
//! failure through the [`Splicer`], and yields the forwarded bytes. It yields
//! one chunk per poll and only polls the source again once the consumer asks
//! for the next item, so nothing is buffered ahead of downstream.
//!
//! Appends from other tasks go through a [`QueueHandle`]. Commands are applied
//! in send order at the start of every poll.

use bytes::Bytes;
use futures::stream::{FusedStream, Stream};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::SpliceConfig;
use crate::queue::QueueEntry;
use crate::splicer::{SpliceState, Splicer};

enum Command<S> {
    Append(QueueEntry<S>),
    Destroy,
}

/// Concatenation of queued byte sources under per-segment and global budgets.
///
/// Yields `Ok(chunk)` for forwarded bytes, `Err(e)` once if the bound source
/// fails, and ends when terminated: global budget reached, end marker drained,
/// explicit [`destroy`](Self::destroy), or a failure with
/// `terminate_on_error`. While idle without an end marker it stays pending.
pub struct QueuedStream<S> {
    splicer: Splicer<S>,
    commands: mpsc::UnboundedReceiver<Command<S>>,
    tx: mpsc::UnboundedSender<Command<S>>,
    finished: bool,
}

impl<S> QueuedStream<S> {
    pub fn new(config: SpliceConfig) -> Self {
        let (tx, commands) = mpsc::unbounded_channel();
        Self {
            splicer: Splicer::new(&config),
            commands,
            tx,
            finished: false,
        }
    }

    /// Append a source. Binds it immediately when idle, queues it otherwise.
    pub fn append(&mut self, source: S, expected_bytes: Option<u64>) -> &mut Self {
        self.apply_queued_commands();
        self.splicer
            .append(QueueEntry::segment(source, expected_bytes));
        self
    }

    /// Append the end-of-input marker
    pub fn end(&mut self) -> &mut Self {
        self.apply_queued_commands();
        self.splicer.append(QueueEntry::EndMarker);
        self
    }

    /// Unbind the active source, drop the queue and end the output
    pub fn destroy(&mut self) {
        self.apply_queued_commands();
        self.splicer.destroy();
    }

    /// A cloneable handle for appending from elsewhere
    pub fn handle(&self) -> QueueHandle<S> {
        QueueHandle {
            tx: self.tx.clone(),
        }
    }

    pub fn state(&self) -> SpliceState {
        self.splicer.state()
    }

    pub fn total_bytes(&self) -> u64 {
        self.splicer.total_bytes()
    }

    pub fn queued(&self) -> usize {
        self.splicer.queued()
    }

    fn apply(&mut self, command: Command<S>) {
        match command {
            Command::Append(entry) => {
                self.splicer.append(entry);
            }
            Command::Destroy => self.splicer.destroy(),
        }
    }

    /// Apply handle commands sent so far, keeping them ordered before a direct call
    fn apply_queued_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            self.apply(command);
        }
    }

    /// Like `apply_queued_commands`, but leaves a waker registered for the next command
    fn poll_commands(&mut self, cx: &mut Context<'_>) {
        while let Poll::Ready(Some(command)) = self.commands.poll_recv(cx) {
            self.apply(command);
        }
    }
}

impl<S, E> Stream for QueuedStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<Bytes, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        // A source leaving at its segment budget may have failed right behind
        // its last chunk; that failure is still ours to report
        if let Some((handle, source)) = this.splicer.outgoing_source() {
            let polled = Pin::new(source).poll_next(cx);
            if let Poll::Ready(Some(Err(err))) = polled {
                if this.splicer.source_failed(handle) {
                    return Poll::Ready(Some(Err(err)));
                }
            }
        }

        // Being polled again means the previous chunk was accepted
        this.splicer.commit();

        loop {
            this.poll_commands(cx);

            match this.splicer.state() {
                SpliceState::Terminated => {
                    debug!(
                        "Queued stream finished after {} bytes",
                        this.splicer.total_bytes()
                    );
                    this.finished = true;
                    return Poll::Ready(None);
                }
                // Woken by the command channel on the next append
                SpliceState::Idle => return Poll::Pending,
                SpliceState::Bound => {}
            }

            let Some((handle, source)) = this.splicer.active_source() else {
                continue;
            };
            let polled = Pin::new(source).poll_next(cx);
            match polled {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(chunk))) => {
                    let forwarded = this.splicer.consume(handle, chunk);
                    if !forwarded.is_empty() {
                        return Poll::Ready(Some(Ok(forwarded)));
                    }
                    // Nothing to hand downstream, so nothing to wait for
                    this.splicer.commit();
                }
                Poll::Ready(Some(Err(err))) => {
                    if this.splicer.source_failed(handle) {
                        return Poll::Ready(Some(Err(err)));
                    }
                }
                Poll::Ready(None) => this.splicer.source_completed(handle),
            }
        }
    }
}

impl<S, E> FusedStream for QueuedStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    fn is_terminated(&self) -> bool {
        self.finished || self.splicer.state() == SpliceState::Terminated
    }
}

/// Appends to a [`QueuedStream`] from another task.
///
/// Sends after the output was dropped are silently ignored, as are appends
/// after it terminated.
pub struct QueueHandle<S> {
    tx: mpsc::UnboundedSender<Command<S>>,
}

impl<S> QueueHandle<S> {
    pub fn append(&self, source: S, expected_bytes: Option<u64>) -> &Self {
        self.send(Command::Append(QueueEntry::segment(source, expected_bytes)));
        self
    }

    /// Append the end-of-input marker
    pub fn end(&self) -> &Self {
        self.send(Command::Append(QueueEntry::EndMarker));
        self
    }

    pub fn destroy(&self) {
        self.send(Command::Destroy);
    }

    /// Whether the output has been dropped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, command: Command<S>) {
        if self.tx.send(command).is_err() {
            debug!("Queued stream dropped, command ignored");
        }
    }
}

impl<S> Clone for QueueHandle<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}
