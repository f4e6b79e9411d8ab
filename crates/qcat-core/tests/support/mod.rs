//! Synthetic byte sources for integration tests

#![allow(dead_code)]

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use qcat_core::{BoxSource, QueuedStream};
use rand::RngCore;
use std::io;

/// Largest chunk a random source hands out
pub const HIGH_WATER_MARK: usize = 16384;

/// Options for [`random_source`]
#[derive(Debug, Clone)]
pub struct RandomSource {
    pub total_bytes: usize,
    pub chunk_size: usize,
    /// Fail with this message after all bytes were produced
    pub error: Option<&'static str>,
    /// Return `Pending` once between the last chunk and the failure
    pub pause_before_error: bool,
}

impl RandomSource {
    pub fn new(total_bytes: usize) -> Self {
        Self {
            total_bytes,
            chunk_size: HIGH_WATER_MARK,
            error: None,
            pause_before_error: false,
        }
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn failing(mut self, message: &'static str) -> Self {
        self.error = Some(message);
        self
    }

    /// Like [`failing`](Self::failing), but the error is only reported on a
    /// later poll than the one that found the bytes exhausted
    pub fn failing_after_pause(mut self, message: &'static str) -> Self {
        self.error = Some(message);
        self.pause_before_error = true;
        self
    }

    pub fn build(self) -> BoxSource {
        let RandomSource {
            total_bytes,
            chunk_size,
            error,
            pause_before_error,
        } = self;

        let chunks = stream::unfold(total_bytes, move |remaining| async move {
            if remaining == 0 {
                return None;
            }
            let n = remaining.min(chunk_size);
            let mut buf = vec![0u8; n];
            rand::thread_rng().fill_bytes(&mut buf);
            // Give other tasks (appenders) a chance between chunks
            tokio::task::yield_now().await;
            Some((Ok(Bytes::from(buf)), remaining - n))
        });

        let tail = stream::iter(error).then(move |message| async move {
            if pause_before_error {
                tokio::task::yield_now().await;
            }
            Err::<Bytes, _>(io::Error::other(message))
        });
        chunks.chain(tail).boxed()
    }
}

/// Shorthand for a random source with default chunking
pub fn random_source(total_bytes: usize) -> BoxSource {
    RandomSource::new(total_bytes).build()
}

/// What came out of a drained output
#[derive(Debug, Default)]
pub struct Drained {
    pub bytes: Vec<u8>,
    pub errors: Vec<io::Error>,
}

/// Consume `output` until it ends
pub async fn drain(output: &mut QueuedStream<BoxSource>) -> Drained {
    let mut drained = Drained::default();
    while let Some(item) = output.next().await {
        match item {
            Ok(chunk) => drained.bytes.extend_from_slice(&chunk),
            Err(err) => drained.errors.push(err),
        }
    }
    drained
}
