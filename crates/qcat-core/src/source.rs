//! Source adaptors
//!
//! Anything implementing `Stream<Item = Result<Bytes, E>> + Unpin` can be
//! appended. These helpers cover the common case of an `AsyncRead`.

use bytes::Bytes;
use futures::stream::BoxStream;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;

/// A boxed byte source, the usual element type of a heterogeneous queue
pub type BoxSource<E = std::io::Error> = BoxStream<'static, Result<Bytes, E>>;

/// Read size used by [`reader_source`]
pub const DEFAULT_READ_SIZE: usize = 16 * 1024;

/// Turn an `AsyncRead` (file, socket, stdin, ...) into a source
pub fn reader_source<R>(reader: R) -> BoxSource
where
    R: AsyncRead + Send + 'static,
{
    reader_source_with_capacity(reader, DEFAULT_READ_SIZE)
}

/// Like [`reader_source`] with an explicit maximum chunk size
pub fn reader_source_with_capacity<R>(reader: R, capacity: usize) -> BoxSource
where
    R: AsyncRead + Send + 'static,
{
    Box::pin(ReaderStream::with_capacity(reader, capacity.max(1)))
}
