//! qcat-core: queued byte-stream concatenation
//!
//! Concatenates an ordered, growing queue of byte sources into one output
//! stream. Each appended source may carry its own byte budget, and the whole
//! output may carry a global one; bytes beyond either budget are discarded
//! and the next queued source takes over.
//!
//! ```ignore
//! use qcat_core::{reader_source, QueuedStream, SpliceConfig};
//!
//! let mut output = QueuedStream::new(SpliceConfig::new().with_max_bytes(Some(1000)));
//! output
//!     .append(reader_source(first_file), Some(300))
//!     .append(reader_source(second_file), None)
//!     .end();
//! while let Some(chunk) = output.next().await { /* ... */ }
//! ```

pub mod binding;
pub mod budget;
pub mod config;
pub mod error;
pub mod queue;
pub mod source;
pub mod splicer;
pub mod stream;

pub use config::SpliceConfig;
pub use error::ConfigError;
pub use queue::QueueEntry;
pub use source::{reader_source, reader_source_with_capacity, BoxSource};
pub use splicer::{SpliceState, Splicer};
pub use stream::{QueueHandle, QueuedStream};
