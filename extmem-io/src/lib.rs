//! Blocking IO building blocks for the extmem page cache.
//!
//! Page caches are read and written through plain [`std::io`] streams. This crate provides the
//! framing helpers shared by the page codecs and the metadata file, and the bounded
//! [`Prefetcher`] that decodes pages on a background thread while the consumer works on the
//! previous one.

pub use prefetch::*;
pub use stream::*;

mod prefetch;
mod stream;
