//! Sharded on-disk caches of sparse pages.
//!
//! A cache spec such as `"/mnt/a/train.cache:/mnt/b/train.cache"` names one prefix per shard.
//! The first prefix holds the dataset [`MetaInfo`](extmem_page::MetaInfo); each shard holds a
//! page file per [`PageType`], written round-robin by a [`PageWriter`] and read back in the same
//! rotation by a [`PageSource`], which keeps a few decoded pages per shard ahead of the reader.
//!
//! Caches are built from a streaming [`RowBlockParser`](extmem_page::RowBlockParser) with
//! [`create_row_page`], or from any [`RowBatchSource`] with [`create_page_from_matrix`].

pub use builder::*;
pub use exists::*;
pub use matrix::*;
pub use meta_file::{MAGIC, read_meta_file, write_meta_file};
pub use options::*;
pub use page_type::*;
pub use shards::*;
pub use source::*;
pub use writer::*;

mod builder;
mod exists;
mod matrix;
mod meta_file;
mod options;
mod page_type;
mod shards;
mod source;
mod writer;
