//! In-memory building blocks of the extmem page cache.
//!
//! A [`SparsePage`] holds a batch of rows in compressed sparse row form and is the unit of IO.
//! Pages are filled from [`RowBlock`]s handed out by a [`RowBlockParser`], while the dataset-wide
//! labels, weights, query groups and counts accumulate in a [`MetaInfo`].
//!
//! Pages are encoded by a [`PageFormat`]. Formats are looked up by name in a [`FormatRegistry`],
//! which is passed around explicitly rather than living in a global.

pub use format::*;
pub use libsvm::*;
pub use meta::*;
pub use page::*;
pub use row_block::*;

mod binary;
mod format;
mod libsvm;
mod meta;
mod page;
mod row_block;
