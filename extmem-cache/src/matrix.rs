use extmem_error::ExtmemResult;
use extmem_page::{MetaInfo, SparsePage};

use crate::PageSource;

/// A matrix whose rows are already materialized as a restartable sequence of batches.
///
/// Each batch's `base_rowid` is the global index of its first row.
pub trait RowBatchSource {
    fn info(&self) -> &MetaInfo;

    /// Restart from the first batch.
    fn before_first(&mut self) -> ExtmemResult<()>;

    /// The next batch, or `None` at the end of the matrix.
    fn next_batch(&mut self) -> ExtmemResult<Option<&SparsePage>>;
}

/// A matrix held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMatrix {
    info: MetaInfo,
    batches: Vec<SparsePage>,
    cursor: usize,
}

impl InMemoryMatrix {
    /// Wrap `batches` with their metadata, numbering the batches' rows consecutively.
    pub fn new(info: MetaInfo, mut batches: Vec<SparsePage>) -> Self {
        let mut base_rowid = 0;
        for batch in &mut batches {
            batch.base_rowid = base_rowid;
            base_rowid += batch.size() as u64;
        }
        Self {
            info,
            batches,
            cursor: 0,
        }
    }

    /// Wrap `batches`, deriving the row, column and nonzero counts from their contents.
    pub fn from_batches(batches: Vec<SparsePage>) -> Self {
        let info = MetaInfo {
            num_row: batches.iter().map(|b| b.size() as u64).sum(),
            num_col: batches
                .iter()
                .flat_map(|b| &b.data)
                .map(|e| u64::from(e.index) + 1)
                .max()
                .unwrap_or(0),
            num_nonzero: batches.iter().map(|b| b.data.len() as u64).sum(),
            ..Default::default()
        };
        Self::new(info, batches)
    }

    pub fn info_mut(&mut self) -> &mut MetaInfo {
        &mut self.info
    }

    pub fn batches(&self) -> &[SparsePage] {
        &self.batches
    }
}

impl RowBatchSource for InMemoryMatrix {
    fn info(&self) -> &MetaInfo {
        &self.info
    }

    fn before_first(&mut self) -> ExtmemResult<()> {
        self.cursor = 0;
        Ok(())
    }

    fn next_batch(&mut self) -> ExtmemResult<Option<&SparsePage>> {
        let batch = self.batches.get(self.cursor);
        if batch.is_some() {
            self.cursor += 1;
        }
        Ok(batch)
    }
}

/// A row cache can itself feed a builder, for example to derive a column cache from it.
impl RowBatchSource for PageSource {
    fn info(&self) -> &MetaInfo {
        PageSource::info(self)
    }

    fn before_first(&mut self) -> ExtmemResult<()> {
        PageSource::before_first(self);
        Ok(())
    }

    fn next_batch(&mut self) -> ExtmemResult<Option<&SparsePage>> {
        Ok(if self.next() { self.value() } else { None })
    }
}
