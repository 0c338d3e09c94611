use std::cmp::Ordering;
use std::mem::size_of;
use std::ops::Range;

use extmem_error::{ExtmemResult, extmem_bail, extmem_err};

use crate::RowBlock;

/// A single nonzero of a sparse row: the column (or, once transposed, the row) it belongs to and
/// its value.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[repr(C)]
pub struct Entry {
    pub index: u32,
    pub fvalue: f32,
}

impl Entry {
    pub fn new(index: u32, fvalue: f32) -> Self {
        Self { index, fvalue }
    }

    /// Order entries by value.
    pub fn cmp_value(&self, other: &Self) -> Ordering {
        self.fvalue.total_cmp(&other.fvalue)
    }
}

/// A batch of sparse rows in compressed sparse row form.
///
/// Row `i` owns `data[offset[i]..offset[i + 1]]`. `base_rowid` is the global index of the first
/// row, assigned by whoever hands the page out.
#[derive(Debug, Clone, PartialEq)]
pub struct SparsePage {
    pub offset: Vec<u64>,
    pub data: Vec<Entry>,
    pub base_rowid: u64,
}

impl Default for SparsePage {
    fn default() -> Self {
        Self {
            offset: vec![0],
            data: Vec::new(),
            base_rowid: 0,
        }
    }
}

impl SparsePage {
    /// Build a page from rows of entries.
    pub fn from_rows<R, I>(rows: R) -> Self
    where
        R: IntoIterator<Item = I>,
        I: IntoIterator<Item = Entry>,
    {
        let mut page = Self::default();
        for row in rows {
            page.push_row(row);
        }
        page
    }

    /// The number of rows in the page.
    pub fn size(&self) -> usize {
        self.offset.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// The number of bytes held by the offset and entry vectors.
    pub fn mem_cost_bytes(&self) -> usize {
        self.offset.len() * size_of::<u64>() + self.data.len() * size_of::<Entry>()
    }

    // Offsets are bounded by `data.len()`, which is a usize.
    #[allow(clippy::cast_possible_truncation)]
    fn row_range(&self, row: usize) -> Range<usize> {
        self.offset[row] as usize..self.offset[row + 1] as usize
    }

    /// The entries of row `row`.
    ///
    /// # Panics
    ///
    /// Panics if `row >= self.size()`.
    pub fn row(&self, row: usize) -> &[Entry] {
        &self.data[self.row_range(row)]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Entry]> + '_ {
        (0..self.size()).map(|row| self.row(row))
    }

    /// Reset to an empty page, keeping the allocations.
    pub fn clear(&mut self) {
        self.base_rowid = 0;
        self.offset.clear();
        self.offset.push(0);
        self.data.clear();
    }

    /// Append a single row.
    pub fn push_row<I: IntoIterator<Item = Entry>>(&mut self, row: I) {
        self.data.extend(row);
        self.offset.push(self.data.len() as u64);
    }

    /// Append every row of a parsed row block. Missing values are taken to be `1.0`.
    pub fn push_block(&mut self, block: &RowBlock<'_>) {
        let top = self.data.len() as u64;
        let nnz = block.entry_range();
        self.data.reserve(nnz.len());
        match block.value {
            Some(values) => self.data.extend(
                block.index[nnz.clone()]
                    .iter()
                    .zip(&values[nnz.clone()])
                    .map(|(&index, &fvalue)| Entry::new(index, fvalue)),
            ),
            None => self.data.extend(
                block.index[nnz.clone()]
                    .iter()
                    .map(|&index| Entry::new(index, 1.0)),
            ),
        }

        self.offset.reserve(block.size);
        let first = block.offset[0];
        self.offset.extend(
            block.offset[1..=block.size]
                .iter()
                .map(|&end| top + (end - first) as u64),
        );
    }

    /// Append every row of another page.
    pub fn push_page(&mut self, other: &SparsePage) {
        let top = self.data.len() as u64;
        let first = other.offset.first().copied().unwrap_or(0);
        self.data.extend_from_slice(&other.data);
        self.offset
            .extend(other.offset.iter().skip(1).map(|&end| top + (end - first)));
    }

    /// Transpose into a page with one row per column.
    ///
    /// Row `c` of the result lists `(base_rowid + r, value)` for every row `r` of this page with a
    /// nonzero in column `c`, in increasing row order.
    pub fn transpose(&self, num_columns: usize) -> ExtmemResult<SparsePage> {
        let mut counts = vec![0u64; num_columns];
        for entry in &self.data {
            let column = entry.index as usize;
            if column >= num_columns {
                extmem_bail!(
                    "column index {} out of bounds for {num_columns} columns",
                    entry.index
                );
            }
            counts[column] += 1;
        }

        let mut offset = Vec::with_capacity(num_columns + 1);
        offset.push(0u64);
        for count in &counts {
            let last = offset.last().copied().unwrap_or(0);
            offset.push(last + count);
        }

        let mut cursor = offset[..num_columns].to_vec();
        let mut data = vec![Entry::default(); self.data.len()];
        for (row, entries) in self.rows().enumerate() {
            let rowid = u32::try_from(self.base_rowid + row as u64).map_err(|_| {
                extmem_err!("row id {} does not fit a transposed entry", self.base_rowid)
            })?;
            for entry in entries {
                let column = entry.index as usize;
                #[allow(clippy::cast_possible_truncation)]
                let slot = cursor[column] as usize;
                data[slot] = Entry::new(rowid, entry.fvalue);
                cursor[column] += 1;
            }
        }

        Ok(SparsePage {
            offset,
            data,
            base_rowid: 0,
        })
    }

    /// Sort the entries of every row by value.
    pub fn sort_rows(&mut self) {
        for row in 0..self.size() {
            let range = self.row_range(row);
            self.data[range].sort_by(Entry::cmp_value);
        }
    }
}
