use std::ops::Range;

use extmem_error::{ExtmemResult, extmem_bail};

/// A borrowed block of parsed rows in compressed sparse row form.
///
/// Row `r` owns `index[offset[r]..offset[r + 1]]` (and the matching `value` slice). Note that
/// `offset[0]` need not be zero. The optional per-row columns have exactly `size` elements when
/// present.
#[derive(Debug, Clone, Copy)]
pub struct RowBlock<'a> {
    pub size: usize,
    pub offset: &'a [usize],
    pub label: Option<&'a [f32]>,
    pub weight: Option<&'a [f32]>,
    pub qid: Option<&'a [u64]>,
    pub index: &'a [u32],
    pub value: Option<&'a [f32]>,
}

impl RowBlock<'_> {
    /// The range of `index`/`value` covered by this block.
    pub fn entry_range(&self) -> Range<usize> {
        self.offset[0]..self.offset[self.size]
    }

    pub fn num_nonzero(&self) -> usize {
        self.entry_range().len()
    }

    /// The largest column index in the block, if it has any nonzeros.
    pub fn max_index(&self) -> Option<u32> {
        self.index[self.entry_range()].iter().copied().max()
    }
}

/// A restartable source of [`RowBlock`]s, such as a text parser.
///
/// Each block borrows from the parser, so it must be consumed before asking for the next one.
pub trait RowBlockParser {
    /// Restart from the first block.
    fn before_first(&mut self) -> ExtmemResult<()>;

    /// The next block, or `None` once the input is exhausted.
    fn next_block(&mut self) -> ExtmemResult<Option<RowBlock<'_>>>;

    /// The number of input bytes consumed so far, if the parser tracks it.
    fn bytes_read(&self) -> u64 {
        0
    }
}

/// One parsed row, used to fill an [`OwnedRowBlock`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowRecord {
    pub label: Option<f32>,
    pub weight: Option<f32>,
    pub qid: Option<u64>,
    pub features: Vec<(u32, f32)>,
}

impl RowRecord {
    pub fn new(features: impl IntoIterator<Item = (u32, f32)>) -> Self {
        Self {
            features: features.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn with_label(mut self, label: f32) -> Self {
        self.label = Some(label);
        self
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn with_qid(mut self, qid: u64) -> Self {
        self.qid = Some(qid);
        self
    }
}

/// Owned storage for a block of rows that can be lent out as a [`RowBlock`].
///
/// Labels, weights and query ids are all-or-nothing within a block: the first row decides which
/// of them are present and later rows must agree.
#[derive(Debug, Clone, PartialEq)]
pub struct OwnedRowBlock {
    offset: Vec<usize>,
    label: Vec<f32>,
    weight: Vec<f32>,
    qid: Vec<u64>,
    index: Vec<u32>,
    value: Vec<f32>,
}

impl Default for OwnedRowBlock {
    fn default() -> Self {
        Self {
            offset: vec![0],
            label: Vec::new(),
            weight: Vec::new(),
            qid: Vec::new(),
            index: Vec::new(),
            value: Vec::new(),
        }
    }
}

fn check_column<T, V>(column: &[T], rows: usize, value: Option<V>, name: &str) -> ExtmemResult<()> {
    let consistent = match value {
        Some(_) => column.len() == rows,
        None => column.is_empty(),
    };
    if !consistent {
        extmem_bail!("{name} must be given for every row of a block or for none of them");
    }
    Ok(())
}

fn present<T>(values: &[T]) -> Option<&[T]> {
    (!values.is_empty()).then_some(values)
}

impl OwnedRowBlock {
    pub fn from_rows<'a>(rows: impl IntoIterator<Item = &'a RowRecord>) -> ExtmemResult<Self> {
        let mut block = Self::default();
        for row in rows {
            block.push_row(row)?;
        }
        Ok(block)
    }

    /// The number of rows in the block.
    pub fn size(&self) -> usize {
        self.offset.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn push_row(&mut self, row: &RowRecord) -> ExtmemResult<()> {
        let rows = self.size();
        check_column(&self.label, rows, row.label, "label")?;
        check_column(&self.weight, rows, row.weight, "weight")?;
        check_column(&self.qid, rows, row.qid, "qid")?;

        self.label.extend(row.label);
        self.weight.extend(row.weight);
        self.qid.extend(row.qid);

        for &(index, value) in &row.features {
            self.index.push(index);
            self.value.push(value);
        }
        self.offset.push(self.index.len());
        Ok(())
    }

    pub fn clear(&mut self) {
        self.offset.clear();
        self.offset.push(0);
        self.label.clear();
        self.weight.clear();
        self.qid.clear();
        self.index.clear();
        self.value.clear();
    }

    pub fn as_block(&self) -> RowBlock<'_> {
        RowBlock {
            size: self.size(),
            offset: &self.offset,
            label: present(&self.label),
            weight: present(&self.weight),
            qid: present(&self.qid),
            index: &self.index,
            value: Some(&self.value),
        }
    }
}

/// An in-memory [`RowBlockParser`] over a list of owned blocks.
#[derive(Debug, Clone, Default)]
pub struct RowBlockContainer {
    blocks: Vec<OwnedRowBlock>,
    cursor: usize,
}

impl RowBlockContainer {
    pub fn new(blocks: Vec<OwnedRowBlock>) -> Self {
        Self { blocks, cursor: 0 }
    }

    /// Split `rows` into blocks of at most `block_size` rows.
    pub fn from_rows(rows: &[RowRecord], block_size: usize) -> ExtmemResult<Self> {
        if block_size == 0 {
            extmem_bail!("block size must be at least 1");
        }
        let blocks = rows
            .chunks(block_size)
            .map(OwnedRowBlock::from_rows)
            .collect::<ExtmemResult<Vec<_>>>()?;
        Ok(Self::new(blocks))
    }

    pub fn blocks(&self) -> &[OwnedRowBlock] {
        &self.blocks
    }
}

impl RowBlockParser for RowBlockContainer {
    fn before_first(&mut self) -> ExtmemResult<()> {
        self.cursor = 0;
        Ok(())
    }

    fn next_block(&mut self) -> ExtmemResult<Option<RowBlock<'_>>> {
        let Some(block) = self.blocks.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;
        Ok(Some(block.as_block()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owned_block_lends_all_columns() {
        let block = OwnedRowBlock::from_rows(&[
            RowRecord::new([(0, 1.0), (4, 2.0)]).with_label(1.0).with_qid(3),
            RowRecord::new([]).with_label(0.0).with_qid(3),
            RowRecord::new([(2, 5.0)]).with_label(1.0).with_qid(4),
        ])
        .unwrap();

        let borrowed = block.as_block();
        assert_eq!(borrowed.size, 3);
        assert_eq!(borrowed.offset, &[0, 2, 2, 3]);
        assert_eq!(borrowed.label, Some(&[1.0, 0.0, 1.0][..]));
        assert_eq!(borrowed.qid, Some(&[3, 3, 4][..]));
        assert_eq!(borrowed.weight, None);
        assert_eq!(borrowed.num_nonzero(), 3);
        assert_eq!(borrowed.max_index(), Some(4));
    }

    #[test]
    fn optional_columns_must_be_consistent() {
        let mut block = OwnedRowBlock::default();
        block.push_row(&RowRecord::new([(0, 1.0)]).with_qid(1)).unwrap();
        assert!(block.push_row(&RowRecord::new([(0, 1.0)])).is_err());

        let mut block = OwnedRowBlock::default();
        block.push_row(&RowRecord::new([(0, 1.0)])).unwrap();
        assert!(block.push_row(&RowRecord::new([(0, 1.0)]).with_weight(2.0)).is_err());
    }

    #[test]
    fn block_without_nonzeros_has_no_max_index() {
        let block = OwnedRowBlock::from_rows(&[RowRecord::new([]), RowRecord::new([])]).unwrap();
        assert_eq!(block.as_block().num_nonzero(), 0);
        assert_eq!(block.as_block().max_index(), None);
    }

    #[test]
    fn container_replays_blocks() {
        let rows: Vec<_> = (0..5).map(|i| RowRecord::new([(i, 1.0)])).collect();
        let mut container = RowBlockContainer::from_rows(&rows, 2).unwrap();

        let mut sizes = Vec::new();
        while let Some(block) = container.next_block().unwrap() {
            sizes.push(block.size);
        }
        assert_eq!(sizes, vec![2, 2, 1]);

        container.before_first().unwrap();
        assert_eq!(container.next_block().unwrap().map(|b| b.size), Some(2));
    }
}
