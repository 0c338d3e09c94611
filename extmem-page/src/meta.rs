use std::io::{Read, Write};

use bytes::{Buf, BufMut, BytesMut};
use extmem_error::{ExtmemResult, extmem_bail};

use crate::binary::{get_u32, get_u64, get_vec, put_f32_vec, put_u32_vec, put_u64_vec};

/// The version written at the head of every serialized [`MetaInfo`].
pub const META_VERSION: u32 = 1;

/// Dataset-wide metadata that accompanies a page cache.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetaInfo {
    pub num_row: u64,
    pub num_col: u64,
    pub num_nonzero: u64,
    pub labels: Vec<f32>,
    /// Query group boundaries: group `g` covers rows `group_ptr[g]..group_ptr[g + 1]`.
    pub group_ptr: Vec<u32>,
    /// The query id of every row, or empty.
    pub qids: Vec<u64>,
    pub weights: Vec<f32>,
    pub base_margin: Vec<f32>,
}

impl MetaInfo {
    /// The number of query groups.
    pub fn num_groups(&self) -> usize {
        self.group_ptr.len().saturating_sub(1)
    }

    /// Query ids must be given for every row or for none.
    pub fn validate_qids(&self) -> ExtmemResult<()> {
        if !self.qids.is_empty() && self.qids.len() as u64 != self.num_row {
            extmem_bail!(
                GroupInvariant: "{} query ids for {} rows; either every row has a query id or none does",
                self.qids.len(),
                self.num_row
            );
        }
        Ok(())
    }

    pub fn save_binary<W: Write + ?Sized>(&self, write: &mut W) -> ExtmemResult<()> {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u32_le(META_VERSION);
        buf.put_u64_le(self.num_row);
        buf.put_u64_le(self.num_col);
        buf.put_u64_le(self.num_nonzero);
        put_f32_vec(&mut buf, &self.labels);
        put_u32_vec(&mut buf, &self.group_ptr);
        put_u64_vec(&mut buf, &self.qids);
        put_f32_vec(&mut buf, &self.weights);
        put_f32_vec(&mut buf, &self.base_margin);
        write.write_all(&buf)?;
        Ok(())
    }

    /// Read a payload written by [`MetaInfo::save_binary`]. The payload must extend to the end
    /// of the stream.
    pub fn load_binary<R: Read + ?Sized>(read: &mut R) -> ExtmemResult<Self> {
        let mut bytes = Vec::new();
        read.read_to_end(&mut bytes)?;
        let mut buf = bytes.as_slice();

        let version = get_u32(&mut buf, "metadata version")?;
        if version != META_VERSION {
            extmem_bail!(InvalidSerde: "unsupported metadata version {version}");
        }

        let info = Self {
            num_row: get_u64(&mut buf, "num_row")?,
            num_col: get_u64(&mut buf, "num_col")?,
            num_nonzero: get_u64(&mut buf, "num_nonzero")?,
            labels: get_vec(&mut buf, 4, "labels", |b| b.get_f32_le())?,
            group_ptr: get_vec(&mut buf, 4, "group_ptr", |b| b.get_u32_le())?,
            qids: get_vec(&mut buf, 8, "qids", |b| b.get_u64_le())?,
            weights: get_vec(&mut buf, 4, "weights", |b| b.get_f32_le())?,
            base_margin: get_vec(&mut buf, 4, "base_margin", |b| b.get_f32_le())?,
        };

        if !buf.is_empty() {
            extmem_bail!(InvalidSerde: "{} trailing bytes after metadata", buf.len());
        }
        Ok(info)
    }
}
