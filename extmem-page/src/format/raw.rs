use std::io::{Read, Write};
use std::mem::size_of;

use bytes::{Buf, BufMut, BytesMut};
use extmem_error::{ExtmemResult, extmem_bail};
use extmem_io::read_exact_or_eof;
use itertools::Itertools;

use crate::binary::byte_len;
use crate::format::PageFormat;
use crate::{Entry, SparsePage};

pub const RAW_FORMAT: &str = "raw";

const ENTRY_SIZE: usize = size_of::<u32>() + size_of::<f32>();

/// The uncompressed page codec.
///
/// Each page is framed as a `u64` offset count followed by the offsets, then a `u64` entry count
/// followed by `(u32 index, f32 fvalue)` pairs, all little-endian.
#[derive(Debug, Default)]
pub struct RawFormat {
    scratch: Vec<u8>,
    encoded: BytesMut,
}

impl RawFormat {
    fn read_body(&mut self, read: &mut dyn Read, len: usize, what: &str) -> ExtmemResult<()> {
        // Grow with the data actually present rather than trusting a corrupt length.
        self.scratch.clear();
        (&mut *read).take(len as u64).read_to_end(&mut self.scratch)?;
        if self.scratch.len() != len {
            extmem_bail!(
                InvalidSerde: "page frame truncated: {} of {len} bytes of {what}",
                self.scratch.len()
            );
        }
        Ok(())
    }
}

fn read_count(read: &mut dyn Read, what: &str) -> ExtmemResult<u64> {
    let mut count = [0u8; 8];
    if !read_exact_or_eof(read, &mut count)? {
        extmem_bail!(InvalidSerde: "page frame truncated before the {what} count");
    }
    Ok(u64::from_le_bytes(count))
}

fn validate_offsets(offset: &[u64], num_entries: usize) -> ExtmemResult<()> {
    match (offset.first(), offset.last()) {
        (Some(&0), Some(&last)) if last == num_entries as u64 => {}
        _ => extmem_bail!(
            InvalidSerde: "page offsets must run from 0 to {num_entries}, found {:?}..{:?}",
            offset.first(),
            offset.last()
        ),
    }
    if let Some((prev, next)) = offset.iter().tuple_windows().find(|(a, b)| a > b) {
        extmem_bail!(InvalidSerde: "page offsets decrease from {prev} to {next}");
    }
    Ok(())
}

impl PageFormat for RawFormat {
    fn name(&self) -> &str {
        RAW_FORMAT
    }

    fn read(&mut self, page: &mut SparsePage, read: &mut dyn Read) -> ExtmemResult<bool> {
        let mut count = [0u8; 8];
        if !read_exact_or_eof(read, &mut count)? {
            return Ok(false);
        }
        let num_offsets = u64::from_le_bytes(count);
        self.read_body(read, byte_len(num_offsets, size_of::<u64>(), "offsets")?, "offsets")?;
        page.offset.clear();
        let mut buf = self.scratch.as_slice();
        page.offset
            .extend((0..num_offsets).map(|_| buf.get_u64_le()));

        let num_entries = read_count(read, "entry")?;
        self.read_body(read, byte_len(num_entries, ENTRY_SIZE, "entries")?, "entries")?;
        page.data.clear();
        let mut buf = self.scratch.as_slice();
        page.data.extend(
            (0..num_entries).map(|_| Entry::new(buf.get_u32_le(), buf.get_f32_le())),
        );

        validate_offsets(&page.offset, page.data.len())?;
        Ok(true)
    }

    fn write(&mut self, page: &SparsePage, write: &mut dyn Write) -> ExtmemResult<()> {
        self.encoded.clear();
        self.encoded
            .reserve(16 + page.offset.len() * size_of::<u64>() + page.data.len() * ENTRY_SIZE);
        self.encoded.put_u64_le(page.offset.len() as u64);
        for offset in &page.offset {
            self.encoded.put_u64_le(*offset);
        }
        self.encoded.put_u64_le(page.data.len() as u64);
        for entry in &page.data {
            self.encoded.put_u32_le(entry.index);
            self.encoded.put_f32_le(entry.fvalue);
        }
        write.write_all(&self.encoded)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use extmem_error::ExtmemError;

    use super::*;

    fn sample() -> SparsePage {
        SparsePage::from_rows([
            vec![Entry::new(0, 1.5), Entry::new(3, -2.0)],
            vec![],
            vec![Entry::new(7, 0.25)],
        ])
    }

    fn encode(pages: &[SparsePage]) -> Vec<u8> {
        let mut format = RawFormat::default();
        let mut bytes = Vec::new();
        for page in pages {
            format.write(page, &mut bytes).unwrap();
        }
        bytes
    }

    #[test]
    fn frame_layout() {
        let bytes = encode(&[sample()]);
        assert_eq!(bytes.len(), 8 + 4 * 8 + 8 + 3 * 8);
        assert_eq!(&bytes[..8], &4u64.to_le_bytes());
        assert_eq!(&bytes[40..48], &3u64.to_le_bytes());
        assert_eq!(&bytes[48..52], &0u32.to_le_bytes());
        assert_eq!(&bytes[52..56], &1.5f32.to_le_bytes());
    }

    #[test]
    fn reads_pages_until_clean_end_of_stream() {
        let empty = SparsePage::default();
        let mut read = Cursor::new(encode(&[sample(), empty.clone(), sample()]));
        let mut format = RawFormat::default();
        let mut page = SparsePage::default();

        assert!(format.read(&mut page, &mut read).unwrap());
        assert_eq!(page, sample());
        assert!(format.read(&mut page, &mut read).unwrap());
        assert_eq!(page, empty);
        assert!(format.read(&mut page, &mut read).unwrap());
        assert_eq!(page, sample());
        assert!(!format.read(&mut page, &mut read).unwrap());
    }

    #[test]
    fn truncated_frame_is_an_error() {
        let mut bytes = encode(&[sample()]);
        bytes.truncate(bytes.len() - 5);
        let mut format = RawFormat::default();
        let err = format
            .read(&mut SparsePage::default(), &mut Cursor::new(bytes))
            .unwrap_err();
        assert!(matches!(err, ExtmemError::InvalidSerde(..)));
    }

    #[test]
    fn inconsistent_offsets_are_rejected() {
        let mut page = sample();
        page.offset[2] = 9;
        let bytes = encode(&[page]);
        let mut format = RawFormat::default();
        assert!(
            format
                .read(&mut SparsePage::default(), &mut Cursor::new(bytes))
                .is_err()
        );
    }
}
