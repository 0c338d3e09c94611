//! Little-endian helpers shared by the metadata payload and the `raw` page codec.

use bytes::{Buf, BufMut, BytesMut};
use extmem_error::{ExtmemResult, extmem_bail, extmem_err};

pub(crate) fn ensure_remaining(buf: &[u8], needed: usize, what: &str) -> ExtmemResult<()> {
    if buf.remaining() < needed {
        extmem_bail!(
            InvalidSerde: "truncated {what}: needed {needed} bytes, {} remaining",
            buf.remaining()
        );
    }
    Ok(())
}

pub(crate) fn get_u64(buf: &mut &[u8], what: &str) -> ExtmemResult<u64> {
    ensure_remaining(buf, 8, what)?;
    Ok(buf.get_u64_le())
}

pub(crate) fn get_u32(buf: &mut &[u8], what: &str) -> ExtmemResult<u32> {
    ensure_remaining(buf, 4, what)?;
    Ok(buf.get_u32_le())
}

/// Convert an element count read from a stream into a byte length, rejecting overflow.
pub(crate) fn byte_len(count: u64, elem_size: usize, what: &str) -> ExtmemResult<usize> {
    usize::try_from(count)
        .ok()
        .and_then(|count| count.checked_mul(elem_size))
        .ok_or_else(|| extmem_err!(InvalidSerde: "{what} length {count} is too large"))
}

/// Read a `u64` element count followed by that many fixed-size elements.
pub(crate) fn get_vec<T>(
    buf: &mut &[u8],
    elem_size: usize,
    what: &str,
    mut get: impl FnMut(&mut &[u8]) -> T,
) -> ExtmemResult<Vec<T>> {
    let count = get_u64(buf, what)?;
    let len = byte_len(count, elem_size, what)?;
    ensure_remaining(buf, len, what)?;
    Ok((0..len / elem_size).map(|_| get(buf)).collect())
}

pub(crate) fn put_f32_vec(buf: &mut BytesMut, values: &[f32]) {
    buf.reserve(8 + values.len() * 4);
    buf.put_u64_le(values.len() as u64);
    for value in values {
        buf.put_f32_le(*value);
    }
}

pub(crate) fn put_u32_vec(buf: &mut BytesMut, values: &[u32]) {
    buf.reserve(8 + values.len() * 4);
    buf.put_u64_le(values.len() as u64);
    for value in values {
        buf.put_u32_le(*value);
    }
}

pub(crate) fn put_u64_vec(buf: &mut BytesMut, values: &[u64]) {
    buf.reserve(8 + values.len() * 8);
    buf.put_u64_le(values.len() as u64);
    for value in values {
        buf.put_u64_le(*value);
    }
}
