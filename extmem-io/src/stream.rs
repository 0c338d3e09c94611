use std::io::{ErrorKind, Read, Write};

use extmem_error::{ExtmemResult, extmem_bail, extmem_err};

/// Identifiers longer than this are rejected rather than allocated.
const MAX_STRING_LEN: u64 = 1 << 16;

/// Write `value` as a little-endian `u64` byte length followed by its UTF-8 bytes.
pub fn write_string<W: Write + ?Sized>(write: &mut W, value: &str) -> ExtmemResult<()> {
    write.write_all(&(value.len() as u64).to_le_bytes())?;
    write.write_all(value.as_bytes())?;
    Ok(())
}

/// Read a string written by [`write_string`].
pub fn read_string<R: Read + ?Sized>(read: &mut R) -> ExtmemResult<String> {
    let mut len = [0u8; 8];
    if !read_exact_or_eof(read, &mut len)? {
        extmem_bail!(InvalidSerde: "expected a length-prefixed string, found end of stream");
    }
    let len = u64::from_le_bytes(len);
    if len > MAX_STRING_LEN {
        extmem_bail!(InvalidSerde: "string length {len} exceeds {MAX_STRING_LEN}");
    }

    let len = usize::try_from(len)
        .map_err(|_| extmem_err!(InvalidSerde: "string length {len} does not fit in memory"))?;
    let mut bytes = vec![0u8; len];
    if !read_exact_or_eof(read, &mut bytes)? {
        extmem_bail!(InvalidSerde: "string of {len} bytes is truncated");
    }
    String::from_utf8(bytes).map_err(|e| extmem_err!(InvalidSerde: "string is not UTF-8: {e}"))
}

/// Fill `buf` completely.
///
/// Returns `Ok(false)` if the stream ended before the first byte, which callers treat as a clean
/// end of stream. Ending part way through `buf` is an `InvalidSerde` error.
pub fn read_exact_or_eof<R: Read + ?Sized>(read: &mut R, buf: &mut [u8]) -> ExtmemResult<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match read.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }

    match filled {
        0 if !buf.is_empty() => Ok(false),
        n if n == buf.len() => Ok(true),
        n => Err(extmem_err!(
            InvalidSerde: "unexpected end of stream after {n} of {} bytes",
            buf.len()
        )),
    }
}
