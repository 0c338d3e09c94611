use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use extmem_error::{ExtmemError, ExtmemResult, extmem_err};
use extmem_page::MetaInfo;

/// The tag at the head of every metadata file.
pub const MAGIC: u32 = 0xffff_ab01;

/// Write `MAGIC` followed by `info`, after checking that query ids cover every row or none.
pub fn write_meta_file(path: impl AsRef<Path>, info: &MetaInfo) -> ExtmemResult<()> {
    info.validate_qids()?;
    save_meta_file(path.as_ref(), info)
}

/// Write `info` as given, without checking it.
pub(crate) fn save_meta_file(path: &Path, info: &MetaInfo) -> ExtmemResult<()> {
    let mut write = BufWriter::new(create(path)?);
    write.write_all(&MAGIC.to_le_bytes())?;
    info.save_binary(&mut write)?;
    write.flush()?;
    Ok(())
}

/// Read the metadata file at `path`. The magic tag must be present but its value is not checked.
pub fn read_meta_file(path: impl AsRef<Path>) -> ExtmemResult<MetaInfo> {
    let path = path.as_ref();
    let mut read = BufReader::new(open(path)?);
    let mut magic = [0u8; 4];
    read.read_exact(&mut magic).map_err(|e| {
        extmem_err!(BadPageHeader: "cannot read the magic tag of {}: {e}", path.display())
    })?;
    MetaInfo::load_binary(&mut read)
        .map_err(|e| e.with_context(format!("reading metadata from {}", path.display())))
}

pub(crate) fn open(path: &Path) -> ExtmemResult<File> {
    File::open(path)
        .map_err(|e| ExtmemError::from(e).with_context(format!("opening {}", path.display())))
}

pub(crate) fn create(path: &Path) -> ExtmemResult<File> {
    File::create(path)
        .map_err(|e| ExtmemError::from(e).with_context(format!("creating {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_with_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.cache");
        let info = MetaInfo {
            num_row: 2,
            num_col: 4,
            num_nonzero: 3,
            labels: vec![1.0, 0.0],
            ..Default::default()
        };
        write_meta_file(&path, &info).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..4], &[0x01, 0xab, 0xff, 0xff]);
        assert_eq!(read_meta_file(&path).unwrap(), info);
    }

    #[test]
    fn partial_qids_are_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.cache");
        let info = MetaInfo {
            num_row: 3,
            qids: vec![1],
            ..Default::default()
        };
        let err = write_meta_file(&path, &info).unwrap_err();
        assert!(matches!(err, ExtmemError::GroupInvariant(..)));
        assert!(!path.exists());
    }

    #[test]
    fn short_file_is_a_bad_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.cache");
        std::fs::write(&path, [0x01, 0xab]).unwrap();
        let err = read_meta_file(&path).unwrap_err();
        assert!(matches!(err, ExtmemError::BadPageHeader(..)));
    }
}
