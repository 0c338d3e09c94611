use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;
use std::str::FromStr;

use extmem_error::{ExtmemError, ExtmemResult, extmem_bail, extmem_err};

use crate::{OwnedRowBlock, RowBlock, RowBlockParser, RowRecord};

/// The number of rows per block when none is given.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// A [`RowBlockParser`] over LibSVM text.
///
/// Every non-blank line is `label[:weight] [qid:<id>] <index>:<value> ...`. Text after `#` is a
/// comment. Weights and query ids must be given on every line of a block or on none.
#[derive(Debug)]
pub struct LibSvmParser<R> {
    read: R,
    block_size: usize,
    block: OwnedRowBlock,
    line: String,
    line_number: u64,
    bytes_read: u64,
}

impl LibSvmParser<BufReader<File>> {
    pub fn from_path(path: impl AsRef<Path>, block_size: usize) -> ExtmemResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            ExtmemError::from(e).with_context(format!("opening {}", path.display()))
        })?;
        Self::try_new(BufReader::new(file), block_size)
    }
}

impl<R: BufRead + Seek> LibSvmParser<R> {
    pub fn try_new(read: R, block_size: usize) -> ExtmemResult<Self> {
        if block_size == 0 {
            extmem_bail!("block size must be at least 1");
        }
        Ok(Self {
            read,
            block_size,
            block: OwnedRowBlock::default(),
            line: String::new(),
            line_number: 0,
            bytes_read: 0,
        })
    }

    fn fill_block(&mut self) -> ExtmemResult<()> {
        self.block.clear();
        while self.block.size() < self.block_size {
            self.line.clear();
            let n = self.read.read_line(&mut self.line)?;
            if n == 0 {
                break;
            }
            self.bytes_read += n as u64;
            self.line_number += 1;

            let Some(row) = parse_line(&self.line)
                .map_err(|e| e.with_context(format!("line {}", self.line_number)))?
            else {
                continue;
            };
            self.block
                .push_row(&row)
                .map_err(|e| e.with_context(format!("line {}", self.line_number)))?;
        }
        Ok(())
    }
}

fn parse_number<T: FromStr>(token: &str, what: &str) -> ExtmemResult<T> {
    token
        .parse()
        .map_err(|_| extmem_err!(InvalidSerde: "invalid {what} {token:?}"))
}

/// Parse one line, returning `None` for blank and comment-only lines.
fn parse_line(line: &str) -> ExtmemResult<Option<RowRecord>> {
    let content = line.split_once('#').map_or(line, |(content, _)| content);
    let mut tokens = content.split_ascii_whitespace();
    let Some(head) = tokens.next() else {
        return Ok(None);
    };

    let mut row = match head.split_once(':') {
        Some((label, weight)) => RowRecord::default()
            .with_label(parse_number(label, "label")?)
            .with_weight(parse_number(weight, "weight")?),
        None => RowRecord::default().with_label(parse_number(head, "label")?),
    };

    for token in tokens {
        let Some((key, value)) = token.split_once(':') else {
            extmem_bail!(InvalidSerde: "expected <index>:<value>, found {token:?}");
        };
        if key == "qid" {
            if row.qid.is_some() || !row.features.is_empty() {
                extmem_bail!(InvalidSerde: "qid must follow the label and appear once");
            }
            row.qid = Some(parse_number(value, "qid")?);
        } else {
            row.features
                .push((parse_number(key, "index")?, parse_number(value, "value")?));
        }
    }
    Ok(Some(row))
}

impl<R: BufRead + Seek> RowBlockParser for LibSvmParser<R> {
    fn before_first(&mut self) -> ExtmemResult<()> {
        self.read.seek(SeekFrom::Start(0))?;
        self.block.clear();
        self.line_number = 0;
        self.bytes_read = 0;
        Ok(())
    }

    fn next_block(&mut self) -> ExtmemResult<Option<RowBlock<'_>>> {
        self.fill_block()?;
        if self.block.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.block.as_block()))
    }

    fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use rstest::rstest;

    use super::*;

    const RANKING: &str = "\
# a small ranking set
1 qid:1 0:1.5 3:2
0 qid:1 2:0.5

1 qid:2 1:1 # trailing comment
";

    #[test]
    fn parses_labels_qids_and_features() {
        let mut parser = LibSvmParser::try_new(Cursor::new(RANKING), 16).unwrap();
        let block = parser.next_block().unwrap().unwrap();
        assert_eq!(block.size, 3);
        assert_eq!(block.label, Some(&[1.0, 0.0, 1.0][..]));
        assert_eq!(block.qid, Some(&[1, 1, 2][..]));
        assert_eq!(block.weight, None);
        assert_eq!(block.offset, &[0, 2, 3, 4]);
        assert_eq!(block.index, &[0, 3, 2, 1]);
        assert_eq!(block.value, Some(&[1.5, 2.0, 0.5, 1.0][..]));

        assert!(parser.next_block().unwrap().is_none());
        assert_eq!(parser.bytes_read(), RANKING.len() as u64);
    }

    #[test]
    fn splits_into_blocks_and_restarts() {
        let text = "1 0:1\n0 1:1\n1 2:1\n";
        let mut parser = LibSvmParser::try_new(Cursor::new(text), 2).unwrap();
        let mut sizes = Vec::new();
        while let Some(block) = parser.next_block().unwrap() {
            sizes.push(block.size);
        }
        assert_eq!(sizes, vec![2, 1]);

        parser.before_first().unwrap();
        assert_eq!(parser.bytes_read(), 0);
        assert_eq!(parser.next_block().unwrap().map(|b| b.size), Some(2));
    }

    #[test]
    fn weights_follow_the_label() {
        let mut parser = LibSvmParser::try_new(Cursor::new("1:0.5 4:2\n0:2 1:1\n"), 8).unwrap();
        let block = parser.next_block().unwrap().unwrap();
        assert_eq!(block.weight, Some(&[0.5, 2.0][..]));
        assert_eq!(block.label, Some(&[1.0, 0.0][..]));
    }

    #[rstest]
    #[case("x 0:1\n")]
    #[case("1 0:abc\n")]
    #[case("1 7\n")]
    #[case("1 0:1 qid:3\n")]
    #[case("1 qid:1 0:1\n0 1:1\n")]
    fn malformed_lines_are_rejected(#[case] text: &str) {
        let mut parser = LibSvmParser::try_new(Cursor::new(text), 8).unwrap();
        let err = parser.next_block().unwrap_err();
        assert!(matches!(err, ExtmemError::Context(..)));
    }

    #[test]
    fn reads_from_a_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"1 0:1 5:2\n").unwrap();
        let mut parser = LibSvmParser::from_path(file.path(), DEFAULT_BLOCK_SIZE).unwrap();
        let block = parser.next_block().unwrap().unwrap();
        assert_eq!(block.max_index(), Some(5));
    }
}
