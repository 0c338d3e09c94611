use std::path::Path;
use std::time::Instant;

use extmem_cache::{CacheOptions, create_row_page};
use extmem_page::{LibSvmParser, RowBlockParser};
use humansize::{DECIMAL, format_size};

#[derive(Debug, Clone, Copy)]
pub struct BuildFlags {
    pub block_size: usize,
    pub page_size: usize,
}

/// Parse `input` as LibSVM and write it to the row-page cache `cache`.
pub fn exec_build(input: &Path, cache: &str, flags: BuildFlags) -> anyhow::Result<()> {
    let start = Instant::now();
    let mut parser = LibSvmParser::from_path(input, flags.block_size)?;
    let options = CacheOptions::default().with_page_size_target(flags.page_size);

    let info = create_row_page(&mut parser, cache, &options)?;
    log::info!(
        "Built {} rows x {} columns ({} nonzeros) from {} of text in {:.2?}",
        info.num_row,
        info.num_col,
        info.num_nonzero,
        format_size(parser.bytes_read(), DECIMAL),
        start.elapsed()
    );
    Ok(())
}
