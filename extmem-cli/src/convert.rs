use extmem_cache::{CacheOptions, PageSource, PageType, create_column_page};

/// Read the row pages of `cache` and write its column pages next to them.
pub fn exec_convert(cache: &str, sorted: bool) -> anyhow::Result<()> {
    let options = CacheOptions::default();
    let mut source = PageSource::open(cache, PageType::Row, &options)?;
    create_column_page(&mut source, cache, sorted, &options)?;
    Ok(())
}
