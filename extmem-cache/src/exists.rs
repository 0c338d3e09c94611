use std::fs::File;

use extmem_error::ExtmemResult;

use crate::cache_shards;

/// Whether the metadata file and every shard's `page_type` file of a cache can be opened.
///
/// Missing or unreadable files report `false`; only a spec that names no shards is an error.
pub fn cache_exists(cache_info: &str, page_type: &str) -> ExtmemResult<bool> {
    let prefixes = cache_shards(cache_info)?;
    if File::open(&prefixes[0]).is_err() {
        return Ok(false);
    }
    Ok(prefixes
        .iter()
        .all(|prefix| File::open(format!("{prefix}{page_type}")).is_ok()))
}
