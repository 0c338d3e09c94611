use extmem_error::{ExtmemResult, extmem_bail};

/// The separator between shard prefixes in a cache spec.
pub const SHARD_SEPARATOR: char = ':';

/// Resolve a cache spec such as `"/mnt/a/train.cache:/mnt/b/train.cache"` into its ordered shard
/// prefixes. The first prefix is also the path of the metadata file.
///
/// On Windows a spec starting with a single letter and the separator (`C:`) is a drive letter and
/// belongs to the first prefix.
pub fn cache_shards(spec: &str) -> ExtmemResult<Vec<String>> {
    split_shards(spec, cfg!(windows))
}

pub(crate) fn split_shards(spec: &str, drive_letters: bool) -> ExtmemResult<Vec<String>> {
    let mut chars = spec.chars();
    let has_drive = drive_letters
        && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.next() == Some(SHARD_SEPARATOR);

    let shards = if has_drive {
        let (drive, rest) = spec.split_at(2);
        let mut shards = split_tokens(rest);
        match shards.first_mut() {
            Some(first) => first.insert_str(0, drive),
            None => shards.push(drive.to_string()),
        }
        shards
    } else {
        split_tokens(spec)
    };

    if shards.is_empty() {
        extmem_bail!(BadCacheSpec: "cache spec {spec:?} names no shards");
    }
    Ok(shards)
}

/// Split on the separator, keeping empty tokens between separators but not after a trailing one.
fn split_tokens(spec: &str) -> Vec<String> {
    if spec.is_empty() {
        return Vec::new();
    }
    let spec = spec.strip_suffix(SHARD_SEPARATOR).unwrap_or(spec);
    spec.split(SHARD_SEPARATOR).map(str::to_string).collect()
}
