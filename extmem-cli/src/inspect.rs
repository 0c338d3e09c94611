use std::fmt::{Display, Formatter};
use std::fs;

use extmem_cache::{CacheOptions, PageSource, PageType, cache_shards};
use extmem_page::MetaInfo;
use humansize::{DECIMAL, format_size};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShardStats {
    pub path: String,
    pub file_bytes: u64,
    pub pages: usize,
    pub rows: u64,
    pub entries: u64,
}

/// What `xm inspect` prints.
#[derive(Debug, Clone)]
pub struct InspectReport {
    pub page_type: PageType,
    pub info: MetaInfo,
    pub shards: Vec<ShardStats>,
}

/// Scan one pass of `cache` and tally pages per shard.
pub fn exec_inspect(cache: &str, page_type: PageType) -> anyhow::Result<InspectReport> {
    let mut shards = cache_shards(cache)?
        .into_iter()
        .map(|prefix| -> anyhow::Result<ShardStats> {
            let path = page_type.shard_path(&prefix);
            let file_bytes = fs::metadata(&path)?.len();
            Ok(ShardStats {
                path,
                file_bytes,
                ..Default::default()
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut source = PageSource::open(cache, page_type, &CacheOptions::default())?;
    let num_shards = shards.len();
    let mut page_index = 0;
    while source.next() {
        if let Some(page) = source.value() {
            // Pages rotate over the shards in order.
            let stats = &mut shards[page_index % num_shards];
            stats.pages += 1;
            stats.rows += page.size() as u64;
            stats.entries += page.data.len() as u64;
        }
        page_index += 1;
    }

    Ok(InspectReport {
        page_type,
        info: source.info().clone(),
        shards,
    })
}

impl Display for InspectReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let info = &self.info;
        writeln!(
            f,
            "rows: {}  columns: {}  nonzeros: {}",
            info.num_row, info.num_col, info.num_nonzero
        )?;
        writeln!(
            f,
            "labels: {}  weights: {}  query groups: {}  base margins: {}",
            info.labels.len(),
            info.weights.len(),
            info.num_groups(),
            info.base_margin.len()
        )?;
        write!(f, "{} shards of {}", self.shards.len(), self.page_type)?;
        for shard in &self.shards {
            write!(
                f,
                "\n  {}: {} pages, {} rows, {} entries, {}",
                shard.path,
                shard.pages,
                shard.rows,
                shard.entries,
                format_size(shard.file_bytes, DECIMAL)
            )?;
        }
        Ok(())
    }
}
